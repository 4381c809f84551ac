pub mod address;
pub mod bounce;
pub mod config;
pub mod engine;
pub mod mapping;
pub mod message;
pub mod rewrite;
pub mod sender;
pub mod senders;
pub mod store;

pub use address::*;
pub use bounce::*;
pub use config::*;
pub use engine::*;
pub use mapping::*;
pub use message::*;
pub use rewrite::*;
pub use sender::*;
pub use senders::*;
pub use store::*;
