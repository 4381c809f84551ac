//! Concrete [`MailSender`](crate::sender::MailSender) backends.

mod file_outbox;
mod memory;
#[cfg(feature = "smtp")]
mod smtp;

pub use file_outbox::FileOutboxSender;
pub use memory::{MemorySender, SentKind, SentMessage};
#[cfg(feature = "smtp")]
pub use smtp::SmtpSender;
