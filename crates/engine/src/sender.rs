//! Outbound mail submission seam.
//!
//! Everything the engine emits leaves through [`MailSender`]: rewritten
//! originals via `send_raw`, bounce notifications via `send_notification`.
//! Notifications are submitted under a null reverse-path so a failing
//! bounce can never bounce again.

use std::future::Future;
use std::io;
use std::pin::Pin;

use thiserror::Error;

use crate::address::EmailAddress;
use crate::message::MailMessage;

/// Result type for send operations.
pub type SendResult<T> = Result<T, SendError>;

/// Boxed future type for send operations, enabling object safety.
pub type SendFuture<'a> = Pin<Box<dyn Future<Output = SendResult<()>> + Send + 'a>>;

/// Errors that can occur while submitting outbound mail.
#[derive(Debug, Error)]
pub enum SendError {
    /// The submission service refused the message or its envelope.
    #[error("submission rejected: {0}")]
    Rejected(String),
    /// The transport failed before the message was accepted.
    #[error("transport error: {0}")]
    Transport(String),
    /// Local i/o failed while handing the message off.
    #[error("send i/o error: {0}")]
    Io(#[from] io::Error),
}

/// Outbound mail submission backend.
pub trait MailSender: Send + Sync {
    /// Submits a rewritten message to one forwarding destination.
    fn send_raw<'a>(
        &'a self,
        destination: &'a EmailAddress,
        message: &'a MailMessage,
    ) -> SendFuture<'a>;

    /// Submits a bounce notification under a null reverse-path.
    fn send_notification<'a>(
        &'a self,
        to: &'a EmailAddress,
        message: &'a MailMessage,
    ) -> SendFuture<'a>;

    /// Returns the name of this sender backend.
    fn name(&self) -> &str;
}
