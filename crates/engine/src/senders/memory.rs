use std::sync::RwLock;

use crate::address::EmailAddress;
use crate::message::MailMessage;
use crate::sender::{MailSender, SendFuture};

/// How a recorded message was submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SentKind {
    /// Rewritten original sent to a forwarding destination.
    Forward,
    /// Bounce notification sent under a null reverse-path.
    Notification,
}

/// One message recorded by [`MemorySender`].
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub destination: String,
    pub raw: Vec<u8>,
    pub kind: SentKind,
}

/// Sender recording every submission in memory, for tests and embedding.
#[derive(Debug, Default)]
pub struct MemorySender {
    sent: RwLock<Vec<SentMessage>>,
}

impl MemorySender {
    /// Creates a new empty MemorySender.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of every recorded submission, in send order.
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.read().unwrap().clone()
    }

    /// Returns the number of recorded submissions.
    pub fn sent_count(&self) -> usize {
        self.sent.read().unwrap().len()
    }

    fn record(&self, destination: &EmailAddress, message: &MailMessage, kind: SentKind) {
        self.sent.write().unwrap().push(SentMessage {
            destination: destination.address().to_string(),
            raw: message.raw().to_vec(),
            kind,
        });
    }
}

impl MailSender for MemorySender {
    fn send_raw<'a>(
        &'a self,
        destination: &'a EmailAddress,
        message: &'a MailMessage,
    ) -> SendFuture<'a> {
        Box::pin(async move {
            self.record(destination, message, SentKind::Forward);
            Ok(())
        })
    }

    fn send_notification<'a>(
        &'a self,
        to: &'a EmailAddress,
        message: &'a MailMessage,
    ) -> SendFuture<'a> {
        Box::pin(async move {
            self.record(to, message, SentKind::Notification);
            Ok(())
        })
    }

    fn name(&self) -> &str {
        "memory"
    }
}
