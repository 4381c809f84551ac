use std::path::PathBuf;

use tracing::info;
use uuid::Uuid;

use crate::address::EmailAddress;
use crate::message::MailMessage;
use crate::sender::{MailSender, SendFuture, SendResult};

/// Sender writing each outgoing message into a per-destination outbox
/// directory, for an external submission agent to pick up.
///
/// Layout: `{base}/{destination}/{uuid}.eml`. This is the default backend;
/// it needs no credentials and makes every emitted message inspectable.
#[derive(Debug, Clone)]
pub struct FileOutboxSender {
    base: PathBuf,
}

impl FileOutboxSender {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    async fn write_message(
        &self,
        destination: &EmailAddress,
        message: &MailMessage,
    ) -> SendResult<()> {
        let dir = self.base.join(safe_component(destination.address()));
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(format!("{}.eml", Uuid::new_v4()));
        tokio::fs::write(&path, message.raw()).await?;
        info!(
            destination = %destination.address(),
            path = %path.display(),
            "Wrote message to outbox"
        );
        Ok(())
    }
}

impl MailSender for FileOutboxSender {
    fn send_raw<'a>(
        &'a self,
        destination: &'a EmailAddress,
        message: &'a MailMessage,
    ) -> SendFuture<'a> {
        Box::pin(self.write_message(destination, message))
    }

    fn send_notification<'a>(
        &'a self,
        to: &'a EmailAddress,
        message: &'a MailMessage,
    ) -> SendFuture<'a> {
        Box::pin(self.write_message(to, message))
    }

    fn name(&self) -> &str {
        "file_outbox"
    }
}

/// Normalizes an address to a safe directory name component.
fn safe_component(address: &str) -> String {
    address
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '@' | '.' | '-' | '_' | '+') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
