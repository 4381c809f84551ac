use lettre::address::Envelope;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use tracing::info;

use crate::address::EmailAddress;
use crate::message::MailMessage;
use crate::sender::{MailSender, SendError, SendFuture, SendResult};

/// Sender submitting through an authenticated SMTP relay.
///
/// Forwards go out with the configured envelope sender as reverse-path;
/// notifications always use a null reverse-path.
pub struct SmtpSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    envelope_from: Option<Address>,
}

impl SmtpSender {
    /// Connects a relay transport over TLS with the given credentials.
    ///
    /// `envelope_from` is the reverse-path for forwarded messages; when
    /// unset, forwards are also submitted with a null reverse-path.
    pub fn new(
        host: &str,
        port: Option<u16>,
        username: &str,
        password: &str,
        envelope_from: Option<&str>,
    ) -> SendResult<Self> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(host)
            .map_err(|e| SendError::Transport(format!("relay setup: {e}")))?
            .credentials(Credentials::new(username.to_string(), password.to_string()));
        if let Some(port) = port {
            builder = builder.port(port);
        }
        let envelope_from = envelope_from
            .map(|address| {
                address
                    .parse::<Address>()
                    .map_err(|e| SendError::Transport(format!("invalid envelope sender: {e}")))
            })
            .transpose()?;
        Ok(Self {
            transport: builder.build(),
            envelope_from,
        })
    }

    async fn submit(
        &self,
        reverse_path: Option<Address>,
        destination: &EmailAddress,
        message: &MailMessage,
    ) -> SendResult<()> {
        let to = destination
            .address()
            .parse::<Address>()
            .map_err(|e| SendError::Rejected(format!("invalid destination: {e}")))?;
        let envelope = Envelope::new(reverse_path, vec![to])
            .map_err(|e| SendError::Rejected(e.to_string()))?;
        self.transport
            .send_raw(&envelope, message.raw())
            .await
            .map_err(|e| SendError::Transport(e.to_string()))?;
        info!(destination = %destination.address(), "Submitted message to relay");
        Ok(())
    }
}

impl MailSender for SmtpSender {
    fn send_raw<'a>(
        &'a self,
        destination: &'a EmailAddress,
        message: &'a MailMessage,
    ) -> SendFuture<'a> {
        Box::pin(self.submit(self.envelope_from.clone(), destination, message))
    }

    fn send_notification<'a>(
        &'a self,
        to: &'a EmailAddress,
        message: &'a MailMessage,
    ) -> SendFuture<'a> {
        Box::pin(self.submit(None, to, message))
    }

    fn name(&self) -> &str {
        "smtp"
    }
}
