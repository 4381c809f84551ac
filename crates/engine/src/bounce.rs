//! Bounce notification composition.
//!
//! When forwarding fails, the original sender gets a single plain-text
//! notification back. The notification is a complete standalone message
//! ready for submission under a null reverse-path; it never embeds the
//! original body, so a bounce can never re-trigger size or content limits.

use chrono::Utc;
use uuid::Uuid;

use crate::address::{format_mailbox, EmailAddress};
use crate::message::MailMessage;
use crate::rewrite::verified_address;

/// Display name on every bounce notification.
pub const BOUNCE_FROM_NAME: &str = "Mail Delivery Subsystem";

/// Subject used when the original message had none.
pub const FALLBACK_SUBJECT: &str = "Auto-Reply";

/// One failed forwarding attempt, reported back to the original sender.
///
/// The destination is kept for logging; the bounce body names only the
/// receiving address and the failure reasons, never the forwarding targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryFailure {
    pub destination: Option<EmailAddress>,
    pub reason: String,
}

impl DeliveryFailure {
    pub fn new(destination: Option<EmailAddress>, reason: impl Into<String>) -> Self {
        Self {
            destination,
            reason: reason.into(),
        }
    }
}

/// Builds the bounce notification for an invocation's failed destinations.
#[derive(Debug, Clone)]
pub struct BounceComposer {
    verified_from: Option<String>,
}

impl BounceComposer {
    pub fn new(verified_from: Option<String>) -> Self {
        Self { verified_from }
    }

    /// Composes one notification covering every failure of the invocation.
    ///
    /// `bounce_to` is the resolved return address of the original sender,
    /// `recipient` the address the message was originally received at (its
    /// domain also anchors the From address and Message-ID).
    pub fn compose(
        &self,
        bounce_to: &EmailAddress,
        original_subject: &str,
        recipient: &EmailAddress,
        failures: &[DeliveryFailure],
    ) -> MailMessage {
        let domain = recipient.domain().unwrap_or_default();
        let from = format_mailbox(
            BOUNCE_FROM_NAME,
            &verified_address(self.verified_from.as_deref(), domain),
        );
        let subject = match original_subject.trim() {
            "" => format!("Undeliverable: {FALLBACK_SUBJECT}"),
            subject => format!("Undeliverable: {subject}"),
        };
        let date = Utc::now().to_rfc2822();
        let message_id = format!("<{}@{}>", Uuid::new_v4(), domain);
        let body = bounce_body(recipient, failures);

        MailMessage::compose(
            &[
                ("From", from.as_str()),
                ("To", bounce_to.address()),
                ("Subject", subject.as_str()),
                ("Date", date.as_str()),
                ("Message-ID", message_id.as_str()),
                ("MIME-Version", "1.0"),
                ("Content-Type", "text/plain; charset=utf-8"),
                ("Auto-Submitted", "auto-replied"),
            ],
            &body,
        )
    }
}

/// Plain-text bounce body naming the receiving address and each distinct
/// failure reason.
fn bounce_body(recipient: &EmailAddress, failures: &[DeliveryFailure]) -> String {
    let mut body = format!(
        "An error occurred while forwarding email for {} to its final \
         destination address. Check that the size of the email and its \
         attachments are not too large or contact the administrator for \
         assistance.\r\n\r\n",
        recipient.address()
    );
    let mut reasons: Vec<&str> = Vec::new();
    for failure in failures {
        if !reasons.contains(&failure.reason.as_str()) {
            reasons.push(&failure.reason);
        }
    }
    match reasons.as_slice() {
        [] => body.push_str("No destination accepted the message.\r\n"),
        [reason] => {
            body.push_str("The error message was: ");
            body.push_str(reason);
            body.push_str("\r\n");
        }
        all => {
            body.push_str("The error messages were:\r\n");
            for reason in all {
                body.push_str("- ");
                body.push_str(reason);
                body.push_str("\r\n");
            }
        }
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address(raw: &str) -> EmailAddress {
        EmailAddress::parse(raw).unwrap()
    }

    fn failure(destination: &str, reason: &str) -> DeliveryFailure {
        DeliveryFailure::new(Some(address(destination)), reason)
    }

    #[test]
    fn test_bounce_headers() {
        let composer = BounceComposer::new(None);
        let bounce = composer.compose(
            &address("jane@origin.example"),
            "Hello",
            &address("info@example.com"),
            &[failure("dest@dest.example", "message too large")],
        );

        assert_eq!(
            bounce.header("From"),
            Some("Mail Delivery Subsystem <noreply@example.com>")
        );
        assert_eq!(bounce.header("To"), Some("jane@origin.example"));
        assert_eq!(bounce.header("Subject"), Some("Undeliverable: Hello"));
        assert_eq!(bounce.header("Auto-Submitted"), Some("auto-replied"));
        assert_eq!(
            bounce.header("Content-Type"),
            Some("text/plain; charset=utf-8")
        );
        assert_eq!(bounce.header("MIME-Version"), Some("1.0"));
        assert!(bounce.header("Message-ID").unwrap().ends_with("@example.com>"));
        assert!(!bounce.header("Date").unwrap().is_empty());
    }

    #[test]
    fn test_bounce_from_uses_verified_address() {
        let composer = BounceComposer::new(Some("forwarder@example.com".to_string()));
        let bounce = composer.compose(
            &address("jane@origin.example"),
            "Hello",
            &address("info@example.com"),
            &[failure("dest@dest.example", "rejected")],
        );

        assert_eq!(
            bounce.header("From"),
            Some("Mail Delivery Subsystem <forwarder@example.com>")
        );
    }

    #[test]
    fn test_bounce_subject_fallback() {
        let composer = BounceComposer::new(None);
        let bounce = composer.compose(
            &address("jane@origin.example"),
            "  ",
            &address("info@example.com"),
            &[failure("dest@dest.example", "no mapping")],
        );

        assert_eq!(bounce.header("Subject"), Some("Undeliverable: Auto-Reply"));
    }

    #[test]
    fn test_bounce_body_names_recipient_and_reason() {
        let composer = BounceComposer::new(None);
        let bounce = composer.compose(
            &address("jane@origin.example"),
            "Hello",
            &address("info@example.com"),
            &[failure("dest@dest.example", "message too large")],
        );
        let body = String::from_utf8(bounce.body().to_vec()).unwrap();

        assert!(body.contains("An error occurred while forwarding email for info@example.com"));
        assert!(body.contains("The error message was: message too large"));
    }

    #[test]
    fn test_bounce_consolidates_failures() {
        let composer = BounceComposer::new(None);
        let bounce = composer.compose(
            &address("jane@origin.example"),
            "Hello",
            &address("info@example.com"),
            &[
                failure("one@dest.example", "message too large"),
                failure("two@dest.example", "connection refused"),
            ],
        );
        let body = String::from_utf8(bounce.body().to_vec()).unwrap();

        assert!(body.contains("The error messages were:"));
        assert!(body.contains("- message too large"));
        assert!(body.contains("- connection refused"));
    }

    #[test]
    fn test_bounce_collapses_duplicate_reasons() {
        let composer = BounceComposer::new(None);
        let bounce = composer.compose(
            &address("jane@origin.example"),
            "Hello",
            &address("info@example.com"),
            &[
                failure("one@dest.example", "message too large"),
                failure("two@dest.example", "message too large"),
            ],
        );
        let body = String::from_utf8(bounce.body().to_vec()).unwrap();

        assert!(body.contains("The error message was: message too large"));
        assert_eq!(body.matches("message too large").count(), 1);
    }

    #[test]
    fn test_bounce_never_names_destinations() {
        let composer = BounceComposer::new(None);
        let bounce = composer.compose(
            &address("jane@origin.example"),
            "Hello",
            &address("info@example.com"),
            &[failure("hidden@dest.example", "rejected")],
        );
        let body = String::from_utf8(bounce.body().to_vec()).unwrap();

        assert!(!body.contains("hidden@dest.example"));
    }
}
