//! Header rewriting applied to messages before re-sending.
//!
//! An outbound relay only accepts mail whose From address is verified for
//! sending, so the original From can never be replayed as-is. The rewriter
//! replaces it with the configured verified address while keeping the
//! original sender visible in the display name, and points Reply-To back at
//! the original sender so replies keep working.

use crate::address::{format_mailbox, EmailAddress};
use crate::message::MailMessage;

/// Local part used for the From address when none is configured.
pub const DEFAULT_FROM_PREFIX: &str = "noreply";

/// Headers removed from the original message before the rewritten From and
/// Reply-To are inserted. Leaving any of these in place would either fail
/// relay verification or leak authentication state from the first hop.
pub const STRIPPED_HEADERS: [&str; 5] =
    ["From", "Reply-To", "Return-Path", "Sender", "DKIM-Signature"];

/// Resolves the configured verified sender to a concrete address for mail
/// received in `receiving_domain`.
///
/// A full configured address is used verbatim, a bare username is completed
/// with the receiving domain, and `None` falls back to
/// [`DEFAULT_FROM_PREFIX`] at the receiving domain.
pub fn verified_address(verified_from: Option<&str>, receiving_domain: &str) -> String {
    match verified_from {
        Some(verified) if verified.contains('@') => verified.to_string(),
        Some(prefix) => format!("{prefix}@{receiving_domain}"),
        None => format!("{DEFAULT_FROM_PREFIX}@{receiving_domain}"),
    }
}

/// Rewrites From/Reply-To on forwarded messages.
///
/// The verified sender is captured at construction: a full address is used
/// verbatim, a bare username is completed with the receiving domain at
/// rewrite time, and when nothing is configured the From falls back to
/// [`DEFAULT_FROM_PREFIX`] at the receiving domain with the original sender
/// embedded in the display name.
#[derive(Debug, Clone)]
pub struct HeaderRewriter {
    verified_from: Option<String>,
}

impl HeaderRewriter {
    pub fn new(verified_from: Option<String>) -> Self {
        Self { verified_from }
    }

    /// Builds the rewritten From mailbox for a message received at an
    /// address within `receiving_domain`.
    pub fn from_header(&self, original_from: &EmailAddress, receiving_domain: &str) -> String {
        let verified = verified_address(self.verified_from.as_deref(), receiving_domain);
        let label = match (&self.verified_from, original_from.display_name()) {
            // With no verified address configured, the From is a generic
            // noreply mailbox; the original sender survives in the label.
            (None, Some(name)) => format!("{} at {}", name, original_from.address()),
            (Some(_), Some(name)) => name.to_string(),
            (_, None) => original_from.address().to_string(),
        };
        format_mailbox(&label, &verified)
    }

    /// Returns the Reply-To value: an existing header is copied verbatim,
    /// otherwise replies are routed to the original From address.
    pub fn reply_to(&self, message: &MailMessage, original_from: &EmailAddress) -> String {
        match message.header("Reply-To") {
            Some(value) if !value.trim().is_empty() => value.trim().to_string(),
            _ => original_from.address().to_string(),
        }
    }

    /// Rewrites the message in place for re-sending to a destination.
    ///
    /// Strips the headers in [`STRIPPED_HEADERS`], prepends the new From and
    /// Reply-To, and rebuilds the serialized form. Every other header and
    /// the body keep their original bytes.
    pub fn rewrite(
        &self,
        message: &mut MailMessage,
        original_from: &EmailAddress,
        recipient: &EmailAddress,
    ) {
        let from = self.from_header(original_from, recipient.domain().unwrap_or_default());
        let reply_to = self.reply_to(message, original_from);
        for name in STRIPPED_HEADERS {
            message.remove_header(name);
        }
        message.prepend_header("Reply-To", &reply_to);
        message.prepend_header("From", &from);
        message.rebuild();
    }
}
