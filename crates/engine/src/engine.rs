//! The forwarding decision core.
//!
//! One invocation processes one received message for one envelope
//! recipient: resolve destinations, rewrite headers, enforce the size
//! ceiling, hand the copies to the sender, and report every outcome.
//! Failures become per-destination bounced outcomes plus at most one
//! consolidated bounce notification to the original sender; nothing in
//! here retries.

use thiserror::Error;
use tracing::{error, info, warn};

use crate::address::{AddressError, EmailAddress};
use crate::bounce::{BounceComposer, DeliveryFailure};
use crate::config::{ConfigResult, ForwardConfig};
use crate::mapping::MappingTable;
use crate::message::MailMessage;
use crate::rewrite::HeaderRewriter;
use crate::sender::{MailSender, SendError};

/// Default hard ceiling on the serialized size of an outgoing message.
pub const DEFAULT_SIZE_LIMIT: usize = 10_000_000;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that abort an invocation outright.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The envelope recipient is not a usable address.
    #[error("invalid envelope recipient '{recipient}': {source}")]
    Recipient {
        recipient: String,
        source: AddressError,
    },

    /// The bounce notification itself could not be submitted.
    #[error("bounce to '{target}' failed: {source}")]
    BounceSend { target: String, source: SendError },
}

/// What the engine decided to do with a message for one recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardAction {
    Forward,
    Bounce,
}

/// The decision for one invocation, made before any send is attempted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardingDecision {
    pub action: ForwardAction,
    pub destinations: Vec<EmailAddress>,
    pub reason: Option<String>,
}

/// Terminal state of one destination after processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DestinationStatus {
    /// The rewritten message was accepted by the sender backend.
    Forwarded,
    /// The destination was not served; the reason feeds the bounce.
    Bounced { reason: String },
}

/// One destination paired with its terminal state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationOutcome {
    pub destination: EmailAddress,
    pub status: DestinationStatus,
}

/// Aggregate result of one invocation, returned to the harness for logging.
#[derive(Debug, Clone)]
pub struct ForwardReport {
    pub decision: ForwardingDecision,
    pub outcomes: Vec<DestinationOutcome>,
    /// Whether a bounce notification went back to the original sender.
    pub bounced: bool,
}

/// Everything the decision needs, computed once per invocation.
struct Prepared {
    decision: ForwardingDecision,
    recipient: EmailAddress,
    rewritten: Option<MailMessage>,
}

/// The decision engine. Holds the read-only mapping table and policy;
/// all I/O goes through the store and sender collaborators.
pub struct ForwardingEngine {
    mapping: MappingTable,
    rewriter: HeaderRewriter,
    composer: BounceComposer,
    size_limit: usize,
}

impl ForwardingEngine {
    pub fn new(mapping: MappingTable, verified_from: Option<String>, size_limit: usize) -> Self {
        Self {
            mapping,
            rewriter: HeaderRewriter::new(verified_from.clone()),
            composer: BounceComposer::new(verified_from),
            size_limit,
        }
    }

    /// Builds an engine from validated forwarding configuration.
    pub fn from_config(config: &ForwardConfig) -> ConfigResult<Self> {
        Ok(Self::new(
            config.mapping_table()?,
            config.verified_from.clone(),
            config.size_limit,
        ))
    }

    /// Decides what to do with a message for one envelope recipient,
    /// without performing any send.
    ///
    /// Deterministic: identical message, recipient, and mapping yield an
    /// identical decision. [`process`](Self::process) acts on exactly this
    /// decision.
    pub fn decide(
        &self,
        message: &MailMessage,
        envelope_recipient: &str,
        envelope_sender: &str,
    ) -> EngineResult<ForwardingDecision> {
        self.prepare(message, envelope_recipient, envelope_sender)
            .map(|prepared| prepared.decision)
    }

    /// Processes one received message for one envelope recipient.
    ///
    /// Sends are sequential and never retried; a send failure downgrades
    /// that destination's outcome and feeds the consolidated bounce. The
    /// only fatal errors are an unusable envelope recipient and a bounce
    /// that itself cannot be submitted.
    pub async fn process(
        &self,
        message: &MailMessage,
        envelope_recipient: &str,
        envelope_sender: &str,
        sender: &dyn MailSender,
    ) -> EngineResult<ForwardReport> {
        let prepared = self.prepare(message, envelope_recipient, envelope_sender)?;
        let decision = prepared.decision;
        let recipient = prepared.recipient;

        if decision.action == ForwardAction::Bounce {
            let reason = decision.reason.clone().unwrap_or_default();
            let outcomes: Vec<DestinationOutcome> = decision
                .destinations
                .iter()
                .map(|destination| DestinationOutcome {
                    destination: destination.clone(),
                    status: DestinationStatus::Bounced {
                        reason: reason.clone(),
                    },
                })
                .collect();
            let failures = vec![DeliveryFailure::new(None, reason)];
            let bounced = self
                .send_bounce(message, envelope_sender, &recipient, &failures, sender)
                .await?;
            return Ok(ForwardReport {
                decision,
                outcomes,
                bounced,
            });
        }

        // Forward path: prepare() always rewrites before deciding Forward.
        let rewritten = match prepared.rewritten {
            Some(rewritten) => rewritten,
            None => message.clone(),
        };
        let mut outcomes = Vec::with_capacity(decision.destinations.len());
        let mut failures = Vec::new();
        for destination in &decision.destinations {
            match sender.send_raw(destination, &rewritten).await {
                Ok(()) => {
                    info!(
                        recipient = %envelope_recipient,
                        destination = %destination.address(),
                        "Forwarded email"
                    );
                    outcomes.push(DestinationOutcome {
                        destination: destination.clone(),
                        status: DestinationStatus::Forwarded,
                    });
                }
                Err(error) => {
                    warn!(
                        recipient = %envelope_recipient,
                        destination = %destination.address(),
                        error = %error,
                        "Error while forwarding email"
                    );
                    failures.push(DeliveryFailure::new(
                        Some(destination.clone()),
                        error.to_string(),
                    ));
                    outcomes.push(DestinationOutcome {
                        destination: destination.clone(),
                        status: DestinationStatus::Bounced {
                            reason: error.to_string(),
                        },
                    });
                }
            }
        }

        let bounced = if failures.is_empty() {
            false
        } else {
            self.send_bounce(message, envelope_sender, &recipient, &failures, sender)
                .await?
        };
        Ok(ForwardReport {
            decision,
            outcomes,
            bounced,
        })
    }

    /// Resolves, rewrites, and sizes the message into a decision.
    fn prepare(
        &self,
        message: &MailMessage,
        envelope_recipient: &str,
        envelope_sender: &str,
    ) -> EngineResult<Prepared> {
        let recipient =
            EmailAddress::parse(envelope_recipient).map_err(|source| EngineError::Recipient {
                recipient: envelope_recipient.to_string(),
                source,
            })?;

        let destinations = self.mapping.resolve(envelope_recipient).to_vec();
        if destinations.is_empty() {
            error!(recipient = %envelope_recipient, "No mapping rule for recipient");
            return Ok(Prepared {
                decision: ForwardingDecision {
                    action: ForwardAction::Bounce,
                    destinations,
                    reason: Some("no mapping".to_string()),
                },
                recipient,
                rewritten: None,
            });
        }

        let original_from = self.original_from(message, envelope_sender);
        let mut rewritten = message.clone();
        self.rewriter.rewrite(&mut rewritten, &original_from, &recipient);

        if rewritten.size() > self.size_limit {
            warn!(
                recipient = %envelope_recipient,
                size = rewritten.size(),
                limit = self.size_limit,
                "Message exceeds size limit"
            );
            return Ok(Prepared {
                decision: ForwardingDecision {
                    action: ForwardAction::Bounce,
                    destinations,
                    reason: Some("message too large".to_string()),
                },
                recipient,
                rewritten: None,
            });
        }

        Ok(Prepared {
            decision: ForwardingDecision {
                action: ForwardAction::Forward,
                destinations,
                reason: None,
            },
            recipient,
            rewritten: Some(rewritten),
        })
    }

    /// Parses the original From header, recovering from malformed values by
    /// carrying the raw string, and from a missing header via the envelope
    /// sender.
    fn original_from(&self, message: &MailMessage, envelope_sender: &str) -> EmailAddress {
        match message.header("From") {
            Some(value) => EmailAddress::parse(value).unwrap_or_else(|_| {
                warn!(value = %value, "Malformed From header, using raw value");
                EmailAddress::fallback(value)
            }),
            None => {
                warn!(
                    sender = %envelope_sender,
                    "Missing From header, using envelope sender"
                );
                EmailAddress::parse(envelope_sender)
                    .unwrap_or_else(|_| EmailAddress::fallback(envelope_sender))
            }
        }
    }

    /// Picks the address the bounce goes back to: the envelope sender when
    /// usable, then the original Return-Path, Reply-To, and From headers.
    ///
    /// An explicit null reverse-path marks the message as a notification
    /// itself and suppresses the bounce outright.
    fn bounce_target(&self, original: &MailMessage, envelope_sender: &str) -> Option<EmailAddress> {
        let envelope = envelope_sender.trim();
        if envelope == "<>" {
            return None;
        }
        if !envelope.is_empty() {
            if let Ok(address) = EmailAddress::parse(envelope) {
                return Some(address);
            }
        }
        ["Return-Path", "Reply-To", "From"]
            .into_iter()
            .filter_map(|name| original.header(name))
            .find_map(|value| EmailAddress::parse(value).ok())
    }

    /// Sends the consolidated bounce, returning whether one went out.
    async fn send_bounce(
        &self,
        original: &MailMessage,
        envelope_sender: &str,
        recipient: &EmailAddress,
        failures: &[DeliveryFailure],
        sender: &dyn MailSender,
    ) -> EngineResult<bool> {
        let Some(target) = self.bounce_target(original, envelope_sender) else {
            warn!(
                recipient = %recipient.address(),
                "No usable return path, suppressing bounce"
            );
            return Ok(false);
        };
        let bounce = self
            .composer
            .compose(&target, original.subject(), recipient, failures);
        sender
            .send_notification(&target, &bounce)
            .await
            .map_err(|source| EngineError::BounceSend {
                target: target.address().to_string(),
                source,
            })?;
        info!(
            target = %target.address(),
            recipient = %recipient.address(),
            failures = failures.len(),
            "Sent bounce notification"
        );
        Ok(true)
    }
}
