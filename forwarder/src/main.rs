use std::{env, error::Error, io::Read, path::Path, process};

use serde::Deserialize;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use mailway_engine::{
    load_config, Config, DestinationStatus, FileMessageStore, FileOutboxSender, ForwardingEngine,
    MailMessage, MailSender, MemoryMessageStore, MemorySender, MessageStore, SenderConfig,
    StoreConfig,
};
#[cfg(feature = "smtp")]
use mailway_engine::SmtpSender;

/// A receipt event emitted by the upstream mail-receiving service: one
/// stored message and the envelope recipients it was accepted for.
#[derive(Debug, Deserialize)]
struct ReceiptEvent {
    message_id: String,
    recipients: Vec<String>,
    /// Envelope sender; empty when the upstream does not report one.
    #[serde(default)]
    source: String,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    if let Err(error) = run().await {
        error!(error = %error, "Forwarding run failed");
        process::exit(1);
    }
}

/// Runs one receipt event end to end: load config, fetch the stored
/// message, process every envelope recipient, log every outcome.
///
/// Usage: `mailway-forwarder [config.toml] [event.json]`; the event is
/// read from stdin when no path is given.
async fn run() -> Result<(), Box<dyn Error>> {
    let mut args = env::args().skip(1);
    let config_path = args.next().unwrap_or_else(|| "config.toml".to_string());
    let event = read_event(args.next())?;

    let config = load_config(Path::new(&config_path))?;
    let engine = ForwardingEngine::from_config(&config.forward)?;
    let store = build_store(&config);
    let sender = build_sender(&config)?;

    info!(
        message_id = %event.message_id,
        recipients = event.recipients.len(),
        store = store.name(),
        sender = sender.name(),
        "Processing receipt event"
    );

    let raw = store.fetch(&event.message_id).await?;
    let message = MailMessage::parse(&raw);

    for recipient in &event.recipients {
        let report = engine
            .process(&message, recipient, &event.source, sender.as_ref())
            .await?;
        for outcome in &report.outcomes {
            match &outcome.status {
                DestinationStatus::Forwarded => {
                    info!(
                        recipient = %recipient,
                        destination = %outcome.destination.address(),
                        "Destination forwarded"
                    );
                }
                DestinationStatus::Bounced { reason } => {
                    warn!(
                        recipient = %recipient,
                        destination = %outcome.destination.address(),
                        reason = %reason,
                        "Destination bounced"
                    );
                }
            }
        }
        info!(
            recipient = %recipient,
            action = ?report.decision.action,
            bounced = report.bounced,
            "Recipient processed"
        );
    }
    Ok(())
}

/// Reads the receipt event from a JSON file, or stdin when no path is given.
fn read_event(path: Option<String>) -> Result<ReceiptEvent, Box<dyn Error>> {
    let payload = match path {
        Some(path) => std::fs::read_to_string(path)?,
        None => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };
    Ok(serde_json::from_str(&payload)?)
}

fn build_store(config: &Config) -> Box<dyn MessageStore> {
    match &config.store {
        StoreConfig::File { path } => Box::new(FileMessageStore::new(path)),
        StoreConfig::Memory => Box::new(MemoryMessageStore::new()),
    }
}

fn build_sender(config: &Config) -> Result<Box<dyn MailSender>, Box<dyn Error>> {
    let sender: Box<dyn MailSender> = match &config.sender {
        SenderConfig::FileOutbox { path } => Box::new(FileOutboxSender::new(path)),
        SenderConfig::Memory => Box::new(MemorySender::new()),
        #[cfg(feature = "smtp")]
        SenderConfig::Smtp {
            host,
            port,
            username,
            password,
            envelope_from,
        } => Box::new(SmtpSender::new(
            host,
            *port,
            username,
            password,
            envelope_from.as_deref(),
        )?),
    };
    Ok(sender)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_receipt_event() {
        let event: ReceiptEvent = serde_json::from_str(
            r#"{
                "message_id": "abc123",
                "recipients": ["info@example.com", "abuse@example.com"],
                "source": "jane@origin.example"
            }"#,
        )
        .unwrap();

        assert_eq!(event.message_id, "abc123");
        assert_eq!(event.recipients.len(), 2);
        assert_eq!(event.source, "jane@origin.example");
    }

    #[test]
    fn test_parse_receipt_event_without_source() {
        let event: ReceiptEvent =
            serde_json::from_str(r#"{"message_id": "abc123", "recipients": []}"#).unwrap();

        assert_eq!(event.source, "");
        assert!(event.recipients.is_empty());
    }
}
