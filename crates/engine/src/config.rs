use std::{collections::HashMap, fs, path::Path};

use serde::Deserialize;
use thiserror::Error;

use crate::address::EmailAddress;
use crate::engine::DEFAULT_SIZE_LIMIT;
use crate::mapping::{MappingError, MappingRule, MappingTable};

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Top-level configuration for the forwarding service.
#[derive(Debug, Deserialize)]
pub struct Config {
    pub forward: ForwardConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub sender: SenderConfig,
}

/// Forwarding policy configuration.
#[derive(Debug, Deserialize)]
pub struct ForwardConfig {
    /// Verified sender identity: a bare address usable verbatim, or a bare
    /// username completed with the receiving domain at rewrite time. Unset
    /// falls back to the noreply mailbox.
    #[serde(default)]
    pub verified_from: Option<String>,

    /// Hard ceiling on the serialized size of an outgoing message, in bytes.
    #[serde(default = "default_size_limit")]
    pub size_limit: usize,

    /// Recipient pattern to destination address(es).
    #[serde(default)]
    pub mapping: HashMap<String, Destinations>,
}

/// One or many destination addresses for a mapping entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Destinations {
    One(String),
    Many(Vec<String>),
}

impl Destinations {
    pub fn as_slice(&self) -> &[String] {
        match self {
            Destinations::One(single) => std::slice::from_ref(single),
            Destinations::Many(list) => list,
        }
    }
}

/// Message spool backend selection.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum StoreConfig {
    /// Spool of `.eml` files under a base directory.
    #[serde(rename = "file")]
    File {
        #[serde(default = "default_spool_path")]
        path: String,
    },

    /// In-memory spool, for tests and embedding.
    #[serde(rename = "memory")]
    Memory,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::File {
            path: default_spool_path(),
        }
    }
}

/// Outbound sender backend selection.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum SenderConfig {
    /// Writes outgoing messages into an outbox directory.
    #[serde(rename = "file_outbox")]
    FileOutbox {
        #[serde(default = "default_outbox_path")]
        path: String,
    },

    /// Records outgoing messages in memory.
    #[serde(rename = "memory")]
    Memory,

    /// Submits through an authenticated SMTP relay.
    #[cfg(feature = "smtp")]
    #[serde(rename = "smtp")]
    Smtp {
        host: String,
        #[serde(default)]
        port: Option<u16>,
        username: String,
        password: String,
        #[serde(default)]
        envelope_from: Option<String>,
    },
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self::FileOutbox {
            path: default_outbox_path(),
        }
    }
}

impl Config {
    /// Validates the configuration, failing fast on anything the engine
    /// would otherwise hit mid-message.
    pub fn validate(&self) -> ConfigResult<()> {
        self.forward.validate()
    }
}

impl ForwardConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.size_limit == 0 {
            return Err(ConfigError::ZeroSizeLimit);
        }
        if let Some(verified) = &self.verified_from {
            validate_verified_from(verified)?;
        }
        self.mapping_table().map(|_| ())
    }

    /// Builds the validated mapping table from the config entries.
    pub fn mapping_table(&self) -> ConfigResult<MappingTable> {
        let mut rules = Vec::with_capacity(self.mapping.len());
        for (pattern, destinations) in &self.mapping {
            rules.push(MappingRule::new(pattern, destinations.as_slice())?);
        }
        Ok(MappingTable::new(rules))
    }
}

/// Loads and validates configuration from a TOML file.
pub fn load_config(path: &Path) -> ConfigResult<Config> {
    let content = fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An I/O error occurred reading the file.
    #[error("config i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A parse error occurred deserializing TOML.
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// A mapping entry failed validation.
    #[error(transparent)]
    Mapping(#[from] MappingError),

    /// The verified_from value is neither a bare username nor a bare address.
    #[error("invalid verified_from '{0}': expected a bare username or address")]
    VerifiedFrom(String),

    /// The size limit must allow at least one byte.
    #[error("size_limit must be greater than zero")]
    ZeroSizeLimit,
}

/// Accepts a bare `local@domain` address or a bare username (the charset a
/// local part allows). Display names and surrounding whitespace are
/// rejected; the rewriter needs a value it can embed verbatim.
fn validate_verified_from(verified: &str) -> ConfigResult<()> {
    let invalid = || ConfigError::VerifiedFrom(verified.to_string());
    if verified.contains('@') {
        let parsed = EmailAddress::parse(verified).map_err(|_| invalid())?;
        if parsed.display_name().is_some() || parsed.address() != verified {
            return Err(invalid());
        }
        return Ok(());
    }
    let is_username = !verified.is_empty()
        && verified
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '+'));
    if is_username {
        Ok(())
    } else {
        Err(invalid())
    }
}

fn default_size_limit() -> usize {
    DEFAULT_SIZE_LIMIT
}

fn default_spool_path() -> String {
    "incoming".to_string()
}

fn default_outbox_path() -> String {
    "outbox".to_string()
}
