use std::cmp::Reverse;

use thiserror::Error;

use crate::address::{AddressError, EmailAddress};

/// Errors raised while building mapping rules from configuration.
#[derive(Debug, Error)]
pub enum MappingError {
    /// The pattern string was empty.
    #[error("empty mapping pattern")]
    EmptyPattern,
    /// The pattern string did not classify as any supported kind.
    #[error("invalid mapping pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
    /// A destination address for the rule did not parse.
    #[error("invalid destination '{destination}' for pattern '{pattern}': {source}")]
    InvalidDestination {
        pattern: String,
        destination: String,
        source: AddressError,
    },
    /// The rule listed no destinations at all.
    #[error("mapping pattern '{0}' has no destinations")]
    NoDestinations(String),
}

/// The kind of recipient pattern a mapping rule matches.
///
/// Patterns are stored lowercased; matching is case-insensitive on the
/// whole recipient address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingPattern {
    /// Matches one exact address (e.g. `info@example.com`).
    Address(String),
    /// Matches local parts starting with the prefix, at one domain
    /// (e.g. `info+@example.com` matches `info+spam@example.com`).
    PlusPrefix { prefix: String, domain: String },
    /// Matches a local part at any domain (e.g. `info`). A plus-suffixed
    /// recipient also matches on its base username (`info+tag@any.org`).
    Username(String),
    /// Matches any user at one domain (e.g. `@example.com`).
    Domain(String),
}

impl MappingPattern {
    /// Classifies a configuration pattern string.
    ///
    /// Spellings: `user@domain` (exact), `user+@domain` (plus-prefix),
    /// `user` or `user@*` (bare username), `@domain` or `*@domain`
    /// (domain catch-all). A pattern without `@` is always a bare
    /// username, so domain catch-alls require the leading `@`.
    pub fn parse(pattern: &str) -> Result<Self, MappingError> {
        let trimmed = pattern.trim().to_ascii_lowercase();
        if trimmed.is_empty() {
            return Err(MappingError::EmptyPattern);
        }
        let invalid = |reason: &str| MappingError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        };
        if trimmed.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(invalid("whitespace is not allowed"));
        }

        if let Some(domain) = trimmed
            .strip_prefix("*@")
            .or_else(|| trimmed.strip_prefix('@'))
        {
            if domain.is_empty() || domain.contains('@') {
                return Err(invalid("catch-all requires a bare domain after '@'"));
            }
            return Ok(Self::Domain(domain.to_string()));
        }

        let Some((local, domain)) = trimmed.split_once('@') else {
            return Ok(Self::Username(trimmed));
        };
        if domain == "*" {
            return Ok(Self::Username(local.to_string()));
        }
        if domain.is_empty() || domain.contains('@') {
            return Err(invalid("invalid domain"));
        }
        if local.ends_with('+') {
            return Ok(Self::PlusPrefix {
                prefix: local.to_string(),
                domain: domain.to_string(),
            });
        }
        Ok(Self::Address(trimmed))
    }

    /// Tests if this pattern matches a lowercased recipient, split into
    /// its whole form, local part, and domain.
    pub fn matches(&self, address: &str, local: &str, domain: &str) -> bool {
        match self {
            Self::Address(a) => a == address,
            Self::PlusPrefix { prefix, domain: d } => {
                domain == d && local.starts_with(prefix.as_str())
            }
            Self::Username(user) => {
                local == user || local.split('+').next() == Some(user.as_str())
            }
            Self::Domain(d) => domain == d,
        }
    }

    /// Sort tier: lower is more specific.
    fn specificity(&self) -> u8 {
        match self {
            Self::Address(_) => 0,
            Self::PlusPrefix { .. } => 1,
            Self::Username(_) => 2,
            Self::Domain(_) => 3,
        }
    }

    /// Pattern key length, used to break ties within a tier
    /// (longest pattern wins).
    fn key_len(&self) -> usize {
        match self {
            Self::Address(a) => a.len(),
            Self::PlusPrefix { prefix, domain } => prefix.len() + domain.len(),
            Self::Username(user) => user.len(),
            Self::Domain(domain) => domain.len(),
        }
    }
}

/// A single mapping rule: a recipient pattern and its forwarding targets.
#[derive(Debug, Clone)]
pub struct MappingRule {
    pub pattern: MappingPattern,
    pub destinations: Vec<EmailAddress>,
}

impl MappingRule {
    /// Builds a rule from configuration strings, validating the pattern
    /// and every destination address.
    pub fn new<S: AsRef<str>>(pattern: &str, destinations: &[S]) -> Result<Self, MappingError> {
        let parsed_pattern = MappingPattern::parse(pattern)?;
        if destinations.is_empty() {
            return Err(MappingError::NoDestinations(pattern.to_string()));
        }
        let mut parsed = Vec::with_capacity(destinations.len());
        for destination in destinations {
            let destination = destination.as_ref();
            let address = EmailAddress::parse(destination).map_err(|source| {
                MappingError::InvalidDestination {
                    pattern: pattern.to_string(),
                    destination: destination.to_string(),
                    source,
                }
            })?;
            parsed.push(address);
        }
        Ok(Self {
            pattern: parsed_pattern,
            destinations: parsed,
        })
    }
}

/// Recipient-to-destination lookup with structural precedence.
///
/// Rules are evaluated most specific tier first: exact address >
/// plus-prefix within the domain > bare username > domain catch-all.
/// Within a tier the longest pattern wins; the first match ends the
/// search. An empty result means the recipient is unmapped and the
/// caller bounces.
#[derive(Debug, Clone, Default)]
pub struct MappingTable {
    rules: Vec<MappingRule>,
}

impl MappingTable {
    /// Creates a table from rules, sorting them by specificity.
    pub fn new(mut rules: Vec<MappingRule>) -> Self {
        rules.sort_by_key(|r| (r.pattern.specificity(), Reverse(r.pattern.key_len())));
        Self { rules }
    }

    /// Resolves a recipient to its destination addresses.
    ///
    /// The recipient is lowercased before matching; an empty slice means
    /// no rule matched across all four tiers.
    pub fn resolve(&self, recipient: &str) -> &[EmailAddress] {
        let lower = recipient.trim().to_ascii_lowercase();
        let (local, domain) = match lower.split_once('@') {
            Some((local, domain)) => (local, domain),
            None => (lower.as_str(), ""),
        };
        for rule in &self.rules {
            if rule.pattern.matches(&lower, local, domain) {
                return &rule.destinations;
            }
        }
        &[]
    }

    /// Returns the number of rules in the table.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns whether the table holds no rules at all.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
