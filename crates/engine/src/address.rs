//! Structured email address parsing.
//!
//! This module defines [`EmailAddress`], the display-name + address pair
//! used for envelope fields and rewritten
//! [RFC 5322](https://www.rfc-editor.org/rfc/rfc5322) headers. Parsing
//! accepts both `Name <addr>` and bare `addr` mailbox forms, including
//! quoted display names that contain commas or angle brackets.

use std::fmt;

use thiserror::Error;

/// Result type for address parsing operations.
pub type AddressResult<T> = Result<T, AddressError>;

/// Errors that can occur while parsing an address header value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    /// No valid `local@domain` pair was found in the input.
    #[error("no valid address in '{0}'")]
    Malformed(String),
}

/// A parsed mailbox: optional display name plus a `local@domain` address.
///
/// Immutable once parsed. [`parse`](Self::parse) and [`new`](Self::new)
/// guarantee a syntactically valid address; [`fallback`](Self::fallback)
/// is the explicit escape hatch for recovering unparsable headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailAddress {
    display_name: Option<String>,
    address: String,
}

impl EmailAddress {
    /// Parses a `From`/`To` style header value into an [`EmailAddress`].
    ///
    /// Accepted forms are a bare address, an angle-bracketed address, and a
    /// display name (optionally quoted) followed by an angle-bracketed
    /// address. Angle brackets inside a quoted display name do not
    /// terminate the name.
    ///
    /// # Examples
    ///
    /// ```rust
    /// let addr = mailway_engine::EmailAddress::parse("Jane Example <jane@example.com>").unwrap();
    /// assert_eq!(addr.display_name(), Some("Jane Example"));
    /// assert_eq!(addr.address(), "jane@example.com");
    /// ```
    ///
    /// ```rust
    /// let addr = mailway_engine::EmailAddress::parse("info@example.com").unwrap();
    /// assert_eq!(addr.display_name(), None);
    /// assert_eq!(addr.address(), "info@example.com");
    /// ```
    pub fn parse(value: &str) -> AddressResult<Self> {
        let trimmed = value.trim();
        if let Some((open, close)) = find_angle_addr(trimmed) {
            let candidate = trimmed[open + 1..close].trim();
            if !is_valid_address(candidate) {
                return Err(AddressError::Malformed(value.to_string()));
            }
            return Ok(Self {
                display_name: clean_display_name(&trimmed[..open]),
                address: candidate.to_string(),
            });
        }
        if is_valid_address(trimmed) {
            return Ok(Self {
                display_name: None,
                address: trimmed.to_string(),
            });
        }
        Err(AddressError::Malformed(value.to_string()))
    }

    /// Creates an address from its parts, validating the address portion.
    pub fn new(display_name: Option<String>, address: String) -> AddressResult<Self> {
        if !is_valid_address(&address) {
            return Err(AddressError::Malformed(address));
        }
        Ok(Self {
            display_name: display_name.filter(|name| !name.is_empty()),
            address,
        })
    }

    /// Creates an address from an unparsable header value, using the raw
    /// string as both display name and address.
    ///
    /// The result intentionally skips validation so that downstream
    /// components still have something to label the sender with.
    pub fn fallback(raw: &str) -> Self {
        let raw = raw.trim().to_string();
        Self {
            display_name: Some(raw.clone()),
            address: raw,
        }
    }

    /// Returns the display name, if one was present.
    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    /// Returns the bare `local@domain` address.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Returns the part of the address before the `@`.
    pub fn local_part(&self) -> &str {
        self.address
            .rsplit_once('@')
            .map(|(local, _)| local)
            .unwrap_or(&self.address)
    }

    /// Returns the domain after the `@`, or `None` for a
    /// [`fallback`](Self::fallback) value without one.
    pub fn domain(&self) -> Option<&str> {
        self.address.rsplit_once('@').map(|(_, domain)| domain)
    }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.display_name {
            Some(name) => f.write_str(&format_mailbox(name, &self.address)),
            None => f.write_str(&self.address),
        }
    }
}

/// Formats a display name and address as an RFC 5322 mailbox string.
///
/// The display name is quoted only when it contains characters that would
/// break an unquoted phrase; composed labels such as
/// `Jane Example at jane@example.com` render unquoted.
///
/// # Examples
///
/// ```rust
/// assert_eq!(
///     mailway_engine::format_mailbox("Jane Example", "noreply@example.com"),
///     "Jane Example <noreply@example.com>"
/// );
/// assert_eq!(
///     mailway_engine::format_mailbox("Example, Inc.", "info@example.com"),
///     "\"Example, Inc.\" <info@example.com>"
/// );
/// ```
pub fn format_mailbox(name: &str, address: &str) -> String {
    if name.is_empty() {
        return address.to_string();
    }
    if name
        .chars()
        .any(|c| matches!(c, '"' | '<' | '>' | ',' | ';' | ':' | '\\'))
    {
        let escaped = name.replace('\\', "\\\\").replace('"', "\\\"");
        format!("\"{escaped}\" <{address}>")
    } else {
        format!("{name} <{address}>")
    }
}

/// Finds the byte offsets of the first `<...>` pair outside quoted regions.
fn find_angle_addr(value: &str) -> Option<(usize, usize)> {
    let mut in_quotes = false;
    let mut escaped = false;
    let mut open = None;
    for (i, c) in value.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            '<' if !in_quotes && open.is_none() => open = Some(i),
            '>' if !in_quotes => {
                if let Some(start) = open {
                    return Some((start, i));
                }
            }
            _ => {}
        }
    }
    None
}

/// Strips surrounding quotes and `\"`/`\\` escapes from a display name.
fn clean_display_name(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let name = if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        let inner = &trimmed[1..trimmed.len() - 1];
        let mut out = String::with_capacity(inner.len());
        let mut escaped = false;
        for c in inner.chars() {
            if escaped {
                out.push(c);
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else {
                out.push(c);
            }
        }
        out
    } else {
        trimmed.to_string()
    };
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

/// Checks that a candidate is a plausible `local@domain` pair: exactly one
/// `@` with non-empty halves and no whitespace or structural characters.
fn is_valid_address(candidate: &str) -> bool {
    let Some((local, domain)) = candidate.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.is_empty()
        && !domain.contains('@')
        && candidate
            .chars()
            .all(|c| !c.is_whitespace() && !c.is_control() && !matches!(c, '<' | '>' | '"' | ','))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_address() {
        let addr = EmailAddress::parse("jane@example.com").unwrap();
        assert_eq!(addr.display_name(), None);
        assert_eq!(addr.address(), "jane@example.com");
        assert_eq!(addr.local_part(), "jane");
        assert_eq!(addr.domain(), Some("example.com"));
    }

    #[test]
    fn test_parse_named_address() {
        let addr = EmailAddress::parse("Jane Example <jane@example.com>").unwrap();
        assert_eq!(addr.display_name(), Some("Jane Example"));
        assert_eq!(addr.address(), "jane@example.com");
    }

    #[test]
    fn test_parse_angle_only() {
        let addr = EmailAddress::parse("<jane@example.com>").unwrap();
        assert_eq!(addr.display_name(), None);
        assert_eq!(addr.address(), "jane@example.com");
    }

    #[test]
    fn test_parse_quoted_name_with_comma() {
        let addr = EmailAddress::parse("\"Example, Inc.\" <info@example.com>").unwrap();
        assert_eq!(addr.display_name(), Some("Example, Inc."));
        assert_eq!(addr.address(), "info@example.com");
    }

    #[test]
    fn test_parse_quoted_name_with_angle_brackets() {
        let addr = EmailAddress::parse("\"Jane <at home>\" <jane@example.com>").unwrap();
        assert_eq!(addr.display_name(), Some("Jane <at home>"));
        assert_eq!(addr.address(), "jane@example.com");
    }

    #[test]
    fn test_parse_escaped_quote_in_name() {
        let addr = EmailAddress::parse("\"Jane \\\"JJ\\\" Example\" <jane@example.com>").unwrap();
        assert_eq!(addr.display_name(), Some("Jane \"JJ\" Example"));
    }

    #[test]
    fn test_parse_surrounding_whitespace() {
        let addr = EmailAddress::parse("  jane@example.com  ").unwrap();
        assert_eq!(addr.address(), "jane@example.com");
    }

    #[test]
    fn test_parse_rejects_missing_at() {
        assert!(matches!(
            EmailAddress::parse("not-an-address"),
            Err(AddressError::Malformed(_))
        ));
    }

    #[test]
    fn test_parse_rejects_empty_input() {
        assert!(EmailAddress::parse("").is_err());
        assert!(EmailAddress::parse("   ").is_err());
    }

    #[test]
    fn test_parse_rejects_empty_angle_addr() {
        assert!(EmailAddress::parse("Jane <>").is_err());
    }

    #[test]
    fn test_parse_rejects_double_at() {
        assert!(EmailAddress::parse("jane@@example.com").is_err());
        assert!(EmailAddress::parse("a@b@example.com").is_err());
    }

    #[test]
    fn test_parse_rejects_whitespace_in_address() {
        assert!(EmailAddress::parse("jane doe@example.com").is_err());
    }

    #[test]
    fn test_roundtrip_preserves_address() {
        for input in ["jane@example.com", "Jane Example <jane@example.com>"] {
            let addr = EmailAddress::parse(input).unwrap();
            assert_eq!(addr.address(), "jane@example.com");
            let reparsed = EmailAddress::parse(&addr.to_string()).unwrap();
            assert_eq!(reparsed.address(), addr.address());
            assert_eq!(reparsed.display_name(), addr.display_name());
        }
    }

    #[test]
    fn test_display_plain_name() {
        let addr = EmailAddress::parse("Jane Example <jane@example.com>").unwrap();
        assert_eq!(addr.to_string(), "Jane Example <jane@example.com>");
    }

    #[test]
    fn test_display_quotes_special_characters() {
        let addr =
            EmailAddress::new(Some("Example, Inc.".to_string()), "info@example.com".to_string())
                .unwrap();
        assert_eq!(addr.to_string(), "\"Example, Inc.\" <info@example.com>");
    }

    #[test]
    fn test_format_mailbox_leaves_at_sign_unquoted() {
        assert_eq!(
            format_mailbox("Jane Example at jane@example.com", "noreply@example.com"),
            "Jane Example at jane@example.com <noreply@example.com>"
        );
    }

    #[test]
    fn test_format_mailbox_empty_name() {
        assert_eq!(format_mailbox("", "info@example.com"), "info@example.com");
    }

    #[test]
    fn test_new_validates_address() {
        assert!(EmailAddress::new(None, "broken".to_string()).is_err());
        assert!(EmailAddress::new(None, "ok@example.com".to_string()).is_ok());
    }

    #[test]
    fn test_fallback_keeps_raw_value() {
        let addr = EmailAddress::fallback("totally broken header");
        assert_eq!(addr.display_name(), Some("totally broken header"));
        assert_eq!(addr.address(), "totally broken header");
        assert_eq!(addr.domain(), None);
    }
}
