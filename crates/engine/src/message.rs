//! Raw mail message model used throughout the forwarding pipeline.
//!
//! This module defines [`MailMessage`], an ordered multi-map of
//! [RFC 5322](https://www.rfc-editor.org/rfc/rfc5322) header fields over an
//! opaque byte body. Each field keeps the exact bytes it was parsed from
//! (including folded continuation lines), so a message re-serializes
//! byte-identically except for the fields that were explicitly removed or
//! added. A cached `raw` form holds the full serialization; call
//! [`rebuild`](MailMessage::rebuild) after header mutations.

/// A single header field with its parsed name/value and original bytes.
///
/// `value` is unfolded and trimmed for lookups; `raw` is the untouched byte
/// run of the field (terminators and folds included) and is what
/// serialization emits for fields that were never modified.
#[derive(Debug, Clone)]
pub struct HeaderField {
    name: String,
    value: String,
    raw: Vec<u8>,
}

impl HeaderField {
    fn parsed(name: String, value: String, raw: Vec<u8>) -> Self {
        Self { name, value, raw }
    }

    fn synthesized(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
            raw: format!("{name}: {value}\r\n").into_bytes(),
        }
    }

    /// Returns the case-preserved field name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the unfolded, trimmed field value.
    pub fn value(&self) -> &str {
        &self.value
    }
}

/// A raw MIME document: ordered header fields, separator, and opaque body.
///
/// Header names are matched case-insensitively and may repeat; order is
/// preserved. The body and every untouched field re-serialize byte-for-byte,
/// which is what lets forwarded messages pass attachments through without
/// re-encoding.
#[derive(Debug, Clone)]
pub struct MailMessage {
    fields: Vec<HeaderField>,
    /// Blank-line bytes between header section and body, empty when the
    /// source had none.
    separator: Vec<u8>,
    body: Vec<u8>,
    /// Cached full serialization, rebuilt via [`rebuild`](Self::rebuild)
    /// after header mutations.
    raw: Vec<u8>,
}

impl MailMessage {
    /// Parses raw message bytes into header fields and body.
    ///
    /// The header section ends at the first blank line (the separator) or
    /// at the first line that is neither a `name: value` field nor a folded
    /// continuation, in which case that line starts the body. Parsing never
    /// fails; a message with no recognizable headers is all body.
    pub fn parse(bytes: &[u8]) -> Self {
        let mut fields: Vec<HeaderField> = Vec::new();
        let mut separator = Vec::new();
        let mut body_start = bytes.len();
        let mut pos = 0;

        while pos < bytes.len() {
            let line_end = next_line_end(bytes, pos);
            let line = &bytes[pos..line_end];
            let content = trim_line_ending(line);

            if content.is_empty() {
                separator = line.to_vec();
                body_start = line_end;
                break;
            }

            if content[0] == b' ' || content[0] == b'\t' {
                // Folded continuation of the previous field
                if let Some(last) = fields.last_mut() {
                    last.raw.extend_from_slice(line);
                    let folded = String::from_utf8_lossy(content);
                    let folded = folded.trim();
                    if !folded.is_empty() {
                        if !last.value.is_empty() {
                            last.value.push(' ');
                        }
                        last.value.push_str(folded);
                    }
                    pos = line_end;
                    continue;
                }
                body_start = pos;
                break;
            }

            match content.iter().position(|&b| b == b':') {
                Some(colon) => {
                    let name = String::from_utf8_lossy(&content[..colon]).trim().to_string();
                    let value = String::from_utf8_lossy(&content[colon + 1..])
                        .trim()
                        .to_string();
                    fields.push(HeaderField::parsed(name, value, line.to_vec()));
                    pos = line_end;
                }
                None => {
                    body_start = pos;
                    break;
                }
            }
        }

        Self {
            fields,
            separator,
            body: bytes[body_start..].to_vec(),
            raw: bytes.to_vec(),
        }
    }

    /// Builds a message from scratch with synthesized headers and a text body.
    pub fn compose(fields: &[(&str, &str)], body: &str) -> Self {
        let mut message = Self {
            fields: fields
                .iter()
                .map(|(name, value)| HeaderField::synthesized(name, value))
                .collect(),
            separator: b"\r\n".to_vec(),
            body: body.as_bytes().to_vec(),
            raw: Vec::new(),
        };
        message.rebuild();
        message
    }

    /// Returns the first header value matching `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
            .map(|f| f.value.as_str())
    }

    /// Returns all values for a header name, in original order.
    pub fn header_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> {
        self.fields
            .iter()
            .filter(move |f| f.name.eq_ignore_ascii_case(name))
            .map(|f| f.value.as_str())
    }

    /// Returns the message subject (convenience for `header("Subject")`).
    pub fn subject(&self) -> &str {
        self.header("Subject").unwrap_or_default()
    }

    /// Returns a reference to the ordered header field list.
    pub fn header_fields(&self) -> &[HeaderField] {
        &self.fields
    }

    /// Removes every occurrence of a header (case-insensitive), returning
    /// how many fields were dropped.
    ///
    /// The cached [`raw`](Self::raw) form is **not** updated automatically,
    /// call [`rebuild`](Self::rebuild) once after all header modifications.
    pub fn remove_header(&mut self, name: &str) -> usize {
        let before = self.fields.len();
        self.fields.retain(|f| !f.name.eq_ignore_ascii_case(name));
        before - self.fields.len()
    }

    /// Prepends a synthesized header to the beginning of the header list.
    ///
    /// The cached [`raw`](Self::raw) form is **not** updated automatically,
    /// call [`rebuild`](Self::rebuild) once after all header modifications.
    pub fn prepend_header(&mut self, name: &str, value: &str) {
        // A message parsed without a blank separator needs one once headers
        // exist, or the first body line would be read as a header.
        if self.separator.is_empty() && !self.body.is_empty() {
            self.separator = b"\r\n".to_vec();
        }
        self.fields.insert(0, HeaderField::synthesized(name, value));
    }

    /// Rebuilds the cached [`raw`](Self::raw) form from fields, separator,
    /// and body.
    ///
    /// Pre-computes the exact byte length, allocates once, and writes all
    /// parts via `extend_from_slice`. On a freshly parsed, unmodified
    /// message this reproduces the input bytes exactly.
    pub fn rebuild(&mut self) {
        let fields_len: usize = self.fields.iter().map(|f| f.raw.len()).sum();
        let mut raw = Vec::with_capacity(fields_len + self.separator.len() + self.body.len());
        for field in &self.fields {
            raw.extend_from_slice(&field.raw);
        }
        raw.extend_from_slice(&self.separator);
        raw.extend_from_slice(&self.body);
        self.raw = raw;
    }

    /// Returns the full serialized message (headers + separator + body).
    ///
    /// Returns the cached form; call [`rebuild`](Self::rebuild) after
    /// modifying headers to ensure this is up to date.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Returns the message body after the header section, untouched.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Returns the serialized size in bytes, as it would be transmitted.
    pub fn size(&self) -> usize {
        self.raw.len()
    }
}

/// Returns the index just past the terminator of the line starting at `start`.
fn next_line_end(bytes: &[u8], start: usize) -> usize {
    match bytes[start..].iter().position(|&b| b == b'\n') {
        Some(i) => start + i + 1,
        None => bytes.len(),
    }
}

/// Strips a trailing `\r\n` or `\n` from a line.
fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
