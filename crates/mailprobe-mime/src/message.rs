//! Retrieved message handling.

use crate::error::Result;
use crate::header::Headers;

/// A parsed RFC 5322 message.
///
/// Only the header block is interpreted; the body is kept as raw bytes.
#[derive(Debug, Clone)]
pub struct Message {
    /// Message headers.
    pub headers: Headers,
    /// Raw body (everything after the first empty line).
    pub body: Vec<u8>,
}

impl Message {
    /// Parses a raw message.
    ///
    /// A message without an empty line is treated as headers only. Header
    /// bytes that are not valid UTF-8 are replaced rather than rejected.
    ///
    /// # Errors
    ///
    /// Returns an error if the header block is malformed.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let (head, body) = split_head_body(raw);
        let headers = Headers::parse(&String::from_utf8_lossy(head))?;
        Ok(Self {
            headers,
            body: body.to_vec(),
        })
    }

    /// Gets the decoded Subject header.
    #[must_use]
    pub fn subject(&self) -> Option<String> {
        self.headers.get_decoded("subject")
    }

    /// Gets the decoded From header.
    #[must_use]
    pub fn from(&self) -> Option<String> {
        self.headers.get_decoded("from")
    }

    /// Gets the Date header.
    #[must_use]
    pub fn date(&self) -> Option<&str> {
        self.headers.get("date")
    }

    /// Gets the Message-ID header.
    #[must_use]
    pub fn message_id(&self) -> Option<&str> {
        self.headers.get("message-id")
    }
}

/// Splits raw message bytes at the first empty line.
fn split_head_body(raw: &[u8]) -> (&[u8], &[u8]) {
    let crlf = find(raw, b"\r\n\r\n").map(|i| (i, 4));
    let lf = find(raw, b"\n\n").map(|i| (i, 2));

    let split = match (crlf, lf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    };

    match split {
        Some((index, len)) => (&raw[..index], &raw[index + len..]),
        None => (raw, &[]),
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_crlf_message() {
        let raw = b"From: a@example.com\r\n\
                    Subject: Re: T1-abc\r\n\
                    Message-ID: <1@example.com>\r\n\r\nHello\r\n";
        let message = Message::parse(raw).unwrap();
        assert_eq!(message.subject().as_deref(), Some("Re: T1-abc"));
        assert_eq!(message.from().as_deref(), Some("a@example.com"));
        assert_eq!(message.message_id(), Some("<1@example.com>"));
        assert_eq!(message.body, b"Hello\r\n");
    }

    #[test]
    fn test_parse_lf_message() {
        let raw = b"Subject: Confirmation: T1-abc\nDate: Mon, 1 Jan 2024 00:00:00 +0000\n\nbody";
        let message = Message::parse(raw).unwrap();
        assert_eq!(message.subject().as_deref(), Some("Confirmation: T1-abc"));
        assert_eq!(message.date(), Some("Mon, 1 Jan 2024 00:00:00 +0000"));
        assert_eq!(message.body, b"body");
    }

    #[test]
    fn test_parse_headers_only() {
        let message = Message::parse(b"Subject: only headers").unwrap();
        assert_eq!(message.subject().as_deref(), Some("only headers"));
        assert!(message.body.is_empty());
    }

    #[test]
    fn test_missing_subject() {
        let message = Message::parse(b"From: a@example.com\r\n\r\n").unwrap();
        assert!(message.subject().is_none());
    }
}
