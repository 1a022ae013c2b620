//! POP3 response parsing.

use crate::error::{Error, Result};

/// Parsed status line: `+OK text` or `-ERR text`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusLine {
    /// Positive response with its text.
    Ok(String),
    /// Negative response with its text.
    Err(String),
}

impl StatusLine {
    /// Parses a status line (without trailing CRLF).
    ///
    /// # Errors
    ///
    /// Returns a protocol error if the line starts with neither indicator.
    pub fn parse(line: &str) -> Result<Self> {
        if let Some(rest) = line.strip_prefix("+OK") {
            Ok(Self::Ok(rest.trim_start().to_string()))
        } else if let Some(rest) = line.strip_prefix("-ERR") {
            Ok(Self::Err(rest.trim_start().to_string()))
        } else {
            Err(Error::Protocol(format!("Unexpected status line: {line}")))
        }
    }

    /// Converts the line into the positive text, or [`Error::Negative`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Negative`] for `-ERR` lines.
    pub fn into_result(self) -> Result<String> {
        match self {
            Self::Ok(text) => Ok(text),
            Self::Err(text) => Err(Error::Negative(text)),
        }
    }
}

/// Mailbox drop listing from `STAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stat {
    /// Number of messages in the maildrop.
    pub count: u32,
    /// Total size in octets.
    pub size: u64,
}

impl Stat {
    /// Parses the text of a `+OK` reply to `STAT` (`nn mm`).
    ///
    /// # Errors
    ///
    /// Returns a protocol error if the counts are missing or not numeric.
    pub fn parse(text: &str) -> Result<Self> {
        let mut fields = text.split_whitespace();
        let count = parse_field(fields.next(), text)?;
        let size = parse_field(fields.next(), text)?;
        Ok(Self { count, size })
    }
}

/// One line of a `LIST` scan listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListEntry {
    /// Message number (1-based, stable for the session).
    pub id: u32,
    /// Message size in octets.
    pub size: u64,
}

impl ListEntry {
    /// Parses a scan listing line (`id size`).
    ///
    /// # Errors
    ///
    /// Returns a protocol error if the line is malformed.
    pub fn parse(line: &str) -> Result<Self> {
        let mut fields = line.split_whitespace();
        let id = parse_field(fields.next(), line)?;
        let size = parse_field(fields.next(), line)?;
        Ok(Self { id, size })
    }
}

fn parse_field<T: std::str::FromStr>(field: Option<&str>, line: &str) -> Result<T> {
    field
        .and_then(|f| f.parse().ok())
        .ok_or_else(|| Error::Protocol(format!("Malformed listing: {line}")))
}

/// Removes the dot-stuffing from one line of a multi-line body.
///
/// Returns `None` for the terminating `.` line.
#[must_use]
pub fn unstuff_line(line: &[u8]) -> Option<&[u8]> {
    let content = line
        .strip_suffix(b"\r\n")
        .or_else(|| line.strip_suffix(b"\n"))
        .unwrap_or(line);
    if content == b"." {
        return None;
    }
    Some(if content.starts_with(b"..") {
        &line[1..]
    } else {
        line
    })
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
    fn test_status_line() {
        assert_eq!(
            StatusLine::parse("+OK 2 messages").unwrap(),
            StatusLine::Ok("2 messages".into())
        );
        assert_eq!(StatusLine::parse("+OK").unwrap(), StatusLine::Ok(String::new()));
        assert_eq!(
            StatusLine::parse("-ERR no such message").unwrap(),
            StatusLine::Err("no such message".into())
        );
        assert!(StatusLine::parse("* OK imap").is_err());
    }

    #[test]
    fn test_negative_into_result() {
        let err = StatusLine::Err("locked".into()).into_result().unwrap_err();
        assert!(matches!(err, Error::Negative(ref t) if t == "locked"));
    }

    #[test]
    fn test_stat_parse() {
        assert_eq!(Stat::parse("2 320").unwrap(), Stat { count: 2, size: 320 });
        assert!(Stat::parse("two 320").is_err());
        assert!(Stat::parse("2").is_err());
    }

    #[test]
    fn test_list_entry_parse() {
        assert_eq!(ListEntry::parse("1 120").unwrap(), ListEntry { id: 1, size: 120 });
        assert!(ListEntry::parse("").is_err());
    }

    #[test]
    fn test_unstuff_line() {
        assert_eq!(unstuff_line(b".\r\n"), None);
        assert_eq!(unstuff_line(b"..dot\r\n"), Some(b".dot\r\n".as_slice()));
        assert_eq!(unstuff_line(b"plain\r\n"), Some(b"plain\r\n".as_slice()));
        assert_eq!(unstuff_line(b"..\r\n"), Some(b".\r\n".as_slice()));
    }
}
