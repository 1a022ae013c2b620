//! POP3 command serialization (RFC 1939, RFC 2595).

/// POP3 command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// USER - Mailbox name
    User(String),
    /// PASS - Mailbox password
    Pass(String),
    /// STLS - Upgrade to TLS
    Stls,
    /// STAT - Drop listing
    Stat,
    /// LIST - Scan listing for every message
    List,
    /// RETR - Retrieve a message
    Retr(u32),
    /// DELE - Mark a message deleted
    Dele(u32),
    /// QUIT - Commit deletions and close
    Quit,
}

impl Command {
    /// Serializes the command to a CRLF-terminated line.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let line = match self {
            Self::User(name) => format!("USER {name}"),
            Self::Pass(password) => format!("PASS {password}"),
            Self::Stls => "STLS".to_string(),
            Self::Stat => "STAT".to_string(),
            Self::List => "LIST".to_string(),
            Self::Retr(id) => format!("RETR {id}"),
            Self::Dele(id) => format!("DELE {id}"),
            Self::Quit => "QUIT".to_string(),
        };

        let mut buf = line.into_bytes();
        buf.extend_from_slice(b"\r\n");
        buf
    }

    /// Returns a loggable form that never exposes the password.
    #[must_use]
    pub fn redacted(&self) -> String {
        match self {
            Self::Pass(_) => "PASS ****".to_string(),
            other => String::from_utf8_lossy(&other.serialize())
                .trim_end()
                .to_string(),
        }
    }
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
    fn test_serialize() {
        assert_eq!(Command::User("inbox".into()).serialize(), b"USER inbox\r\n");
        assert_eq!(Command::Retr(3).serialize(), b"RETR 3\r\n");
        assert_eq!(Command::Dele(12).serialize(), b"DELE 12\r\n");
        assert_eq!(Command::Quit.serialize(), b"QUIT\r\n");
    }

    #[test]
    fn test_pass_is_redacted() {
        assert_eq!(Command::Pass("hunter2".into()).redacted(), "PASS ****");
        assert_eq!(Command::Stat.redacted(), "STAT");
    }
}
