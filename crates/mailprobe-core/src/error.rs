//! Error types for the core library.

use thiserror::Error;

use crate::verdict::Status;

/// Errors that end a probe run in the ERROR state.
///
/// Cloneable so the same value can sit in the verdict and be handed to the
/// run's callback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    /// Connecting, TLS negotiation or an I/O timeout failed.
    #[error("Transport error at {endpoint}: {message}")]
    Transport {
        /// Endpoint identity.
        endpoint: String,
        /// Underlying error text.
        message: String,
    },

    /// The server rejected the credentials.
    #[error("Authentication failed at {endpoint}: {message}")]
    Authentication {
        /// Endpoint identity.
        endpoint: String,
        /// Underlying error text.
        message: String,
    },

    /// Malformed reply or command issued in the wrong state.
    #[error("Protocol error at {endpoint}: {message}")]
    Protocol {
        /// Endpoint identity.
        endpoint: String,
        /// Underlying error text.
        message: String,
    },

    /// A list, retrieve, delete or quit was rejected.
    #[error("Mailbox operation failed at {endpoint}: {message}")]
    Mailbox {
        /// Endpoint identity.
        endpoint: String,
        /// Underlying error text.
        message: String,
    },

    /// The SMTP transaction carrying the probe failed.
    #[error("Send failed at {endpoint}: {message}")]
    Send {
        /// Endpoint identity.
        endpoint: String,
        /// Underlying error text.
        message: String,
    },

    /// The retry budget ran out without a matching message.
    #[error("no response from receiving server ({endpoint}, {attempts} attempts)")]
    NoResponse {
        /// Endpoint that was polled.
        endpoint: String,
        /// Number of polling cycles performed.
        attempts: u32,
    },

    /// Evidence was reported for an endpoint the run does not know.
    #[error("internal bug assertion: unrecognized server {0}")]
    UnknownEndpoint(String),

    /// Every poll session finished but the verdict never became terminal.
    #[error("poll sessions finished without a verdict (status {0})")]
    Unsettled(Status),

    /// The run settled on a different status than expected.
    #[error("expected status {expected}, got {actual}")]
    UnexpectedStatus {
        /// Terminal status reached.
        actual: Status,
        /// Status the caller expected.
        expected: Status,
    },

    /// Invalid endpoint, probe or configuration file.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ProbeError {
    /// Builds a [`ProbeError::Transport`].
    #[must_use]
    pub fn transport(endpoint: &str, message: impl ToString) -> Self {
        Self::Transport {
            endpoint: endpoint.to_string(),
            message: message.to_string(),
        }
    }

    /// Builds a [`ProbeError::Authentication`].
    #[must_use]
    pub fn authentication(endpoint: &str, message: impl ToString) -> Self {
        Self::Authentication {
            endpoint: endpoint.to_string(),
            message: message.to_string(),
        }
    }

    /// Builds a [`ProbeError::Protocol`].
    #[must_use]
    pub fn protocol(endpoint: &str, message: impl ToString) -> Self {
        Self::Protocol {
            endpoint: endpoint.to_string(),
            message: message.to_string(),
        }
    }

    /// Builds a [`ProbeError::Mailbox`].
    #[must_use]
    pub fn mailbox(endpoint: &str, message: impl ToString) -> Self {
        Self::Mailbox {
            endpoint: endpoint.to_string(),
            message: message.to_string(),
        }
    }

    /// Builds a [`ProbeError::Send`].
    #[must_use]
    pub fn send(endpoint: &str, message: impl ToString) -> Self {
        Self::Send {
            endpoint: endpoint.to_string(),
            message: message.to_string(),
        }
    }

    /// Returns true for the retry-exhaustion error.
    #[must_use]
    pub const fn is_no_response(&self) -> bool {
        matches!(self, Self::NoResponse { .. })
    }
}

/// Result type alias using [`ProbeError`].
pub type Result<T> = std::result::Result<T, ProbeError>;

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
    fn no_response_message() {
        let err = ProbeError::NoResponse {
            endpoint: "inbox@hisp-b.example".into(),
            attempts: 30,
        };
        assert!(err.is_no_response());
        assert!(err.to_string().starts_with("no response from receiving server"));
    }

    #[test]
    fn unexpected_status_message() {
        let err = ProbeError::UnexpectedStatus {
            actual: Status::Rejected,
            expected: Status::Completed,
        };
        assert_eq!(err.to_string(), "expected status COMPLETED, got REJECTED");
    }

    #[test]
    fn constructors_carry_endpoint() {
        let err = ProbeError::authentication("a@x", "bad password");
        assert_eq!(err.to_string(), "Authentication failed at a@x: bad password");
        assert_eq!(err.clone(), err);
    }
}
