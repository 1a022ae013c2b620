//! Error types for POP3 operations.

use std::io;

/// Result type alias for POP3 operations.
pub type Result<T> = std::result::Result<T, Error>;

/// POP3 error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// TLS error.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Server answered a command with `-ERR`.
    #[error("Server replied -ERR: {0}")]
    Negative(String),

    /// Server rejected the credentials.
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    /// Protocol error (unexpected or malformed response).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Response exceeded the configured size cap.
    #[error("Response exceeds {0} bytes")]
    TooLarge(usize),

    /// Server closed the connection.
    #[error("Connection closed by server")]
    ConnectionClosed,

    /// Feature not supported by server.
    #[error("Server does not support {0}")]
    NotSupported(String),
}
