//! Type-state POP3 client.

use crate::command::Command;
use crate::error::{Error, Result};
use crate::response::{ListEntry, Stat, StatusLine, unstuff_line};
use crate::stream::Pop3Stream;
use std::marker::PhantomData;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio_rustls::TlsConnector;

/// Default cap on a multi-line response body: 64 MiB.
pub const DEFAULT_MAX_RESPONSE_SIZE: usize = 64 * 1024 * 1024;

/// Longest status line accepted; RFC 1939 allows 512 octets.
const MAX_STATUS_LINE: usize = 8 * 1024;

/// Type-state marker for the AUTHORIZATION state.
#[derive(Debug)]
pub struct Authorization;

/// Type-state marker for the TRANSACTION state.
#[derive(Debug)]
pub struct Transaction;

/// POP3 client with type-state pattern.
///
/// `S` is the transport; it defaults to [`Pop3Stream`] but any
/// `AsyncRead + AsyncWrite` works.
#[derive(Debug)]
pub struct Client<State, S = Pop3Stream> {
    reader: BufReader<S>,
    greeting: String,
    max_response_size: usize,
    _state: PhantomData<State>,
}

impl<S> Client<Authorization, S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a client from a stream and reads the `+OK` greeting.
    ///
    /// # Errors
    ///
    /// Returns an error if the greeting is missing or negative.
    pub async fn from_stream(stream: S) -> Result<Self> {
        let mut reader = BufReader::new(stream);
        let greeting = read_status(&mut reader).await?.into_result()?;
        tracing::debug!(%greeting, "POP3 greeting received");

        Ok(Self {
            reader,
            greeting,
            max_response_size: DEFAULT_MAX_RESPONSE_SIZE,
            _state: PhantomData,
        })
    }

    /// Authenticates with `USER`/`PASS` and enters the TRANSACTION state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AuthFailed`] if either command is refused.
    pub async fn login(mut self, username: &str, password: &str) -> Result<Client<Transaction, S>> {
        self.simple(Command::User(username.to_string()))
            .await
            .map_err(into_auth_error)?;
        self.simple(Command::Pass(password.to_string()))
            .await
            .map_err(into_auth_error)?;

        Ok(Client {
            reader: self.reader,
            greeting: self.greeting,
            max_response_size: self.max_response_size,
            _state: PhantomData,
        })
    }
}

impl Client<Authorization, Pop3Stream> {
    /// Upgrades the connection with `STLS`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotSupported`] if the server refuses `STLS`, or an
    /// error if the handshake fails.
    pub async fn stls(mut self, hostname: &str, connector: &TlsConnector) -> Result<Self> {
        self.simple(Command::Stls).await.map_err(|e| match e {
            Error::Negative(text) => Error::NotSupported(format!("STLS ({text})")),
            other => other,
        })?;

        let stream = self
            .reader
            .into_inner()
            .upgrade_to_tls(hostname, connector)
            .await?;
        tracing::debug!(host = hostname, "POP3 connection upgraded to TLS");

        Ok(Self {
            reader: BufReader::new(stream),
            greeting: self.greeting,
            max_response_size: self.max_response_size,
            _state: PhantomData,
        })
    }
}

impl<S> Client<Transaction, S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Returns the message count and total size.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails or the reply is malformed.
    pub async fn stat(&mut self) -> Result<Stat> {
        let text = self.simple(Command::Stat).await?;
        Stat::parse(&text)
    }

    /// Returns the scan listing of every message not marked deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails or a line is malformed.
    pub async fn list(&mut self) -> Result<Vec<ListEntry>> {
        self.simple(Command::List).await?;
        let body = read_multiline(&mut self.reader, self.max_response_size).await?;
        String::from_utf8_lossy(&body)
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(ListEntry::parse)
            .collect()
    }

    /// Retrieves the raw bytes of message `id`, dot-stuffing removed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Negative`] if the message does not exist, or
    /// [`Error::TooLarge`] if it exceeds the response size cap.
    pub async fn retr(&mut self, id: u32) -> Result<Vec<u8>> {
        self.simple(Command::Retr(id)).await?;
        read_multiline(&mut self.reader, self.max_response_size).await
    }

    /// Marks message `id` deleted; the deletion is committed by [`Self::quit`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Negative`] if the message does not exist or is
    /// already deleted.
    pub async fn dele(&mut self, id: u32) -> Result<()> {
        self.simple(Command::Dele(id)).await.map(drop)
    }
}

// Common implementation for all states
impl<State, S> Client<State, S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Returns the text of the server greeting.
    #[must_use]
    pub fn greeting(&self) -> &str {
        &self.greeting
    }

    /// Caps the size of a multi-line response body.
    ///
    /// A larger `LIST` or `RETR` response fails with [`Error::TooLarge`]
    /// instead of being buffered.
    #[must_use]
    pub fn with_max_response_size(mut self, bytes: usize) -> Self {
        self.max_response_size = bytes;
        self
    }

    /// Sends `QUIT`; in the TRANSACTION state this commits deletions.
    ///
    /// # Errors
    ///
    /// Returns an error if the server does not answer `+OK`.
    pub async fn quit(mut self) -> Result<()> {
        self.simple(Command::Quit).await.map(drop)
    }

    /// Sends a command and returns the text of its positive status line.
    async fn simple(&mut self, cmd: Command) -> Result<String> {
        tracing::trace!(command = %cmd.redacted(), "POP3 >");
        let stream = self.reader.get_mut();
        stream.write_all(&cmd.serialize()).await?;
        stream.flush().await?;
        read_status(&mut self.reader).await?.into_result()
    }
}

/// Reads one line of at most `limit` bytes.
async fn read_line<S>(reader: &mut BufReader<S>, limit: usize) -> Result<Vec<u8>>
where
    S: AsyncRead + Unpin,
{
    let mut line = Vec::new();
    let read = reader
        .take(limit as u64)
        .read_until(b'\n', &mut line)
        .await?;
    if read == 0 {
        return Err(Error::ConnectionClosed);
    }
    if read == limit && !line.ends_with(b"\n") {
        return Err(Error::TooLarge(limit));
    }
    Ok(line)
}

async fn read_status<S>(reader: &mut BufReader<S>) -> Result<StatusLine>
where
    S: AsyncRead + Unpin,
{
    let line = read_line(reader, MAX_STATUS_LINE).await?;
    let status = StatusLine::parse(String::from_utf8_lossy(&line).trim_end())?;
    tracing::trace!(ok = matches!(status, StatusLine::Ok(_)), "POP3 <");
    Ok(status)
}

async fn read_multiline<S>(reader: &mut BufReader<S>, max_size: usize) -> Result<Vec<u8>>
where
    S: AsyncRead + Unpin,
{
    let mut body = Vec::new();
    loop {
        // Leaves room for a stuffed dot and the terminating ".\r\n".
        let limit = max_size.saturating_sub(body.len()).saturating_add(3);
        let line = read_line(reader, limit).await.map_err(|e| match e {
            Error::TooLarge(_) => Error::TooLarge(max_size),
            other => other,
        })?;
        match unstuff_line(&line) {
            Some(content) if body.len() + content.len() > max_size => {
                return Err(Error::TooLarge(max_size));
            }
            Some(content) => body.extend_from_slice(content),
            None => return Ok(body),
        }
    }
}

fn into_auth_error(error: Error) -> Error {
    match error {
        Error::Negative(text) => Error::AuthFailed(text),
        other => other,
    }
}
