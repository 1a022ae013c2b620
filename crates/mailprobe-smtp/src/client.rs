//! Type-state SMTP client.

use crate::address::Address;
use crate::command::Command;
use crate::error::{Error, Result};
use crate::extension::{AuthMechanism, Extension};
use crate::reply::{Reply, ReplyCode, is_last_reply_line, parse_reply};
use crate::stream::SmtpStream;
use base64::Engine;
use std::collections::HashSet;
use std::marker::PhantomData;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio_rustls::TlsConnector;

/// Type-state marker for connected state.
#[derive(Debug)]
pub struct Connected;

/// Type-state marker for authenticated state.
#[derive(Debug)]
pub struct Authenticated;

/// Type-state marker for mail transaction started.
#[derive(Debug)]
pub struct MailTransaction;

/// Type-state marker for recipient added.
#[derive(Debug)]
pub struct RecipientAdded;

/// Type-state marker for data mode.
#[derive(Debug)]
pub struct Data;

/// Server capabilities from the greeting and EHLO response.
#[derive(Debug, Clone, Default)]
pub struct ServerInfo {
    /// Server hostname from greeting.
    pub hostname: String,
    /// Supported extensions.
    pub extensions: HashSet<Extension>,
}

impl ServerInfo {
    /// Checks if the server supports an extension.
    #[must_use]
    pub fn supports(&self, ext: &Extension) -> bool {
        self.extensions.contains(ext)
    }

    /// Checks if STARTTLS is supported.
    #[must_use]
    pub fn supports_starttls(&self) -> bool {
        self.supports(&Extension::StartTls)
    }

    /// Checks if delivery status notifications are supported.
    #[must_use]
    pub fn supports_dsn(&self) -> bool {
        self.supports(&Extension::Dsn)
    }

    /// Returns supported authentication mechanisms.
    #[must_use]
    pub fn auth_mechanisms(&self) -> Vec<AuthMechanism> {
        self.extensions
            .iter()
            .find_map(|ext| match ext {
                Extension::Auth(mechanisms) => Some(mechanisms.clone()),
                _ => None,
            })
            .unwrap_or_default()
    }
}

/// A recipient the server refused during `RCPT TO`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefusedRecipient {
    /// The refused address.
    pub address: Address,
    /// Reply code returned for it.
    pub code: u16,
    /// Reply text returned for it.
    pub message: String,
}

/// SMTP client with type-state pattern.
///
/// `S` is the transport; it defaults to [`SmtpStream`] but any
/// `AsyncRead + AsyncWrite` works, which is how tests script sessions.
#[derive(Debug)]
pub struct Client<State, S = SmtpStream> {
    reader: BufReader<S>,
    server_info: ServerInfo,
    _state: PhantomData<State>,
}

impl<S> Client<Connected, S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a client from a stream and reads the server greeting.
    ///
    /// # Errors
    ///
    /// Returns an error if reading the greeting fails or if the server returns an error.
    pub async fn from_stream(stream: S) -> Result<Self> {
        let mut reader = BufReader::new(stream);
        let greeting = read_reply(&mut reader).await?;
        if greeting.code != ReplyCode::SERVICE_READY {
            return Err(greeting.into_error());
        }

        let hostname = greeting
            .message
            .first()
            .and_then(|msg| msg.split_whitespace().next())
            .unwrap_or("unknown")
            .to_string();
        tracing::debug!(%hostname, "SMTP greeting received");

        Ok(Self {
            reader,
            server_info: ServerInfo {
                hostname,
                extensions: HashSet::new(),
            },
            _state: PhantomData,
        })
    }

    /// Sends EHLO and discovers server capabilities.
    ///
    /// # Errors
    ///
    /// Returns an error if the EHLO command fails.
    pub async fn ehlo(mut self, client_hostname: &str) -> Result<Self> {
        let reply = self
            .send_command(Command::Ehlo {
                hostname: client_hostname.to_string(),
            })
            .await?;
        if !reply.is_success() {
            return Err(reply.into_error());
        }

        // First line is the greeting, the rest are extensions.
        self.server_info.extensions = reply
            .message
            .iter()
            .skip(1)
            .map(|line| Extension::parse(line))
            .collect();
        Ok(self)
    }

    /// Authenticates using the PLAIN mechanism with an initial response.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AuthFailed`] if the server rejects the credentials.
    pub async fn auth_plain(
        mut self,
        username: &str,
        password: &str,
    ) -> Result<Client<Authenticated, S>> {
        let credentials = format!("\0{username}\0{password}");
        let encoded = base64::engine::general_purpose::STANDARD.encode(credentials.as_bytes());

        let reply = self
            .send_command(Command::Auth {
                mechanism: AuthMechanism::Plain,
                initial_response: Some(encoded),
            })
            .await?;
        check_auth(reply)?;

        Ok(self.transition())
    }

    /// Authenticates using the LOGIN mechanism.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AuthFailed`] if the server rejects the credentials, or
    /// a protocol error if it does not issue the expected challenges.
    pub async fn auth_login(
        mut self,
        username: &str,
        password: &str,
    ) -> Result<Client<Authenticated, S>> {
        let engine = base64::engine::general_purpose::STANDARD;

        let reply = self
            .send_command(Command::Auth {
                mechanism: AuthMechanism::Login,
                initial_response: None,
            })
            .await?;
        expect_challenge(&reply)?;

        let reply = self
            .send_command(Command::AuthContinuation(engine.encode(username)))
            .await?;
        expect_challenge(&reply)?;

        let reply = self
            .send_command(Command::AuthContinuation(engine.encode(password)))
            .await?;
        check_auth(reply)?;

        Ok(self.transition())
    }

    /// Starts a mail transaction without authentication (if server allows).
    ///
    /// # Errors
    ///
    /// Returns an error if the MAIL FROM command fails.
    pub async fn mail_from(self, from: &Address) -> Result<Client<MailTransaction, S>> {
        self.start_transaction(from).await
    }
}

impl Client<Connected, SmtpStream> {
    /// Upgrades the connection to TLS using STARTTLS and repeats EHLO.
    ///
    /// # Errors
    ///
    /// Returns an error if STARTTLS is not supported or if the upgrade fails.
    pub async fn starttls(
        mut self,
        server_hostname: &str,
        connector: &TlsConnector,
        client_hostname: &str,
    ) -> Result<Self> {
        if !self.server_info.supports_starttls() {
            return Err(Error::NotSupported("STARTTLS".into()));
        }

        let reply = self.send_command(Command::StartTls).await?;
        if reply.code != ReplyCode::SERVICE_READY {
            return Err(reply.into_error());
        }

        let stream = self
            .reader
            .into_inner()
            .upgrade_to_tls(server_hostname, connector)
            .await?;
        tracing::debug!(host = server_hostname, "SMTP connection upgraded to TLS");

        let client = Self {
            reader: BufReader::new(stream),
            server_info: ServerInfo {
                hostname: self.server_info.hostname,
                extensions: HashSet::new(),
            },
            _state: PhantomData,
        };
        client.ehlo(client_hostname).await
    }
}

impl<S> Client<Authenticated, S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Starts a mail transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the MAIL FROM command fails.
    pub async fn mail_from(self, from: &Address) -> Result<Client<MailTransaction, S>> {
        self.start_transaction(from).await
    }
}

impl<S> Client<MailTransaction, S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Offers every recipient and collects the ones the server refuses.
    ///
    /// `notify` is sent as the DSN `NOTIFY=` parameter, but only when the
    /// server advertised DSN.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllRecipientsRefused`] if no recipient was accepted,
    /// or an error if the connection fails.
    pub async fn recipients(
        mut self,
        to: &[Address],
        notify: Option<&str>,
    ) -> Result<(Client<RecipientAdded, S>, Vec<RefusedRecipient>)> {
        let notify = notify
            .filter(|_| self.server_info.supports_dsn())
            .map(str::to_string);
        let mut refused = Vec::new();
        let mut accepted = 0_usize;

        for address in to {
            let reply = self
                .send_command(Command::RcptTo {
                    to: address.clone(),
                    notify: notify.clone(),
                })
                .await?;
            if reply.is_success() {
                accepted += 1;
            } else {
                tracing::warn!(%address, code = %reply.code, "recipient refused");
                refused.push(RefusedRecipient {
                    address: address.clone(),
                    code: reply.code.as_u16(),
                    message: reply.message_text(),
                });
            }
        }

        if accepted == 0 {
            let list = refused
                .iter()
                .map(|r| format!("{} ({})", r.address, r.code))
                .collect::<Vec<_>>()
                .join(", ");
            return Err(Error::AllRecipientsRefused(list));
        }

        Ok((self.transition(), refused))
    }
}

impl<S> Client<RecipientAdded, S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Begins sending message data.
    ///
    /// # Errors
    ///
    /// Returns an error if the DATA command fails.
    pub async fn data(mut self) -> Result<Client<Data, S>> {
        let reply = self.send_command(Command::Data).await?;
        if reply.code != ReplyCode::START_DATA {
            return Err(reply.into_error());
        }
        Ok(self.transition())
    }
}

impl<S> Client<Data, S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Sends the message content and completes the transaction.
    ///
    /// Line endings are normalized to CRLF, lines starting with `.` are
    /// dot-stuffed and the terminating `.` line is appended.
    ///
    /// # Errors
    ///
    /// Returns an error if sending the message fails or server rejects it.
    pub async fn send_message(mut self, message: &[u8]) -> Result<Client<Connected, S>> {
        self.write_all(&dot_stuff(message)).await?;

        let reply = read_reply(&mut self.reader).await?;
        if !reply.is_success() {
            return Err(reply.into_error());
        }
        tracing::debug!(reply = %reply.message_text(), "message accepted");

        Ok(self.transition())
    }
}

// Common implementation for all states
impl<State, S> Client<State, S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Returns the server information.
    #[must_use]
    pub const fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }

    /// Sends QUIT and closes the connection (available in any state).
    ///
    /// # Errors
    ///
    /// Returns an error if the QUIT command fails.
    pub async fn quit(mut self) -> Result<()> {
        let reply = self.send_command(Command::Quit).await?;
        if !reply.is_success() && reply.code != ReplyCode::CLOSING {
            return Err(reply.into_error());
        }
        Ok(())
    }

    fn transition<T>(self) -> Client<T, S> {
        Client {
            reader: self.reader,
            server_info: self.server_info,
            _state: PhantomData,
        }
    }

    async fn start_transaction(mut self, from: &Address) -> Result<Client<MailTransaction, S>> {
        let reply = self
            .send_command(Command::MailFrom {
                from: from.clone(),
                size: None,
            })
            .await?;
        if !reply.is_success() {
            return Err(reply.into_error());
        }
        Ok(self.transition())
    }

    async fn send_command(&mut self, cmd: Command) -> Result<Reply> {
        tracing::trace!(command = %cmd.redacted(), "SMTP >");
        self.write_all(&cmd.serialize()).await?;
        read_reply(&mut self.reader).await
    }

    async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.reader.get_mut();
        stream.write_all(data).await?;
        stream.flush().await?;
        Ok(())
    }
}

async fn read_reply<S>(reader: &mut BufReader<S>) -> Result<Reply>
where
    S: AsyncRead + Unpin,
{
    let mut lines = Vec::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            return Err(Error::ConnectionClosed);
        }
        let line = line.trim_end().to_string();
        if line.is_empty() {
            continue;
        }

        let is_last = is_last_reply_line(&line);
        lines.push(line);
        if is_last {
            break;
        }
    }

    let reply = parse_reply(&lines)?;
    tracing::trace!(code = %reply.code, "SMTP <");
    Ok(reply)
}

fn expect_challenge(reply: &Reply) -> Result<()> {
    if reply.code == ReplyCode::AUTH_CONTINUE {
        Ok(())
    } else {
        Err(Error::AuthFailed {
            code: reply.code.as_u16(),
            message: reply.message_text(),
        })
    }
}

fn check_auth(reply: Reply) -> Result<()> {
    if reply.is_success() {
        Ok(())
    } else {
        Err(Error::AuthFailed {
            code: reply.code.as_u16(),
            message: reply.message_text(),
        })
    }
}

/// Normalizes line endings to CRLF, byte-stuffs leading dots and appends
/// the end-of-data marker.
fn dot_stuff(message: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(message.len() + 16);
    let body = message.strip_suffix(b"\n").unwrap_or(message);
    let body = body.strip_suffix(b"\r").unwrap_or(body);

    if !body.is_empty() {
        for line in body.split(|&b| b == b'\n') {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if line.first() == Some(&b'.') {
                out.push(b'.');
            }
            out.extend_from_slice(line);
            out.extend_from_slice(b"\r\n");
        }
    }
    out.extend_from_slice(b".\r\n");
    out
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
    fn test_dot_stuff_normalizes_and_terminates() {
        assert_eq!(dot_stuff(b"a\nb\n"), b"a\r\nb\r\n.\r\n");
        assert_eq!(dot_stuff(b"a\r\nb"), b"a\r\nb\r\n.\r\n");
    }

    #[test]
    fn test_dot_stuff_leading_dots() {
        assert_eq!(dot_stuff(b".hidden\r\n..two\r\n"), b"..hidden\r\n...two\r\n.\r\n");
    }

    #[test]
    fn test_dot_stuff_empty() {
        assert_eq!(dot_stuff(b""), b".\r\n");
    }

    #[test]
    fn test_server_info_capabilities() {
        let info = ServerInfo {
            hostname: "mx".to_string(),
            extensions: [
                Extension::Dsn,
                Extension::Auth(vec![AuthMechanism::Login]),
            ]
            .into_iter()
            .collect(),
        };
        assert!(info.supports_dsn());
        assert!(!info.supports_starttls());
        assert_eq!(info.auth_mechanisms(), vec![AuthMechanism::Login]);
        assert!(ServerInfo::default().auth_mechanisms().is_empty());
    }
}
