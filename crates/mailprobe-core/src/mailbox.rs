//! Mailbox access used by the poll sessions and maintenance operations.
//!
//! The traits keep the polling logic independent of POP3 so it can be driven
//! by in-memory fakes; [`Pop3Connector`] is the production implementation.

use std::future::Future;
use std::time::Duration;

use mailprobe_pop3::stream::{Pop3Stream, connect, connect_tls};
use mailprobe_pop3::{Authorization, Client, Transaction};

use crate::endpoint::{Endpoint, Security};
use crate::error::{ProbeError, Result};
use crate::tls;

/// One message in a mailbox listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MailboxEntry {
    /// Message number within the session.
    pub number: u32,
    /// Size in octets.
    pub size: u64,
}

/// Opens authenticated mailbox sessions.
pub trait MailboxConnector {
    /// Session type produced by this connector.
    type Session: MailboxSession;

    /// Connects to the endpoint's mailbox and authenticates.
    ///
    /// Fails with [`ProbeError::Transport`] or [`ProbeError::Authentication`].
    fn connect(&self, endpoint: &Endpoint) -> impl Future<Output = Result<Self::Session>>;
}

/// An authenticated mailbox session.
pub trait MailboxSession {
    /// Lists the messages in the mailbox.
    fn list(&mut self) -> impl Future<Output = Result<Vec<MailboxEntry>>>;

    /// Retrieves the raw bytes of one message.
    fn retrieve(&mut self, number: u32) -> impl Future<Output = Result<Vec<u8>>>;

    /// Marks one message for deletion.
    fn delete(&mut self, number: u32) -> impl Future<Output = Result<()>>;

    /// Closes the session, committing deletions.
    fn quit(self) -> impl Future<Output = Result<()>>;
}

/// [`MailboxConnector`] speaking POP3.
#[derive(Debug, Clone, Copy, Default)]
pub struct Pop3Connector;

impl Pop3Connector {
    /// Creates the connector.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl MailboxConnector for Pop3Connector {
    type Session = Pop3Session;

    async fn connect(&self, endpoint: &Endpoint) -> Result<Pop3Session> {
        let id = endpoint.id.as_str();
        let limit = endpoint.timeouts.connect();
        let client = match tokio::time::timeout(limit, open(endpoint)).await {
            Ok(result) => result?,
            Err(_) => return Err(timed_out(id, limit)),
        };

        let leg = &endpoint.pop3;
        let login = client.login(&leg.username, &leg.password);
        let client = within(id, endpoint.timeouts.io(), login).await?;
        tracing::debug!(endpoint = %id, host = %leg.host, "POP3 session authenticated");

        Ok(Pop3Session {
            client,
            endpoint: endpoint.id.clone(),
            io_timeout: endpoint.timeouts.io(),
        })
    }
}

async fn open(endpoint: &Endpoint) -> Result<Client<Authorization>> {
    let id = endpoint.id.as_str();
    let leg = &endpoint.pop3;
    let classify = |e| pop3_error(id, e);

    match leg.security {
        Security::None => {
            let stream: Pop3Stream = connect(&leg.host, leg.port).await.map_err(classify)?;
            Client::from_stream(stream).await.map_err(classify)
        }
        Security::Tls => {
            let connector = tls::connector_for(endpoint);
            let stream = connect_tls(&leg.host, leg.port, &connector)
                .await
                .map_err(classify)?;
            Client::from_stream(stream).await.map_err(classify)
        }
        Security::StartTls => {
            let connector = tls::connector_for(endpoint);
            let stream = connect(&leg.host, leg.port).await.map_err(classify)?;
            let client = Client::from_stream(stream).await.map_err(classify)?;
            client.stls(&leg.host, &connector).await.map_err(classify)
        }
    }
}

/// Authenticated POP3 session.
#[derive(Debug)]
pub struct Pop3Session {
    client: Client<Transaction>,
    endpoint: String,
    io_timeout: Duration,
}

impl MailboxSession for Pop3Session {
    async fn list(&mut self) -> Result<Vec<MailboxEntry>> {
        let entries = within(&self.endpoint, self.io_timeout, self.client.list()).await?;
        Ok(entries
            .into_iter()
            .map(|entry| MailboxEntry {
                number: entry.id,
                size: entry.size,
            })
            .collect())
    }

    async fn retrieve(&mut self, number: u32) -> Result<Vec<u8>> {
        within(&self.endpoint, self.io_timeout, self.client.retr(number)).await
    }

    async fn delete(&mut self, number: u32) -> Result<()> {
        within(&self.endpoint, self.io_timeout, self.client.dele(number)).await
    }

    async fn quit(self) -> Result<()> {
        within(&self.endpoint, self.io_timeout, self.client.quit()).await
    }
}

async fn within<T>(
    endpoint: &str,
    limit: Duration,
    operation: impl Future<Output = mailprobe_pop3::Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(limit, operation).await {
        Ok(result) => result.map_err(|e| pop3_error(endpoint, e)),
        Err(_) => Err(timed_out(endpoint, limit)),
    }
}

fn timed_out(endpoint: &str, limit: Duration) -> ProbeError {
    ProbeError::transport(endpoint, format!("timed out after {}s", limit.as_secs()))
}

/// Maps a POP3 client error onto the probe error taxonomy.
fn pop3_error(endpoint: &str, error: mailprobe_pop3::Error) -> ProbeError {
    use mailprobe_pop3::Error;

    match error {
        Error::Io(_) | Error::Tls(_) | Error::ConnectionClosed => {
            ProbeError::transport(endpoint, error)
        }
        Error::AuthFailed(_) => ProbeError::authentication(endpoint, error),
        Error::Negative(_) => ProbeError::mailbox(endpoint, error),
        Error::Protocol(_) | Error::NotSupported(_) | Error::TooLarge(_) => {
            ProbeError::protocol(endpoint, error)
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
    fn pop3_errors_are_classified() {
        let id = "inbox@hisp-b.example";
        assert!(matches!(
            pop3_error(id, mailprobe_pop3::Error::ConnectionClosed),
            ProbeError::Transport { .. }
        ));
        assert!(matches!(
            pop3_error(id, mailprobe_pop3::Error::AuthFailed("nope".into())),
            ProbeError::Authentication { .. }
        ));
        assert!(matches!(
            pop3_error(id, mailprobe_pop3::Error::Negative("no such message".into())),
            ProbeError::Mailbox { .. }
        ));
        assert!(matches!(
            pop3_error(id, mailprobe_pop3::Error::Protocol("garbage".into())),
            ProbeError::Protocol { .. }
        ));
        assert!(matches!(
            pop3_error(id, mailprobe_pop3::Error::TooLarge(1024)),
            ProbeError::Protocol { .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn within_times_out() {
        let err = within("inbox@hisp-b.example", Duration::from_secs(5), async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<_, mailprobe_pop3::Error>(())
        })
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            ProbeError::Transport { ref message, .. } if message == "timed out after 5s"
        ));
    }

    #[tokio::test]
    async fn connect_refused_is_transport_error() {
        let mut endpoint = Endpoint::new("inbox@hisp-b.example");
        endpoint.pop3.host = "127.0.0.1".into();
        endpoint.pop3.port = 1;
        endpoint.pop3.security = Security::None;

        let err = Pop3Connector::new().connect(&endpoint).await.unwrap_err();
        assert!(matches!(err, ProbeError::Transport { .. }));
    }
}
