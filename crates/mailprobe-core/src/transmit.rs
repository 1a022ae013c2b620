//! Probe transmission through an endpoint's SMTP submission leg.

use std::future::Future;
use std::time::Duration;

use mailprobe_smtp::stream::{SmtpStream, connect, connect_tls};
use mailprobe_smtp::{Address, AuthMechanism, Authenticated, Client, Connected};

use crate::endpoint::{Endpoint, Security};
use crate::error::{ProbeError, Result};
use crate::probe::Probe;
use crate::tls;

/// DSN `NOTIFY=` value requested when the server supports DSN.
const DSN_NOTIFY: &str = "SUCCESS,FAILURE,DELAY";

/// Sends a probe through an endpoint.
pub trait Transmitter {
    /// Submits `probe` via `endpoint` and returns the recipients the server
    /// refused (non-fatal while at least one was accepted).
    ///
    /// Fails with [`ProbeError::Send`] and friends when the transaction fails.
    fn transmit(
        &self,
        endpoint: &Endpoint,
        probe: &Probe,
    ) -> impl Future<Output = Result<Vec<String>>>;
}

/// [`Transmitter`] speaking SMTP submission.
#[derive(Debug, Clone)]
pub struct SmtpTransmitter {
    client_hostname: String,
}

impl Default for SmtpTransmitter {
    fn default() -> Self {
        Self::new("localhost")
    }
}

impl SmtpTransmitter {
    /// Creates a transmitter announcing `client_hostname` in EHLO.
    #[must_use]
    pub fn new(client_hostname: impl Into<String>) -> Self {
        Self {
            client_hostname: client_hostname.into(),
        }
    }
}

impl Transmitter for SmtpTransmitter {
    async fn transmit(&self, endpoint: &Endpoint, probe: &Probe) -> Result<Vec<String>> {
        let id = endpoint.id.as_str();
        let io = endpoint.timeouts.io();
        let message = probe.render()?;
        let from = Address::new(&probe.from).map_err(|e| ProbeError::Config(e.to_string()))?;
        let to = probe
            .to
            .iter()
            .map(Address::new)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| ProbeError::Config(e.to_string()))?;

        let limit = endpoint.timeouts.connect();
        let opening = open(endpoint, &self.client_hostname);
        let client = match tokio::time::timeout(limit, opening).await {
            Ok(result) => result?,
            Err(_) => return Err(timed_out(id, limit)),
        };

        let leg = &endpoint.smtp;
        let client = if leg.requires_auth() {
            let client = authenticate(client, endpoint).await?;
            within(id, io, client.mail_from(&from)).await?
        } else {
            within(id, io, client.mail_from(&from)).await?
        };

        let (client, refused) = within(id, io, client.recipients(&to, Some(DSN_NOTIFY))).await?;
        let client = within(id, io, client.data()).await?;
        let client = within(id, io, client.send_message(&message)).await?;
        tracing::info!(
            endpoint = %id,
            subject = %probe.subject,
            bytes = message.len(),
            "probe submitted"
        );

        if let Err(error) = within(id, io, client.quit()).await {
            tracing::warn!(endpoint = %id, %error, "QUIT after submission failed");
        }

        Ok(refused
            .into_iter()
            .map(|r| r.address.to_string())
            .collect())
    }
}

async fn open(endpoint: &Endpoint, client_hostname: &str) -> Result<Client<Connected>> {
    let id = endpoint.id.as_str();
    let leg = &endpoint.smtp;
    let classify = |e| smtp_error(id, e);

    let stream: SmtpStream = match leg.security {
        Security::Tls => {
            connect_tls(&leg.host, leg.port, &tls::connector_for(endpoint))
                .await
                .map_err(classify)?
        }
        Security::None | Security::StartTls => {
            connect(&leg.host, leg.port).await.map_err(classify)?
        }
    };
    let client = Client::from_stream(stream).await.map_err(classify)?;
    let client = client.ehlo(client_hostname).await.map_err(classify)?;

    if leg.security == Security::StartTls {
        client
            .starttls(&leg.host, &tls::connector_for(endpoint), client_hostname)
            .await
            .map_err(classify)
    } else {
        Ok(client)
    }
}

async fn authenticate(
    client: Client<Connected>,
    endpoint: &Endpoint,
) -> Result<Client<Authenticated>> {
    let leg = &endpoint.smtp;
    let io = endpoint.timeouts.io();
    let mechanisms = client.server_info().auth_mechanisms();
    let use_login = !mechanisms.contains(&AuthMechanism::Plain)
        && mechanisms.contains(&AuthMechanism::Login);

    tracing::debug!(endpoint = %endpoint.id, login = use_login, "authenticating");
    if use_login {
        within(&endpoint.id, io, client.auth_login(&leg.username, &leg.password)).await
    } else {
        within(&endpoint.id, io, client.auth_plain(&leg.username, &leg.password)).await
    }
}

async fn within<T>(
    endpoint: &str,
    limit: Duration,
    operation: impl Future<Output = mailprobe_smtp::Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(limit, operation).await {
        Ok(result) => result.map_err(|e| smtp_error(endpoint, e)),
        Err(_) => Err(timed_out(endpoint, limit)),
    }
}

fn timed_out(endpoint: &str, limit: Duration) -> ProbeError {
    ProbeError::transport(endpoint, format!("timed out after {}s", limit.as_secs()))
}

/// Maps an SMTP client error onto the probe error taxonomy.
fn smtp_error(endpoint: &str, error: mailprobe_smtp::Error) -> ProbeError {
    use mailprobe_smtp::Error;

    match error {
        Error::Io(_) | Error::Tls(_) | Error::ConnectionClosed => {
            ProbeError::transport(endpoint, error)
        }
        Error::AuthFailed { .. } => ProbeError::authentication(endpoint, error),
        Error::Protocol(_) | Error::NotSupported(_) => ProbeError::protocol(endpoint, error),
        Error::SmtpError { .. } | Error::AllRecipientsRefused(_) | Error::InvalidAddress(_) => {
            ProbeError::send(endpoint, error)
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
    fn smtp_errors_are_classified() {
        let id = "sender@hisp-a.example";
        assert!(matches!(
            smtp_error(id, mailprobe_smtp::Error::ConnectionClosed),
            ProbeError::Transport { .. }
        ));
        assert!(matches!(
            smtp_error(id, mailprobe_smtp::Error::AuthFailed { code: 535, message: "no".into() }),
            ProbeError::Authentication { .. }
        ));
        assert!(matches!(
            smtp_error(id, mailprobe_smtp::Error::smtp_error(554, "rejected")),
            ProbeError::Send { .. }
        ));
        assert!(matches!(
            smtp_error(id, mailprobe_smtp::Error::AllRecipientsRefused("x (550)".into())),
            ProbeError::Send { .. }
        ));
    }

    #[tokio::test]
    async fn invalid_sender_is_config_error() {
        let endpoint = Endpoint::new("sender@hisp-a.example");
        let outbound = Probe::new("T1-abc", "not-an-address", "inbox@hisp-b.example");
        let err = SmtpTransmitter::default()
            .transmit(&endpoint, &outbound)
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::Config(_)));
    }

    #[tokio::test]
    async fn connect_refused_is_transport_error() {
        let mut endpoint = Endpoint::new("sender@hisp-a.example");
        endpoint.smtp.host = "127.0.0.1".into();
        endpoint.smtp.port = 1;
        endpoint.smtp.security = Security::None;
        let outbound = Probe::new("T1-abc", "sender@hisp-a.example", "inbox@hisp-b.example");

        let err = SmtpTransmitter::default()
            .transmit(&endpoint, &outbound)
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::Transport { .. }));
    }
}
