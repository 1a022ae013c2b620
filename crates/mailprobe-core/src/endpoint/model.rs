//! Endpoint model types.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Security/encryption mode for a connection leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Security {
    /// No encryption.
    None,
    /// Implicit TLS (connect directly with TLS).
    #[default]
    Tls,
    /// Plaintext connect upgraded with STARTTLS (SMTP) or STLS (POP3).
    StartTls,
}

impl Security {
    /// Get display name for the security mode.
    #[must_use]
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::None => "None (insecure)",
            Self::Tls => "SSL/TLS",
            Self::StartTls => "STARTTLS",
        }
    }
}

/// SMTP submission leg of an endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SmtpLeg {
    /// Server hostname.
    pub host: String,
    /// Server port (default: 465 for TLS, 587 for STARTTLS).
    pub port: u16,
    /// Security mode.
    #[serde(default)]
    pub security: Security,
    /// Username for AUTH; empty submits without authenticating.
    #[serde(default)]
    pub username: String,
    /// Password for AUTH.
    #[serde(default)]
    pub password: String,
}

impl SmtpLeg {
    /// Get default port for the security mode.
    #[must_use]
    pub const fn default_port(security: Security) -> u16 {
        match security {
            Security::None => 25,
            Security::StartTls => 587,
            Security::Tls => 465,
        }
    }

    /// Returns true if the leg authenticates before submitting.
    #[must_use]
    pub const fn requires_auth(&self) -> bool {
        !self.username.is_empty()
    }
}

/// POP3 mailbox leg of an endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Pop3Leg {
    /// Server hostname.
    pub host: String,
    /// Server port (default: 995 for TLS, 110 otherwise).
    pub port: u16,
    /// Security mode.
    #[serde(default)]
    pub security: Security,
    /// Mailbox username.
    pub username: String,
    /// Mailbox password.
    pub password: String,
}

impl Pop3Leg {
    /// Get default port for the security mode.
    #[must_use]
    pub const fn default_port(security: Security) -> u16 {
        match security {
            Security::None | Security::StartTls => 110,
            Security::Tls => 995,
        }
    }
}

/// Connect and per-operation I/O timeouts, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// TCP connect plus TLS handshake.
    pub connect_secs: u64,
    /// Any single command/reply exchange.
    pub io_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect_secs: 30,
            io_secs: 60,
        }
    }
}

impl Timeouts {
    /// Connect timeout.
    #[must_use]
    pub const fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    /// I/O timeout.
    #[must_use]
    pub const fn io(&self) -> Duration {
        Duration::from_secs(self.io_secs)
    }
}

/// One mail server under test.
///
/// Endpoints compare by identity: two descriptors with the same `id` are
/// the same server, whatever their connection parameters say.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Endpoint {
    /// Identity: the mailbox address probes are sent from or to.
    pub id: String,
    /// SMTP submission leg.
    pub smtp: SmtpLeg,
    /// POP3 mailbox leg.
    pub pop3: Pop3Leg,
    /// Skip certificate verification on both legs (test servers only).
    #[serde(default)]
    pub accept_invalid_certs: bool,
    /// Connection timeouts.
    #[serde(default)]
    pub timeouts: Timeouts,
}

impl Endpoint {
    /// Creates an endpoint with the given identity and empty legs.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Sets the SMTP leg.
    #[must_use]
    pub fn with_smtp(mut self, smtp: SmtpLeg) -> Self {
        self.smtp = smtp;
        self
    }

    /// Sets the POP3 leg.
    #[must_use]
    pub fn with_pop3(mut self, pop3: Pop3Leg) -> Self {
        self.pop3 = pop3;
        self
    }

    /// Sets whether invalid certificates are accepted.
    #[must_use]
    pub const fn with_accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    /// Returns true if `other` names the same server.
    #[must_use]
    pub fn is_same(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl PartialEq for Endpoint {
    fn eq(&self, other: &Self) -> bool {
        self.is_same(other)
    }
}

impl Eq for Endpoint {}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.id)
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

    mod security_tests {
        use super::*;

        #[test]
        fn default_is_tls() {
            assert_eq!(Security::default(), Security::Tls);
        }

        #[test]
        fn serde_names() {
            assert_eq!(serde_json::to_string(&Security::StartTls).unwrap(), "\"starttls\"");
            let parsed: Security = serde_json::from_str("\"none\"").unwrap();
            assert_eq!(parsed, Security::None);
        }
    }

    mod port_tests {
        use super::*;

        #[test]
        fn smtp_default_ports() {
            assert_eq!(SmtpLeg::default_port(Security::Tls), 465);
            assert_eq!(SmtpLeg::default_port(Security::StartTls), 587);
            assert_eq!(SmtpLeg::default_port(Security::None), 25);
        }

        #[test]
        fn pop3_default_ports() {
            assert_eq!(Pop3Leg::default_port(Security::Tls), 995);
            assert_eq!(Pop3Leg::default_port(Security::None), 110);
        }
    }

    mod endpoint_tests {
        use super::*;

        #[test]
        fn equality_is_by_identity() {
            let mut a = Endpoint::new("sender@hisp-a.example");
            let b = Endpoint::new("sender@hisp-a.example");
            a.smtp.host = "smtp.hisp-a.example".into();
            assert_eq!(a, b);
            assert_ne!(a, Endpoint::new("inbox@hisp-b.example"));
        }

        #[test]
        fn deserialize_with_defaults() {
            let json = r#"{
                "id": "sender@hisp-a.example",
                "smtp": { "host": "smtp.hisp-a.example", "port": 587, "security": "starttls" },
                "pop3": { "host": "pop.hisp-a.example", "port": 995,
                          "username": "probe", "password": "secret" }
            }"#;
            let endpoint: Endpoint = serde_json::from_str(json).unwrap();
            assert_eq!(endpoint.smtp.security, Security::StartTls);
            assert!(!endpoint.smtp.requires_auth());
            assert_eq!(endpoint.pop3.security, Security::Tls);
            assert!(!endpoint.accept_invalid_certs);
            assert_eq!(endpoint.timeouts, Timeouts::default());
            assert_eq!(endpoint.timeouts.io(), Duration::from_secs(60));
        }
    }
}
