//! The probe message.

use std::path::PathBuf;

use mailprobe_mime::{Attachment, MessageBuilder};

use crate::endpoint::Endpoint;
use crate::error::{ProbeError, Result};

/// Value of the `X-Mailer` header on every probe.
pub const X_MAILER: &str = concat!("mailprobe/", env!("CARGO_PKG_VERSION"));

/// One probe: the subject is the correlation key, the rest is payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Probe {
    /// Correlation subject.
    pub subject: String,
    /// Envelope and header sender.
    pub from: String,
    /// Recipients; the first is the receiving endpoint's mailbox.
    pub to: Vec<String>,
    /// Plain text body.
    pub body: String,
    /// Optional file attached as a base64 part.
    pub attachment: Option<PathBuf>,
}

impl Probe {
    /// Creates a probe with an empty body.
    #[must_use]
    pub fn new(subject: impl Into<String>, from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            from: from.into(),
            to: vec![to.into()],
            body: String::new(),
            attachment: None,
        }
    }

    /// Creates a probe from the sending endpoint's mailbox to the receiving one.
    #[must_use]
    pub fn between(subject: impl Into<String>, sending: &Endpoint, receiving: &Endpoint) -> Self {
        Self::new(subject, &sending.id, &receiving.id)
    }

    /// Generates a unique subject such as `mailprobe 20261018T101500.123Z`.
    #[must_use]
    pub fn generate_subject(prefix: &str) -> String {
        let now = chrono::Utc::now();
        format!("{prefix} {}", now.format("%Y%m%dT%H%M%S%.3fZ"))
    }

    /// Sets the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Adds another recipient.
    #[must_use]
    pub fn with_recipient(mut self, to: impl Into<String>) -> Self {
        self.to.push(to.into());
        self
    }

    /// Attaches a file.
    #[must_use]
    pub fn with_attachment(mut self, path: impl Into<PathBuf>) -> Self {
        self.attachment = Some(path.into());
        self
    }

    /// Renders the probe to RFC 5322 bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::Config`] if the attachment cannot be read or
    /// the message cannot be composed.
    pub fn render(&self) -> Result<Vec<u8>> {
        let mut builder = MessageBuilder::new()
            .from(&self.from)
            .subject(&self.subject)
            .text_body(&self.body)
            .header("X-Mailer", X_MAILER);
        for to in &self.to {
            builder = builder.to(to);
        }
        if let Some(path) = &self.attachment {
            let attachment = Attachment::from_path(path)
                .map_err(|e| ProbeError::Config(format!("attachment {}: {e}", path.display())))?;
            builder = builder.attach(attachment);
        }
        builder
            .build()
            .map_err(|e| ProbeError::Config(format!("cannot compose probe: {e}")))
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
    use mailprobe_mime::Message;

    #[test]
    fn between_endpoints() {
        let outbound = Probe::between(
            "T1-abc",
            &Endpoint::new("sender@hisp-a.example"),
            &Endpoint::new("inbox@hisp-b.example"),
        );
        assert_eq!(outbound.from, "sender@hisp-a.example");
        assert_eq!(outbound.to, vec!["inbox@hisp-b.example"]);
    }

    #[test]
    fn render_carries_subject_and_mailer() {
        let raw = Probe::new("T1-abc", "sender@hisp-a.example", "inbox@hisp-b.example")
            .with_body("hello")
            .render()
            .unwrap();
        let message = Message::parse(&raw).unwrap();
        assert_eq!(message.subject().as_deref(), Some("T1-abc"));
        assert_eq!(message.headers.get("x-mailer"), Some(X_MAILER));
        assert!(message.message_id().is_some());
    }

    #[test]
    fn render_missing_attachment_fails() {
        let err = Probe::new("T1", "a@x.example", "b@y.example")
            .with_attachment("/nonexistent/attachment.bin")
            .render()
            .unwrap_err();
        assert!(matches!(err, ProbeError::Config(_)));
    }

    #[test]
    fn generated_subjects_use_prefix() {
        let subject = Probe::generate_subject("mailprobe");
        assert!(subject.starts_with("mailprobe 20"));
        assert!(subject.ends_with('Z'));
    }
}
