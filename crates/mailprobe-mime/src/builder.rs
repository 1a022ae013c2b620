//! Probe message composition.

use crate::encoding::{encode_base64_wrapped, encode_rfc2047};
use crate::error::{Error, Result};
use crate::header::Headers;
use chrono::{DateTime, Local};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

/// Per-process counter keeping boundaries and message ids unique.
static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// A file attached to a composed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// File name advertised in `Content-Disposition`.
    pub filename: String,
    /// MIME type, e.g. `application/pdf`.
    pub content_type: String,
    /// Raw file contents.
    pub data: Vec<u8>,
}

impl Attachment {
    /// Creates an attachment from memory.
    #[must_use]
    pub fn new(
        filename: impl Into<String>,
        content_type: impl Into<String>,
        data: Vec<u8>,
    ) -> Self {
        Self {
            filename: filename.into(),
            content_type: content_type.into(),
            data,
        }
    }

    /// Reads an attachment from disk, guessing its MIME type from the extension.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        let filename = path
            .file_name()
            .map_or_else(|| "attachment".to_string(), |n| n.to_string_lossy().into_owned());
        let content_type = guess_content_type(&filename);
        Ok(Self::new(filename, content_type, data))
    }
}

fn guess_content_type(filename: &str) -> &'static str {
    let extension = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "txt" => "text/plain",
        "xml" => "application/xml",
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "zip" => "application/zip",
        _ => "application/octet-stream",
    }
}

/// Builder for an RFC 5322 message with an optional attachment.
///
/// Single text bodies are sent as `text/plain` 8bit; as soon as an
/// attachment is present the message becomes `multipart/mixed` with
/// base64-encoded attachment parts.
#[derive(Debug, Clone, Default)]
pub struct MessageBuilder {
    from: Option<String>,
    to: Vec<String>,
    subject: Option<String>,
    text_body: String,
    attachments: Vec<Attachment>,
    extra_headers: Headers,
    date: Option<DateTime<Local>>,
}

impl MessageBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the sender.
    #[must_use]
    pub fn from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    /// Adds a recipient.
    #[must_use]
    pub fn to(mut self, to: impl Into<String>) -> Self {
        self.to.push(to.into());
        self
    }

    /// Sets the subject.
    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Sets the plain text body.
    #[must_use]
    pub fn text_body(mut self, body: impl Into<String>) -> Self {
        self.text_body = body.into();
        self
    }

    /// Adds an attachment.
    #[must_use]
    pub fn attach(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Adds an extra header such as `X-Mailer`.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.add(name, value);
        self
    }

    /// Overrides the `Date` header (defaults to now).
    #[must_use]
    pub fn date(mut self, date: DateTime<Local>) -> Self {
        self.date = Some(date);
        self
    }

    /// Serializes the message with CRLF line endings.
    ///
    /// # Errors
    ///
    /// Returns an error if the sender or all recipients are missing.
    pub fn build(self) -> Result<Vec<u8>> {
        let from = self
            .from
            .ok_or_else(|| Error::MissingHeader("From".to_string()))?;
        if self.to.is_empty() {
            return Err(Error::MissingHeader("To".to_string()));
        }

        let sequence = SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let date = self.date.unwrap_or_else(Local::now);
        let stamp = date.timestamp_nanos_opt().unwrap_or_default();
        let domain = from.rsplit_once('@').map_or("localhost", |(_, d)| d.trim_end_matches('>'));

        let mut headers = Headers::new();
        headers.add("From", from.as_str());
        headers.add("To", self.to.join(", "));
        headers.add("Subject", encode_rfc2047(self.subject.as_deref().unwrap_or_default()));
        headers.add("Date", date.to_rfc2822());
        headers.add("Message-ID", format!("<{stamp:x}.{sequence}@{domain}>"));
        for (name, value) in self.extra_headers.iter() {
            headers.add(name, value);
        }
        headers.add("MIME-Version", "1.0");

        let text = normalize_line_endings(&self.text_body);
        let mut out = String::new();

        if self.attachments.is_empty() {
            headers.add("Content-Type", "text/plain; charset=utf-8");
            headers.add("Content-Transfer-Encoding", "8bit");
            out.push_str(&headers.to_string());
            out.push_str("\r\n");
            out.push_str(&text);
            return Ok(out.into_bytes());
        }

        let boundary = format!("=_mailprobe_{stamp:x}_{sequence}");
        headers.add(
            "Content-Type",
            format!("multipart/mixed; boundary=\"{boundary}\""),
        );
        out.push_str(&headers.to_string());
        out.push_str("\r\n");

        out.push_str(&format!("--{boundary}\r\n"));
        out.push_str("Content-Type: text/plain; charset=utf-8\r\n");
        out.push_str("Content-Transfer-Encoding: 8bit\r\n\r\n");
        out.push_str(&text);
        out.push_str("\r\n");

        for attachment in &self.attachments {
            let filename = encode_rfc2047(&attachment.filename);
            out.push_str(&format!("--{boundary}\r\n"));
            out.push_str(&format!(
                "Content-Type: {}; name=\"{filename}\"\r\n",
                attachment.content_type
            ));
            out.push_str("Content-Transfer-Encoding: base64\r\n");
            out.push_str(&format!(
                "Content-Disposition: attachment; filename=\"{filename}\"\r\n\r\n"
            ));
            out.push_str(&encode_base64_wrapped(&attachment.data));
        }
        out.push_str(&format!("--{boundary}--\r\n"));

        Ok(out.into_bytes())
    }
}

fn normalize_line_endings(text: &str) -> String {
    let mut normalized = text.replace("\r\n", "\n").replace('\n', "\r\n");
    if !normalized.is_empty() && !normalized.ends_with("\r\n") {
        normalized.push_str("\r\n");
    }
    normalized
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
    use crate::Message;

    #[test]
    fn test_build_requires_sender_and_recipient() {
        assert!(MessageBuilder::new().to("b@example.com").build().is_err());
        assert!(MessageBuilder::new().from("a@example.com").build().is_err());
    }

    #[test]
    fn test_build_plain_message() {
        let raw = MessageBuilder::new()
            .from("sender@hisp-a.example")
            .to("inbox@hisp-b.example")
            .subject("T1-abc")
            .header("X-Mailer", "mailprobe")
            .text_body("line one\nline two")
            .build()
            .unwrap();

        let text = String::from_utf8(raw.clone()).unwrap();
        assert!(text.contains("line one\r\nline two\r\n"));
        assert!(text.contains("@hisp-a.example>"));

        let message = Message::parse(&raw).unwrap();
        assert_eq!(message.subject().as_deref(), Some("T1-abc"));
        assert_eq!(message.headers.get("x-mailer"), Some("mailprobe"));
        assert_eq!(message.headers.get("to"), Some("inbox@hisp-b.example"));
    }

    #[test]
    fn test_build_with_attachment() {
        let raw = MessageBuilder::new()
            .from("sender@hisp-a.example")
            .to("inbox@hisp-b.example")
            .subject("T1-abc")
            .text_body("see attachment")
            .attach(Attachment::new("ccd.xml", "application/xml", b"<doc/>".to_vec()))
            .build()
            .unwrap();

        let message = Message::parse(&raw).unwrap();
        let content_type = message.headers.get("content-type").unwrap();
        assert!(content_type.starts_with("multipart/mixed; boundary="));

        let text = String::from_utf8(raw).unwrap();
        assert!(text.contains("filename=\"ccd.xml\""));
        assert!(text.contains("PGRvYy8+"));
        assert!(text.trim_end().ends_with("--"));
    }

    #[test]
    fn test_message_ids_are_unique() {
        let build = || {
            let raw = MessageBuilder::new()
                .from("a@example.com")
                .to("b@example.com")
                .build()
                .unwrap();
            Message::parse(&raw).unwrap().message_id().unwrap().to_string()
        };
        assert_ne!(build(), build());
    }

    #[test]
    fn test_guess_content_type() {
        assert_eq!(guess_content_type("report.PDF"), "application/pdf");
        assert_eq!(guess_content_type("noext"), "application/octet-stream");
    }
}
