//! Endpoint validation.

use super::model::Endpoint;

/// Validation error for an endpoint descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Identity is empty.
    EmptyId,
    /// Identity is not a mailbox address.
    InvalidId,
    /// SMTP host is empty.
    EmptySmtpHost,
    /// SMTP port is invalid.
    InvalidSmtpPort,
    /// SMTP username is set without a password.
    MissingSmtpPassword,
    /// POP3 host is empty.
    EmptyPop3Host,
    /// POP3 port is invalid.
    InvalidPop3Port,
    /// POP3 username is empty.
    EmptyPop3Username,
    /// POP3 password is empty.
    EmptyPop3Password,
    /// A timeout is zero.
    ZeroTimeout,
}

impl ValidationError {
    /// Get human-readable error message.
    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::EmptyId => "Endpoint id is required",
            Self::InvalidId => "Endpoint id must be a mailbox address",
            Self::EmptySmtpHost => "SMTP server is required",
            Self::InvalidSmtpPort => "SMTP port must be 1-65535",
            Self::MissingSmtpPassword => "SMTP password is required when a username is set",
            Self::EmptyPop3Host => "POP3 server is required",
            Self::InvalidPop3Port => "POP3 port must be 1-65535",
            Self::EmptyPop3Username => "POP3 username is required",
            Self::EmptyPop3Password => "POP3 password is required",
            Self::ZeroTimeout => "Timeouts must be at least one second",
        }
    }

    /// Get the field name this error relates to.
    #[must_use]
    pub const fn field(&self) -> &'static str {
        match self {
            Self::EmptyId | Self::InvalidId => "id",
            Self::EmptySmtpHost => "smtp.host",
            Self::InvalidSmtpPort => "smtp.port",
            Self::MissingSmtpPassword => "smtp.password",
            Self::EmptyPop3Host => "pop3.host",
            Self::InvalidPop3Port => "pop3.port",
            Self::EmptyPop3Username => "pop3.username",
            Self::EmptyPop3Password => "pop3.password",
            Self::ZeroTimeout => "timeouts",
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field(), self.message())
    }
}

impl std::error::Error for ValidationError {}

/// Result of validating an endpoint.
pub type ValidationResult = Result<(), Vec<ValidationError>>;

/// Validate an endpoint descriptor.
///
/// Returns `Ok(())` if valid, or every problem found.
///
/// # Errors
///
/// Returns a vector of `ValidationError` if any fields are invalid.
pub fn validate_endpoint(endpoint: &Endpoint) -> ValidationResult {
    let mut errors = Vec::new();

    if endpoint.id.trim().is_empty() {
        errors.push(ValidationError::EmptyId);
    } else if mailprobe_smtp::Address::new(&endpoint.id).is_err() {
        errors.push(ValidationError::InvalidId);
    }

    if endpoint.smtp.host.trim().is_empty() {
        errors.push(ValidationError::EmptySmtpHost);
    }
    if endpoint.smtp.port == 0 {
        errors.push(ValidationError::InvalidSmtpPort);
    }
    if endpoint.smtp.requires_auth() && endpoint.smtp.password.is_empty() {
        errors.push(ValidationError::MissingSmtpPassword);
    }

    if endpoint.pop3.host.trim().is_empty() {
        errors.push(ValidationError::EmptyPop3Host);
    }
    if endpoint.pop3.port == 0 {
        errors.push(ValidationError::InvalidPop3Port);
    }
    if endpoint.pop3.username.trim().is_empty() {
        errors.push(ValidationError::EmptyPop3Username);
    }
    if endpoint.pop3.password.is_empty() {
        errors.push(ValidationError::EmptyPop3Password);
    }

    if endpoint.timeouts.connect_secs == 0 || endpoint.timeouts.io_secs == 0 {
        errors.push(ValidationError::ZeroTimeout);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
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
    use crate::endpoint::{Pop3Leg, Security, SmtpLeg};

    fn complete() -> Endpoint {
        Endpoint::new("sender@hisp-a.example")
            .with_smtp(SmtpLeg {
                host: "smtp.hisp-a.example".into(),
                port: 465,
                security: Security::Tls,
                username: "probe".into(),
                password: "secret".into(),
            })
            .with_pop3(Pop3Leg {
                host: "pop.hisp-a.example".into(),
                port: 995,
                security: Security::Tls,
                username: "probe".into(),
                password: "secret".into(),
            })
    }

    #[test]
    fn test_validate_complete_endpoint() {
        assert!(validate_endpoint(&complete()).is_ok());
    }

    #[test]
    fn test_validate_empty_endpoint() {
        let errors = validate_endpoint(&Endpoint::default()).unwrap_err();
        assert!(errors.contains(&ValidationError::EmptyId));
        assert!(errors.contains(&ValidationError::EmptySmtpHost));
        assert!(errors.contains(&ValidationError::InvalidSmtpPort));
        assert!(errors.contains(&ValidationError::EmptyPop3Username));
        assert!(errors.contains(&ValidationError::EmptyPop3Password));
        assert!(!errors.contains(&ValidationError::MissingSmtpPassword));
    }

    #[test]
    fn test_validate_bad_id_and_password() {
        let mut endpoint = complete();
        endpoint.id = "not-an-address".into();
        endpoint.smtp.password.clear();
        let errors = validate_endpoint(&endpoint).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::InvalidId, ValidationError::MissingSmtpPassword]
        );
    }

    #[test]
    fn test_smtp_without_auth_is_valid() {
        let mut endpoint = complete();
        endpoint.smtp.username.clear();
        endpoint.smtp.password.clear();
        assert!(validate_endpoint(&endpoint).is_ok());
    }

    #[test]
    fn test_display_includes_field() {
        assert_eq!(
            ValidationError::InvalidPop3Port.to_string(),
            "pop3.port: POP3 port must be 1-65535"
        );
    }
}
