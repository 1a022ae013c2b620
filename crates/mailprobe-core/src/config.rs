//! Run settings and the endpoint configuration file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::endpoint::{Endpoint, ValidationError, validate_endpoint};
use crate::error::{ProbeError, Result};

/// Fixed-delay retry budget for a poll session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Polling cycles before giving up.
    pub max_attempts: u32,
    /// Delay between cycles.
    #[serde(rename = "retry_delay_ms", with = "duration_ms")]
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            retry_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Creates the default policy (30 attempts, 2 seconds apart).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the attempt budget.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Sets the delay between cycles.
    #[must_use]
    pub const fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Returns true if another cycle is allowed after `attempts` fruitless ones.
    #[must_use]
    pub const fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }

    /// Total time spent waiting between cycles when every attempt is used.
    ///
    /// The last attempt is not followed by a delay, so this is
    /// `(max_attempts - 1) * retry_delay`. Time spent in the cycles
    /// themselves comes on top.
    #[must_use]
    pub fn budget(&self) -> Duration {
        self.retry_delay
            .saturating_mul(self.max_attempts.saturating_sub(1))
    }
}

/// Per-run settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Retry budget for each poll session.
    pub retry: RetryPolicy,
    /// Wait for a confirmation artifact at the sending endpoint before
    /// declaring delivery.
    pub require_confirmation: bool,
    /// Subject substrings that mark a non-delivery notice.
    pub bounce_markers: Vec<String>,
    /// Name sent in EHLO.
    pub client_hostname: String,
    /// Messages the server lists as larger than this are not retrieved.
    pub max_message_size: u64,
}

/// Default for [`RunConfig::max_message_size`]: 10 MiB.
pub const DEFAULT_MAX_MESSAGE_SIZE: u64 = 10 * 1024 * 1024;

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            require_confirmation: false,
            bounce_markers: vec!["Undeliverable".to_string()],
            client_hostname: "localhost".to_string(),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

impl RunConfig {
    /// Creates the default run settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the retry policy.
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets whether a sending-side confirmation is required.
    #[must_use]
    pub const fn with_require_confirmation(mut self, require: bool) -> Self {
        self.require_confirmation = require;
        self
    }

    /// Replaces the bounce markers.
    #[must_use]
    pub fn with_bounce_markers<I, S>(mut self, markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.bounce_markers = markers.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the EHLO name.
    #[must_use]
    pub fn with_client_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.client_hostname = hostname.into();
        self
    }

    /// Sets the largest message size that is still retrieved.
    #[must_use]
    pub const fn with_max_message_size(mut self, bytes: u64) -> Self {
        self.max_message_size = bytes;
        self
    }

    /// Returns true if `subject` contains a bounce marker.
    #[must_use]
    pub fn is_bounce(&self, subject: &str) -> bool {
        self.bounce_markers
            .iter()
            .any(|marker| !marker.is_empty() && subject.contains(marker.as_str()))
    }
}

/// Contents of `endpoints.json`: named endpoints plus default run settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Endpoints by name.
    #[serde(default)]
    pub endpoints: BTreeMap<String, Endpoint>,
    /// Defaults for every run.
    #[serde(default)]
    pub run: RunConfig,
}

impl ConfigFile {
    /// Default location: `<config dir>/mailprobe/endpoints.json`.
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mailprobe")
            .join("endpoints.json")
    }

    /// Parses a configuration document.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::Config`] if the JSON is malformed.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| ProbeError::Config(e.to_string()))
    }

    /// Loads the configuration file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::Config`] if the file cannot be read or parsed.
    pub async fn load(path: &Path) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ProbeError::Config(format!("{}: {e}", path.display())))?;
        let config = Self::from_json(&contents)?;
        tracing::debug!(
            path = %path.display(),
            endpoints = config.endpoints.len(),
            "configuration loaded"
        );
        Ok(config)
    }

    /// Looks up an endpoint by name.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::Config`] if no endpoint has that name.
    pub fn endpoint(&self, name: &str) -> Result<&Endpoint> {
        self.endpoints
            .get(name)
            .ok_or_else(|| ProbeError::Config(format!("unknown endpoint {name:?}")))
    }

    /// Validates every endpoint, returning the problems per endpoint name.
    ///
    /// # Errors
    ///
    /// Returns each invalid endpoint's name with its errors.
    pub fn validate(&self) -> std::result::Result<(), Vec<(String, Vec<ValidationError>)>> {
        let problems: Vec<_> = self
            .endpoints
            .iter()
            .filter_map(|(name, endpoint)| {
                validate_endpoint(endpoint)
                    .err()
                    .map(|errors| (name.clone(), errors))
            })
            .collect();

        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems)
        }
    }
}

/// Serde helpers for `Duration` as whole milliseconds.
mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::trivially_copy_pass_by_ref)] // Required by serde with= signature
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
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

    mod retry_policy_tests {
        use super::*;

        #[test]
        fn defaults() {
            let policy = RetryPolicy::default();
            assert_eq!(policy.max_attempts, 30);
            assert_eq!(policy.retry_delay, Duration::from_secs(2));
            assert_eq!(policy.budget(), Duration::from_secs(58));
        }

        #[test]
        fn budget_counts_only_delays_between_attempts() {
            let policy = RetryPolicy::new().with_retry_delay(Duration::from_secs(5));
            assert_eq!(policy.with_max_attempts(1).budget(), Duration::ZERO);
            assert_eq!(policy.with_max_attempts(0).budget(), Duration::ZERO);
            assert_eq!(policy.with_max_attempts(4).budget(), Duration::from_secs(15));
        }

        #[test]
        fn should_retry_below_budget() {
            let policy = RetryPolicy::new().with_max_attempts(3);
            assert!(policy.should_retry(0));
            assert!(policy.should_retry(2));
            assert!(!policy.should_retry(3));
        }
    }

    mod run_config_tests {
        use super::*;

        #[test]
        fn defaults() {
            let config = RunConfig::default();
            assert!(!config.require_confirmation);
            assert_eq!(config.bounce_markers, vec!["Undeliverable"]);
            assert_eq!(config.max_message_size, DEFAULT_MAX_MESSAGE_SIZE);
        }

        #[test]
        fn bounce_detection() {
            let config = RunConfig::new().with_bounce_markers(["Undeliverable", "Delivery Status"]);
            assert!(config.is_bounce("Undeliverable: T1-abc"));
            assert!(config.is_bounce("Delivery Status Notification (Failure)"));
            assert!(!config.is_bounce("Re: T1-abc"));
        }

        #[test]
        fn empty_marker_never_matches() {
            let config = RunConfig::new().with_bounce_markers([""]);
            assert!(!config.is_bounce("anything"));
        }
    }

    mod config_file_tests {
        use super::*;

        const SAMPLE: &str = r#"{
            "endpoints": {
                "hisp-a": {
                    "id": "sender@hisp-a.example",
                    "smtp": { "host": "smtp.hisp-a.example", "port": 465,
                              "username": "probe", "password": "secret" },
                    "pop3": { "host": "pop.hisp-a.example", "port": 995,
                              "username": "probe", "password": "secret" },
                    "accept_invalid_certs": true
                },
                "broken": {
                    "id": "",
                    "smtp": { "host": "", "port": 0 },
                    "pop3": { "host": "pop", "port": 110, "username": "u", "password": "p" }
                }
            },
            "run": { "retry": { "max_attempts": 5, "retry_delay_ms": 500 },
                     "require_confirmation": true }
        }"#;

        #[test]
        fn parse_and_lookup() {
            let config = ConfigFile::from_json(SAMPLE).unwrap();
            let endpoint = config.endpoint("hisp-a").unwrap();
            assert_eq!(endpoint.id, "sender@hisp-a.example");
            assert!(endpoint.accept_invalid_certs);
            assert_eq!(config.run.retry.max_attempts, 5);
            assert_eq!(config.run.retry.retry_delay, Duration::from_millis(500));
            assert!(config.run.require_confirmation);
            assert_eq!(config.run.bounce_markers, vec!["Undeliverable"]);
            assert!(config.endpoint("missing").is_err());
        }

        #[test]
        fn validate_reports_by_name() {
            let config = ConfigFile::from_json(SAMPLE).unwrap();
            let problems = config.validate().unwrap_err();
            assert_eq!(problems.len(), 1);
            assert_eq!(problems[0].0, "broken");
            assert!(problems[0].1.contains(&ValidationError::EmptyId));
        }

        #[test]
        fn malformed_json_is_config_error() {
            let err = ConfigFile::from_json("{ not json").unwrap_err();
            assert!(matches!(err, ProbeError::Config(_)));
        }

        #[test]
        fn default_path_ends_with_file_name() {
            let path = ConfigFile::default_path();
            assert!(path.ends_with("mailprobe/endpoints.json"));
        }

        #[tokio::test]
        async fn load_missing_file() {
            let err = ConfigFile::load(Path::new("/nonexistent/mailprobe.json"))
                .await
                .unwrap_err();
            assert!(matches!(err, ProbeError::Config(ref m) if m.contains("/nonexistent")));
        }
    }
}
