//! Configuration loading via `ortho-config`.

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::credentials::Credentials;
use crate::error::ApiError;
use crate::job::{Backoff, PollPolicy};
use crate::signer::HttpMethod;

/// Client configuration derived from environment variables, configuration
/// files, and CLI flags.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "HMARA",
    discovery(
        app_name = "hmara",
        env_var = "HMARA_CONFIG_PATH",
        config_file_name = "hmara.toml",
        dotfile_name = ".hmara.toml",
        project_file_name = "hmara.toml"
    )
)]
pub struct ClientConfig {
    /// Base URL of the management API, for example
    /// `https://cloud.example.com/client/api`.
    pub api_url: String,
    /// Public API key sent with every request.
    pub api_key: String,
    /// Secret key used to sign requests. Never transmitted.
    pub secret_key: String,
    /// HTTP method used for commands (`GET` or `POST`).
    #[ortho_config(default = "GET".to_owned())]
    pub http_method: String,
    /// Per-request HTTP timeout in seconds.
    #[ortho_config(default = 30)]
    pub http_timeout_secs: u64,
    /// Base delay between job status queries, in milliseconds.
    #[ortho_config(default = 2000)]
    pub poll_interval_ms: u64,
    /// Floor for the delay between job status queries, in milliseconds.
    #[ortho_config(default = 500)]
    pub min_poll_interval_ms: u64,
    /// Ceiling for backoff delays, in milliseconds.
    #[ortho_config(default = 30000)]
    pub max_poll_interval_ms: u64,
    /// Backoff strategy: `fixed`, or `exponential` optionally followed by a
    /// multiplier (for example `exponential:3`). The default multiplier is 2.
    #[ortho_config(default = "fixed".to_owned())]
    pub backoff: String,
    /// Overall time allowed for an asynchronous job, in seconds.
    #[ortho_config(default = 900)]
    pub job_timeout_secs: u64,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }
}

impl ClientConfig {
    fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "missing {}: set {} or add {} to hmara.toml",
                metadata.description, metadata.env_var, metadata.toml_key
            )));
        }
        Ok(())
    }

    /// Loads configuration using the `ortho-config` derive. Values merge
    /// defaults, configuration files, environment variables, and CLI flags in
    /// that order of precedence.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the loader fails to merge sources.
    pub fn load_from_sources() -> Result<Self, ConfigError> {
        Self::load().map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Loads configuration without attempting to parse CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("hmara")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation on required fields and numeric ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty
    /// and [`ConfigError::Invalid`] when a value cannot be used.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::require_field(
            &self.api_url,
            &FieldMetadata::new("API endpoint URL", "HMARA_API_URL", "api_url"),
        )?;
        Self::require_field(
            &self.api_key,
            &FieldMetadata::new("API key", "HMARA_API_KEY", "api_key"),
        )?;
        Self::require_field(
            &self.secret_key,
            &FieldMetadata::new("API secret key", "HMARA_SECRET_KEY", "secret_key"),
        )?;
        self.method()?;
        self.poll_policy()?;
        if self.http_timeout_secs == 0 {
            return Err(ConfigError::Invalid(String::from(
                "http_timeout_secs must be greater than zero",
            )));
        }
        Ok(())
    }

    /// Returns the credential pair.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when either key is blank.
    pub fn credentials(&self) -> Result<Credentials, ConfigError> {
        Credentials::new(&self.api_key, &self.secret_key).map_err(|err| match err {
            ApiError::Configuration(message) => ConfigError::MissingField(message),
            other => ConfigError::Invalid(other.to_string()),
        })
    }

    /// Parses the configured HTTP method.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for anything but `GET` or `POST`.
    pub fn method(&self) -> Result<HttpMethod, ConfigError> {
        self.http_method.parse().map_err(ConfigError::Invalid)
    }

    /// Returns the per-request HTTP timeout.
    #[must_use]
    pub const fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Builds the default job polling policy.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the backoff strategy cannot be
    /// parsed or the resulting policy is unusable.
    pub fn poll_policy(&self) -> Result<PollPolicy, ConfigError> {
        let policy = PollPolicy {
            interval: Duration::from_millis(self.poll_interval_ms),
            min_interval: Duration::from_millis(self.min_poll_interval_ms),
            max_interval: Duration::from_millis(self.max_poll_interval_ms),
            timeout: Duration::from_secs(self.job_timeout_secs),
            backoff: parse_backoff(&self.backoff)?,
        };
        policy
            .validate()
            .map_err(|err| ConfigError::Invalid(err.to_string()))?;
        Ok(policy)
    }
}

fn parse_backoff(value: &str) -> Result<Backoff, ConfigError> {
    let normalised = value.trim().to_ascii_lowercase();
    let (kind, multiplier) = match normalised.split_once(':') {
        Some((head, tail)) => (head, Some(tail)),
        None => (normalised.as_str(), None),
    };
    match (kind, multiplier) {
        ("fixed", None) => Ok(Backoff::Fixed),
        ("exponential", None) => Ok(Backoff::Exponential { multiplier: 2 }),
        ("exponential", Some(raw)) => match raw.trim().parse::<u32>() {
            Ok(factor) if factor >= 1 => Ok(Backoff::Exponential { multiplier: factor }),
            _ => Err(ConfigError::Invalid(format!(
                "backoff multiplier must be a positive integer, got '{raw}'"
            ))),
        },
        _ => Err(ConfigError::Invalid(format!(
            "unknown backoff strategy '{value}'; expected fixed or exponential[:N]"
        ))),
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a configuration value is present but unusable.
    #[error("invalid configuration value: {0}")]
    Invalid(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("fixed", Backoff::Fixed)]
    #[case(" Exponential ", Backoff::Exponential { multiplier: 2 })]
    #[case("exponential:3", Backoff::Exponential { multiplier: 3 })]
    fn parses_backoff_strategies(#[case] raw: &str, #[case] expected: Backoff) {
        assert_eq!(parse_backoff(raw), Ok(expected));
    }

    #[test]
    fn blank_secret_reports_a_single_prefix() {
        let cfg = ClientConfig {
            api_url: String::from("https://cloud.example.com/client/api"),
            api_key: String::from("key"),
            secret_key: String::from("  "),
            http_method: String::from("GET"),
            http_timeout_secs: 30,
            poll_interval_ms: 2000,
            min_poll_interval_ms: 500,
            max_poll_interval_ms: 30000,
            backoff: String::from("fixed"),
            job_timeout_secs: 900,
        };

        let err = cfg.credentials().expect_err("blank secret should fail");

        assert_eq!(err, ConfigError::MissingField(String::from("missing secret key")));
        assert_eq!(
            err.to_string(),
            "missing configuration field: missing secret key"
        );
    }

    #[rstest]
    #[case("linear")]
    #[case("exponential:0")]
    #[case("exponential:x")]
    #[case("fixed:2")]
    fn rejects_unknown_backoff(#[case] raw: &str) {
        assert!(matches!(parse_backoff(raw), Err(ConfigError::Invalid(_))));
    }
}
