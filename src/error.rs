//! Error taxonomy shared by the signer, transport, and job resolver.

use std::time::Duration;

use thiserror::Error;

use crate::config::ConfigError;

/// Errors surfaced by the API client.
///
/// Signing and validation failures are raised before any network I/O.
/// Transport and remote failures are passed through unmodified; retrying is
/// left to the caller (see [`ApiError::is_retryable`]).
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ApiError {
    /// Raised when credentials or the endpoint are missing or invalid.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Raised when a command or its parameters are malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Raised when the request could not be delivered or the HTTP exchange
    /// failed without a structured error payload.
    #[error("transport error: {message}")]
    Transport {
        /// HTTP status, when a response was received.
        status: Option<u16>,
        /// Description of the failure.
        message: String,
    },
    /// Raised when the server answered with a structured error payload.
    #[error("remote error {code}: {text}")]
    Remote {
        /// Error code reported by the server.
        code: i64,
        /// Error text reported by the server.
        text: String,
    },
    /// Raised when the response body cannot be interpreted.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    /// Raised when an asynchronous job reached the failed terminal state.
    #[error("job {job_id} failed with error {code}: {text}")]
    JobFailed {
        /// Identifier of the failed job.
        job_id: String,
        /// Error code reported for the job.
        code: i64,
        /// Error text reported for the job.
        text: String,
    },
    /// Raised when polling exceeded its deadline. The remote outcome of the
    /// job is unknown.
    #[error("timed out after {elapsed:?} waiting for job {job_id}")]
    JobTimedOut {
        /// Identifier of the job being polled.
        job_id: String,
        /// Time spent polling before giving up.
        elapsed: Duration,
    },
    /// Raised when the caller cancelled the wait.
    #[error("cancelled while waiting for job {job_id}")]
    Cancelled {
        /// Identifier of the job being polled.
        job_id: String,
    },
}

impl ApiError {
    /// Returns `true` when the caller may reasonably retry the same request.
    ///
    /// Only transport failures qualify. Remote errors, validation errors, and
    /// job outcomes describe a definite answer from the control plane.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}

impl From<ConfigError> for ApiError {
    fn from(value: ConfigError) -> Self {
        Self::Configuration(value.to_string())
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(value: reqwest::Error) -> Self {
        Self::Transport {
            status: value.status().map(|status| status.as_u16()),
            message: value.to_string(),
        }
    }
}
