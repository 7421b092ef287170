//! API credentials used to authenticate signed requests.

use std::fmt;
use std::sync::Arc;

use crate::error::ApiError;

/// Key pair issued by the control plane.
///
/// The API key travels with every request; the secret key is only ever used
/// as the HMAC key and is redacted from `Debug` output. Cloning is cheap, so a
/// single instance can be shared read-only across concurrent signers.
#[derive(Clone, Eq, PartialEq)]
pub struct Credentials {
    api_key: Arc<str>,
    secret_key: Arc<str>,
}

impl Credentials {
    /// Creates a credential pair, trimming surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Configuration`] when either key is blank.
    pub fn new(
        api_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Result<Self, ApiError> {
        let api = api_key.into();
        let secret = secret_key.into();
        let trimmed_api = api.trim();
        let trimmed_secret = secret.trim();
        if trimmed_api.is_empty() {
            return Err(ApiError::configuration("missing API key"));
        }
        if trimmed_secret.is_empty() {
            return Err(ApiError::configuration("missing secret key"));
        }
        Ok(Self {
            api_key: Arc::from(trimmed_api),
            secret_key: Arc::from(trimmed_secret),
        })
    }

    /// Returns the public API key.
    #[must_use]
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub(crate) fn secret_key(&self) -> &[u8] {
        self.secret_key.as_bytes()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}
