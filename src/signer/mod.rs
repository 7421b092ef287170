//! Request signing for the control-plane query API.
//!
//! Every request carries an HMAC-SHA1 signature over a canonical rendering of
//! its parameters. The server recomputes the same string, so the rules here
//! (lowercased keys, sorted pairs, `%20` for spaces, lowercased canonical
//! string) must match the server byte for byte.

use std::fmt;
use std::str::FromStr;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use reqwest::Url;
use sha1::Sha1;
use tracing::debug;

use crate::credentials::Credentials;
use crate::error::ApiError;
use crate::request::CommandRequest;

type HmacSha1 = Hmac<Sha1>;

/// Content negotiation value sent with every command.
pub const RESPONSE_FORMAT: &str = "json";

/// HTTP method used to deliver signed commands.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum HttpMethod {
    /// Parameters travel in the query string.
    #[default]
    Get,
    /// Parameters travel as a form-encoded body.
    Post,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => f.write_str("GET"),
            Self::Post => f.write_str("POST"),
        }
    }
}

impl FromStr for HttpMethod {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            other => Err(format!("unsupported HTTP method '{other}'")),
        }
    }
}

/// Produces signed requests for a single endpoint and key pair.
#[derive(Clone, Debug)]
pub struct RequestSigner {
    endpoint: Url,
    credentials: Credentials,
    method: HttpMethod,
}

impl RequestSigner {
    /// Creates a signer for `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Configuration`] when the URL is not an absolute
    /// `http`/`https` URL or already carries a query string.
    pub fn new(base_url: &str, credentials: Credentials) -> Result<Self, ApiError> {
        let trimmed = base_url.trim();
        if trimmed.is_empty() {
            return Err(ApiError::configuration("missing API endpoint URL"));
        }
        let endpoint = Url::parse(trimmed).map_err(|err| {
            ApiError::configuration(format!("invalid API endpoint '{trimmed}': {err}"))
        })?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(ApiError::configuration(format!(
                "API endpoint must use http or https, got '{}'",
                endpoint.scheme()
            )));
        }
        if endpoint.query().is_some() {
            return Err(ApiError::configuration(
                "API endpoint must not include a query string",
            ));
        }
        Ok(Self {
            endpoint,
            credentials,
            method: HttpMethod::Get,
        })
    }

    /// Selects the HTTP method used for signed requests.
    #[must_use]
    pub const fn with_method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    /// Returns the configured endpoint.
    #[must_use]
    pub const fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Returns the configured HTTP method.
    #[must_use]
    pub const fn method(&self) -> HttpMethod {
        self.method
    }

    /// Signs `request`.
    ///
    /// The result depends only on the command, its parameters, and the
    /// credentials: no nonce or timestamp is injected, so signing the same
    /// input twice yields identical requests.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidArgument`] when the command name is empty or
    /// a parameter uses a key reserved for the signer.
    pub fn sign(&self, request: &CommandRequest) -> Result<SignedRequest, ApiError> {
        let command = request.name();
        if command.is_empty() {
            return Err(ApiError::invalid("command name must not be empty"));
        }
        if let Some(key) = request.reserved_key() {
            return Err(ApiError::invalid(format!(
                "parameter '{key}' is set by the signer and cannot be supplied"
            )));
        }

        let mut parameters = Vec::with_capacity(request.parameters().len() + 3);
        parameters.push((String::from("apikey"), self.credentials.api_key().to_owned()));
        parameters.push((String::from("command"), command.to_owned()));
        parameters.push((String::from("response"), String::from(RESPONSE_FORMAT)));
        parameters.extend(request.parameters().iter().cloned());
        parameters.retain(|(_, value)| !value.is_empty());
        parameters.sort();

        let canonical = canonical_string(&parameters);
        let signature = compute_signature(self.credentials.secret_key(), &canonical)?;
        debug!(
            command,
            parameters = parameters.len(),
            method = %self.method,
            "signed command"
        );

        Ok(SignedRequest {
            endpoint: self.endpoint.clone(),
            command: command.to_owned(),
            method: self.method,
            parameters,
            signature,
        })
    }
}

/// Renders the string that is fed to the HMAC.
///
/// Pairs with empty values are skipped, keys are lowercased, pairs are sorted
/// by key then value, values are percent-encoded with `%20` for spaces, and
/// the joined string is lowercased as a whole.
#[must_use]
pub fn canonical_string(pairs: &[(String, String)]) -> String {
    let mut normalised: Vec<(String, &str)> = pairs
        .iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(key, value)| (key.to_lowercase(), value.as_str()))
        .collect();
    normalised.sort_unstable();
    normalised
        .iter()
        .map(|(key, value)| format!("{key}={}", urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("&")
        .to_lowercase()
}

/// Computes the base64-encoded HMAC-SHA1 of `canonical` keyed by `secret`.
///
/// # Errors
///
/// Returns [`ApiError::Configuration`] when the HMAC rejects the key.
pub fn compute_signature(secret: &[u8], canonical: &str) -> Result<String, ApiError> {
    let mut mac = HmacSha1::new_from_slice(secret)
        .map_err(|err| ApiError::configuration(format!("unusable secret key: {err}")))?;
    mac.update(canonical.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// A fully signed command, ready for the transport.
///
/// Signed requests are built per call and are not meant to be cached.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SignedRequest {
    endpoint: Url,
    command: String,
    method: HttpMethod,
    parameters: Vec<(String, String)>,
    signature: String,
}

impl SignedRequest {
    /// Returns the command name.
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Returns the HTTP method to use.
    #[must_use]
    pub const fn method(&self) -> HttpMethod {
        self.method
    }

    /// Returns the endpoint without a query string.
    #[must_use]
    pub const fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Returns the signed parameters in canonical order, excluding the
    /// signature itself.
    #[must_use]
    pub fn parameters(&self) -> &[(String, String)] {
        &self.parameters
    }

    /// Returns the base64 signature before URL encoding.
    #[must_use]
    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// Renders every parameter plus the signature as an encoded query string.
    #[must_use]
    pub fn query_string(&self) -> String {
        let mut query = self
            .parameters
            .iter()
            .map(|(key, value)| {
                format!(
                    "{}={}",
                    urlencoding::encode(key),
                    urlencoding::encode(value)
                )
            })
            .collect::<Vec<_>>()
            .join("&");
        query.push_str("&signature=");
        query.push_str(&urlencoding::encode(&self.signature));
        query
    }

    /// Returns the URL to request. For `GET` this includes the query string;
    /// for `POST` it is the bare endpoint.
    #[must_use]
    pub fn url(&self) -> String {
        match self.method {
            HttpMethod::Get => format!("{}?{}", self.endpoint, self.query_string()),
            HttpMethod::Post => self.endpoint.to_string(),
        }
    }

    /// Returns the form body for `POST` requests.
    #[must_use]
    pub fn body(&self) -> Option<String> {
        match self.method {
            HttpMethod::Get => None,
            HttpMethod::Post => Some(self.query_string()),
        }
    }
}
