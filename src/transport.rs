//! HTTP delivery of signed requests.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use crate::error::ApiError;
use crate::signer::{HttpMethod, SignedRequest};

/// Default per-request HTTP timeout.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Raw HTTP response as seen by the classifier.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TransportResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body, expected to be JSON.
    pub body: String,
}

impl TransportResponse {
    /// Builds a response from a status code and body.
    #[must_use]
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Returns `true` for 2xx statuses.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Future returned by transport operations.
pub type TransportFuture<'a> =
    Pin<Box<dyn Future<Output = Result<TransportResponse, ApiError>> + Send + 'a>>;

/// Executes signed requests. Implementations must not retry internally.
pub trait Transport: Send + Sync {
    /// Sends `request` and returns the raw response.
    fn send<'a>(&'a self, request: &'a SignedRequest) -> TransportFuture<'a>;
}

impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    fn send<'a>(&'a self, request: &'a SignedRequest) -> TransportFuture<'a> {
        (**self).send(request)
    }
}

/// [`Transport`] backed by `reqwest`.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpTransport {
    /// Creates a transport with the given per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Configuration`] when the HTTP client cannot be
    /// initialised (for example when the TLS backend fails to load).
    pub fn new(timeout: Duration) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| {
                ApiError::configuration(format!("failed to build HTTP client: {err}"))
            })?;
        Ok(Self { client, timeout })
    }

    /// Returns the per-request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn execute(&self, request: &SignedRequest) -> Result<TransportResponse, ApiError> {
        let builder = match request.method() {
            HttpMethod::Get => self.client.get(request.url()),
            HttpMethod::Post => self
                .client
                .post(request.url())
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(request.body().unwrap_or_default()),
        };

        debug!(
            command = request.command(),
            method = %request.method(),
            endpoint = %request.endpoint(),
            "sending command"
        );
        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        debug!(command = request.command(), status, "received response");

        Ok(TransportResponse { status, body })
    }
}

impl Transport for HttpTransport {
    fn send<'a>(&'a self, request: &'a SignedRequest) -> TransportFuture<'a> {
        Box::pin(self.execute(request))
    }
}
