//! High-level client combining validation, signing, transport, and job
//! resolution.
//!
//! Each call is sequential from the caller's point of view (validate, sign,
//! send, and optionally poll) while separate calls share nothing mutable and
//! may run concurrently on the same client.

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::job::{JobOutcome, JobResolver, PollPolicy};
use crate::request::CommandRequest;
use crate::response::{AsyncJobHandle, CommandResponse, classify};
use crate::schema::CommandSchemas;
use crate::signer::RequestSigner;
use crate::transport::{HttpTransport, Transport};

/// API client bound to one endpoint and key pair.
#[derive(Debug)]
pub struct ApiClient<T> {
    signer: RequestSigner,
    transport: T,
    poll_policy: PollPolicy,
    schemas: CommandSchemas,
}

impl ApiClient<HttpTransport> {
    /// Builds an HTTP-backed client from loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Configuration`] when the configuration fails
    /// validation or the HTTP client cannot be created.
    pub fn from_config(config: &ClientConfig) -> Result<Self, ApiError> {
        config.validate()?;
        let signer = RequestSigner::new(&config.api_url, config.credentials()?)?
            .with_method(config.method()?);
        let transport = HttpTransport::new(config.http_timeout())?;
        Ok(Self::new(signer, transport).with_poll_policy(config.poll_policy()?))
    }
}

impl<T: Transport> ApiClient<T> {
    /// Creates a client with the default poll policy and the built-in command
    /// schemas.
    #[must_use]
    pub fn new(signer: RequestSigner, transport: T) -> Self {
        Self {
            signer,
            transport,
            poll_policy: PollPolicy::default(),
            schemas: CommandSchemas::builtin(),
        }
    }

    /// Replaces the default poll policy.
    #[must_use]
    pub const fn with_poll_policy(mut self, policy: PollPolicy) -> Self {
        self.poll_policy = policy;
        self
    }

    /// Replaces the command schemas used for validation.
    #[must_use]
    pub fn with_schemas(mut self, schemas: CommandSchemas) -> Self {
        self.schemas = schemas;
        self
    }

    /// Returns the signer.
    #[must_use]
    pub const fn signer(&self) -> &RequestSigner {
        &self.signer
    }

    /// Returns the transport.
    #[must_use]
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Returns the default poll policy.
    #[must_use]
    pub const fn poll_policy(&self) -> &PollPolicy {
        &self.poll_policy
    }

    /// Validates, signs, and sends `request`, returning either the direct
    /// result or a handle for the background job.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidArgument`] before any network I/O when the
    /// request fails validation, and surfaces transport and remote errors
    /// unmodified.
    pub async fn invoke(&self, request: &CommandRequest) -> Result<CommandResponse, ApiError> {
        self.schemas.validate(request)?;
        let signed = self.signer.sign(request)?;
        let response = self.transport.send(&signed).await?;
        let classified = classify(request.name(), &response)?;
        if let CommandResponse::Async(handle) = &classified {
            debug!(command = request.name(), job_id = %handle.job_id, "command started job");
        }
        Ok(classified)
    }

    /// Polls `handle` until it reaches a terminal outcome. `policy` overrides
    /// the client default for this job only.
    ///
    /// # Errors
    ///
    /// Surfaces errors raised while polling; terminal job states are reported
    /// through [`JobOutcome`].
    pub async fn resolve(
        &self,
        handle: &AsyncJobHandle,
        policy: Option<PollPolicy>,
        cancel: &CancellationToken,
    ) -> Result<JobOutcome, ApiError> {
        let effective = policy.unwrap_or(self.poll_policy);
        JobResolver::new(&self.signer, &self.transport, effective)
            .resolve(handle, cancel)
            .await
    }

    /// Invokes `request` and, when it starts a job, waits for the job's
    /// result.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`Self::invoke`] and [`Self::resolve`], with
    /// failed, timed-out, and cancelled jobs mapped to
    /// [`ApiError::JobFailed`], [`ApiError::JobTimedOut`], and
    /// [`ApiError::Cancelled`].
    pub async fn execute(
        &self,
        request: &CommandRequest,
        cancel: &CancellationToken,
    ) -> Result<Value, ApiError> {
        match self.invoke(request).await? {
            CommandResponse::Sync(value) => Ok(value),
            CommandResponse::Async(handle) => self
                .resolve(&handle, None, cancel)
                .await?
                .into_result(&handle.job_id),
        }
    }
}
