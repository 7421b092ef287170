//! Core library for the Hmara management API client.
//!
//! The crate turns named commands into signed HTTP requests against a
//! cloud-orchestration control plane and resolves commands that complete in
//! the background by polling their job status until a terminal outcome.

pub mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod job;
pub mod request;
pub mod response;
pub mod schema;
pub mod signer;
pub mod test_support;
pub mod transport;

pub use client::ApiClient;
pub use config::{ClientConfig, ConfigError};
pub use credentials::Credentials;
pub use error::ApiError;
pub use job::{Backoff, JobOutcome, JobResolver, PollPolicy};
pub use request::CommandRequest;
pub use response::{AsyncJobHandle, CommandResponse, JobStatus};
pub use schema::{CommandSchema, CommandSchemas, QUERY_ASYNC_JOB_RESULT};
pub use signer::{HttpMethod, RequestSigner, SignedRequest};
pub use tokio_util::sync::CancellationToken;
pub use transport::{HttpTransport, Transport, TransportResponse};
