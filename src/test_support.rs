//! Test support utilities shared across unit and integration tests.

use std::collections::{BTreeSet, VecDeque};
use std::env;
use std::ffi::OsString;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::MutexGuard;
use tokio::time::{Instant, sleep};

use crate::credentials::Credentials;
use crate::error::ApiError;
use crate::signer::{RequestSigner, SignedRequest};
use crate::transport::{Transport, TransportFuture, TransportResponse};

/// Endpoint used by test signers.
pub const TEST_ENDPOINT: &str = "https://cloud.example.com/client/api";

/// Returns a signer with fixed test credentials.
///
/// # Panics
///
/// Never in practice: the endpoint and credentials are constants.
#[must_use]
pub fn test_signer() -> RequestSigner {
    let credentials = Credentials::new("test-api-key", "test-secret")
        .unwrap_or_else(|err| panic!("test credentials: {err}"));
    RequestSigner::new(TEST_ENDPOINT, credentials)
        .unwrap_or_else(|err| panic!("test signer: {err}"))
}

/// Builds a job status response with the given status code and result.
#[must_use]
pub fn job_status_response(job_id: &str, status: u8, result: Option<Value>) -> TransportResponse {
    let mut inner = json!({"jobid": job_id, "jobstatus": status});
    if let (Some(payload), Some(object)) = (result, inner.as_object_mut()) {
        object.insert(String::from("jobresult"), payload);
    }
    TransportResponse::new(
        200,
        json!({ "queryasyncjobresultresponse": inner }).to_string(),
    )
}

/// Records a single request made through [`ScriptedTransport`].
#[derive(Clone, Debug)]
pub struct RecordedCall {
    /// The signed request as received by the transport.
    pub request: SignedRequest,
    /// When the transport received it.
    pub at: Instant,
}

/// Transport that returns pre-seeded responses in FIFO order.
///
/// Once the script is exhausted the fallback response (if any) is repeated;
/// otherwise a transport error is returned.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<Result<TransportResponse, ApiError>>>,
    fallback: Option<Result<TransportResponse, ApiError>>,
    latency: Duration,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedTransport {
    /// Creates an empty transport.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a response.
    #[must_use]
    pub fn respond(self, response: TransportResponse) -> Self {
        self.push(Ok(response));
        self
    }

    /// Queues an error.
    #[must_use]
    pub fn fail(self, error: ApiError) -> Self {
        self.push(Err(error));
        self
    }

    /// Sets the response repeated after the script runs out.
    #[must_use]
    pub fn otherwise(mut self, response: TransportResponse) -> Self {
        self.fallback = Some(Ok(response));
        self
    }

    /// Delays every response by `latency`.
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn push(&self, entry: Result<TransportResponse, ApiError>) {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(entry);
    }

    /// Returns every recorded call in order.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns the number of requests received.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn next_response(&self) -> Result<TransportResponse, ApiError> {
        let scripted = self
            .responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        scripted
            .or_else(|| self.fallback.clone())
            .unwrap_or_else(|| {
                Err(ApiError::Transport {
                    status: None,
                    message: String::from("scripted transport exhausted"),
                })
            })
    }
}

impl Transport for ScriptedTransport {
    fn send<'a>(&'a self, request: &'a SignedRequest) -> TransportFuture<'a> {
        Box::pin(async move {
            self.calls
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(RecordedCall {
                    request: request.clone(),
                    at: Instant::now(),
                });
            if !self.latency.is_zero() {
                sleep(self.latency).await;
            }
            self.next_response()
        })
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: tokio::sync::Mutex<()> = tokio::sync::Mutex::const_new(());

/// Guard that holds the env mutex and restores variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets `pairs` and removes `cleared` while holding the global mutex.
    pub async fn set_vars(pairs: &[(&str, &str)], cleared: &[&str]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs
                    .iter()
                    .map(|(key, _)| key)
                    .chain(cleared)
                    .all(|key| seen.insert(*key))
            },
            "duplicate environment variable keys passed to EnvGuard::set_vars"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len() + cleared.len());
        for (key, value) in pairs {
            previous.push(((*key).to_owned(), env::var_os(key)));
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::set_var(key, value) };
        }
        for key in cleared {
            previous.push(((*key).to_owned(), env::var_os(key)));
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::remove_var(key) };
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in self.previous.iter().rev() {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
