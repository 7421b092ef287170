//! Resolution of asynchronous jobs.
//!
//! A job moves from submitted to polling and ends in exactly one terminal
//! outcome. Both the wait between polls and any in-flight status query race
//! the caller's cancellation token and the overall deadline, so neither can
//! hold the caller for longer than one polling interval past the point it
//! should stop.

mod policy;

use std::time::Duration;

use serde_json::Value;
use tokio::time::{Instant, sleep_until, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::ApiError;
use crate::request::CommandRequest;
use crate::response::{AsyncJobHandle, JobStatus, parse_job_status};
use crate::schema::QUERY_ASYNC_JOB_RESULT;
use crate::signer::RequestSigner;
use crate::transport::Transport;

pub use policy::{
    Backoff, DEFAULT_JOB_TIMEOUT, DEFAULT_MAX_POLL_INTERVAL, DEFAULT_MIN_POLL_INTERVAL,
    DEFAULT_POLL_INTERVAL, PollPolicy,
};

/// Terminal state of a resolved job.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum JobOutcome {
    /// The job finished and produced this result payload.
    Succeeded(Value),
    /// The job finished with an error.
    Failed {
        /// Error code reported by the server.
        error_code: i64,
        /// Error text reported by the server.
        error_text: String,
    },
    /// The deadline passed before the job reached a terminal state.
    TimedOut {
        /// Time spent polling.
        elapsed: Duration,
        /// Number of status queries issued.
        polls: u32,
    },
    /// The caller cancelled the wait. The remote job is left running.
    Cancelled {
        /// Number of status queries issued.
        polls: u32,
    },
}

impl JobOutcome {
    /// Converts the outcome into the job result, mapping every non-success
    /// terminal state onto its [`ApiError`] variant.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::JobFailed`], [`ApiError::JobTimedOut`], or
    /// [`ApiError::Cancelled`] for the corresponding outcomes.
    pub fn into_result(self, job_id: &str) -> Result<Value, ApiError> {
        match self {
            Self::Succeeded(value) => Ok(value),
            Self::Failed {
                error_code,
                error_text,
            } => Err(ApiError::JobFailed {
                job_id: job_id.to_owned(),
                code: error_code,
                text: error_text,
            }),
            Self::TimedOut { elapsed, .. } => Err(ApiError::JobTimedOut {
                job_id: job_id.to_owned(),
                elapsed,
            }),
            Self::Cancelled { .. } => Err(ApiError::Cancelled {
                job_id: job_id.to_owned(),
            }),
        }
    }
}

/// Polls a single job until it reaches a terminal outcome.
#[derive(Debug)]
pub struct JobResolver<'a, T: ?Sized> {
    signer: &'a RequestSigner,
    transport: &'a T,
    policy: PollPolicy,
}

impl<'a, T> JobResolver<'a, T>
where
    T: Transport + ?Sized,
{
    /// Creates a resolver that signs status queries with `signer` and sends
    /// them through `transport`.
    #[must_use]
    pub const fn new(signer: &'a RequestSigner, transport: &'a T, policy: PollPolicy) -> Self {
        Self {
            signer,
            transport,
            policy,
        }
    }

    /// Returns the active policy.
    #[must_use]
    pub const fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Polls `handle` until it succeeds, fails, times out, or `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidArgument`] for an unusable policy or empty
    /// job identifier. Transport, remote, and decoding errors raised by a
    /// status query end resolution and are returned unmodified.
    pub async fn resolve(
        &self,
        handle: &AsyncJobHandle,
        cancel: &CancellationToken,
    ) -> Result<JobOutcome, ApiError> {
        self.policy.validate()?;
        if handle.job_id.trim().is_empty() {
            return Err(ApiError::invalid("job identifier must not be empty"));
        }

        let job_id = handle.job_id.as_str();
        let started = Instant::now();
        let deadline = started + self.policy.timeout;
        let mut polls: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Ok(Self::cancelled(job_id, polls));
            }

            let request = self.signer.sign(
                &CommandRequest::new(QUERY_ASYNC_JOB_RESULT).param("jobid", job_id),
            )?;
            polls = polls.saturating_add(1);
            debug!(job_id, poll = polls, "querying job status");

            let sent = tokio::select! {
                biased;
                () = cancel.cancelled() => return Ok(Self::cancelled(job_id, polls)),
                sent = timeout_at(deadline, self.transport.send(&request)) => sent,
            };
            let Ok(response) = sent else {
                return Ok(Self::timed_out(job_id, started, polls));
            };

            match parse_job_status(&response?)? {
                JobStatus::Pending => {}
                JobStatus::Succeeded(result) => {
                    info!(job_id, polls, "job succeeded");
                    return Ok(JobOutcome::Succeeded(result));
                }
                JobStatus::Failed {
                    error_code,
                    error_text,
                } => {
                    info!(job_id, polls, error_code, %error_text, "job failed");
                    return Ok(JobOutcome::Failed {
                        error_code,
                        error_text,
                    });
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(Self::timed_out(job_id, started, polls));
            }

            // Never wake past the deadline; a clamped wait ends in a timeout
            // rather than an early poll.
            let wake = (now + self.policy.delay_after(polls.saturating_sub(1))).min(deadline);
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Ok(Self::cancelled(job_id, polls)),
                () = sleep_until(wake) => {}
            }

            if Instant::now() >= deadline {
                return Ok(Self::timed_out(job_id, started, polls));
            }
        }
    }

    fn cancelled(job_id: &str, polls: u32) -> JobOutcome {
        info!(job_id, polls, "job wait cancelled");
        JobOutcome::Cancelled { polls }
    }

    fn timed_out(job_id: &str, started: Instant, polls: u32) -> JobOutcome {
        let elapsed = started.elapsed();
        info!(job_id, polls, ?elapsed, "job wait timed out");
        JobOutcome::TimedOut { elapsed, polls }
    }
}
