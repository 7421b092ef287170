//! Interpretation of control-plane responses.
//!
//! The server wraps every payload in a `<command>response` envelope. A
//! payload is either a direct result, a job identifier for work that
//! continues in the background, or a structured error.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::ApiError;
use crate::schema::QUERY_ASYNC_JOB_RESULT;
use crate::transport::TransportResponse;

const ENVELOPE_SUFFIX: &str = "response";
const BODY_SNIPPET_LEN: usize = 200;

/// Outcome of a single command invocation.
#[derive(Clone, Debug, PartialEq)]
pub enum CommandResponse {
    /// The command completed within the request/response cycle.
    Sync(Value),
    /// The command was accepted and continues as a background job.
    Async(AsyncJobHandle),
}

/// Reference to a background job returned by an asynchronous command.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AsyncJobHandle {
    /// Job identifier used for status queries.
    pub job_id: String,
    /// Command that started the job.
    pub command: String,
    /// Identifier of the resource the job operates on, when reported.
    pub resource_id: Option<String>,
    /// When the handle was received.
    pub created_at: DateTime<Utc>,
}

impl AsyncJobHandle {
    /// Creates a handle for an existing job, for example one whose identifier
    /// was persisted by an earlier process.
    #[must_use]
    pub fn new(job_id: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            command: command.into(),
            resource_id: None,
            created_at: Utc::now(),
        }
    }

    /// Records the resource identifier returned alongside the job.
    #[must_use]
    pub fn with_resource_id(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }
}

/// Status reported by a single job status query.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum JobStatus {
    /// The job is still running (status code 0).
    Pending,
    /// The job finished successfully (status code 1).
    Succeeded(Value),
    /// The job finished with an error (status code 2).
    Failed {
        /// Error code reported by the server.
        error_code: i64,
        /// Error text reported by the server.
        error_text: String,
    },
}

/// Classifies the response to `command`.
///
/// # Errors
///
/// Returns [`ApiError::Remote`] for structured error payloads,
/// [`ApiError::Transport`] for non-2xx statuses without one, and
/// [`ApiError::MalformedResponse`] when a successful body is not JSON.
pub fn classify(command: &str, response: &TransportResponse) -> Result<CommandResponse, ApiError> {
    let payload = decode(response)?;
    if command.eq_ignore_ascii_case(QUERY_ASYNC_JOB_RESULT) {
        return Ok(CommandResponse::Sync(payload));
    }

    match payload.get("jobid").and_then(as_text) {
        Some(job_id) => {
            let handle = AsyncJobHandle::new(job_id, command);
            let resolved = match payload.get("id").and_then(as_text) {
                Some(resource_id) => handle.with_resource_id(resource_id),
                None => handle,
            };
            Ok(CommandResponse::Async(resolved))
        }
        None => Ok(CommandResponse::Sync(payload)),
    }
}

/// Parses the answer to a job status query.
///
/// A reported `jobstatus` takes precedence over error fields, so a failed job
/// whose error code sits beside the status is still a [`JobStatus::Failed`].
///
/// # Errors
///
/// Returns the same errors as [`classify`], plus
/// [`ApiError::MalformedResponse`] when `jobstatus` is missing or unknown.
pub fn parse_job_status(response: &TransportResponse) -> Result<JobStatus, ApiError> {
    let payload = parse_payload(response)?;
    let Some(status) = payload.get("jobstatus").and_then(as_code) else {
        reject_failures(response, &payload)?;
        return Err(ApiError::MalformedResponse(String::from(
            "job status missing jobstatus",
        )));
    };

    if matches!(status, 0 | 1) {
        reject_failures(response, &payload)?;
    }

    match status {
        0 => Ok(JobStatus::Pending),
        1 => Ok(JobStatus::Succeeded(
            payload.get("jobresult").cloned().unwrap_or(Value::Null),
        )),
        2 => Ok(failed_job(&payload)),
        other => Err(ApiError::MalformedResponse(format!(
            "unknown job status {other}"
        ))),
    }
}

fn failed_job(payload: &Value) -> JobStatus {
    let result = payload.get("jobresult");
    let error_code = result
        .and_then(|inner| inner.get("errorcode"))
        .or_else(|| payload.get("errorcode"))
        .and_then(as_code)
        .or_else(|| payload.get("jobresultcode").and_then(as_code))
        .unwrap_or_default();
    let error_text = result
        .and_then(|inner| inner.get("errortext"))
        .or_else(|| payload.get("errortext"))
        .and_then(Value::as_str)
        .map_or_else(|| String::from("job failed without error text"), str::to_owned);
    JobStatus::Failed {
        error_code,
        error_text,
    }
}

fn decode(response: &TransportResponse) -> Result<Value, ApiError> {
    let payload = parse_payload(response)?;
    reject_failures(response, &payload)?;
    Ok(payload)
}

fn parse_payload(response: &TransportResponse) -> Result<Value, ApiError> {
    match serde_json::from_str::<Value>(&response.body) {
        Ok(value) => Ok(unwrap_envelope(value)),
        Err(err) if response.is_success() => Err(ApiError::MalformedResponse(err.to_string())),
        Err(_) => Err(http_failure(response)),
    }
}

fn reject_failures(response: &TransportResponse, payload: &Value) -> Result<(), ApiError> {
    if let Some(err) = remote_error(payload) {
        return Err(err);
    }
    if !response.is_success() {
        return Err(http_failure(response));
    }
    Ok(())
}

fn unwrap_envelope(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.len() == 1 => {
            let key = map.keys().next().cloned().unwrap_or_default();
            if key.to_ascii_lowercase().ends_with(ENVELOPE_SUFFIX) {
                map.remove(&key).unwrap_or(Value::Null)
            } else {
                Value::Object(map)
            }
        }
        other => other,
    }
}

fn remote_error(payload: &Value) -> Option<ApiError> {
    let code = payload.get("errorcode").and_then(as_code)?;
    let text = payload
        .get("errortext")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();
    Some(ApiError::Remote { code, text })
}

fn http_failure(response: &TransportResponse) -> ApiError {
    let snippet: String = response.body.chars().take(BODY_SNIPPET_LEN).collect();
    ApiError::Transport {
        status: Some(response.status),
        message: format!("HTTP {}: {}", response.status, snippet.trim()),
    }
}

fn as_code(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn ok(body: &Value) -> TransportResponse {
        TransportResponse::new(200, body.to_string())
    }

    #[test]
    fn classify_unwraps_sync_payload() {
        let body = json!({"listzonesresponse": {"count": 1, "zone": [{"id": "z-1"}]}});
        let response = classify("listZones", &ok(&body))
            .unwrap_or_else(|err| panic!("classify: {err}"));
        assert_eq!(
            response,
            CommandResponse::Sync(json!({"count": 1, "zone": [{"id": "z-1"}]}))
        );
    }

    #[test]
    fn classify_detects_job_handles() {
        let body = json!({"deployvirtualmachineresponse": {"id": "vm-7", "jobid": "job-1"}});
        let response = classify("deployVirtualMachine", &ok(&body))
            .unwrap_or_else(|err| panic!("classify: {err}"));
        let CommandResponse::Async(handle) = response else {
            panic!("expected async handle, got {response:?}");
        };
        assert_eq!(handle.job_id, "job-1");
        assert_eq!(handle.command, "deployVirtualMachine");
        assert_eq!(handle.resource_id.as_deref(), Some("vm-7"));
    }

    #[test]
    fn classify_surfaces_remote_errors_verbatim() {
        let body = json!({"deployvirtualmachineresponse": {
            "errorcode": 431,
            "errortext": "Unable to find template"
        }});
        let response = TransportResponse::new(431, body.to_string());
        assert_eq!(
            classify("deployVirtualMachine", &response),
            Err(ApiError::Remote {
                code: 431,
                text: String::from("Unable to find template"),
            })
        );
    }

    #[test]
    fn classify_maps_unstructured_failures_to_transport_errors() {
        let response = TransportResponse::new(502, "<html>bad gateway</html>");
        let err = classify("listZones", &response).expect_err("502 should fail");
        assert!(
            matches!(err, ApiError::Transport { status: Some(502), .. }),
            "unexpected error: {err:?}"
        );
    }

    #[test]
    fn classify_rejects_non_json_success() {
        let response = TransportResponse::new(200, "not json");
        assert!(matches!(
            classify("listZones", &response),
            Err(ApiError::MalformedResponse(_))
        ));
    }

    #[test]
    fn job_status_codes_map_to_states() {
        let pending = json!({"queryasyncjobresultresponse": {"jobid": "j", "jobstatus": 0}});
        let done = json!({"queryasyncjobresultresponse": {
            "jobid": "j",
            "jobstatus": 1,
            "jobresult": {"id": "42"}
        }});
        assert_eq!(parse_job_status(&ok(&pending)), Ok(JobStatus::Pending));
        assert_eq!(
            parse_job_status(&ok(&done)),
            Ok(JobStatus::Succeeded(json!({"id": "42"})))
        );
    }

    #[test]
    fn failed_job_carries_error_details() {
        let body = json!({"queryasyncjobresultresponse": {
            "jobid": "j",
            "jobstatus": 2,
            "jobresultcode": 530,
            "jobresult": {"errorcode": 431, "errortext": "bad state"}
        }});
        assert_eq!(
            parse_job_status(&ok(&body)),
            Ok(JobStatus::Failed {
                error_code: 431,
                error_text: String::from("bad state"),
            })
        );
    }

    #[test]
    fn failed_job_falls_back_to_result_code() {
        let body = json!({"queryasyncjobresultresponse": {
            "jobid": "j",
            "jobstatus": "2",
            "jobresultcode": 530
        }});
        assert_eq!(
            parse_job_status(&ok(&body)),
            Ok(JobStatus::Failed {
                error_code: 530,
                error_text: String::from("job failed without error text"),
            })
        );
    }

    #[test]
    fn failed_job_reads_error_fields_beside_the_status() {
        let body = json!({"queryasyncjobresultresponse": {
            "jobid": "j",
            "jobstatus": 2,
            "errorcode": 431,
            "errortext": "bad state"
        }});
        assert_eq!(
            parse_job_status(&ok(&body)),
            Ok(JobStatus::Failed {
                error_code: 431,
                error_text: String::from("bad state"),
            })
        );
    }

    #[test]
    fn status_query_without_jobstatus_surfaces_remote_errors() {
        let body = json!({"queryasyncjobresultresponse": {
            "errorcode": 530,
            "errortext": "job not found"
        }});
        let response = TransportResponse::new(530, body.to_string());
        assert_eq!(
            parse_job_status(&response),
            Err(ApiError::Remote {
                code: 530,
                text: String::from("job not found"),
            })
        );
    }

    #[test]
    fn unknown_job_status_is_malformed() {
        let body = json!({"queryasyncjobresultresponse": {"jobid": "j", "jobstatus": 9}});
        assert!(matches!(
            parse_job_status(&ok(&body)),
            Err(ApiError::MalformedResponse(_))
        ));
    }
}
