//! Poll strategy: ask the workflow engine for the result of a submission.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error};

use super::types::{json_type_name, AnalysisResult};
use crate::http::{build_client, truncate_body};

/// Outcome of a single poll.
#[derive(Debug, Clone, PartialEq)]
pub enum PollStatus {
    /// The workflow has not produced a result yet.
    Pending,
    Completed(AnalysisResult),
    /// The workflow gave up on the document.
    Failed(String),
}

/// Errors from a single poll request.
#[derive(Debug, Clone, Error)]
pub enum PollError {
    #[error("network error while fetching the analysis: {0}")]
    Network(String),

    #[error("result endpoint returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("malformed analysis status response: {0}")]
    MalformedResponse(String),
}

impl PollError {
    /// Transient errors are retried on the next tick.
    pub fn is_transient(&self) -> bool {
        match self {
            PollError::Network(_) => true,
            PollError::Http { status, .. } => *status >= 500,
            PollError::MalformedResponse(_) => false,
        }
    }
}

/// Fetches the state of a submitted analysis by correlation id.
#[async_trait]
pub trait ResultPoller: Send + Sync {
    /// Name of the backend (for logging).
    fn name(&self) -> &str;

    async fn poll(&self, correlation_id: &str) -> Result<PollStatus, PollError>;
}

/// Polls `GET <result_url>` where `{id}` in the template is the correlation id.
pub struct HttpResultPoller {
    client: Client,
    url_template: String,
}

impl HttpResultPoller {
    pub fn new(url_template: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_client(timeout)?,
            url_template: url_template.into(),
        })
    }

    fn status_url(&self, correlation_id: &str) -> String {
        self.url_template
            .replace("{id}", &urlencoding::encode(correlation_id))
    }
}

#[async_trait]
impl ResultPoller for HttpResultPoller {
    fn name(&self) -> &str {
        "http"
    }

    async fn poll(&self, correlation_id: &str) -> Result<PollStatus, PollError> {
        let url = self.status_url(correlation_id);
        debug!(correlation_id, url = %url, "Polling analysis status");

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| PollError::Network(e.to_string()))?;

        let status = response.status();
        // Results that are not stored yet read as 404 on simple result stores.
        if status == StatusCode::NOT_FOUND {
            return Ok(PollStatus::Pending);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PollError::Http {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        let body: Value = response.json().await.map_err(|e| {
            error!(kind = "malformed_response", correlation_id, "Unreadable status body: {}", e);
            PollError::MalformedResponse(format!("Failed to parse response: {}", e))
        })?;

        parse_status(&body).inspect_err(|e| {
            error!(kind = "malformed_response", correlation_id, "{}", e);
        })
    }
}

/// Interpret a `{status, result?, error?}` document.
///
/// A bare result object (no `status`, but a `score`) counts as completed.
pub fn parse_status(body: &Value) -> Result<PollStatus, PollError> {
    let obj = body.as_object().ok_or_else(|| {
        PollError::MalformedResponse(format!("expected an object, got {}", json_type_name(body)))
    })?;

    let Some(status) = obj.get("status").and_then(Value::as_str) else {
        if obj.contains_key("score") {
            return completed(body);
        }
        return Err(PollError::MalformedResponse(
            "response has no status field".to_string(),
        ));
    };

    match status.to_ascii_lowercase().as_str() {
        "pending" | "queued" | "processing" | "running" => Ok(PollStatus::Pending),
        "completed" | "complete" | "done" | "success" => match obj.get("result") {
            Some(result) => completed(result),
            None => Err(PollError::MalformedResponse(
                "completed status without a result".to_string(),
            )),
        },
        "failed" | "error" => {
            let reason = ["error", "reason", "message"]
                .iter()
                .find_map(|k| obj.get(*k).and_then(Value::as_str))
                .unwrap_or("Analysis failed")
                .to_string();
            Ok(PollStatus::Failed(reason))
        }
        other => Err(PollError::MalformedResponse(format!(
            "unknown status: {}",
            other
        ))),
    }
}

fn completed(payload: &Value) -> Result<PollStatus, PollError> {
    AnalysisResult::from_payload(payload)
        .map(PollStatus::Completed)
        .map_err(|e| PollError::MalformedResponse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_pending() {
        assert_eq!(parse_status(&json!({"status": "pending"})).unwrap(), PollStatus::Pending);
        assert_eq!(parse_status(&json!({"status": "Processing"})).unwrap(), PollStatus::Pending);
    }

    #[test]
    fn test_parse_completed() {
        let body = json!({"status": "completed", "result": {"score": 85, "strengths": ["x"]}});
        match parse_status(&body).unwrap() {
            PollStatus::Completed(result) => {
                assert_eq!(result.score, 85);
                assert_eq!(result.strengths, vec!["x"]);
            }
            other => panic!("expected completed, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_bare_result() {
        let body = json!({"score": 64, "improvements": ["Shorten"]});
        assert!(matches!(parse_status(&body).unwrap(), PollStatus::Completed(r) if r.score == 64));
    }

    #[test]
    fn test_parse_failed_keeps_reason() {
        let body = json!({"status": "failed", "error": "Document could not be parsed"});
        assert_eq!(
            parse_status(&body).unwrap(),
            PollStatus::Failed("Document could not be parsed".to_string())
        );
        assert_eq!(
            parse_status(&json!({"status": "error"})).unwrap(),
            PollStatus::Failed("Analysis failed".to_string())
        );
    }

    #[test]
    fn test_parse_malformed() {
        assert!(matches!(parse_status(&json!([])), Err(PollError::MalformedResponse(_))));
        assert!(matches!(parse_status(&json!({})), Err(PollError::MalformedResponse(_))));
        assert!(matches!(
            parse_status(&json!({"status": "completed"})),
            Err(PollError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_status(&json!({"status": "completed", "result": "85"})),
            Err(PollError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_status(&json!({"status": "exploded"})),
            Err(PollError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_poll_error_transience() {
        assert!(PollError::Network("reset".into()).is_transient());
        assert!(PollError::Http { status: 503, body: String::new() }.is_transient());
        assert!(!PollError::Http { status: 400, body: String::new() }.is_transient());
        assert!(!PollError::MalformedResponse("x".into()).is_transient());
    }

    #[test]
    fn test_status_url_encodes_id() {
        let poller = HttpResultPoller::new(
            "http://localhost:5678/analysis/{id}",
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            poller.status_url("a b/c"),
            "http://localhost:5678/analysis/a%20b%2Fc"
        );
    }
}
