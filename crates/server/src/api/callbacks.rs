//! Inbound result callbacks from the workflow engine.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, warn};

use matchpro_core::analysis::{parse_status, CallbackRejection, PollStatus};
use matchpro_core::CallbackAck;

use super::sessions::{error, ApiError};
use crate::state::AppState;

/// Keys the workflow may use for the correlation id.
const CORRELATION_KEYS: &[&str] = &[
    "correlationId",
    "correlation_id",
    "analysisId",
    "analysis_id",
    "fileId",
    "jobId",
    "id",
];

/// Keys the workflow may nest the analysis under.
const RESULT_KEYS: &[&str] = &["result", "analysis"];

#[derive(Debug, Serialize)]
pub struct CallbackResponse {
    pub status: &'static str,
}

fn correlation_id(body: &Value) -> Option<String> {
    CORRELATION_KEYS.iter().find_map(|k| match body.get(*k) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn nested_result(body: &Value) -> Option<&Value> {
    RESULT_KEYS
        .iter()
        .find_map(|k| body.get(*k).filter(|r| r.is_object()))
}

/// Receive an analysis result or failure.
///
/// Accepts `{correlationId, status, result}`, `{fileId, analysis}` or a bare
/// result object carrying its correlation id.
pub async fn receive_analysis(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<CallbackResponse>), ApiError> {
    let Some(registry) = state.callbacks() else {
        return Err(error(
            StatusCode::SERVICE_UNAVAILABLE,
            "Callback retrieval is not enabled",
        ));
    };

    let Some(id) = correlation_id(&body) else {
        warn!("Callback without a correlation id");
        return Err(error(StatusCode::BAD_REQUEST, "Missing correlation id"));
    };

    // Without a status, a nested result stands for a completed analysis.
    let status_source = match body.get("status") {
        Some(_) => &body,
        None => nested_result(&body).unwrap_or(&body),
    };

    let ack = match parse_status(status_source) {
        Ok(PollStatus::Pending) => {
            debug!(correlation_id = %id, "Callback reports analysis still pending");
            return Ok((
                StatusCode::ACCEPTED,
                Json(CallbackResponse { status: "pending" }),
            ));
        }
        Ok(PollStatus::Failed(reason)) => registry.on_failure(&id, &reason),
        Ok(PollStatus::Completed(_)) => {
            let payload = nested_result(&body).unwrap_or(&body);
            registry.on_result(&id, payload)
        }
        Err(e) => {
            error!(kind = "malformed_response", correlation_id = %id, "Unusable callback: {}", e);
            return Err(error(StatusCode::BAD_REQUEST, e.to_string()));
        }
    };

    match ack {
        CallbackAck::Accepted => Ok((
            StatusCode::ACCEPTED,
            Json(CallbackResponse { status: "accepted" }),
        )),
        CallbackAck::Rejected(rejection @ CallbackRejection::UnknownCorrelation(_)) => {
            Err(error(StatusCode::NOT_FOUND, rejection.to_string()))
        }
        CallbackAck::Rejected(rejection @ CallbackRejection::Malformed(_)) => {
            Err(error(StatusCode::BAD_REQUEST, rejection.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_correlation_id_keys() {
        assert_eq!(correlation_id(&json!({"correlationId": "a1"})).as_deref(), Some("a1"));
        assert_eq!(correlation_id(&json!({"analysis_id": 42})).as_deref(), Some("42"));
        assert_eq!(correlation_id(&json!({"fileId": "f-1"})).as_deref(), Some("f-1"));
        assert_eq!(correlation_id(&json!({"jobId": "j-7"})).as_deref(), Some("j-7"));
        assert_eq!(correlation_id(&json!({"id": ""})), None);
        assert_eq!(correlation_id(&json!({"score": 10})), None);
    }

    #[test]
    fn test_nested_result_keys() {
        let body = json!({"fileId": "f-1", "analysis": {"score": 80}});
        assert_eq!(nested_result(&body), Some(&json!({"score": 80})));
        assert_eq!(nested_result(&json!({"result": "text"})), None);
    }
}
