//! Multipart submission to the workflow engine over HTTP.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, info};

use super::{FormFieldNames, SubmissionClient, SubmissionError, SubmissionReceipt, SubmissionRequest};
use crate::analysis::AnalysisResult;
use crate::http::{build_client, truncate_body};

/// Keys under which workflows return the correlation token.
const CORRELATION_KEYS: &[&str] = &[
    "analysisId",
    "analysis_id",
    "correlationId",
    "correlation_id",
    "id",
    "fileId",
    "jobId",
];

/// Posts documents as `multipart/form-data` to a configured endpoint.
pub struct HttpSubmissionClient {
    client: Client,
    url: String,
    fields: FormFieldNames,
}

impl HttpSubmissionClient {
    pub fn new(
        url: impl Into<String>,
        fields: FormFieldNames,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_client(timeout)?,
            url: url.into(),
            fields,
        })
    }

    fn build_form(&self, request: &SubmissionRequest) -> Result<Form, SubmissionError> {
        let doc = &request.document;
        let part = Part::bytes(doc.bytes.clone())
            .file_name(doc.name.clone())
            .mime_str(doc.kind.mime_type())
            .map_err(|e| SubmissionError::Encoding(e.to_string()))?;

        Ok(Form::new()
            .part(self.fields.document.clone(), part)
            .text(self.fields.declared_role.clone(), request.declared_role.clone())
            .text(self.fields.document_name.clone(), doc.name.clone())
            .text(self.fields.document_size.clone(), doc.size().to_string())
            .text(
                self.fields.submitted_at.clone(),
                request.submitted_at.to_rfc3339(),
            ))
    }
}

#[async_trait]
impl SubmissionClient for HttpSubmissionClient {
    fn name(&self) -> &str {
        "http"
    }

    async fn submit(&self, request: &SubmissionRequest) -> Result<SubmissionReceipt, SubmissionError> {
        let form = self.build_form(request)?;
        debug!(
            url = %self.url,
            document = %request.document.name,
            size = request.document.size(),
            "Submitting document for analysis"
        );

        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::ACCEPT, "application/json")
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SubmissionError::Network(format!("request timed out: {}", e))
                } else if e.is_connect() {
                    SubmissionError::Network(format!("connection failed: {}", e))
                } else {
                    SubmissionError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SubmissionError::Network(format!("Failed to read response: {}", e)))?;

        if status.is_server_error() {
            return Err(SubmissionError::Server {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }
        if !status.is_success() {
            return Err(SubmissionError::Rejected {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        let receipt = parse_receipt(&body).inspect_err(|e| {
            error!(kind = "malformed_response", url = %self.url, "{}", e);
        })?;

        info!(
            correlation_id = %receipt.correlation_id,
            immediate = receipt.immediate_result.is_some(),
            "Submission accepted"
        );
        Ok(receipt)
    }
}

/// Read a submission response body.
///
/// The body must carry a correlation token, a direct result (an object with
/// a `score`, top level or under `result`), or both. Workflow engines that
/// wrap their output in a one-element array are unwrapped first.
pub fn parse_receipt(body: &str) -> Result<SubmissionReceipt, SubmissionError> {
    let value: Value = serde_json::from_str(body).map_err(|e| {
        SubmissionError::MalformedResponse(format!("response is not JSON: {}", e))
    })?;

    let value = match value {
        Value::Array(mut items) if items.len() == 1 => items.remove(0),
        other => other,
    };

    let obj = value.as_object().ok_or_else(|| {
        SubmissionError::MalformedResponse("response is not a JSON object".to_string())
    })?;

    let correlation_id = CORRELATION_KEYS
        .iter()
        .filter_map(|k| obj.get(*k))
        .find_map(|v| match v {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        });

    let result_payload = if obj.contains_key("score") {
        Some(&value)
    } else {
        obj.get("result")
            .filter(|r| r.get("score").is_some())
    };

    let immediate_result = result_payload
        .map(AnalysisResult::from_payload)
        .transpose()
        .map_err(|e| SubmissionError::MalformedResponse(e.to_string()))?;

    let correlation_id = match (correlation_id, &immediate_result) {
        (Some(id), _) => id,
        (None, Some(_)) => format!("local-{}", uuid::Uuid::new_v4()),
        (None, None) => {
            return Err(SubmissionError::MalformedResponse(
                "response contains neither an analysis id nor a result".to_string(),
            ))
        }
    };

    Ok(SubmissionReceipt {
        correlation_id,
        accepted_at: Utc::now(),
        immediate_result,
    })
}
