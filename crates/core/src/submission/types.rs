//! Types for document submission.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::analysis::AnalysisResult;
use crate::document::ValidatedDocument;

/// A validated document plus the metadata sent along with it.
#[derive(Debug, Clone)]
pub struct SubmissionRequest {
    pub document: ValidatedDocument,
    /// Professional title declared by the candidate (trimmed, never blank).
    pub declared_role: String,
    pub submitted_at: DateTime<Utc>,
}

/// The declared role was blank.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Please enter your professional title")]
pub struct MissingRoleError;

impl SubmissionRequest {
    pub fn new(
        document: ValidatedDocument,
        declared_role: &str,
        submitted_at: DateTime<Utc>,
    ) -> Result<Self, MissingRoleError> {
        let declared_role = declared_role.trim();
        if declared_role.is_empty() {
            return Err(MissingRoleError);
        }
        Ok(Self {
            document,
            declared_role: declared_role.to_string(),
            submitted_at,
        })
    }
}

/// Acknowledgement of an accepted submission.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionReceipt {
    /// Key for correlating polls and callbacks with this submission.
    pub correlation_id: String,
    pub accepted_at: DateTime<Utc>,
    /// Set when the workflow answered synchronously with the analysis.
    pub immediate_result: Option<AnalysisResult>,
}

/// Failures while submitting a document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmissionError {
    #[error("Could not reach the analysis service: {0}")]
    Network(String),

    #[error("Upload failed: HTTP {status} {body}")]
    Server { status: u16, body: String },

    #[error("Upload rejected: HTTP {status} {body}")]
    Rejected { status: u16, body: String },

    #[error("Malformed response from the analysis service: {0}")]
    MalformedResponse(String),

    #[error("Could not encode the submission: {0}")]
    Encoding(String),
}

impl SubmissionError {
    /// Network failures and 5xx responses may succeed when tried again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SubmissionError::Network(_) | SubmissionError::Server { .. }
        )
    }

    /// Short machine-readable kind, used as a metrics label.
    pub fn kind(&self) -> &'static str {
        match self {
            SubmissionError::Network(_) => "network",
            SubmissionError::Server { .. } => "server_error",
            SubmissionError::Rejected { .. } => "rejected",
            SubmissionError::MalformedResponse(_) => "malformed_response",
            SubmissionError::Encoding(_) => "encoding",
        }
    }
}

/// Multipart field names expected by the submission endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormFieldNames {
    #[serde(default = "default_document_field")]
    pub document: String,
    #[serde(default = "default_declared_role_field")]
    pub declared_role: String,
    #[serde(default = "default_document_name_field")]
    pub document_name: String,
    #[serde(default = "default_document_size_field")]
    pub document_size: String,
    #[serde(default = "default_submitted_at_field")]
    pub submitted_at: String,
}

fn default_document_field() -> String {
    "document".to_string()
}

fn default_declared_role_field() -> String {
    "declaredRole".to_string()
}

fn default_document_name_field() -> String {
    "documentName".to_string()
}

fn default_document_size_field() -> String {
    "documentSize".to_string()
}

fn default_submitted_at_field() -> String {
    "submittedAt".to_string()
}

impl Default for FormFieldNames {
    fn default() -> Self {
        Self {
            document: default_document_field(),
            declared_role: default_declared_role_field(),
            document_name: default_document_name_field(),
            document_size: default_document_size_field(),
            submitted_at: default_submitted_at_field(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;

    #[test]
    fn test_request_requires_role() {
        let doc = fixtures::validated_pdf("cv.pdf", 1024);
        assert_eq!(
            SubmissionRequest::new(doc.clone(), "   ", Utc::now()).unwrap_err(),
            MissingRoleError
        );

        let request = SubmissionRequest::new(doc, "  Backend Engineer ", Utc::now()).unwrap();
        assert_eq!(request.declared_role, "Backend Engineer");
    }

    #[test]
    fn test_retryability() {
        assert!(SubmissionError::Network("timeout".into()).is_retryable());
        assert!(SubmissionError::Server { status: 500, body: String::new() }.is_retryable());
        assert!(!SubmissionError::Rejected { status: 422, body: String::new() }.is_retryable());
        assert!(!SubmissionError::MalformedResponse("empty".into()).is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = SubmissionError::Server {
            status: 500,
            body: "Internal Server Error".to_string(),
        };
        assert_eq!(err.to_string(), "Upload failed: HTTP 500 Internal Server Error");
    }

    #[test]
    fn test_field_names_partial_override() {
        let fields: FormFieldNames = toml::from_str(r#"document = "cv""#).unwrap();
        assert_eq!(fields.document, "cv");
        assert_eq!(fields.declared_role, "declaredRole");
        assert_eq!(fields.submitted_at, "submittedAt");
    }
}
