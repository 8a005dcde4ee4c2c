//! Pipeline state, snapshots and errors.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::analysis::{AnalysisResult, WaitError};
use crate::document::{DocumentSummary, ValidationError};
use crate::submission::SubmissionError;

/// Where a pipeline is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PipelineState {
    /// Nothing selected.
    Idle,

    /// A candidate document is being checked.
    Validating,

    /// A valid document is held; waiting for the declared role and a submit.
    Ready { document: DocumentSummary },

    /// The document is being sent to the workflow engine.
    Submitting { document: DocumentSummary },

    /// The workflow accepted the document; waiting for its analysis.
    AwaitingResult {
        document: DocumentSummary,
        correlation_id: String,
        since: DateTime<Utc>,
    },

    /// A result is available in the snapshot.
    Completed {
        document: DocumentSummary,
        correlation_id: String,
    },

    /// The run stopped; the failure is also in the snapshot.
    Failed { failure: PipelineFailure },
}

impl PipelineState {
    /// Get the state name as a string.
    pub fn name(&self) -> &'static str {
        match self {
            PipelineState::Idle => "idle",
            PipelineState::Validating => "validating",
            PipelineState::Ready { .. } => "ready",
            PipelineState::Submitting { .. } => "submitting",
            PipelineState::AwaitingResult { .. } => "awaiting_result",
            PipelineState::Completed { .. } => "completed",
            PipelineState::Failed { .. } => "failed",
        }
    }

    /// A submission is in flight.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            PipelineState::Submitting { .. } | PipelineState::AwaitingResult { .. }
        )
    }

    /// Completed or Failed.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineState::Completed { .. } | PipelineState::Failed { .. }
        )
    }

    /// Correlation id of the current run, if one was issued.
    pub fn correlation_id(&self) -> Option<&str> {
        match self {
            PipelineState::AwaitingResult { correlation_id, .. }
            | PipelineState::Completed { correlation_id, .. } => Some(correlation_id),
            _ => None,
        }
    }
}

/// Category of a pipeline failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Validation,
    Submission,
    AnalysisTimeout,
    MalformedResponse,
    AnalysisFailed,
}

impl FailureKind {
    /// Metrics label for a run that ended with this failure.
    pub fn outcome_label(&self) -> &'static str {
        match self {
            FailureKind::Validation => "validation",
            FailureKind::Submission => "submission_error",
            FailureKind::AnalysisTimeout => "timeout",
            FailureKind::MalformedResponse => "malformed_response",
            FailureKind::AnalysisFailed => "failed",
        }
    }
}

/// A user-presentable failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineFailure {
    pub kind: FailureKind,
    pub message: String,
    /// Whether `retry` may re-submit the same document.
    pub retryable: bool,
}

impl PipelineFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable,
        }
    }
}

impl From<&ValidationError> for PipelineFailure {
    fn from(err: &ValidationError) -> Self {
        Self::new(FailureKind::Validation, err.to_string(), false)
    }
}

impl From<&SubmissionError> for PipelineFailure {
    fn from(err: &SubmissionError) -> Self {
        match err {
            SubmissionError::MalformedResponse(_) => {
                Self::new(FailureKind::MalformedResponse, err.to_string(), false)
            }
            _ => Self::new(FailureKind::Submission, err.to_string(), err.is_retryable()),
        }
    }
}

impl From<&WaitError> for PipelineFailure {
    fn from(err: &WaitError) -> Self {
        let kind = match err {
            WaitError::Timeout(_) => FailureKind::AnalysisTimeout,
            WaitError::MalformedResponse(_) => FailureKind::MalformedResponse,
            WaitError::Failed(_) | WaitError::Poll(_) => FailureKind::AnalysisFailed,
        };
        Self::new(kind, err.to_string(), false)
    }
}

/// Everything an observer sees of a pipeline at one instant.
///
/// `result` is present exactly when `state` is Completed and `error` exactly
/// when it is Failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineSnapshot {
    #[serde(flatten)]
    pub state: PipelineState,
    pub result: Option<AnalysisResult>,
    pub error: Option<PipelineFailure>,
    pub declared_role: String,
    pub updated_at: DateTime<Utc>,
}

impl PipelineSnapshot {
    pub fn idle() -> Self {
        Self {
            state: PipelineState::Idle,
            result: None,
            error: None,
            declared_role: String::new(),
            updated_at: Utc::now(),
        }
    }
}

/// Errors returned synchronously by pipeline actions.
///
/// Failures of the background run are not returned here; they move the
/// pipeline to Failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    Precondition(String),

    #[error("An analysis is already in progress")]
    Busy,

    #[error("Cannot {action} while {state}")]
    InvalidState {
        action: &'static str,
        state: &'static str,
    },
}
