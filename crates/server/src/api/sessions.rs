//! Session API handlers.
//!
//! Each session owns one pipeline. Actions map one-to-one onto
//! `PipelineController` operations and answer with the resulting snapshot.

use axum::{
    extract::{multipart::MultipartError, Multipart, Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use matchpro_core::{
    CandidateDocument, DocumentSummary, PipelineController, PipelineError, PipelineSnapshot,
};

use super::ErrorResponse;
use crate::state::AppState;

/// Multipart field carrying the document.
const DOCUMENT_FIELD: &str = "document";

/// Optional multipart field carrying the declared role with the upload.
const ROLE_FIELD: &str = "declared_role";

pub(super) type ApiError = (StatusCode, Json<ErrorResponse>);

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for setting the declared role
#[derive(Debug, Deserialize)]
pub struct SetRoleBody {
    pub declared_role: String,
}

/// A session and the current snapshot of its pipeline
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub id: Uuid,
    #[serde(flatten)]
    pub snapshot: PipelineSnapshot,
}

/// Response for a document upload
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub document: DocumentSummary,
    #[serde(flatten)]
    pub session: SessionResponse,
}

// ============================================================================
// Helpers
// ============================================================================

pub(super) fn error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

fn pipeline_error(e: PipelineError) -> ApiError {
    let status = match &e {
        PipelineError::Validation(_) | PipelineError::Precondition(_) => StatusCode::BAD_REQUEST,
        PipelineError::Busy | PipelineError::InvalidState { .. } => StatusCode::CONFLICT,
    };
    error(status, e.to_string())
}

/// Keep the status axum assigns, so an over-limit body stays a 413.
fn multipart_error(e: MultipartError) -> ApiError {
    error(e.status(), format!("Failed to read upload: {}", e.body_text()))
}

pub(super) fn lookup(state: &AppState, id: &str) -> Result<(Uuid, Arc<PipelineController>), ApiError> {
    let not_found = || error(StatusCode::NOT_FOUND, format!("Session not found: {}", id));
    let uuid = Uuid::parse_str(id).map_err(|_| not_found())?;
    let pipeline = state.sessions().get(&uuid).ok_or_else(not_found)?;
    Ok((uuid, pipeline))
}

fn respond(id: Uuid, pipeline: &PipelineController) -> Json<SessionResponse> {
    Json(SessionResponse {
        id,
        snapshot: pipeline.snapshot(),
    })
}

// ============================================================================
// Handlers
// ============================================================================

/// Create a new session
pub async fn create_session(
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<SessionResponse>), ApiError> {
    let (id, pipeline) = state
        .sessions()
        .create()
        .await
        .map_err(|e| error(StatusCode::SERVICE_UNAVAILABLE, e.to_string()))?;
    Ok((StatusCode::CREATED, respond(id, &pipeline)))
}

/// Get a session's current snapshot
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionResponse>, ApiError> {
    let (id, pipeline) = lookup(&state, &id)?;
    Ok(respond(id, &pipeline))
}

/// Delete a session, cancelling any run in flight
pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let (id, _) = lookup(&state, &id)?;
    state.sessions().remove(&id).await;
    Ok(StatusCode::NO_CONTENT)
}

/// Upload the candidate document (multipart)
pub async fn upload_document(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let (id, pipeline) = lookup(&state, &id)?;

    let mut candidate: Option<CandidateDocument> = None;
    let mut role: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        warn!(session_id = %id, "Failed to read multipart upload: {}", e);
        multipart_error(e)
    })? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            DOCUMENT_FIELD => {
                let file_name = field.file_name().unwrap_or("").to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(|e| {
                    warn!(session_id = %id, "Failed to read document upload: {}", e);
                    multipart_error(e)
                })?;
                candidate = Some(CandidateDocument::new(
                    file_name,
                    content_type.as_deref(),
                    bytes.to_vec(),
                ));
            }
            ROLE_FIELD => {
                role = field.text().await.ok();
            }
            other => {
                debug!(session_id = %id, field = other, "Ignoring unknown multipart field");
            }
        }
    }

    let candidate = candidate.ok_or_else(|| {
        error(
            StatusCode::BAD_REQUEST,
            format!("Missing multipart field '{}'", DOCUMENT_FIELD),
        )
    })?;

    let document = pipeline
        .select_file(candidate)
        .await
        .map_err(pipeline_error)?;
    if let Some(role) = role {
        pipeline.set_declared_role(&role).await;
    }

    Ok(Json(UploadResponse {
        document,
        session: SessionResponse {
            id,
            snapshot: pipeline.snapshot(),
        },
    }))
}

/// Set the declared professional title
pub async fn set_role(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<SetRoleBody>,
) -> Result<Json<SessionResponse>, ApiError> {
    let (id, pipeline) = lookup(&state, &id)?;
    pipeline.set_declared_role(&body.declared_role).await;
    Ok(respond(id, &pipeline))
}

/// Submit the document for analysis
pub async fn submit(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<SessionResponse>), ApiError> {
    let (id, pipeline) = lookup(&state, &id)?;
    pipeline.submit().await.map_err(pipeline_error)?;
    Ok((StatusCode::ACCEPTED, respond(id, &pipeline)))
}

/// Re-submit after a retryable submission failure
pub async fn retry(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<SessionResponse>), ApiError> {
    let (id, pipeline) = lookup(&state, &id)?;
    pipeline.retry().await.map_err(pipeline_error)?;
    Ok((StatusCode::ACCEPTED, respond(id, &pipeline)))
}

/// Cancel whatever the pipeline is doing
pub async fn cancel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionResponse>, ApiError> {
    let (id, pipeline) = lookup(&state, &id)?;
    pipeline.cancel().await;
    Ok(respond(id, &pipeline))
}

/// Return the pipeline to Idle
pub async fn reset(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionResponse>, ApiError> {
    let (id, pipeline) = lookup(&state, &id)?;
    pipeline.reset().await;
    Ok(respond(id, &pipeline))
}
