use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::{callbacks, handlers, sessions, ws};
use super::middleware::{callback_auth_middleware, metrics_middleware};
use crate::state::AppState;

/// Room for multipart framing and the text fields around the document.
const UPLOAD_OVERHEAD_BYTES: usize = 1024 * 1024;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Bodies up to twice the document limit reach the validator; larger ones
    // are refused with 413.
    let upload_limit = usize::try_from(state.config().validation.max_document_bytes)
        .unwrap_or(usize::MAX / 2)
        .saturating_mul(2)
        .saturating_add(UPLOAD_OVERHEAD_BYTES);

    let callback_routes = Router::new()
        .route("/callbacks/analysis", post(callbacks::receive_analysis))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            callback_auth_middleware,
        ));

    // API routes
    let api_routes = Router::new()
        // Health, config and metrics
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        .route("/metrics", get(handlers::get_metrics))
        // Sessions
        .route("/sessions", post(sessions::create_session))
        .route(
            "/sessions/{id}",
            get(sessions::get_session).delete(sessions::delete_session),
        )
        .route(
            "/sessions/{id}/document",
            post(sessions::upload_document).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/sessions/{id}/role", put(sessions::set_role))
        .route("/sessions/{id}/submit", post(sessions::submit))
        .route("/sessions/{id}/cancel", post(sessions::cancel))
        .route("/sessions/{id}/reset", post(sessions::reset))
        .route("/sessions/{id}/retry", post(sessions::retry))
        .route("/sessions/{id}/ws", get(ws::ws_handler))
        // Workflow callbacks
        .merge(callback_routes)
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
