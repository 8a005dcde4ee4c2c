//! Callback authentication and metrics middleware.

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;

use matchpro_core::{CallbackAuthError, CallbackRequest};

use super::ErrorResponse;
use crate::metrics::{
    normalize_path, CALLBACK_AUTH_FAILURES_TOTAL, HTTP_REQUESTS_IN_FLIGHT, HTTP_REQUESTS_TOTAL,
    HTTP_REQUEST_DURATION,
};
use crate::state::AppState;

/// Metrics middleware that tracks HTTP request duration and counts.
///
/// This middleware records:
/// - Request duration (histogram)
/// - Request count (counter)
/// - Requests in flight (gauge)
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = normalize_path(request.uri().path());

    HTTP_REQUESTS_IN_FLIGHT.inc();

    let response = next.run(request).await;

    HTTP_REQUESTS_IN_FLIGHT.dec();

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    HTTP_REQUEST_DURATION
        .with_label_values(&[&method, &path, &status])
        .observe(duration);
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[&method, &path, &status])
        .inc();

    response
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
        .into_response()
}

/// Checks inbound callbacks against the configured callback authenticator.
///
/// Session routes are not behind this middleware; only the workflow engine
/// calls the callback endpoint.
pub async fn callback_auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let authenticator = state.callback_authenticator();

    if authenticator.method_name() == "none" {
        return next.run(request).await;
    }

    let headers: HashMap<String, String> = request
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_lowercase(), v.to_string()))
        })
        .collect();

    let source_ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));

    let callback_request = CallbackRequest { headers, source_ip };

    match authenticator.authenticate(&callback_request).await {
        Ok(()) => next.run(request).await,
        Err(e @ CallbackAuthError::NotAuthenticated) => {
            CALLBACK_AUTH_FAILURES_TOTAL
                .with_label_values(&["not_authenticated"])
                .inc();
            warn!(%source_ip, "Callback rejected: {}", e);
            unauthorized(&e.to_string())
        }
        Err(e @ CallbackAuthError::InvalidCredentials) => {
            CALLBACK_AUTH_FAILURES_TOTAL
                .with_label_values(&["invalid_credentials"])
                .inc();
            warn!(%source_ip, "Callback rejected: {}", e);
            unauthorized(&e.to_string())
        }
        Err(e) => {
            CALLBACK_AUTH_FAILURES_TOTAL
                .with_label_values(&["internal_error"])
                .inc();
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}
