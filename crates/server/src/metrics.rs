//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the MatchPro server:
//! - HTTP request metrics (latency, counts, errors)
//! - Callback authentication failures
//! - WebSocket connection metrics
//! - Session and callback-waiter gauges (collected dynamically)
//!
//! Pipeline metrics live in `matchpro_core::metrics` and are registered into
//! the same registry.

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    matchpro_core::metrics::register_core_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "matchpro_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("matchpro_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "matchpro_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

/// Callback authentication failures.
pub static CALLBACK_AUTH_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "matchpro_callback_auth_failures_total",
            "Inbound callbacks refused by authentication",
        ),
        &["reason"],
    )
    .unwrap()
});

// =============================================================================
// WebSocket Metrics
// =============================================================================

/// Active WebSocket connections.
pub static WS_CONNECTIONS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "matchpro_ws_connections_active",
        "Number of active WebSocket connections",
    )
    .unwrap()
});

/// Total WebSocket connections (cumulative).
pub static WS_CONNECTIONS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "matchpro_ws_connections_total",
        "Total WebSocket connections since startup",
    )
    .unwrap()
});

/// Snapshots pushed to WebSocket clients.
pub static WS_MESSAGES_SENT: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "matchpro_ws_messages_sent_total",
        "Pipeline snapshots sent over WebSocket",
    )
    .unwrap()
});

// =============================================================================
// Sessions (collected dynamically)
// =============================================================================

/// Live sessions.
pub static SESSIONS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("matchpro_sessions_active", "Number of live sessions").unwrap()
});

/// Pipelines waiting on a callback.
pub static CALLBACK_WAITERS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "matchpro_callback_waiters",
        "Pipelines currently waiting for a result callback",
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();
    registry
        .register(Box::new(CALLBACK_AUTH_FAILURES_TOTAL.clone()))
        .unwrap();

    // WebSocket
    registry
        .register(Box::new(WS_CONNECTIONS_ACTIVE.clone()))
        .unwrap();
    registry
        .register(Box::new(WS_CONNECTIONS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(WS_MESSAGES_SENT.clone()))
        .unwrap();

    // Sessions
    registry.register(Box::new(SESSIONS_ACTIVE.clone())).unwrap();
    registry
        .register(Box::new(CALLBACK_WAITERS.clone()))
        .unwrap();
}

/// Encode all registered metrics in Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

/// Update gauges from current application state before encoding.
pub fn collect_dynamic_metrics(state: &crate::state::AppState) {
    SESSIONS_ACTIVE.set(state.sessions().len() as i64);
    if let Some(registry) = state.callbacks() {
        CALLBACK_WAITERS.set(registry.waiting() as i64);
    }
}

/// Normalize a path for metric labels (replace IDs with placeholders).
pub fn normalize_path(path: &str) -> String {
    let uuid_regex = regex_lite::Regex::new(
        r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}",
    )
    .unwrap();
    let numeric_regex = regex_lite::Regex::new(r"/\d+(/|$)").unwrap();

    let result = uuid_regex.replace_all(path, "{id}");
    let result = numeric_regex.replace_all(&result, "/{id}$1");
    result.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_session_id() {
        let path = "/api/v1/sessions/550e8400-e29b-41d4-a716-446655440000/submit";
        assert_eq!(normalize_path(path), "/api/v1/sessions/{id}/submit");
    }

    #[test]
    fn test_normalize_path_numeric() {
        assert_eq!(normalize_path("/api/v1/sessions/12345"), "/api/v1/sessions/{id}");
    }

    #[test]
    fn test_normalize_path_no_ids() {
        assert_eq!(normalize_path("/api/v1/health"), "/api/v1/health");
    }

    #[test]
    fn test_registry_contains_server_and_core_metrics() {
        HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/test", "200"])
            .inc();
        WS_CONNECTIONS_TOTAL.inc();
        SESSIONS_ACTIVE.set(0);
        matchpro_core::metrics::SUBMISSIONS
            .with_label_values(&["accepted"])
            .inc();

        let output = encode_metrics();
        assert!(output.contains("# HELP"));
        assert!(output.contains("matchpro_http_requests_total"));
        assert!(output.contains("matchpro_ws_connections_total"));
        assert!(output.contains("matchpro_sessions_active"));
        assert!(output.contains("matchpro_submissions_total"));
    }
}
