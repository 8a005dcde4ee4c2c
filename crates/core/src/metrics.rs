//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Document validation
//! - Submissions to the workflow engine
//! - Result retrieval (polls and callbacks)
//! - Pipeline outcomes and durations
//!
//! The server registers these into its registry via [`register_core_metrics`].

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};

// =============================================================================
// Intake
// =============================================================================

/// Documents refused by the validator, by reason.
pub static VALIDATION_REJECTIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "matchpro_validation_rejections_total",
            "Documents rejected by the file validator",
        ),
        &["reason"], // "unsupported_type", "too_large", "empty"
    )
    .unwrap()
});

// =============================================================================
// Workflow engine
// =============================================================================

/// Submission attempts by result.
pub static SUBMISSIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "matchpro_submissions_total",
            "Document submissions to the analysis workflow",
        ),
        &["result"], // "accepted", "immediate", "network", "server_error", "rejected", ...
    )
    .unwrap()
});

/// Poll requests by observed status.
pub static POLL_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "matchpro_poll_requests_total",
            "Result poll requests by observed status",
        ),
        &["status"],
    )
    .unwrap()
});

/// Inbound callbacks by result.
pub static CALLBACKS_RECEIVED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "matchpro_callbacks_received_total",
            "Inbound analysis callbacks",
        ),
        &["result"], // "accepted", "parked", "stale", "malformed"
    )
    .unwrap()
});

// =============================================================================
// Pipeline
// =============================================================================

/// Finished analyses by outcome.
pub static ANALYSIS_OUTCOMES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "matchpro_analysis_outcomes_total",
            "Pipeline runs by final outcome",
        ),
        &["outcome"], // "completed", "timeout", "failed", "malformed_response", "submission_error"
    )
    .unwrap()
});

/// Time from submission to a final outcome.
pub static ANALYSIS_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "matchpro_analysis_duration_seconds",
            "Time from submission to completion or failure",
        )
        .buckets(vec![1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 60.0, 90.0, 120.0, 300.0]),
        &["outcome"],
    )
    .unwrap()
});

/// Register all core metrics into `registry`.
pub fn register_core_metrics(registry: &Registry) {
    registry
        .register(Box::new(VALIDATION_REJECTIONS.clone()))
        .expect("Failed to register VALIDATION_REJECTIONS");
    registry
        .register(Box::new(SUBMISSIONS.clone()))
        .expect("Failed to register SUBMISSIONS");
    registry
        .register(Box::new(POLL_REQUESTS.clone()))
        .expect("Failed to register POLL_REQUESTS");
    registry
        .register(Box::new(CALLBACKS_RECEIVED.clone()))
        .expect("Failed to register CALLBACKS_RECEIVED");
    registry
        .register(Box::new(ANALYSIS_OUTCOMES.clone()))
        .expect("Failed to register ANALYSIS_OUTCOMES");
    registry
        .register(Box::new(ANALYSIS_DURATION.clone()))
        .expect("Failed to register ANALYSIS_DURATION");
}
