//! Sending documents to the analysis workflow.
//!
//! This module provides a `SubmissionClient` trait so the pipeline can be
//! driven against the real workflow endpoint or a test double.

mod http;
mod types;

pub use http::{parse_receipt, HttpSubmissionClient};
pub use types::*;

use async_trait::async_trait;

/// Sends one submission to the workflow engine.
///
/// Implementations make a single attempt; retrying is up to the caller.
#[async_trait]
pub trait SubmissionClient: Send + Sync {
    /// Name of this client (for logging).
    fn name(&self) -> &str;

    async fn submit(&self, request: &SubmissionRequest) -> Result<SubmissionReceipt, SubmissionError>;
}
