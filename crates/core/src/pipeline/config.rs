//! Pipeline tuning derived from the service configuration.

use std::time::Duration;

use crate::analysis::WaitPolicy;
use crate::config::Config;
use crate::document::DEFAULT_MAX_DOCUMENT_BYTES;

/// Settings shared by every pipeline of a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Largest accepted document, inclusive.
    pub max_document_bytes: u64,
    pub wait: WaitPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_document_bytes: DEFAULT_MAX_DOCUMENT_BYTES,
            wait: WaitPolicy::default(),
        }
    }
}

impl From<&Config> for PipelineConfig {
    fn from(config: &Config) -> Self {
        Self {
            max_document_bytes: config.validation.max_document_bytes,
            wait: WaitPolicy {
                poll_interval: Duration::from_millis(config.analysis.poll_interval_ms),
                budget: Duration::from_secs(config.analysis.wait_budget_secs),
            },
        }
    }
}
