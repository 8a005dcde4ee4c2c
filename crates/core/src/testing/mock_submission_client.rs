//! Mock submission client for testing.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::analysis::AnalysisResult;
use crate::submission::{SubmissionClient, SubmissionError, SubmissionReceipt, SubmissionRequest};

/// A submission as the workflow engine would have received it.
#[derive(Debug, Clone)]
pub struct RecordedSubmission {
    pub document_name: String,
    pub document_size: u64,
    pub declared_role: String,
}

/// Mock implementation of the SubmissionClient trait.
///
/// Outcomes are consumed in the order they were pushed. Once the script is
/// exhausted every submission is accepted with a fresh `mock-N` id and no
/// immediate result.
///
/// # Example
///
/// ```rust,ignore
/// use matchpro_core::testing::{MockSubmissionClient, fixtures};
///
/// let client = MockSubmissionClient::new();
/// client.push_accepted("abc").await;
/// client.push_immediate("local-1", fixtures::analysis_result(80)).await;
/// ```
#[derive(Debug, Default)]
pub struct MockSubmissionClient {
    script: Arc<RwLock<VecDeque<Result<SubmissionReceipt, SubmissionError>>>>,
    requests: Arc<RwLock<Vec<RecordedSubmission>>>,
    delay: Option<Duration>,
    counter: AtomicU64,
}

impl MockSubmissionClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take `delay` before answering each submission.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Next submission is accepted for asynchronous analysis.
    pub async fn push_accepted(&self, correlation_id: &str) {
        self.script.write().await.push_back(Ok(receipt(correlation_id, None)));
    }

    /// Next submission answers synchronously with `result`.
    pub async fn push_immediate(&self, correlation_id: &str, result: AnalysisResult) {
        self.script
            .write()
            .await
            .push_back(Ok(receipt(correlation_id, Some(result))));
    }

    /// Next submission fails with `error`.
    pub async fn push_error(&self, error: SubmissionError) {
        self.script.write().await.push_back(Err(error));
    }

    /// Submissions received so far.
    pub async fn requests(&self) -> Vec<RecordedSubmission> {
        self.requests.read().await.clone()
    }
}

fn receipt(correlation_id: &str, immediate_result: Option<AnalysisResult>) -> SubmissionReceipt {
    SubmissionReceipt {
        correlation_id: correlation_id.to_string(),
        accepted_at: Utc::now(),
        immediate_result,
    }
}

#[async_trait]
impl SubmissionClient for MockSubmissionClient {
    fn name(&self) -> &str {
        "mock"
    }

    async fn submit(&self, request: &SubmissionRequest) -> Result<SubmissionReceipt, SubmissionError> {
        self.requests.write().await.push(RecordedSubmission {
            document_name: request.document.name.clone(),
            document_size: request.document.size(),
            declared_role: request.declared_role.clone(),
        });

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match self.script.write().await.pop_front() {
            Some(outcome) => outcome,
            None => {
                let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(receipt(&format!("mock-{}", n), None))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;

    #[tokio::test]
    async fn test_scripted_outcomes_in_order() {
        let client = MockSubmissionClient::new();
        client.push_error(SubmissionError::Network("down".into())).await;
        client.push_accepted("abc").await;

        let request = fixtures::submission_request("Engineer", 10);
        assert!(client.submit(&request).await.is_err());
        assert_eq!(client.submit(&request).await.unwrap().correlation_id, "abc");
        assert_eq!(client.submit(&request).await.unwrap().correlation_id, "mock-1");

        let recorded = client.requests().await;
        assert_eq!(recorded.len(), 3);
        assert_eq!(recorded[0].declared_role, "Engineer");
        assert_eq!(recorded[0].document_size, 10);
    }
}
