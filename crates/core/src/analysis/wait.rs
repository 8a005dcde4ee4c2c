//! Waiting for an analysis result under a time budget.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use super::callback::CallbackRegistry;
use super::poller::{PollError, PollStatus, ResultPoller};
use super::types::AnalysisResult;
use crate::metrics::POLL_REQUESTS;

/// Where results come from, chosen by configuration.
#[derive(Clone)]
pub enum ResultRetrieval {
    Poll(Arc<dyn ResultPoller>),
    Callback(Arc<CallbackRegistry>),
}

impl ResultRetrieval {
    pub fn strategy_name(&self) -> &'static str {
        match self {
            ResultRetrieval::Poll(_) => "poll",
            ResultRetrieval::Callback(_) => "callback",
        }
    }
}

impl std::fmt::Debug for ResultRetrieval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ResultRetrieval")
            .field(&self.strategy_name())
            .finish()
    }
}

/// Timing for the wait phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    /// Delay before each poll request.
    pub poll_interval: Duration,
    /// Total time allowed for the result to arrive.
    pub budget: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(3),
            budget: Duration::from_secs(120),
        }
    }
}

/// Why no result was obtained.
#[derive(Debug, Clone, Error)]
pub enum WaitError {
    #[error("Analysis timed out after {} seconds", .0.as_secs())]
    Timeout(Duration),

    #[error("{0}")]
    Failed(String),

    #[error("Malformed response from the analysis service: {0}")]
    MalformedResponse(String),

    #[error("Could not retrieve the analysis: {0}")]
    Poll(PollError),
}

/// Wait for the result of `correlation_id`.
///
/// Poll ticks never overlap: the next request is only scheduled once the
/// previous one resolved. The budget runs independently of the interval.
/// Dropping the returned future cancels the wait, including its timers and
/// its callback subscription.
pub async fn wait_for_result(
    retrieval: &ResultRetrieval,
    correlation_id: &str,
    policy: WaitPolicy,
) -> Result<AnalysisResult, WaitError> {
    let waiting = async {
        match retrieval {
            ResultRetrieval::Poll(poller) => {
                poll_until_done(poller.as_ref(), correlation_id, policy.poll_interval).await
            }
            ResultRetrieval::Callback(registry) => {
                let mut subscription = registry.register(correlation_id);
                match subscription.recv().await {
                    Some(Ok(result)) => Ok(result),
                    Some(Err(reason)) => Err(WaitError::Failed(reason)),
                    // Only reachable if the registry dropped the waiter; wait out the budget.
                    None => std::future::pending().await,
                }
            }
        }
    };

    match tokio::time::timeout(policy.budget, waiting).await {
        Ok(outcome) => outcome,
        Err(_) => Err(WaitError::Timeout(policy.budget)),
    }
}

async fn poll_until_done(
    poller: &dyn ResultPoller,
    correlation_id: &str,
    interval: Duration,
) -> Result<AnalysisResult, WaitError> {
    let mut attempt: u32 = 0;
    loop {
        tokio::time::sleep(interval).await;
        attempt += 1;

        match poller.poll(correlation_id).await {
            Ok(PollStatus::Pending) => {
                POLL_REQUESTS.with_label_values(&["pending"]).inc();
                debug!(correlation_id, attempt, "Analysis still pending");
            }
            Ok(PollStatus::Completed(result)) => {
                POLL_REQUESTS.with_label_values(&["completed"]).inc();
                return Ok(result);
            }
            Ok(PollStatus::Failed(reason)) => {
                POLL_REQUESTS.with_label_values(&["failed"]).inc();
                return Err(WaitError::Failed(reason));
            }
            Err(e) if e.is_transient() => {
                POLL_REQUESTS.with_label_values(&["transient_error"]).inc();
                warn!(correlation_id, attempt, poller = poller.name(), "Poll failed, will retry: {}", e);
            }
            Err(PollError::MalformedResponse(msg)) => {
                POLL_REQUESTS.with_label_values(&["malformed"]).inc();
                return Err(WaitError::MalformedResponse(msg));
            }
            Err(e) => {
                POLL_REQUESTS.with_label_values(&["error"]).inc();
                return Err(WaitError::Poll(e));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixtures, MockResultPoller};
    use serde_json::json;

    fn policy(interval_ms: u64, budget_ms: u64) -> WaitPolicy {
        WaitPolicy {
            poll_interval: Duration::from_millis(interval_ms),
            budget: Duration::from_millis(budget_ms),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_until_completed() {
        let poller = Arc::new(MockResultPoller::new());
        poller
            .script("abc", vec![
                Ok(PollStatus::Pending),
                Ok(PollStatus::Completed(fixtures::analysis_result(85))),
            ])
            .await;

        let retrieval = ResultRetrieval::Poll(poller.clone());
        let result = wait_for_result(&retrieval, "abc", policy(2000, 120_000)).await.unwrap();

        assert_eq!(result.score, 85);
        assert_eq!(poller.poll_count("abc").await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_times_out() {
        let poller = Arc::new(MockResultPoller::new());
        let retrieval = ResultRetrieval::Poll(poller.clone());

        let err = wait_for_result(&retrieval, "slow", policy(2000, 9_000))
            .await
            .unwrap_err();

        assert!(matches!(err, WaitError::Timeout(d) if d == Duration::from_secs(9)));
        // Ticks at 2s, 4s, 6s, 8s complete before the 9s deadline.
        assert_eq!(poller.poll_count("slow").await, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_poll_errors_are_retried() {
        let poller = Arc::new(MockResultPoller::new());
        poller
            .script("abc", vec![
                Err(PollError::Network("connection reset".into())),
                Err(PollError::Http { status: 502, body: String::new() }),
                Ok(PollStatus::Completed(fixtures::analysis_result(40))),
            ])
            .await;

        let retrieval = ResultRetrieval::Poll(poller);
        let result = wait_for_result(&retrieval, "abc", policy(1000, 60_000)).await.unwrap();
        assert_eq!(result.score, 40);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_poll_error_fails_fast() {
        let poller = Arc::new(MockResultPoller::new());
        poller
            .script("abc", vec![Err(PollError::MalformedResponse("garbage".into()))])
            .await;

        let retrieval = ResultRetrieval::Poll(poller);
        let err = wait_for_result(&retrieval, "abc", policy(1000, 60_000)).await.unwrap_err();
        assert!(matches!(err, WaitError::MalformedResponse(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_callback_resolves_wait() {
        let registry = Arc::new(CallbackRegistry::new());
        let retrieval = ResultRetrieval::Callback(Arc::clone(&registry));

        let pusher = Arc::clone(&registry);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            pusher.on_result("cb-1", &json!({"score": 93}));
        });

        let result = wait_for_result(&retrieval, "cb-1", policy(1000, 60_000)).await.unwrap();
        assert_eq!(result.score, 93);
    }

    #[tokio::test(start_paused = true)]
    async fn test_callback_wait_times_out_and_retires_id() {
        let registry = Arc::new(CallbackRegistry::new());
        let retrieval = ResultRetrieval::Callback(Arc::clone(&registry));

        let err = wait_for_result(&retrieval, "late", policy(1000, 30_000)).await.unwrap_err();
        assert!(matches!(err, WaitError::Timeout(_)));
        assert_eq!(registry.waiting(), 0);
        assert!(matches!(
            registry.on_result("late", &json!({"score": 1})),
            crate::analysis::CallbackAck::Rejected(_)
        ));
    }
}
