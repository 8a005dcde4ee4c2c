//! Mock result poller for testing.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::analysis::{PollError, PollStatus, ResultPoller};

/// Mock implementation of the ResultPoller trait.
///
/// Each correlation id answers from its own script; an id without a script,
/// or whose script ran out, reports `Pending`.
#[derive(Debug, Default)]
pub struct MockResultPoller {
    scripts: Arc<RwLock<HashMap<String, VecDeque<Result<PollStatus, PollError>>>>>,
    polls: Arc<RwLock<HashMap<String, usize>>>,
    delay: Option<Duration>,
}

impl MockResultPoller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take `delay` before answering each poll.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue answers for `correlation_id`.
    pub async fn script(&self, correlation_id: &str, answers: Vec<Result<PollStatus, PollError>>) {
        self.scripts
            .write()
            .await
            .entry(correlation_id.to_string())
            .or_default()
            .extend(answers);
    }

    /// Polls answered for `correlation_id`.
    pub async fn poll_count(&self, correlation_id: &str) -> usize {
        self.polls
            .read()
            .await
            .get(correlation_id)
            .copied()
            .unwrap_or(0)
    }

    /// Polls answered across all ids.
    pub async fn total_polls(&self) -> usize {
        self.polls.read().await.values().sum()
    }
}

#[async_trait]
impl ResultPoller for MockResultPoller {
    fn name(&self) -> &str {
        "mock"
    }

    async fn poll(&self, correlation_id: &str) -> Result<PollStatus, PollError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        *self
            .polls
            .write()
            .await
            .entry(correlation_id.to_string())
            .or_insert(0) += 1;

        self.scripts
            .write()
            .await
            .get_mut(correlation_id)
            .and_then(|answers| answers.pop_front())
            .unwrap_or(Ok(PollStatus::Pending))
    }
}
