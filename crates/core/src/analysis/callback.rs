//! Callback strategy: results pushed by the workflow engine.
//!
//! Pipelines register the correlation id they got at submission time and
//! wait on the returned [`CallbackSubscription`]. Inbound callbacks are
//! matched by id only. Results for ids that were cancelled or already
//! resolved are rejected and never reach a pipeline. Results that arrive
//! before their pipeline subscribed are parked for a short while.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::types::AnalysisResult;
use crate::metrics::CALLBACKS_RECEIVED;

/// How many retired ids are remembered for stale-result detection.
const RETIRED_CAPACITY: usize = 1024;

/// How many early results may wait for their subscriber.
const EARLY_CAPACITY: usize = 256;

/// How long an early result waits for its subscriber.
const EARLY_TTL: Duration = Duration::from_secs(60);

/// What a callback resolves a pipeline with.
pub type CallbackOutcome = Result<AnalysisResult, String>;

/// Answer returned to the caller of [`CallbackRegistry::on_result`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackAck {
    Accepted,
    Rejected(CallbackRejection),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallbackRejection {
    /// The id was cancelled, already resolved, or never issued recently.
    #[error("no pending analysis for correlation id {0}")]
    UnknownCorrelation(String),

    #[error("malformed callback payload: {0}")]
    Malformed(String),
}

#[derive(Default)]
struct Inner {
    waiters: HashMap<String, oneshot::Sender<CallbackOutcome>>,
    early: HashMap<String, (Instant, CallbackOutcome)>,
    early_order: VecDeque<String>,
    retired: VecDeque<String>,
}

impl Inner {
    fn retire(&mut self, id: &str) {
        if self.retired.iter().any(|r| r == id) {
            return;
        }
        if self.retired.len() >= RETIRED_CAPACITY {
            self.retired.pop_front();
        }
        self.retired.push_back(id.to_string());
    }

    fn is_retired(&self, id: &str) -> bool {
        self.retired.iter().any(|r| r == id)
    }

    fn park(&mut self, id: &str, outcome: CallbackOutcome) {
        self.prune_early();
        if self.early.len() >= EARLY_CAPACITY {
            if let Some(oldest) = self.early_order.pop_front() {
                self.early.remove(&oldest);
            }
        }
        if self.early.insert(id.to_string(), (Instant::now(), outcome)).is_none() {
            self.early_order.push_back(id.to_string());
        }
    }

    fn take_early(&mut self, id: &str) -> Option<CallbackOutcome> {
        self.prune_early();
        let (_, outcome) = self.early.remove(id)?;
        self.early_order.retain(|e| e != id);
        Some(outcome)
    }

    fn prune_early(&mut self) {
        let now = Instant::now();
        self.early
            .retain(|_, (at, _)| now.duration_since(*at) < EARLY_TTL);
        let early = &self.early;
        self.early_order.retain(|id| early.contains_key(id));
    }
}

/// Routes inbound result callbacks to the pipeline waiting for them.
#[derive(Default)]
pub struct CallbackRegistry {
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("CallbackRegistry")
            .field("waiting", &inner.waiters.len())
            .field("early", &inner.early.len())
            .finish()
    }
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic while holding the lock leaves plain maps behind, still usable.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start waiting for the result of `correlation_id`.
    ///
    /// Dropping the subscription unregisters it and retires the id.
    pub fn register(self: &Arc<Self>, correlation_id: &str) -> CallbackSubscription {
        let (tx, rx) = oneshot::channel();
        let mut inner = self.lock();
        // A reissued id starts a new wait.
        inner.retired.retain(|r| r != correlation_id);

        if let Some(outcome) = inner.take_early(correlation_id) {
            debug!(correlation_id, "Delivering early callback result");
            let _ = tx.send(outcome);
        } else {
            inner.waiters.insert(correlation_id.to_string(), tx);
        }

        CallbackSubscription {
            correlation_id: correlation_id.to_string(),
            rx,
            registry: Arc::clone(self),
        }
    }

    /// Stop waiting for `correlation_id`; later callbacks for it are rejected.
    pub fn unregister(&self, correlation_id: &str) {
        let mut inner = self.lock();
        inner.waiters.remove(correlation_id);
        inner.take_early(correlation_id);
        inner.retire(correlation_id);
    }

    /// Receive a completed analysis for `correlation_id`.
    pub fn on_result(&self, correlation_id: &str, payload: &Value) -> CallbackAck {
        match AnalysisResult::from_payload(payload) {
            Ok(result) => self.deliver(correlation_id, Ok(result)),
            Err(e) => {
                warn!(
                    kind = "malformed_response",
                    correlation_id, "Rejecting callback: {}", e
                );
                CALLBACKS_RECEIVED.with_label_values(&["malformed"]).inc();
                CallbackAck::Rejected(CallbackRejection::Malformed(e.to_string()))
            }
        }
    }

    /// Receive a failure report for `correlation_id`.
    pub fn on_failure(&self, correlation_id: &str, reason: &str) -> CallbackAck {
        self.deliver(correlation_id, Err(reason.to_string()))
    }

    /// Number of pipelines currently waiting.
    pub fn waiting(&self) -> usize {
        self.lock().waiters.len()
    }

    fn deliver(&self, correlation_id: &str, outcome: CallbackOutcome) -> CallbackAck {
        let mut inner = self.lock();

        if inner.is_retired(correlation_id) {
            debug!(correlation_id, "Discarding callback for retired correlation id");
            CALLBACKS_RECEIVED.with_label_values(&["stale"]).inc();
            return CallbackAck::Rejected(CallbackRejection::UnknownCorrelation(
                correlation_id.to_string(),
            ));
        }

        match inner.waiters.remove(correlation_id) {
            Some(tx) => {
                inner.retire(correlation_id);
                if tx.send(outcome).is_err() {
                    // Receiver went away between cancel and unregister.
                    CALLBACKS_RECEIVED.with_label_values(&["stale"]).inc();
                    return CallbackAck::Rejected(CallbackRejection::UnknownCorrelation(
                        correlation_id.to_string(),
                    ));
                }
                info!(correlation_id, "Callback result delivered");
                CALLBACKS_RECEIVED.with_label_values(&["accepted"]).inc();
                CallbackAck::Accepted
            }
            None => {
                debug!(correlation_id, "Parking callback result until its pipeline subscribes");
                inner.park(correlation_id, outcome);
                CALLBACKS_RECEIVED.with_label_values(&["parked"]).inc();
                CallbackAck::Accepted
            }
        }
    }
}

/// A pending wait for one correlation id.
pub struct CallbackSubscription {
    correlation_id: String,
    rx: oneshot::Receiver<CallbackOutcome>,
    registry: Arc<CallbackRegistry>,
}

impl CallbackSubscription {
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Wait for the callback. `None` if the registry dropped the waiter.
    pub async fn recv(&mut self) -> Option<CallbackOutcome> {
        (&mut self.rx).await.ok()
    }
}

impl Drop for CallbackSubscription {
    fn drop(&mut self) {
        self.registry.unregister(&self.correlation_id);
    }
}
