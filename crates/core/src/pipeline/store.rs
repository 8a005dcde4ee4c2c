//! Observable holder of a pipeline's current snapshot.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::watch;

use super::types::{PipelineFailure, PipelineSnapshot, PipelineState};
use crate::analysis::AnalysisResult;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("A result is already present; reset before storing another")]
    ResultAlreadyPresent,
}

/// Single source of truth for one pipeline.
///
/// Every update replaces the whole snapshot, so subscribers never observe a
/// state paired with a result or error from another state. Only the
/// controller writes; anyone may read or subscribe.
#[derive(Debug, Clone)]
pub struct ResultStore {
    tx: Arc<watch::Sender<PipelineSnapshot>>,
}

impl Default for ResultStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultStore {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(PipelineSnapshot::idle());
        Self { tx: Arc::new(tx) }
    }

    pub fn current(&self) -> PipelineState {
        self.tx.borrow().state.clone()
    }

    pub fn snapshot(&self) -> PipelineSnapshot {
        self.tx.borrow().clone()
    }

    pub fn result(&self) -> Option<AnalysisResult> {
        self.tx.borrow().result.clone()
    }

    pub fn error(&self) -> Option<PipelineFailure> {
        self.tx.borrow().error.clone()
    }

    /// Receive every subsequent snapshot.
    pub fn subscribe(&self) -> watch::Receiver<PipelineSnapshot> {
        self.tx.subscribe()
    }

    /// Move to a non-terminal state. Clears any result and error.
    pub(crate) fn transition(&self, state: PipelineState) {
        debug_assert!(!state.is_terminal());
        self.tx.send_modify(|snapshot| {
            snapshot.state = state;
            snapshot.result = None;
            snapshot.error = None;
            snapshot.updated_at = Utc::now();
        });
    }

    /// Store a finished analysis.
    pub(crate) fn complete(
        &self,
        state: PipelineState,
        result: AnalysisResult,
    ) -> Result<(), StoreError> {
        if self.tx.borrow().result.is_some() {
            return Err(StoreError::ResultAlreadyPresent);
        }
        self.tx.send_modify(|snapshot| {
            snapshot.state = state;
            snapshot.result = Some(result);
            snapshot.error = None;
            snapshot.updated_at = Utc::now();
        });
        Ok(())
    }

    pub(crate) fn fail(&self, failure: PipelineFailure) {
        self.tx.send_modify(|snapshot| {
            snapshot.state = PipelineState::Failed {
                failure: failure.clone(),
            };
            snapshot.result = None;
            snapshot.error = Some(failure);
            snapshot.updated_at = Utc::now();
        });
    }

    pub(crate) fn set_declared_role(&self, role: &str) {
        self.tx.send_if_modified(|snapshot| {
            if snapshot.declared_role == role {
                return false;
            }
            snapshot.declared_role = role.to_string();
            snapshot.updated_at = Utc::now();
            true
        });
    }

    /// Back to Idle with no result, error or role. No notification if
    /// already there.
    pub(crate) fn reset(&self) {
        self.tx.send_if_modified(|snapshot| {
            if snapshot.state == PipelineState::Idle
                && snapshot.result.is_none()
                && snapshot.error.is_none()
                && snapshot.declared_role.is_empty()
            {
                return false;
            }
            *snapshot = PipelineSnapshot::idle();
            true
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{DocumentKind, DocumentSummary};
    use crate::pipeline::FailureKind;
    use crate::testing::fixtures;

    fn completed() -> PipelineState {
        PipelineState::Completed {
            document: DocumentSummary {
                name: "cv.pdf".into(),
                kind: DocumentKind::Pdf,
                size_bytes: 10,
            },
            correlation_id: "a1".into(),
        }
    }

    #[test]
    fn test_starts_idle() {
        let store = ResultStore::new();
        assert_eq!(store.current(), PipelineState::Idle);
        assert!(store.result().is_none());
        assert!(store.error().is_none());
    }

    #[test]
    fn test_complete_refuses_overwrite() {
        let store = ResultStore::new();
        store.complete(completed(), fixtures::analysis_result(80)).unwrap();
        assert_eq!(
            store.complete(completed(), fixtures::analysis_result(10)),
            Err(StoreError::ResultAlreadyPresent)
        );
        assert_eq!(store.result().unwrap().score, 80);

        store.reset();
        assert!(store.result().is_none());
        store.complete(completed(), fixtures::analysis_result(10)).unwrap();
        assert_eq!(store.result().unwrap().score, 10);
    }

    #[test]
    fn test_fail_clears_result() {
        let store = ResultStore::new();
        store.complete(completed(), fixtures::analysis_result(80)).unwrap();
        store.fail(PipelineFailure::new(FailureKind::AnalysisFailed, "boom", false));

        let snapshot = store.snapshot();
        assert_eq!(snapshot.state.name(), "failed");
        assert!(snapshot.result.is_none());
        assert_eq!(snapshot.error.unwrap().message, "boom");
    }

    #[tokio::test]
    async fn test_subscribers_see_transitions() {
        let store = ResultStore::new();
        let mut rx = store.subscribe();

        store.transition(PipelineState::Validating);
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().state, PipelineState::Validating);

        store.reset();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().state, PipelineState::Idle);

        // Resetting an idle store is silent.
        store.reset();
        assert!(!rx.has_changed().unwrap());
    }
}
