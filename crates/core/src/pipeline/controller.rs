//! The pipeline state machine.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::{oneshot, watch, Mutex};
use tracing::{debug, error, info, warn};

use super::config::PipelineConfig;
use super::store::ResultStore;
use super::types::{
    FailureKind, PipelineError, PipelineFailure, PipelineSnapshot, PipelineState,
};
use crate::analysis::{wait_for_result, AnalysisResult, ResultRetrieval, WaitError};
use crate::document::{CandidateDocument, DocumentSummary, FileValidator, ValidatedDocument};
use crate::metrics::{ANALYSIS_DURATION, ANALYSIS_OUTCOMES, SUBMISSIONS, VALIDATION_REJECTIONS};
use crate::submission::{SubmissionClient, SubmissionReceipt, SubmissionRequest};

/// An in-flight run. Dropping it cancels the background task.
struct ActiveRun {
    generation: u64,
    correlation_id: Option<String>,
    _cancel: oneshot::Sender<()>,
}

#[derive(Default)]
struct Inner {
    document: Option<ValidatedDocument>,
    declared_role: String,
    /// Bumped on every submit, cancel and reset. A background task may only
    /// touch the store while its generation is current.
    generation: u64,
    run: Option<ActiveRun>,
}

/// Drives one candidate document from selection to a stored result.
///
/// Actions are serialized; `submit` returns once the pipeline entered
/// Submitting and the rest of the run happens on a background task.
pub struct PipelineController {
    validator: FileValidator,
    config: PipelineConfig,
    submitter: Arc<dyn SubmissionClient>,
    retrieval: ResultRetrieval,
    store: ResultStore,
    inner: Arc<Mutex<Inner>>,
}

impl std::fmt::Debug for PipelineController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineController").finish_non_exhaustive()
    }
}

impl PipelineController {
    pub fn new(
        config: PipelineConfig,
        submitter: Arc<dyn SubmissionClient>,
        retrieval: ResultRetrieval,
    ) -> Self {
        Self {
            validator: FileValidator::new(config.max_document_bytes),
            config,
            submitter,
            retrieval,
            store: ResultStore::new(),
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    pub fn state(&self) -> PipelineState {
        self.store.current()
    }

    pub fn result(&self) -> Option<AnalysisResult> {
        self.store.result()
    }

    pub fn error(&self) -> Option<PipelineFailure> {
        self.store.error()
    }

    pub fn snapshot(&self) -> PipelineSnapshot {
        self.store.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<PipelineSnapshot> {
        self.store.subscribe()
    }

    /// Validate `candidate` and hold it for submission.
    ///
    /// A rejected document moves the pipeline to Failed with the validation
    /// message and is also returned as an error.
    pub async fn select_file(
        &self,
        candidate: CandidateDocument,
    ) -> Result<DocumentSummary, PipelineError> {
        let mut inner = self.inner.lock().await;

        match self.store.current() {
            PipelineState::Idle | PipelineState::Ready { .. } | PipelineState::Failed { .. } => {}
            state if state.is_busy() => return Err(PipelineError::Busy),
            state => {
                return Err(PipelineError::InvalidState {
                    action: "select a file",
                    state: state.name(),
                })
            }
        }

        self.store.transition(PipelineState::Validating);

        match self.validator.validate(&candidate) {
            Ok(document) => {
                let summary = document.summary();
                debug!(name = %summary.name, kind = %summary.kind, size = summary.size_bytes, "Document accepted");
                inner.document = Some(document);
                self.store.transition(PipelineState::Ready {
                    document: summary.clone(),
                });
                Ok(summary)
            }
            Err(e) => {
                info!(name = %candidate.name, reason = e.reason(), "Document rejected");
                VALIDATION_REJECTIONS.with_label_values(&[e.reason()]).inc();
                inner.document = None;
                self.store.fail(PipelineFailure::from(&e));
                Err(PipelineError::Validation(e))
            }
        }
    }

    /// Record the candidate's professional title. Takes effect on the next
    /// submit; a run already in flight keeps the role it was started with.
    pub async fn set_declared_role(&self, role: &str) {
        let mut inner = self.inner.lock().await;
        inner.declared_role = role.to_string();
        self.store.set_declared_role(role);
    }

    /// Send the held document for analysis.
    pub async fn submit(&self) -> Result<(), PipelineError> {
        let mut inner = self.inner.lock().await;

        match self.store.current() {
            PipelineState::Ready { .. } => {}
            state if state.is_busy() => return Err(PipelineError::Busy),
            state => {
                return Err(PipelineError::InvalidState {
                    action: "submit",
                    state: state.name(),
                })
            }
        }

        self.start_run(&mut inner)
    }

    /// Re-submit the held document after a retryable submission failure.
    pub async fn retry(&self) -> Result<(), PipelineError> {
        let mut inner = self.inner.lock().await;

        match self.store.current() {
            PipelineState::Failed { failure } if failure.retryable => {}
            state if state.is_busy() => return Err(PipelineError::Busy),
            state => {
                return Err(PipelineError::InvalidState {
                    action: "retry",
                    state: state.name(),
                })
            }
        }

        self.start_run(&mut inner)
    }

    /// Abandon whatever is in progress and return to Idle.
    ///
    /// The current correlation id is invalidated: its timers stop, its
    /// callback registration is dropped and any late result is discarded.
    pub async fn cancel(&self) {
        let mut inner = self.inner.lock().await;
        self.abandon(&mut inner, "cancelled");
    }

    /// Clear everything and return to Idle. Idempotent.
    pub async fn reset(&self) {
        let mut inner = self.inner.lock().await;
        self.abandon(&mut inner, "reset");
    }

    fn abandon(&self, inner: &mut Inner, reason: &str) {
        inner.generation += 1;
        if let Some(run) = inner.run.take() {
            info!(
                generation = run.generation,
                correlation_id = run.correlation_id.as_deref().unwrap_or("-"),
                "Analysis run {}",
                reason
            );
            if let (Some(id), ResultRetrieval::Callback(registry)) =
                (run.correlation_id.as_deref(), &self.retrieval)
            {
                registry.unregister(id);
            }
        }
        inner.document = None;
        inner.declared_role.clear();
        self.store.reset();
    }

    /// Enter Submitting and spawn the background run. Caller holds the lock
    /// and has checked the state.
    fn start_run(&self, inner: &mut Inner) -> Result<(), PipelineError> {
        let Some(document) = inner.document.clone() else {
            return Err(PipelineError::Precondition(
                "Please select a file to upload".to_string(),
            ));
        };
        let request = SubmissionRequest::new(document, &inner.declared_role, Utc::now())
            .map_err(|e| PipelineError::Precondition(e.to_string()))?;

        inner.generation += 1;
        let generation = inner.generation;
        let (cancel_tx, cancel_rx) = oneshot::channel();
        inner.run = Some(ActiveRun {
            generation,
            correlation_id: None,
            _cancel: cancel_tx,
        });

        let summary = request.document.summary();
        info!(
            generation,
            document = %summary.name,
            role = %request.declared_role,
            submitter = self.submitter.name(),
            strategy = self.retrieval.strategy_name(),
            "Submitting document for analysis"
        );
        self.store.transition(PipelineState::Submitting {
            document: summary.clone(),
        });

        let run = Run {
            generation,
            document: summary,
            submitter: Arc::clone(&self.submitter),
            retrieval: self.retrieval.clone(),
            config: self.config,
            store: self.store.clone(),
            inner: Arc::clone(&self.inner),
        };
        tokio::spawn(run.execute(request, cancel_rx));

        Ok(())
    }
}

impl Drop for PipelineController {
    fn drop(&mut self) {
        // Background tasks hold the shared state; make sure they stop.
        if let Ok(mut inner) = self.inner.try_lock() {
            inner.generation += 1;
            inner.run = None;
        }
    }
}

/// Background half of one submission.
struct Run {
    generation: u64,
    document: DocumentSummary,
    submitter: Arc<dyn SubmissionClient>,
    retrieval: ResultRetrieval,
    config: PipelineConfig,
    store: ResultStore,
    inner: Arc<Mutex<Inner>>,
}

impl Run {
    async fn execute(self, request: SubmissionRequest, mut cancel_rx: oneshot::Receiver<()>) {
        let started = Instant::now();

        let submitted = tokio::select! {
            _ = &mut cancel_rx => {
                debug!(generation = self.generation, "Run cancelled during submission");
                return;
            }
            outcome = self.submitter.submit(&request) => outcome,
        };

        let receipt = match submitted {
            Ok(receipt) => receipt,
            Err(e) => {
                SUBMISSIONS.with_label_values(&[e.kind()]).inc();
                if e.kind() == "malformed_response" {
                    error!(kind = "malformed_response", generation = self.generation, "Submission response unusable: {}", e);
                } else {
                    warn!(generation = self.generation, retryable = e.is_retryable(), "Submission failed: {}", e);
                }
                self.finish_failed(PipelineFailure::from(&e), started, true).await;
                return;
            }
        };

        if let Some(result) = receipt.immediate_result.clone() {
            SUBMISSIONS.with_label_values(&["immediate"]).inc();
            self.finish_completed(&receipt.correlation_id, result, started).await;
            return;
        }
        SUBMISSIONS.with_label_values(&["accepted"]).inc();

        if !self.enter_awaiting(&receipt).await {
            return;
        }

        let waited = tokio::select! {
            _ = &mut cancel_rx => {
                debug!(generation = self.generation, correlation_id = %receipt.correlation_id, "Run cancelled while awaiting result");
                return;
            }
            outcome = wait_for_result(&self.retrieval, &receipt.correlation_id, self.config.wait) => outcome,
        };

        match waited {
            Ok(result) => {
                self.finish_completed(&receipt.correlation_id, result, started)
                    .await
            }
            Err(e) => {
                match &e {
                    WaitError::MalformedResponse(_) => {
                        error!(kind = "malformed_response", correlation_id = %receipt.correlation_id, "Analysis response unusable: {}", e)
                    }
                    _ => warn!(correlation_id = %receipt.correlation_id, "Analysis did not complete: {}", e),
                }
                self.finish_failed(PipelineFailure::from(&e), started, false)
                    .await
            }
        }
    }

    async fn enter_awaiting(&self, receipt: &SubmissionReceipt) -> bool {
        let mut inner = self.inner.lock().await;
        let Some(run) = inner.run.as_mut().filter(|r| r.generation == self.generation) else {
            debug!(generation = self.generation, "Discarding receipt for abandoned run");
            return false;
        };
        run.correlation_id = Some(receipt.correlation_id.clone());

        info!(correlation_id = %receipt.correlation_id, "Submission accepted, awaiting analysis");
        self.store.transition(PipelineState::AwaitingResult {
            document: self.document.clone(),
            correlation_id: receipt.correlation_id.clone(),
            since: receipt.accepted_at,
        });
        true
    }

    async fn finish_completed(&self, correlation_id: &str, result: AnalysisResult, started: Instant) {
        let mut inner = self.inner.lock().await;
        if !self.is_current(&inner) {
            debug!(correlation_id, "Discarding result for abandoned run");
            return;
        }
        inner.run = None;

        let score = result.score;
        let state = PipelineState::Completed {
            document: self.document.clone(),
            correlation_id: correlation_id.to_string(),
        };
        if let Err(e) = self.store.complete(state, result) {
            warn!(correlation_id, "Result not stored: {}", e);
            return;
        }

        info!(correlation_id, score, "Analysis completed");
        ANALYSIS_OUTCOMES.with_label_values(&["completed"]).inc();
        ANALYSIS_DURATION
            .with_label_values(&["completed"])
            .observe(started.elapsed().as_secs_f64());
    }

    async fn finish_failed(&self, failure: PipelineFailure, started: Instant, keep_document: bool) {
        let mut inner = self.inner.lock().await;
        if !self.is_current(&inner) {
            debug!(generation = self.generation, "Discarding failure for abandoned run");
            return;
        }
        inner.run = None;
        if !(keep_document && failure.retryable) {
            inner.document = None;
        }

        let outcome = failure.kind.outcome_label();
        ANALYSIS_OUTCOMES.with_label_values(&[outcome]).inc();
        ANALYSIS_DURATION
            .with_label_values(&[outcome])
            .observe(started.elapsed().as_secs_f64());

        debug_assert!(failure.kind != FailureKind::Validation);
        self.store.fail(failure);
    }

    fn is_current(&self, inner: &Inner) -> bool {
        inner.generation == self.generation
            && inner
                .run
                .as_ref()
                .is_some_and(|r| r.generation == self.generation)
    }
}
