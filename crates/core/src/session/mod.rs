//! Per-candidate pipelines keyed by session id.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::analysis::ResultRetrieval;
use crate::config::SessionsConfig;
use crate::pipeline::{PipelineConfig, PipelineController};
use crate::submission::SubmissionClient;

/// Builds pipelines that share the process-wide collaborators.
#[derive(Clone)]
pub struct PipelineFactory {
    config: PipelineConfig,
    submitter: Arc<dyn SubmissionClient>,
    retrieval: ResultRetrieval,
}

impl PipelineFactory {
    pub fn new(
        config: PipelineConfig,
        submitter: Arc<dyn SubmissionClient>,
        retrieval: ResultRetrieval,
    ) -> Self {
        Self {
            config,
            submitter,
            retrieval,
        }
    }

    pub fn build(&self) -> PipelineController {
        PipelineController::new(
            self.config,
            Arc::clone(&self.submitter),
            self.retrieval.clone(),
        )
    }
}

/// Bounds on the live session set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionLimits {
    /// Sessions not looked up for this long are dropped.
    pub idle_ttl: Duration,
    pub max_sessions: usize,
}

impl Default for SessionLimits {
    fn default() -> Self {
        SessionLimits::from(&SessionsConfig::default())
    }
}

impl From<&SessionsConfig> for SessionLimits {
    fn from(config: &SessionsConfig) -> Self {
        Self {
            idle_ttl: Duration::from_secs(config.idle_ttl_secs),
            max_sessions: config.max_sessions,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("Too many active sessions, try again later")]
    CapacityReached,
}

struct Entry {
    pipeline: Arc<PipelineController>,
    last_seen: Instant,
}

/// Live sessions of the service. Each session owns one pipeline.
///
/// Sessions idle for longer than the TTL are evicted, and so is the least
/// recently used one when the cap is reached. Pipelines with a run in flight
/// are never evicted.
pub struct SessionRegistry {
    factory: PipelineFactory,
    limits: SessionLimits,
    sessions: RwLock<HashMap<Uuid, Entry>>,
}

impl SessionRegistry {
    pub fn new(factory: PipelineFactory) -> Self {
        Self::with_limits(factory, SessionLimits::default())
    }

    pub fn with_limits(factory: PipelineFactory, limits: SessionLimits) -> Self {
        Self {
            factory,
            limits,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Start a new session with an idle pipeline.
    pub async fn create(&self) -> Result<(Uuid, Arc<PipelineController>), SessionError> {
        self.prune_idle().await;

        let evicted = {
            let mut sessions = self.write();
            if sessions.len() >= self.limits.max_sessions {
                let oldest = sessions
                    .iter()
                    .filter(|(_, e)| !e.pipeline.state().is_busy())
                    .min_by_key(|(_, e)| e.last_seen)
                    .map(|(id, _)| *id);
                let Some(entry) = oldest.and_then(|id| sessions.remove(&id).map(|e| (id, e)))
                else {
                    warn!(
                        max_sessions = self.limits.max_sessions,
                        "Session cap reached with every pipeline busy"
                    );
                    return Err(SessionError::CapacityReached);
                };
                Some(entry)
            } else {
                None
            }
        };

        if let Some((id, entry)) = evicted {
            entry.pipeline.cancel().await;
            info!(session_id = %id, "Session evicted to make room");
        }

        let id = Uuid::new_v4();
        let pipeline = Arc::new(self.factory.build());
        self.write().insert(
            id,
            Entry {
                pipeline: Arc::clone(&pipeline),
                last_seen: Instant::now(),
            },
        );
        info!(session_id = %id, "Session created");
        Ok((id, pipeline))
    }

    /// Look up a session and mark it as used.
    pub fn get(&self, id: &Uuid) -> Option<Arc<PipelineController>> {
        let mut sessions = self.write();
        let entry = sessions.get_mut(id)?;
        entry.last_seen = Instant::now();
        Some(Arc::clone(&entry.pipeline))
    }

    /// Drop a session, cancelling whatever its pipeline was doing.
    pub async fn remove(&self, id: &Uuid) -> bool {
        let removed = self.write().remove(id);
        match removed {
            Some(entry) => {
                entry.pipeline.cancel().await;
                info!(session_id = %id, "Session removed");
                true
            }
            None => {
                debug!(session_id = %id, "Remove requested for unknown session");
                false
            }
        }
    }

    /// Drop sessions idle past the TTL. Returns how many were dropped.
    pub async fn prune_idle(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<(Uuid, Entry)> = {
            let mut sessions = self.write();
            let ids: Vec<Uuid> = sessions
                .iter()
                .filter(|(_, e)| {
                    now.duration_since(e.last_seen) >= self.limits.idle_ttl
                        && !e.pipeline.state().is_busy()
                })
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| sessions.remove(&id).map(|e| (id, e)))
                .collect()
        };

        for (id, entry) in &expired {
            entry.pipeline.cancel().await;
            debug!(session_id = %id, "Idle session expired");
        }
        if !expired.is_empty() {
            info!(count = expired.len(), "Expired idle sessions");
        }
        expired.len()
    }

    /// Cancel every pipeline and forget all sessions.
    pub async fn shutdown(&self) {
        let drained: Vec<Entry> = self.write().drain().map(|(_, e)| e).collect();
        for entry in &drained {
            entry.pipeline.cancel().await;
        }
        info!(count = drained.len(), "Sessions closed");
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<Uuid, Entry>> {
        self.sessions.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<Uuid, Entry>> {
        self.sessions.write().unwrap_or_else(|e| e.into_inner())
    }
}
