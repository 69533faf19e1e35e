//! Job dispatcher: guarantees exactly one live worker per job.
//!
//! The dispatcher never clears the running flag; it only claims it, and
//! the claim happens inside the registry critical section that performed
//! the triggering mutation (append or failed-item reset). Whichever caller
//! wins the claim spawns the worker, so two concurrent dispatch attempts
//! can never both spawn.

use std::collections::HashSet;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::backend::MediaSource;
use crate::library::MediaLibrary;
use crate::observability::Metrics;

use super::registry::{JobRegistry, JobSnapshot, RegistryError};
use super::session::SessionIndex;
use super::worker::{self, WorkerContext};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no download job bound to this session")]
    NoActiveJob,

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Result of a start request after expansion, dedup, and append.
#[derive(Debug, Clone, Copy)]
pub struct StartOutcome {
    pub job_id: Uuid,
    pub added: usize,
}

/// Result of a retry request.
#[derive(Debug, Clone, Copy)]
pub enum RetryDispatch {
    Restarted { job_id: Uuid, reset: usize },
    NothingToRetry { job_id: Uuid },
}

pub struct Dispatcher {
    registry: Arc<JobRegistry>,
    sessions: Arc<SessionIndex>,
    source: Arc<dyn MediaSource>,
    library: Arc<dyn MediaLibrary>,
    metrics: Arc<Metrics>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<JobRegistry>,
        sessions: Arc<SessionIndex>,
        source: Arc<dyn MediaSource>,
        library: Arc<dyn MediaLibrary>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            registry,
            sessions,
            source,
            library,
            metrics,
        }
    }

    /// Expand, dedup, and append a batch of URLs to the session's job,
    /// creating and binding the job on first use, then spawn a worker if
    /// the append claimed the running flag.
    ///
    /// Playlist expansion happens before any lock is taken; it is the slow
    /// part and must never run inside a registry critical section.
    pub async fn start_batch(
        &self,
        session: &str,
        urls: Vec<String>,
        quality_kbps: u32,
    ) -> Result<StartOutcome, DispatchError> {
        let mut expanded = Vec::new();
        for url in &urls {
            expanded.extend(self.source.expand(url).await);
        }
        let mut seen = HashSet::new();
        expanded.retain(|url| seen.insert(url.clone()));

        let job_id = self.sessions.resolve_or_insert(session, || {
            self.metrics.job_created();
            self.registry.create_job(quality_kbps)
        });

        let outcome = self.registry.append_and_claim(job_id, &expanded)?;
        debug!(%job_id, added = outcome.added, "batch appended");
        if outcome.spawn_worker {
            self.spawn_worker(job_id);
        }

        Ok(StartOutcome {
            job_id,
            added: outcome.added,
        })
    }

    /// Reset the session's failed items and spawn a worker if the reset
    /// claimed the running flag. With zero failed items nothing changes and
    /// nothing is spawned.
    pub fn retry(&self, session: &str) -> Result<RetryDispatch, DispatchError> {
        let job_id = self
            .sessions
            .resolve(session)
            .ok_or(DispatchError::NoActiveJob)?;

        let outcome = self.registry.reset_failed_and_claim(job_id)?;
        if outcome.reset == 0 {
            return Ok(RetryDispatch::NothingToRetry { job_id });
        }

        self.metrics.retry_dispatched();
        info!(%job_id, reset = outcome.reset, "failed items reset for retry");
        if outcome.spawn_worker {
            self.spawn_worker(job_id);
        }

        Ok(RetryDispatch::Restarted {
            job_id,
            reset: outcome.reset,
        })
    }

    /// Snapshot of the session's job, or `None` for an unbound session.
    pub fn status(&self, session: &str) -> Option<JobSnapshot> {
        let job_id = self.sessions.resolve(session)?;
        // Jobs are never removed from the registry, so a bound id resolves.
        self.registry.snapshot(job_id).ok()
    }

    fn spawn_worker(&self, job_id: Uuid) {
        info!(%job_id, "spawning download worker");
        self.metrics.worker_spawned();
        worker::spawn(WorkerContext {
            job_id,
            registry: Arc::clone(&self.registry),
            source: Arc::clone(&self.source),
            library: Arc::clone(&self.library),
            metrics: Arc::clone(&self.metrics),
        });
    }
}
