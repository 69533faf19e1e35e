//! Observability stubs (metrics, tracing)

use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics handle for recording counters
#[derive(Debug, Default)]
pub struct Metrics {
    jobs_created: AtomicU64,
    workers_spawned: AtomicU64,
    items_completed: AtomicU64,
    items_failed: AtomicU64,
    retries_dispatched: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn job_created(&self) {
        self.jobs_created.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "jobs_created", "Metric incremented");
    }

    pub fn worker_spawned(&self) {
        self.workers_spawned.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "workers_spawned", "Metric incremented");
    }

    pub fn item_completed(&self) {
        self.items_completed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "items_completed", "Metric incremented");
    }

    pub fn item_failed(&self) {
        self.items_failed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "items_failed", "Metric incremented");
    }

    pub fn retry_dispatched(&self) {
        self.retries_dispatched.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "retries_dispatched", "Metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            jobs_created: self.jobs_created.load(Ordering::Relaxed),
            workers_spawned: self.workers_spawned.load(Ordering::Relaxed),
            items_completed: self.items_completed.load(Ordering::Relaxed),
            items_failed: self.items_failed.load(Ordering::Relaxed),
            retries_dispatched: self.retries_dispatched.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub jobs_created: u64,
    pub workers_spawned: u64,
    pub items_completed: u64,
    pub items_failed: u64,
    pub retries_dispatched: u64,
}
