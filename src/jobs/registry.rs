//! In-memory job registry.
//!
//! The registry is the single owner of all job and item records. Every
//! read or write crosses its internal lock, and compound operations
//! ("find next pending, mark queued", "append and claim the running flag")
//! execute inside one critical section so two callers can never claim the
//! same item or spawn two workers for one job. No I/O happens under the
//! lock; a `std::sync::Mutex` enforces that structurally, since its guard
//! cannot be held across an `.await`.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::backend::TrackPreview;

use super::item::{DownloadItem, ItemState};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("job not found: {0}")]
    JobNotFound(Uuid),
    #[error("item {index} missing from job {job_id}")]
    ItemNotFound { job_id: Uuid, index: usize },
}

/// One session's batch of download items sharing a quality setting.
#[derive(Debug)]
struct Job {
    quality_kbps: u32,
    items: Vec<DownloadItem>,
    is_running: bool,
    created_at: DateTime<Utc>,
}

impl Job {
    fn new(quality_kbps: u32) -> Self {
        Self {
            quality_kbps,
            items: Vec::new(),
            is_running: false,
            created_at: Utc::now(),
        }
    }

    /// Append items for URLs not already present (exact string match).
    /// Returns how many were actually added.
    fn append_unique(&mut self, urls: &[String]) -> usize {
        let mut added = 0;
        for url in urls {
            if self.items.iter().any(|item| &item.url == url) {
                continue;
            }
            self.items.push(DownloadItem::new(url.clone()));
            added += 1;
        }
        added
    }
}

/// Immutable copy of a job, suitable for serialization.
///
/// The item list is exposed as `urls` because that is the name the polling
/// client knows it by.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub job_id: Uuid,
    pub quality_kbps: u32,
    pub is_running: bool,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub created_at: DateTime<Utc>,
    pub urls: Vec<DownloadItem>,
}

/// An item handed to the worker: enough to drive the pipeline without
/// holding any reference into the registry.
#[derive(Debug, Clone)]
pub struct ClaimedItem {
    pub index: usize,
    pub url: String,
    pub quality_kbps: u32,
}

/// Outcome of an append performed atomically with the running-flag check.
#[derive(Debug, Clone, Copy)]
pub struct AppendOutcome {
    pub added: usize,
    /// True iff this call flipped `is_running` and the caller must spawn
    /// the worker. At most one concurrent caller ever sees `true`.
    pub spawn_worker: bool,
}

/// Outcome of a failed-item reset performed atomically with the
/// running-flag check.
#[derive(Debug, Clone, Copy)]
pub struct RetryOutcome {
    pub reset: usize,
    pub spawn_worker: bool,
}

#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: Mutex<HashMap<Uuid, Job>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A poisoned lock means a caller panicked mid-update; per-field writes
    /// keep the map coherent, so recover the guard rather than wedging every
    /// job behind one crashed worker.
    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, Job>> {
        self.jobs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Allocate a new job with an empty item list.
    pub fn create_job(&self, quality_kbps: u32) -> Uuid {
        let mut jobs = self.lock();
        loop {
            let job_id = Uuid::new_v4();
            if jobs.contains_key(&job_id) {
                continue;
            }
            jobs.insert(job_id, Job::new(quality_kbps));
            return job_id;
        }
    }

    /// Append URLs not already present in the job. Idempotent for repeated
    /// submissions of the same batch.
    pub fn append_urls(&self, job_id: Uuid, urls: &[String]) -> Result<usize, RegistryError> {
        let mut jobs = self.lock();
        let job = jobs
            .get_mut(&job_id)
            .ok_or(RegistryError::JobNotFound(job_id))?;
        Ok(job.append_unique(urls))
    }

    /// Append URLs and, if anything new landed while no worker is active,
    /// claim the running flag in the same critical section. The winner of
    /// the claim is obligated to spawn a worker.
    pub fn append_and_claim(
        &self,
        job_id: Uuid,
        urls: &[String],
    ) -> Result<AppendOutcome, RegistryError> {
        let mut jobs = self.lock();
        let job = jobs
            .get_mut(&job_id)
            .ok_or(RegistryError::JobNotFound(job_id))?;
        let added = job.append_unique(urls);
        let spawn_worker = added > 0 && !job.is_running;
        if spawn_worker {
            job.is_running = true;
        }
        Ok(AppendOutcome {
            added,
            spawn_worker,
        })
    }

    /// Reset all failed items to pending and claim the running flag if a
    /// reset happened while no worker is active. Resetting and claiming
    /// share one critical section, so a worker that is just about to
    /// observe "no pending" either sees the reset items or has already
    /// released the flag for this call to claim.
    pub fn reset_failed_and_claim(&self, job_id: Uuid) -> Result<RetryOutcome, RegistryError> {
        let mut jobs = self.lock();
        let job = jobs
            .get_mut(&job_id)
            .ok_or(RegistryError::JobNotFound(job_id))?;
        let mut reset = 0;
        for item in &mut job.items {
            if item.state == ItemState::Failed {
                item.reset_for_retry();
                reset += 1;
            }
        }
        let spawn_worker = reset > 0 && !job.is_running;
        if spawn_worker {
            job.is_running = true;
        }
        Ok(RetryOutcome {
            reset,
            spawn_worker,
        })
    }

    /// Claim the first pending item (marking it queued), or finish the
    /// worker: when nothing is pending and nothing is mid-flight, the
    /// running flag is cleared in the same critical section and `None` is
    /// returned.
    pub fn claim_or_finish(&self, job_id: Uuid) -> Result<Option<ClaimedItem>, RegistryError> {
        let mut jobs = self.lock();
        let job = jobs
            .get_mut(&job_id)
            .ok_or(RegistryError::JobNotFound(job_id))?;

        let quality_kbps = job.quality_kbps;
        if let Some((index, item)) = job
            .items
            .iter_mut()
            .enumerate()
            .find(|(_, item)| item.state == ItemState::Pending)
        {
            item.state = ItemState::Queued;
            return Ok(Some(ClaimedItem {
                index,
                url: item.url.clone(),
                quality_kbps,
            }));
        }

        if !job.items.iter().any(|item| item.state.is_mid_flight()) {
            job.is_running = false;
        }
        Ok(None)
    }

    /// Record a successful preview: display fields land and the item moves
    /// from queued to downloading.
    pub fn record_preview(
        &self,
        job_id: Uuid,
        index: usize,
        preview: &TrackPreview,
    ) -> Result<(), RegistryError> {
        self.with_item(job_id, index, |item| {
            if transition(item, ItemState::Downloading) {
                item.title = Some(preview.title.clone());
                item.duration_ms = preview.duration_ms;
                item.thumbnail = preview.thumbnail.clone();
            }
        })
    }

    /// Apply a progress update. Percent is monotone within an attempt and
    /// only meaningful while downloading or processing; anything else is
    /// dropped.
    pub fn record_progress(
        &self,
        job_id: Uuid,
        index: usize,
        percent: u8,
    ) -> Result<(), RegistryError> {
        self.with_item(job_id, index, |item| {
            if matches!(item.state, ItemState::Downloading | ItemState::Processing) {
                item.progress_percent = item.progress_percent.max(percent.min(100));
            }
        })
    }

    /// Mark the postprocessing stage. Idempotent: a no-op when the phase
    /// event already moved the item to processing.
    pub fn begin_processing(&self, job_id: Uuid, index: usize) -> Result<(), RegistryError> {
        self.with_item(job_id, index, |item| {
            if item.state == ItemState::Downloading {
                item.state = ItemState::Processing;
            }
        })
    }

    /// Record the library row created from this item and complete it.
    /// The song id lands only together with the completed state.
    pub fn record_completed(
        &self,
        job_id: Uuid,
        index: usize,
        song_id: i64,
    ) -> Result<(), RegistryError> {
        self.with_item(job_id, index, |item| {
            if transition(item, ItemState::Completed) {
                item.result_song_id = Some(song_id);
                item.progress_percent = 100;
            }
        })
    }

    /// Record an item-scoped fault. The error text lands only together
    /// with the failed state.
    pub fn record_failure(
        &self,
        job_id: Uuid,
        index: usize,
        error: String,
    ) -> Result<(), RegistryError> {
        self.with_item(job_id, index, |item| {
            if transition(item, ItemState::Failed) {
                item.error = Some(error);
            }
        })
    }

    /// Unconditionally release the running flag. Crash-capture path only:
    /// called when a worker task dies without draining, so a stalled job
    /// can be re-dispatched.
    pub fn release_running(&self, job_id: Uuid) {
        if let Some(job) = self.lock().get_mut(&job_id) {
            job.is_running = false;
        }
    }

    /// Immutable copy of the job for serialization; never exposes a live
    /// reference a caller could mutate outside the lock.
    pub fn snapshot(&self, job_id: Uuid) -> Result<JobSnapshot, RegistryError> {
        let jobs = self.lock();
        let job = jobs.get(&job_id).ok_or(RegistryError::JobNotFound(job_id))?;
        Ok(JobSnapshot {
            job_id,
            quality_kbps: job.quality_kbps,
            is_running: job.is_running,
            created_at: job.created_at,
            urls: job.items.clone(),
        })
    }

    fn with_item(
        &self,
        job_id: Uuid,
        index: usize,
        apply: impl FnOnce(&mut DownloadItem),
    ) -> Result<(), RegistryError> {
        let mut jobs = self.lock();
        let job = jobs
            .get_mut(&job_id)
            .ok_or(RegistryError::JobNotFound(job_id))?;
        let item = job
            .items
            .get_mut(index)
            .ok_or(RegistryError::ItemNotFound { job_id, index })?;
        apply(item);
        Ok(())
    }
}

/// Move an item along a lifecycle edge, dropping illegal transitions.
/// Late events (a progress callback racing a failure, a double completion)
/// must never push a terminal item back into flight. Returns whether the
/// edge was taken.
fn transition(item: &mut DownloadItem, next: ItemState) -> bool {
    if item.state.can_transition(next) {
        item.state = next;
        true
    } else {
        warn!(
            url = %item.url,
            from = ?item.state,
            to = ?next,
            "dropping illegal item transition"
        );
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urls(list: &[&str]) -> Vec<String> {
        list.iter().map(|u| u.to_string()).collect()
    }

    fn preview(title: &str) -> TrackPreview {
        TrackPreview {
            title: title.to_string(),
            duration_ms: Some(180_000),
            thumbnail: Some("http://img.example/t.jpg".to_string()),
        }
    }

    #[test]
    fn append_is_idempotent_per_url() {
        let registry = JobRegistry::new();
        let job_id = registry.create_job(192);

        let added = registry
            .append_urls(job_id, &urls(&["http://a/1", "http://a/2"]))
            .unwrap();
        assert_eq!(added, 2);

        let added = registry
            .append_urls(job_id, &urls(&["http://a/2", "http://a/3"]))
            .unwrap();
        assert_eq!(added, 1);

        let snapshot = registry.snapshot(job_id).unwrap();
        let listed: Vec<&str> = snapshot.urls.iter().map(|i| i.url.as_str()).collect();
        assert_eq!(listed, vec!["http://a/1", "http://a/2", "http://a/3"]);
    }

    #[test]
    fn append_and_claim_claims_only_once() {
        let registry = JobRegistry::new();
        let job_id = registry.create_job(192);

        let first = registry
            .append_and_claim(job_id, &urls(&["http://a/1"]))
            .unwrap();
        assert!(first.spawn_worker);

        // Worker never started draining; the flag is still held.
        let second = registry
            .append_and_claim(job_id, &urls(&["http://a/2"]))
            .unwrap();
        assert_eq!(second.added, 1);
        assert!(!second.spawn_worker);

        // Pure duplicates never claim, even on an idle job.
        let registry = JobRegistry::new();
        let job_id = registry.create_job(192);
        registry
            .append_urls(job_id, &urls(&["http://a/1"]))
            .unwrap();
        let duplicate = registry
            .append_and_claim(job_id, &urls(&["http://a/1"]))
            .unwrap();
        assert_eq!(duplicate.added, 0);
        assert!(!duplicate.spawn_worker);
    }

    #[test]
    fn claim_walks_items_in_insertion_order() {
        let registry = JobRegistry::new();
        let job_id = registry.create_job(128);
        registry
            .append_urls(job_id, &urls(&["http://a/1", "http://a/2"]))
            .unwrap();

        let first = registry.claim_or_finish(job_id).unwrap().unwrap();
        assert_eq!(first.index, 0);
        assert_eq!(first.url, "http://a/1");
        assert_eq!(first.quality_kbps, 128);

        let second = registry.claim_or_finish(job_id).unwrap().unwrap();
        assert_eq!(second.index, 1);

        let snapshot = registry.snapshot(job_id).unwrap();
        assert!(snapshot
            .urls
            .iter()
            .all(|item| item.state == ItemState::Queued));
    }

    #[test]
    fn exhausted_claim_clears_running_flag() {
        let registry = JobRegistry::new();
        let job_id = registry.create_job(192);
        let outcome = registry
            .append_and_claim(job_id, &urls(&["http://a/1"]))
            .unwrap();
        assert!(outcome.spawn_worker);

        let claimed = registry.claim_or_finish(job_id).unwrap().unwrap();
        registry
            .record_failure(job_id, claimed.index, "boom".to_string())
            .unwrap();

        assert!(registry.claim_or_finish(job_id).unwrap().is_none());
        assert!(!registry.snapshot(job_id).unwrap().is_running);
    }

    #[test]
    fn progress_is_monotone_within_an_attempt() {
        let registry = JobRegistry::new();
        let job_id = registry.create_job(192);
        registry.append_urls(job_id, &urls(&["http://a/1"])).unwrap();
        let claimed = registry.claim_or_finish(job_id).unwrap().unwrap();
        registry
            .record_preview(job_id, claimed.index, &preview("Track"))
            .unwrap();

        registry.record_progress(job_id, claimed.index, 50).unwrap();
        registry.record_progress(job_id, claimed.index, 30).unwrap();
        registry.record_progress(job_id, claimed.index, 80).unwrap();

        let item = &registry.snapshot(job_id).unwrap().urls[0];
        assert_eq!(item.progress_percent, 80);
        assert_eq!(item.state, ItemState::Downloading);
    }

    #[test]
    fn progress_outside_active_states_is_dropped() {
        let registry = JobRegistry::new();
        let job_id = registry.create_job(192);
        registry.append_urls(job_id, &urls(&["http://a/1"])).unwrap();
        let claimed = registry.claim_or_finish(job_id).unwrap().unwrap();
        registry
            .record_failure(job_id, claimed.index, "gone".to_string())
            .unwrap();

        registry.record_progress(job_id, claimed.index, 90).unwrap();

        let item = &registry.snapshot(job_id).unwrap().urls[0];
        assert_eq!(item.state, ItemState::Failed);
        assert_eq!(item.progress_percent, 0);
    }

    #[test]
    fn completion_requires_processing() {
        let registry = JobRegistry::new();
        let job_id = registry.create_job(192);
        registry.append_urls(job_id, &urls(&["http://a/1"])).unwrap();
        let claimed = registry.claim_or_finish(job_id).unwrap().unwrap();
        registry
            .record_preview(job_id, claimed.index, &preview("Track"))
            .unwrap();

        // Completion straight out of downloading is an illegal edge.
        registry.record_completed(job_id, claimed.index, 7).unwrap();
        let item = &registry.snapshot(job_id).unwrap().urls[0];
        assert_eq!(item.state, ItemState::Downloading);
        assert!(item.result_song_id.is_none());

        registry.begin_processing(job_id, claimed.index).unwrap();
        registry.record_completed(job_id, claimed.index, 7).unwrap();
        let item = &registry.snapshot(job_id).unwrap().urls[0];
        assert_eq!(item.state, ItemState::Completed);
        assert_eq!(item.result_song_id, Some(7));
        assert_eq!(item.progress_percent, 100);
    }

    #[test]
    fn reset_failed_claims_flag_and_spares_completed_items() {
        let registry = JobRegistry::new();
        let job_id = registry.create_job(192);
        registry
            .append_urls(job_id, &urls(&["http://a/1", "http://a/2"]))
            .unwrap();

        let first = registry.claim_or_finish(job_id).unwrap().unwrap();
        registry
            .record_preview(job_id, first.index, &preview("One"))
            .unwrap();
        registry.begin_processing(job_id, first.index).unwrap();
        registry.record_completed(job_id, first.index, 1).unwrap();

        let second = registry.claim_or_finish(job_id).unwrap().unwrap();
        registry
            .record_failure(job_id, second.index, "network".to_string())
            .unwrap();
        assert!(registry.claim_or_finish(job_id).unwrap().is_none());

        let outcome = registry.reset_failed_and_claim(job_id).unwrap();
        assert_eq!(outcome.reset, 1);
        assert!(outcome.spawn_worker);

        let snapshot = registry.snapshot(job_id).unwrap();
        assert!(snapshot.is_running);
        assert_eq!(snapshot.urls[0].state, ItemState::Completed);
        assert_eq!(snapshot.urls[1].state, ItemState::Pending);
        assert_eq!(snapshot.urls[1].progress_percent, 0);
        assert!(snapshot.urls[1].error.is_none());
    }

    #[test]
    fn reset_with_no_failures_is_a_no_op() {
        let registry = JobRegistry::new();
        let job_id = registry.create_job(192);
        registry.append_urls(job_id, &urls(&["http://a/1"])).unwrap();

        let outcome = registry.reset_failed_and_claim(job_id).unwrap();
        assert_eq!(outcome.reset, 0);
        assert!(!outcome.spawn_worker);
        assert!(!registry.snapshot(job_id).unwrap().is_running);
        assert_eq!(
            registry.snapshot(job_id).unwrap().urls[0].state,
            ItemState::Pending
        );
    }

    #[test]
    fn unknown_job_is_reported() {
        let registry = JobRegistry::new();
        let missing = Uuid::new_v4();
        assert!(matches!(
            registry.append_urls(missing, &urls(&["http://a/1"])),
            Err(RegistryError::JobNotFound(_))
        ));
        assert!(matches!(
            registry.snapshot(missing),
            Err(RegistryError::JobNotFound(_))
        ));
    }
}
