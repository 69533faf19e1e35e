//! Download worker: drains one job's backlog to exhaustion.
//!
//! One worker task per active job, spawned by the dispatcher after it
//! claims the job's running flag. Items process strictly in insertion
//! order; every collaborator fault is caught at the per-item boundary and
//! recorded as a failed item, never aborting the rest of the job. The
//! worker itself clears the running flag when the claim loop runs dry
//! (inside `JobRegistry::claim_or_finish`), or via crash capture if the
//! drain task dies.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::backend::{FetchPhase, FetchProgress, MediaSource, SourceError};
use crate::library::{LibraryError, MediaLibrary};
use crate::observability::Metrics;

use super::registry::{ClaimedItem, JobRegistry, RegistryError};

/// Everything a worker needs; all shared state is behind the registry.
pub struct WorkerContext {
    pub job_id: Uuid,
    pub registry: Arc<JobRegistry>,
    pub source: Arc<dyn MediaSource>,
    pub library: Arc<dyn MediaLibrary>,
    pub metrics: Arc<Metrics>,
}

#[derive(Debug, Error)]
enum ItemFault {
    #[error("preview failed: {0}")]
    Preview(SourceError),

    #[error("download failed: {0}")]
    Fetch(SourceError),

    #[error("postprocess failed: {0}")]
    Library(#[from] LibraryError),

    #[error("job state lost: {0}")]
    Registry(#[from] RegistryError),
}

/// Spawn the worker for a job. The inner drain task is supervised so that
/// even a panic inside the loop releases the running flag instead of
/// leaving the job stalled with pending items.
pub fn spawn(ctx: WorkerContext) -> JoinHandle<()> {
    tokio::spawn(async move {
        let job_id = ctx.job_id;
        let registry = Arc::clone(&ctx.registry);
        if let Err(err) = tokio::spawn(drain(ctx)).await {
            error!(%job_id, %err, "download worker crashed");
            registry.release_running(job_id);
        }
    })
}

async fn drain(ctx: WorkerContext) {
    info!(job_id = %ctx.job_id, "download worker started");
    loop {
        let claimed = match ctx.registry.claim_or_finish(ctx.job_id) {
            Ok(Some(claimed)) => claimed,
            Ok(None) => break,
            Err(err) => {
                error!(job_id = %ctx.job_id, %err, "job vanished from registry");
                return;
            }
        };

        debug!(job_id = %ctx.job_id, url = %claimed.url, "processing item");
        match process_item(&ctx, &claimed).await {
            Ok(()) => ctx.metrics.item_completed(),
            Err(fault) => {
                warn!(
                    job_id = %ctx.job_id,
                    url = %claimed.url,
                    error = %fault,
                    "item failed"
                );
                if let Err(err) =
                    ctx.registry
                        .record_failure(ctx.job_id, claimed.index, fault.to_string())
                {
                    error!(job_id = %ctx.job_id, %err, "failed to record item failure");
                }
                ctx.metrics.item_failed();
            }
        }
    }
    info!(job_id = %ctx.job_id, "download worker drained");
}

/// Drive one claimed item through preview, fetch, and library insert.
/// Any `Err` is an item-scoped fault; the caller converts it to a failed
/// state and moves on.
async fn process_item(ctx: &WorkerContext, item: &ClaimedItem) -> Result<(), ItemFault> {
    let preview = ctx
        .source
        .preview(&item.url)
        .await
        .map_err(ItemFault::Preview)?;
    ctx.registry
        .record_preview(ctx.job_id, item.index, &preview)?;

    // The fetch reports progress over a channel; a forwarder task applies
    // events to the registry while the fetch future runs, and finishes when
    // the fetch drops its sender.
    let (progress_tx, mut progress_rx) = mpsc::channel::<FetchProgress>(32);
    let forwarder = {
        let registry = Arc::clone(&ctx.registry);
        let job_id = ctx.job_id;
        let index = item.index;
        tokio::spawn(async move {
            while let Some(event) = progress_rx.recv().await {
                if event.phase == FetchPhase::Postprocessing {
                    let _ = registry.begin_processing(job_id, index);
                }
                let _ = registry.record_progress(job_id, index, event.percent);
            }
        })
    };

    let fetched = ctx
        .source
        .fetch(&item.url, item.quality_kbps, progress_tx)
        .await;
    let _ = forwarder.await;
    let audio_path = fetched.map_err(ItemFault::Fetch)?;

    // A fetch backend that never emitted a postprocessing event still has
    // to pass through processing before the item can complete.
    ctx.registry.begin_processing(ctx.job_id, item.index)?;

    let metadata = ctx.library.extract_metadata(&audio_path).await?;
    let cover_id = match ctx.library.extract_cover(&audio_path).await? {
        Some(cover) => Some(ctx.library.persist_cover(cover).await?),
        None => None,
    };
    let song_id = ctx
        .library
        .persist_song(&metadata, cover_id, &audio_path)
        .await?;

    ctx.registry
        .record_completed(ctx.job_id, item.index, song_id)?;
    Ok(())
}
