use std::sync::Arc;
use std::time::Duration;

use jobstore::{DownloadJob, StoreError};
use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};
use ytdl::{DownloadRequest, ErrorCategory, ExtractError, ProgressUpdate, VideoMetadata};

use crate::routes_jobs::remove_job_files;
use crate::state::SharedState;

const POLL_EVERY: Duration = Duration::from_secs(5);
pub const RESTART_REASON: &str = "Interrupted by server restart";
const SHUTDOWN_REASON: &str = "Interrupted by server shutdown";

#[derive(Debug, Error)]
enum JobError {
    #[error("{0}")]
    Extract(#[from] ExtractError),
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
    /// The record disappeared (user deleted it) while the job ran.
    #[error("job was deleted")]
    Gone,
}

/// Claims pending jobs and runs up to `max_concurrent_downloads` at a time
/// until `shutdown` fires. Running jobs are interrupted and marked failed.
pub async fn run_worker_loop(state: SharedState, shutdown: CancellationToken) {
    let slots = Arc::new(Semaphore::new(state.config.max_concurrent_downloads));
    let tracker = TaskTracker::new();
    info!(max_concurrent = state.config.max_concurrent_downloads, "worker_loop: started");

    loop {
        let permit = tokio::select! {
            _ = shutdown.cancelled() => break,
            p = slots.clone().acquire_owned() => match p {
                Ok(p) => p,
                Err(_) => break,
            },
        };

        match state.store.claim_next_pending().await {
            Ok(Some(job)) => {
                let st = state.clone();
                let cancel = shutdown.child_token();
                tracker.spawn(async move {
                    run_job(st, job, cancel).await;
                    drop(permit);
                });
            }
            Ok(None) => {
                drop(permit);
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = state.wake.notified() => {}
                    _ = sleep(POLL_EVERY) => {}
                }
            }
            Err(e) => {
                drop(permit);
                warn!("worker_loop: claim failed: {e}");
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = sleep(POLL_EVERY) => {}
                }
            }
        }
    }

    tracker.close();
    tracker.wait().await;
    info!("worker_loop: stopped");
}

async fn run_job(state: SharedState, job: DownloadJob, cancel: CancellationToken) {
    let id = job.id;
    info!(job_id = %id, url = %job.url, format = %job.format, "worker: starting job");

    let outcome = tokio::select! {
        r = execute_job(&state, &job) => r.map_err(Some),
        _ = cancel.cancelled() => Err(None),
    };

    let message = match outcome {
        Ok(()) => {
            info!(job_id = %id, "worker: job done");
            return;
        }
        Err(Some(JobError::Gone)) => {
            info!(job_id = %id, "worker: job deleted while running; discarding output");
            remove_job_files(&state, &job).await;
            return;
        }
        Err(Some(JobError::Extract(e))) => {
            warn!(job_id = %id, category = e.category().as_str(), "worker: job failed: {e}");
            e.to_string()
        }
        Err(Some(JobError::Store(e))) => {
            error!(job_id = %id, "worker: storage error: {e}");
            "Internal storage error".to_string()
        }
        Err(None) => {
            warn!(job_id = %id, "worker: job interrupted by shutdown");
            SHUTDOWN_REASON.to_string()
        }
    };

    match state.store.mark_failed(id, &message).await {
        Ok(()) | Err(StoreError::NotFound(_)) => {}
        Err(e) => error!(job_id = %id, "worker: could not record failure: {e}"),
    }
    // Partial output is useless once the job has failed.
    let _ = tokio::fs::remove_dir_all(state.job_dir(id)).await;
}

async fn execute_job(state: &SharedState, job: &DownloadJob) -> Result<(), JobError> {
    let id = job.id;

    let meta = state.extractor.fetch_metadata(&job.url).await?;
    if meta.is_live {
        return Err(ExtractError::Tool {
            category: ErrorCategory::UnsupportedFormat,
            detail: "live streams cannot be downloaded".to_string(),
        }
        .into());
    }
    record_metadata(state, id, &meta.title, meta.thumbnail.as_deref(), meta.duration).await?;
    let mut title_known = meta.title != "Unknown";

    let request = DownloadRequest {
        url: job.url.clone(),
        format: job.format,
        quality: job.quality,
    };
    let out_dir = state.job_dir(id);
    let (tx, mut rx) = mpsc::unbounded_channel::<ProgressUpdate>();

    let download = state.extractor.download(&request, &out_dir, tx);
    tokio::pin!(download);

    let result = loop {
        tokio::select! {
            res = &mut download => break res,
            Some(update) = rx.recv() => {
                persist_progress(state, id, &meta, &update, &mut title_known).await?;
            }
        }
    };
    while let Ok(update) = rx.try_recv() {
        persist_progress(state, id, &meta, &update, &mut title_known).await?;
    }

    let file = result?;
    match state.store.mark_completed(id, &file.path, file.size).await {
        Ok(()) => {}
        Err(StoreError::NotFound(_)) => return Err(JobError::Gone),
        Err(e) => return Err(e.into()),
    }
    info!(job_id = %id, path = %file.path.display(), size = file.size, "worker: file ready");
    Ok(())
}

async fn record_metadata(
    state: &SharedState,
    id: uuid::Uuid,
    title: &str,
    thumbnail: Option<&str>,
    duration: u64,
) -> Result<(), JobError> {
    match state.store.record_metadata(id, title, thumbnail, duration).await {
        Ok(()) => Ok(()),
        Err(StoreError::NotFound(_)) => Err(JobError::Gone),
        Err(e) => Err(e.into()),
    }
}

// Returning Gone drops the download future, which kills yt-dlp.
async fn persist_progress(
    state: &SharedState,
    id: uuid::Uuid,
    meta: &VideoMetadata,
    update: &ProgressUpdate,
    title_known: &mut bool,
) -> Result<(), JobError> {
    if !*title_known {
        if let Some(title) = &update.title {
            record_metadata(state, id, title, meta.thumbnail.as_deref(), meta.duration).await?;
            *title_known = true;
        }
    }
    if !state.store.update_progress(id, update.percent).await? {
        return Err(JobError::Gone);
    }
    Ok(())
}
