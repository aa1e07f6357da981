use std::collections::HashSet;
use std::io;
use std::path::Path;
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::routes_jobs::remove_job_files;
use crate::state::{AppState, SharedState};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CleanupReport {
    pub records_removed: usize,
    pub entries_removed: usize,
}

/// Runs `cleanup_once` at startup and then every `cleanup_interval`.
pub async fn run_cleanup_loop(state: SharedState, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(state.config.cleanup_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(
        every_secs = state.config.cleanup_interval.as_secs(),
        retention_secs = state.config.retention.as_secs(),
        "cleanup: started"
    );

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }
        match cleanup_once(&state).await {
            Ok(report) if report != CleanupReport::default() => {
                info!(
                    records = report.records_removed,
                    entries = report.entries_removed,
                    "cleanup: removed expired downloads"
                );
            }
            Ok(_) => debug!("cleanup: nothing to remove"),
            Err(e) => warn!("cleanup: failed: {e:?}"),
        }
    }
    info!("cleanup: stopped");
}

/// Drops finished jobs older than the retention window with their files,
/// then sweeps entries of the download directory that belong to no job and
/// are just as old.
pub async fn cleanup_once(state: &AppState) -> Result<CleanupReport> {
    let retention = state.config.retention;
    let cutoff = Utc::now() - chrono::Duration::from_std(retention).context("retention out of range")?;

    let expired = state.store.delete_finished_before(cutoff).await?;
    for job in &expired {
        remove_job_files(state, job).await;
    }

    // Only orphans are swept. Jobs with a record leave with it.
    let keep: HashSet<String> = state
        .store
        .all_ids()
        .await?
        .into_iter()
        .map(|id| id.to_string())
        .collect();
    let dir = state.config.download_dir.clone();
    let entries_removed = tokio::task::spawn_blocking(move || sweep_stale(&dir, retention, &keep))
        .await
        .context("cleanup sweep panicked")??;

    Ok(CleanupReport {
        records_removed: expired.len(),
        entries_removed,
    })
}

/// Removes top-level entries of `dir` whose newest modification time is more
/// than `max_age` ago. Entries named in `keep` are skipped.
pub fn sweep_stale(dir: &Path, max_age: Duration, keep: &HashSet<String>) -> io::Result<usize> {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let now = SystemTime::now();
    let mut removed = 0;
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if keep.contains(&name) {
            continue;
        }

        let path = entry.path();
        let Some(newest) = newest_mtime(&path) else {
            continue;
        };
        // Clock skew reads as "just modified".
        let age = now.duration_since(newest).unwrap_or_default();
        if age <= max_age {
            continue;
        }

        let result = if entry.file_type()?.is_dir() {
            std::fs::remove_dir_all(&path)
        } else {
            std::fs::remove_file(&path)
        };
        match result {
            Ok(()) => {
                debug!(path = %path.display(), age_secs = age.as_secs(), "cleanup: removed");
                removed += 1;
            }
            Err(e) => warn!(path = %path.display(), "cleanup: could not remove: {e}"),
        }
    }
    Ok(removed)
}

fn newest_mtime(path: &Path) -> Option<SystemTime> {
    WalkDir::new(path)
        .into_iter()
        .filter_map(Result::ok)
        .filter_map(|e| e.metadata().ok())
        .filter_map(|m| m.modified().ok())
        .max()
}
