use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;
use ytdl::{MediaFormat, Quality};

use crate::schema::{DownloadJob, JobState, NewJob};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("download job {0} not found")]
    NotFound(Uuid),
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

const COLUMNS: &str = "id, session_id, url, title, thumbnail, duration, format_type, quality, \
     status, progress, file_path, file_size, error_message, created_at, updated_at, completed_at";

/// Persistent record of download jobs.
///
/// Every method is a single statement, so each transition is atomic on its
/// own row. Nothing spans rows.
#[derive(Clone, Debug)]
pub struct JobStore {
    pool: SqlitePool,
}

impl JobStore {
    /// Opens (creating if needed) the database at `path` and runs migrations.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;
        info!(path = %path.display(), "jobstore: ready");

        Ok(Self { pool })
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn create(&self, new: &NewJob) -> Result<DownloadJob, StoreError> {
        let id = Uuid::new_v4();
        let now = now_millis();
        let sql = format!(
            r#"
            INSERT INTO download_jobs
                (id, session_id, url, format_type, quality, status, progress,
                 file_size, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, 'pending', 0, 0, ?, ?)
            RETURNING {COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .bind(&new.session_id)
            .bind(&new.url)
            .bind(new.format.as_str())
            .bind(new.quality.as_str())
            .bind(now)
            .bind(now)
            .fetch_one(&self.pool)
            .await?;

        let job = row_to_job(&row)?;
        debug!(job_id = %job.id, url = %job.url, "jobstore: created");
        Ok(job)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<DownloadJob>, StoreError> {
        let sql = format!("SELECT {COLUMNS} FROM download_jobs WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_job).transpose()
    }

    /// Like `get`, but a job owned by another session reads as missing.
    pub async fn get_for_session(
        &self,
        id: Uuid,
        session_id: &str,
    ) -> Result<Option<DownloadJob>, StoreError> {
        let sql = format!("SELECT {COLUMNS} FROM download_jobs WHERE id = ? AND session_id = ?");
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_job).transpose()
    }

    /// Newest first.
    pub async fn list_for_session(
        &self,
        session_id: &str,
        limit: u32,
    ) -> Result<Vec<DownloadJob>, StoreError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM download_jobs WHERE session_id = ? \
             ORDER BY created_at DESC, rowid DESC LIMIT ?"
        );
        let rows = sqlx::query(&sql)
            .bind(session_id)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_job).collect()
    }

    /// Moves the oldest pending job to `downloading` and returns it.
    pub async fn claim_next_pending(&self) -> Result<Option<DownloadJob>, StoreError> {
        let sql = format!(
            r#"
            UPDATE download_jobs
            SET status = 'downloading', progress = 0, updated_at = ?
            WHERE id = (
                SELECT id FROM download_jobs
                WHERE status = 'pending'
                ORDER BY created_at ASC, rowid ASC
                LIMIT 1
            )
            AND status = 'pending'
            RETURNING {COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(now_millis())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_job).transpose()
    }

    pub async fn record_metadata(
        &self,
        id: Uuid,
        title: &str,
        thumbnail: Option<&str>,
        duration: u64,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE download_jobs
            SET title = ?, thumbnail = ?, duration = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(title)
        .bind(thumbnail)
        .bind(to_i64(duration))
        .bind(now_millis())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    /// Stores `percent` for a downloading job, capped at 99 and never moving
    /// backwards. Returns false when the job is no longer downloading.
    pub async fn update_progress(&self, id: Uuid, percent: u8) -> Result<bool, StoreError> {
        let capped = i64::from(percent.min(99));
        let result = sqlx::query(
            r#"
            UPDATE download_jobs
            SET progress = MAX(progress, ?), updated_at = ?
            WHERE id = ? AND status = 'downloading'
            "#,
        )
        .bind(capped)
        .bind(now_millis())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Only a downloading job can complete. `NotFound` covers both a missing
    /// row and one that is no longer downloading.
    pub async fn mark_completed(
        &self,
        id: Uuid,
        file_path: &Path,
        file_size: u64,
    ) -> Result<(), StoreError> {
        let now = now_millis();
        let result = sqlx::query(
            r#"
            UPDATE download_jobs
            SET status = 'completed',
                progress = 100,
                file_path = ?,
                file_size = ?,
                error_message = NULL,
                updated_at = ?,
                completed_at = ?
            WHERE id = ? AND status = 'downloading'
            "#,
        )
        .bind(file_path.to_string_lossy().into_owned())
        .bind(to_i64(file_size))
        .bind(now)
        .bind(now)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    pub async fn mark_failed(&self, id: Uuid, message: &str) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE download_jobs
            SET status = 'failed',
                file_path = NULL,
                file_size = 0,
                error_message = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(message)
        .bind(now_millis())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    /// Removes the record and hands it back so the caller can remove files.
    pub async fn delete(&self, id: Uuid) -> Result<Option<DownloadJob>, StoreError> {
        let sql = format!("DELETE FROM download_jobs WHERE id = ? RETURNING {COLUMNS}");
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_job).transpose()
    }

    /// Deletes completed and failed jobs last touched before `cutoff`.
    pub async fn delete_finished_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<DownloadJob>, StoreError> {
        let sql = format!(
            r#"
            DELETE FROM download_jobs
            WHERE status IN ('completed', 'failed')
              AND COALESCE(completed_at, updated_at) < ?
            RETURNING {COLUMNS}
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(cutoff.timestamp_millis())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_job).collect()
    }

    /// Ids of jobs still pending or downloading.
    /// Ids of every job that still has a record, whatever its state.
    pub async fn all_ids(&self) -> Result<Vec<Uuid>, StoreError> {
        let rows = sqlx::query("SELECT id FROM download_jobs")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|r| -> Result<Uuid, StoreError> {
                let s: String = r.try_get("id")?;
                parse_uuid(&s)
            })
            .collect()
    }

    /// Startup recovery: nothing can still be running, so anything unfinished
    /// is failed with `reason`. Returns how many jobs were touched.
    pub async fn fail_unfinished(&self, reason: &str) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE download_jobs
            SET status = 'failed',
                file_path = NULL,
                error_message = ?,
                updated_at = ?
            WHERE status IN ('pending', 'downloading')
            "#,
        )
        .bind(reason)
        .bind(now_millis())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn to_i64(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

fn parse_uuid(s: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(s).map_err(|e| StoreError::Corrupt(format!("id {s:?}: {e}")))
}

fn millis_to_datetime(ms: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| StoreError::Corrupt(format!("timestamp {ms}")))
}

fn row_to_job(row: &SqliteRow) -> Result<DownloadJob, StoreError> {
    let id: String = row.try_get("id")?;
    let format: String = row.try_get("format_type")?;
    let quality: String = row.try_get("quality")?;
    let status: String = row.try_get("status")?;
    let duration: i64 = row.try_get("duration")?;
    let progress: i64 = row.try_get("progress")?;
    let file_path: Option<String> = row.try_get("file_path")?;
    let file_size: i64 = row.try_get("file_size")?;
    let created_at: i64 = row.try_get("created_at")?;
    let updated_at: i64 = row.try_get("updated_at")?;
    let completed_at: Option<i64> = row.try_get("completed_at")?;

    Ok(DownloadJob {
        id: parse_uuid(&id)?,
        session_id: row.try_get("session_id")?,
        url: row.try_get("url")?,
        title: row.try_get("title")?,
        thumbnail: row.try_get("thumbnail")?,
        duration: u64::try_from(duration).unwrap_or(0),
        format: MediaFormat::from_str(&format).map_err(|e| StoreError::Corrupt(e.to_string()))?,
        quality: Quality::from_str(&quality).map_err(|e| StoreError::Corrupt(e.to_string()))?,
        state: JobState::parse(&status)
            .ok_or_else(|| StoreError::Corrupt(format!("status {status:?}")))?,
        progress: progress.clamp(0, 100) as u8,
        file_path: file_path.map(PathBuf::from),
        file_size: u64::try_from(file_size).unwrap_or(0),
        error_message: row.try_get("error_message")?,
        created_at: millis_to_datetime(created_at)?,
        updated_at: millis_to_datetime(updated_at)?,
        completed_at: completed_at.map(millis_to_datetime).transpose()?,
    })
}
