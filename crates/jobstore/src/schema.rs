use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use ytdl::{effective_quality, format_duration, format_file_size, MediaFormat, Quality};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Downloading,
    Completed,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Downloading => "downloading",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobState::Pending),
            "downloading" => Some(JobState::Downloading),
            "completed" => Some(JobState::Completed),
            "failed" => Some(JobState::Failed),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            JobState::Pending => "Pending",
            JobState::Downloading => "Downloading",
            JobState::Completed => "Completed",
            JobState::Failed => "Failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of `download_jobs`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DownloadJob {
    pub id: Uuid,
    pub session_id: String,
    pub url: String,
    pub title: Option<String>,
    pub thumbnail: Option<String>,
    pub duration: u64,
    pub format: MediaFormat,
    pub quality: Quality,
    pub state: JobState,
    pub progress: u8,
    pub file_path: Option<PathBuf>,
    pub file_size: u64,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl DownloadJob {
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or("Processing...")
    }

    pub fn duration_formatted(&self) -> String {
        format_duration(self.duration)
    }

    pub fn file_size_formatted(&self) -> String {
        format_file_size(self.file_size)
    }

    pub fn file_available(&self) -> bool {
        self.state == JobState::Completed && self.file_path.is_some()
    }
}

/// Input to `JobStore::create`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewJob {
    pub session_id: String,
    pub url: String,
    pub format: MediaFormat,
    pub quality: Quality,
}

impl NewJob {
    /// Audio jobs always record `best` quality.
    pub fn new(session_id: impl Into<String>, url: impl Into<String>, format: MediaFormat, quality: Quality) -> Self {
        Self {
            session_id: session_id.into(),
            url: url.into(),
            format,
            quality: effective_quality(format, quality),
        }
    }
}
