use serde::{Deserialize, Serialize};

use crate::error::ExtractError;
use crate::format::format_duration;

/// What the preview page and the video-info API show. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub id: String,
    pub title: String,
    pub thumbnail: Option<String>,
    pub duration: u64,
    pub duration_string: String,
    pub description: String,
    pub uploader: String,
    pub view_count: u64,
    pub upload_date: String,
    pub webpage_url: String,
    pub age_limit: u32,
    pub is_live: bool,
}

// Subset of `yt-dlp --dump-json`. Everything is optional there.
#[derive(Debug, Default, Deserialize)]
struct RawInfo {
    id: Option<String>,
    title: Option<String>,
    thumbnail: Option<String>,
    duration: Option<f64>,
    duration_string: Option<String>,
    description: Option<String>,
    uploader: Option<String>,
    view_count: Option<u64>,
    upload_date: Option<String>,
    webpage_url: Option<String>,
    age_limit: Option<u32>,
    is_live: Option<bool>,
}

impl VideoMetadata {
    /// Parses the first JSON document yt-dlp printed. `url` fills in
    /// `webpage_url` when yt-dlp leaves it out.
    pub fn from_dump_json(stdout: &str, url: &str) -> Result<Self, ExtractError> {
        let first = stdout
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .ok_or_else(|| ExtractError::Parse("empty output".to_string()))?;
        let raw: RawInfo =
            serde_json::from_str(first).map_err(|e| ExtractError::Parse(e.to_string()))?;

        let duration = raw.duration.filter(|d| *d > 0.0).map(|d| d.round() as u64).unwrap_or(0);
        Ok(VideoMetadata {
            id: raw.id.unwrap_or_default(),
            title: non_blank(raw.title).unwrap_or_else(|| "Unknown".to_string()),
            thumbnail: non_blank(raw.thumbnail),
            duration,
            duration_string: non_blank(raw.duration_string).unwrap_or_else(|| format_duration(duration)),
            description: raw.description.unwrap_or_default(),
            uploader: non_blank(raw.uploader).unwrap_or_else(|| "Unknown".to_string()),
            view_count: raw.view_count.unwrap_or(0),
            upload_date: raw.upload_date.unwrap_or_default(),
            webpage_url: non_blank(raw.webpage_url).unwrap_or_else(|| url.to_string()),
            age_limit: raw.age_limit.unwrap_or(0),
            is_live: raw.is_live.unwrap_or(false),
        })
    }

    /// `YYYYMMDD` as `YYYY-MM-DD`; anything else is returned untouched.
    pub fn upload_date_display(&self) -> String {
        let d = &self.upload_date;
        if d.len() == 8 && d.chars().all(|c| c.is_ascii_digit()) {
            format!("{}-{}-{}", &d[0..4], &d[4..6], &d[6..8])
        } else {
            d.clone()
        }
    }
}

fn non_blank(v: Option<String>) -> Option<String> {
    v.filter(|s| !s.trim().is_empty())
}
