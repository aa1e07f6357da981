use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MAX_URL_LEN: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UrlError {
    #[error("URL cannot be empty")]
    Empty,
    #[error("Invalid YouTube URL format")]
    InvalidFormat,
    #[error("URL is too long")]
    TooLong,
}

fn youtube_url_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)^(https?://)?(www\.)?(youtube\.com/(watch\?v=|embed/|v/|shorts/)|youtu\.be/|youtube\.com/playlist\?list=)[\w\-&=]+",
        )
        .expect("static regex")
    })
}

fn video_id_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:v=|/v/|youtu\.be/|embed/|shorts/)([a-zA-Z0-9_-]{11})").expect("static regex")
    })
}

/// Checks that `raw` looks like a YouTube video, short, embed or playlist URL.
///
/// Returns the trimmed URL. Nothing outside this function is consulted, so a
/// rejected URL never reaches yt-dlp.
pub fn validate_url(raw: &str) -> Result<String, UrlError> {
    let url = raw.trim();
    if url.is_empty() {
        return Err(UrlError::Empty);
    }
    if !youtube_url_pattern().is_match(url) {
        return Err(UrlError::InvalidFormat);
    }
    if url.chars().count() > MAX_URL_LEN {
        return Err(UrlError::TooLong);
    }
    Ok(url.to_string())
}

pub fn extract_video_id(url: &str) -> Option<&str> {
    video_id_pattern()
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Select a valid choice. {value} is not one of the available choices.")]
pub struct ParseChoiceError {
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaFormat {
    /// MP4 video with merged audio.
    Mp4,
    /// Audio only, transcoded to MP3.
    Mp3,
}

impl MediaFormat {
    pub const ALL: [MediaFormat; 2] = [MediaFormat::Mp4, MediaFormat::Mp3];

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaFormat::Mp4 => "mp4",
            MediaFormat::Mp3 => "mp3",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MediaFormat::Mp4 => "MP4 (Video)",
            MediaFormat::Mp3 => "MP3 (Audio)",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            MediaFormat::Mp4 => "video/mp4",
            MediaFormat::Mp3 => "audio/mpeg",
        }
    }

    pub fn is_audio(&self) -> bool {
        matches!(self, MediaFormat::Mp3)
    }
}

impl fmt::Display for MediaFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaFormat {
    type Err = ParseChoiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mp4" | "video" => Ok(MediaFormat::Mp4),
            "mp3" | "audio" => Ok(MediaFormat::Mp3),
            _ => Err(ParseChoiceError { value: s.to_string() }),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Quality {
    #[default]
    #[serde(rename = "best")]
    Best,
    #[serde(rename = "1080p")]
    P1080,
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "480p")]
    P480,
    #[serde(rename = "worst")]
    Worst,
}

impl Quality {
    pub const ALL: [Quality; 5] = [
        Quality::Best,
        Quality::P1080,
        Quality::P720,
        Quality::P480,
        Quality::Worst,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Quality::Best => "best",
            Quality::P1080 => "1080p",
            Quality::P720 => "720p",
            Quality::P480 => "480p",
            Quality::Worst => "worst",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Quality::Best => "Best Quality",
            Quality::P1080 => "1080p",
            Quality::P720 => "720p",
            Quality::P480 => "480p",
            Quality::Worst => "Worst Quality",
        }
    }

    /// yt-dlp `-f` selector for a video download at this quality.
    pub fn video_selector(&self) -> &'static str {
        match self {
            Quality::Best => "bestvideo[ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4]/best",
            Quality::P1080 => {
                "bestvideo[height<=1080][ext=mp4]+bestaudio[ext=m4a]/best[height<=1080][ext=mp4]/best[height<=1080]"
            }
            Quality::P720 => {
                "bestvideo[height<=720][ext=mp4]+bestaudio[ext=m4a]/best[height<=720][ext=mp4]/best[height<=720]"
            }
            Quality::P480 => {
                "bestvideo[height<=480][ext=mp4]+bestaudio[ext=m4a]/best[height<=480][ext=mp4]/best[height<=480]"
            }
            Quality::Worst => "worstvideo[ext=mp4]+worstaudio[ext=m4a]/worst[ext=mp4]/worst",
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Quality {
    type Err = ParseChoiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "best" => Ok(Quality::Best),
            "1080p" => Ok(Quality::P1080),
            "720p" => Ok(Quality::P720),
            "480p" => Ok(Quality::P480),
            "worst" => Ok(Quality::Worst),
            _ => Err(ParseChoiceError { value: s.to_string() }),
        }
    }
}

/// Audio downloads always take the best stream; the quality knob only
/// applies to video.
pub fn effective_quality(format: MediaFormat, requested: Quality) -> Quality {
    if format.is_audio() {
        Quality::Best
    } else {
        requested
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_youtube_url_shapes() {
        let valid = [
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "https://youtube.com/watch?v=dQw4w9WgXcQ",
            "http://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "https://youtu.be/dQw4w9WgXcQ",
            "https://www.youtube.com/embed/dQw4w9WgXcQ",
            "https://www.youtube.com/v/dQw4w9WgXcQ",
            "https://www.youtube.com/shorts/dQw4w9WgXcQ",
            "https://www.youtube.com/playlist?list=PL590L5WQmH8fJ54F369BLDSqIwcs-TCfs",
            "  https://www.youtube.com/watch?v=abc123  ",
        ];
        for url in valid {
            assert!(validate_url(url).is_ok(), "should accept {url}");
        }
    }

    #[test]
    fn rejects_other_hosts_and_garbage() {
        let invalid = [
            "not a url",
            "https://google.com",
            "https://vimeo.com/123456",
            "https://facebook.com/video",
            "https://www.youtube.com/",
            "https://evil.example/?u=https://youtu.be/dQw4w9WgXcQ",
        ];
        for url in invalid {
            assert_eq!(validate_url(url), Err(UrlError::InvalidFormat), "should reject {url}");
        }
    }

    #[test]
    fn empty_url_has_its_own_message() {
        assert_eq!(validate_url(""), Err(UrlError::Empty));
        assert_eq!(validate_url("   "), Err(UrlError::Empty));
        assert_eq!(UrlError::Empty.to_string(), "URL cannot be empty");
    }

    #[test]
    fn overlong_url_is_rejected() {
        let url = format!("https://www.youtube.com/watch?v={}", "a".repeat(480));
        assert_eq!(validate_url(&url), Err(UrlError::TooLong));
    }

    #[test]
    fn trims_before_returning() {
        let url = validate_url("\thttps://youtu.be/dQw4w9WgXcQ\n").unwrap();
        assert_eq!(url, "https://youtu.be/dQw4w9WgXcQ");
    }

    #[test]
    fn extracts_video_ids() {
        let cases = [
            ("https://www.youtube.com/watch?v=dQw4w9WgXcQ", "dQw4w9WgXcQ"),
            ("https://youtu.be/dQw4w9WgXcQ", "dQw4w9WgXcQ"),
            ("https://www.youtube.com/embed/dQw4w9WgXcQ", "dQw4w9WgXcQ"),
            ("https://www.youtube.com/v/dQw4w9WgXcQ", "dQw4w9WgXcQ"),
            ("https://www.youtube.com/shorts/dQw4w9WgXcQ", "dQw4w9WgXcQ"),
        ];
        for (url, id) in cases {
            assert_eq!(extract_video_id(url), Some(id), "failed for {url}");
        }
        assert_eq!(extract_video_id("https://youtu.be/short"), None);
    }

    #[test]
    fn choices_parse_only_known_values() {
        assert_eq!("mp3".parse::<MediaFormat>().unwrap(), MediaFormat::Mp3);
        assert_eq!("MP4".parse::<MediaFormat>().unwrap(), MediaFormat::Mp4);
        assert!("webm".parse::<MediaFormat>().is_err());

        for q in Quality::ALL {
            assert_eq!(q.as_str().parse::<Quality>().unwrap(), q);
        }
        assert!("4k".parse::<Quality>().is_err());
    }

    #[test]
    fn audio_always_uses_best_quality() {
        assert_eq!(effective_quality(MediaFormat::Mp3, Quality::P480), Quality::Best);
        assert_eq!(effective_quality(MediaFormat::Mp4, Quality::P480), Quality::P480);
    }
}
