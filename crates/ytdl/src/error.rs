use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Network,
    Unavailable,
    Restricted,
    UnsupportedFormat,
    Other,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Network => "network",
            ErrorCategory::Unavailable => "unavailable",
            ErrorCategory::Restricted => "restricted",
            ErrorCategory::UnsupportedFormat => "unsupported_format",
            ErrorCategory::Other => "other",
        }
    }

    pub fn summary(&self) -> &'static str {
        match self {
            ErrorCategory::Network => "Network error while contacting YouTube",
            ErrorCategory::Unavailable => "The video is unavailable (private, deleted or never existed)",
            ErrorCategory::Restricted => "The video is restricted (age-gated, members-only or region-locked)",
            ErrorCategory::UnsupportedFormat => "The requested format is not available for this video",
            ErrorCategory::Other => "Download failed",
        }
    }
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to start yt-dlp: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("yt-dlp timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("{}: {detail}", .category.summary())]
    Tool { category: ErrorCategory, detail: String },

    #[error("could not parse yt-dlp output: {0}")]
    Parse(String),

    #[error("Download completed but file not found")]
    FileNotFound,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExtractError {
    /// Builds a `Tool` error from whatever yt-dlp printed on stderr.
    pub fn from_stderr(stderr: &str, fallback: impl Into<String>) -> Self {
        let detail = last_error_line(stderr).unwrap_or_else(|| fallback.into());
        ExtractError::Tool {
            category: classify(stderr),
            detail,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            ExtractError::Tool { category, .. } => *category,
            ExtractError::Timeout(_) => ErrorCategory::Network,
            _ => ErrorCategory::Other,
        }
    }
}

/// Sorts yt-dlp stderr into one of the coarse failure categories.
///
/// Order matters: geo/age messages also contain "not available".
pub fn classify(stderr: &str) -> ErrorCategory {
    let s = stderr.to_ascii_lowercase();

    const RESTRICTED: &[&str] = &[
        "sign in to confirm your age",
        "age-restricted",
        "age restricted",
        "inappropriate for some users",
        "members-only",
        "join this channel",
        "available in your country",
        "geo restriction",
        "geo-restricted",
        "confirm you're not a bot",
        "confirm you’re not a bot",
    ];
    const UNSUPPORTED: &[&str] = &[
        "requested format is not available",
        "no video formats found",
        "unsupported url",
        "is a live stream",
        "live event will begin",
    ];
    const UNAVAILABLE: &[&str] = &[
        "video unavailable",
        "private video",
        "has been removed",
        "does not exist",
        "this video is not available",
        "http error 404",
        "account associated with this video has been terminated",
    ];
    const NETWORK: &[&str] = &[
        "unable to download webpage",
        "unable to download api page",
        "timed out",
        "connection reset",
        "connection refused",
        "network is unreachable",
        "name or service not known",
        "temporary failure in name resolution",
        "getaddrinfo failed",
        "http error 5",
        "http error 429",
        "certificate verify failed",
    ];

    let hit = |needles: &[&str]| needles.iter().any(|n| s.contains(n));
    if hit(RESTRICTED) {
        ErrorCategory::Restricted
    } else if hit(UNSUPPORTED) {
        ErrorCategory::UnsupportedFormat
    } else if hit(UNAVAILABLE) {
        ErrorCategory::Unavailable
    } else if hit(NETWORK) {
        ErrorCategory::Network
    } else {
        ErrorCategory::Other
    }
}

fn last_error_line(stderr: &str) -> Option<String> {
    stderr
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| l.starts_with("ERROR:"))
        .map(|l| l.trim_start_matches("ERROR:").trim().to_string())
        .filter(|l| !l.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_common_failures() {
        assert_eq!(
            classify("ERROR: [youtube] abc: Sign in to confirm your age. This video may be inappropriate"),
            ErrorCategory::Restricted
        );
        assert_eq!(
            classify("ERROR: [youtube] abc: The uploader has not made this video available in your country"),
            ErrorCategory::Restricted
        );
        assert_eq!(classify("ERROR: [youtube] abc: Video unavailable"), ErrorCategory::Unavailable);
        assert_eq!(classify("ERROR: [youtube] abc: Private video"), ErrorCategory::Unavailable);
        assert_eq!(
            classify("ERROR: [youtube] abc: Requested format is not available. Use --list-formats"),
            ErrorCategory::UnsupportedFormat
        );
        assert_eq!(
            classify("ERROR: [youtube] abc: Unable to download webpage: <urlopen error [Errno -3] Temporary failure in name resolution>"),
            ErrorCategory::Network
        );
        assert_eq!(classify("something odd happened"), ErrorCategory::Other);
    }

    #[test]
    fn tool_error_keeps_last_error_line() {
        let stderr = "WARNING: falling back\nERROR: first\nERROR: [youtube] x: Video unavailable\n";
        let err = ExtractError::from_stderr(stderr, "exit status 1");
        assert_eq!(err.category(), ErrorCategory::Unavailable);
        assert!(err.to_string().ends_with("[youtube] x: Video unavailable"));

        let err = ExtractError::from_stderr("", "exit status 1");
        assert_eq!(err.category(), ErrorCategory::Other);
        assert_eq!(err.to_string(), "Download failed: exit status 1");
    }
}
