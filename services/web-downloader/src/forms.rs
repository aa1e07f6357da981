use serde::Deserialize;
use ytdl::{effective_quality, validate_url, MediaFormat, Quality};

/// Raw `POST /` body. Missing fields deserialize as empty strings so the
/// validator can report them.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct DownloadForm {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub format_type: String,
    #[serde(default)]
    pub quality: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidDownload {
    pub url: String,
    pub format: MediaFormat,
    pub quality: Quality,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FormErrors {
    pub url: Option<String>,
    pub format_type: Option<String>,
    pub quality: Option<String>,
}

impl FormErrors {
    pub fn is_empty(&self) -> bool {
        self.url.is_none() && self.format_type.is_none() && self.quality.is_none()
    }
}

impl DownloadForm {
    /// Form pre-filled with `url` and the default choices.
    pub fn with_url(url: &str) -> Self {
        Self {
            url: url.to_string(),
            format_type: MediaFormat::Mp4.as_str().to_string(),
            quality: Quality::Best.as_str().to_string(),
        }
    }

    /// Blank choice fields fall back to mp4 / best. An mp3 request always
    /// records `best`.
    pub fn validate(&self) -> Result<ValidDownload, FormErrors> {
        let mut errors = FormErrors::default();

        let url = validate_url(&self.url).map_err(|e| errors.url = Some(e.to_string())).ok();

        let format = if self.format_type.trim().is_empty() {
            Some(MediaFormat::Mp4)
        } else {
            self.format_type
                .trim()
                .parse::<MediaFormat>()
                .map_err(|e| errors.format_type = Some(e.to_string()))
                .ok()
        };

        let quality = if self.quality.trim().is_empty() {
            Some(Quality::Best)
        } else {
            self.quality
                .trim()
                .parse::<Quality>()
                .map_err(|e| errors.quality = Some(e.to_string()))
                .ok()
        };

        match (url, format, quality) {
            (Some(url), Some(format), Some(quality)) if errors.is_empty() => Ok(ValidDownload {
                url,
                format,
                quality: effective_quality(format, quality),
            }),
            _ => Err(errors),
        }
    }
}
