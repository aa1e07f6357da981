use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

use crate::error::ExtractError;
use crate::metadata::VideoMetadata;
use crate::progress::ProgressUpdate;
use crate::validate::{MediaFormat, Quality};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRequest {
    pub url: String,
    pub format: MediaFormat,
    pub quality: Quality,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedFile {
    pub path: PathBuf,
    pub size: u64,
}

/// Boundary to the external download tool.
///
/// `download` writes only inside `out_dir` and reports progress on
/// `progress` as it goes; a closed receiver is not an error.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn fetch_metadata(&self, url: &str) -> Result<VideoMetadata, ExtractError>;

    async fn download(
        &self,
        request: &DownloadRequest,
        out_dir: &Path,
        progress: UnboundedSender<ProgressUpdate>,
    ) -> Result<DownloadedFile, ExtractError>;
}
