use std::path::PathBuf;
use std::sync::Arc;

use jobstore::JobStore;
use tokio::sync::Notify;
use uuid::Uuid;
use ytdl::Extractor;

use crate::config::AppConfig;

pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub config: AppConfig,
    pub store: JobStore,
    pub extractor: Arc<dyn Extractor>,
    /// Poked whenever a job is queued so the worker does not wait for its poll.
    pub wake: Notify,
}

impl AppState {
    pub fn new(config: AppConfig, store: JobStore, extractor: Arc<dyn Extractor>) -> Self {
        Self {
            config,
            store,
            extractor,
            wake: Notify::new(),
        }
    }

    /// Private output directory of one job.
    pub fn job_dir(&self, id: Uuid) -> PathBuf {
        self.config.download_dir.join(id.to_string())
    }
}
