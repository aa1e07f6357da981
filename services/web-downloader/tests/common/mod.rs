//! Shared fixtures: a temp-dir backed app and an extractor that never
//! spawns yt-dlp.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use jobstore::JobStore;
use tokio::sync::mpsc::UnboundedSender;
use tower::ServiceExt;
use uuid::Uuid;
use web_downloader::{build_router, session, AppConfig, AppState, SharedState};
use ytdl::{
    DownloadRequest, DownloadedFile, ErrorCategory, ExtractError, Extractor, ProgressUpdate,
    VideoMetadata,
};

pub const FAKE_BYTES: &[u8] = b"fake media bytes";
pub const FAKE_TITLE: &str = "Fake_Title";

#[derive(Default)]
pub struct FakeExtractor {
    pub metadata_calls: AtomicUsize,
    pub download_calls: AtomicUsize,
    pub fail_metadata: bool,
    pub fail_download: bool,
    pub live: bool,
}

impl FakeExtractor {
    pub fn calls(&self) -> usize {
        self.metadata_calls.load(Ordering::SeqCst) + self.download_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Extractor for FakeExtractor {
    async fn fetch_metadata(&self, url: &str) -> Result<VideoMetadata, ExtractError> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_metadata {
            return Err(ExtractError::from_stderr(
                "ERROR: [youtube] abc: Private video. Sign in if you've been granted access",
                "exit status 1",
            ));
        }
        Ok(VideoMetadata {
            id: "abc123".to_string(),
            title: "Fake Title".to_string(),
            thumbnail: Some("https://i.ytimg.com/vi/abc123/hqdefault.jpg".to_string()),
            duration: 125,
            duration_string: "2:05".to_string(),
            description: "A <b>fake</b> video".to_string(),
            uploader: "Tester".to_string(),
            view_count: 1234,
            upload_date: "20240102".to_string(),
            webpage_url: url.to_string(),
            age_limit: 0,
            is_live: self.live,
        })
    }

    async fn download(
        &self,
        request: &DownloadRequest,
        out_dir: &Path,
        progress: UnboundedSender<ProgressUpdate>,
    ) -> Result<DownloadedFile, ExtractError> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        tokio::fs::create_dir_all(out_dir).await?;

        for percent in [25u8, 60, 100] {
            let _ = progress.send(ProgressUpdate {
                percent,
                title: Some(FAKE_TITLE.to_string()),
            });
        }

        if self.fail_download {
            return Err(ExtractError::Tool {
                category: ErrorCategory::UnsupportedFormat,
                detail: "Requested format is not available".to_string(),
            });
        }

        let path = out_dir.join(format!("{FAKE_TITLE}.{}", request.format.as_str()));
        tokio::fs::write(&path, FAKE_BYTES).await?;
        Ok(DownloadedFile {
            path,
            size: FAKE_BYTES.len() as u64,
        })
    }
}

pub struct TestApp {
    pub state: SharedState,
    pub router: Router,
    pub fake: Arc<FakeExtractor>,
    pub session_id: String,
    pub dir: tempfile::TempDir,
}

impl TestApp {
    pub async fn new(fake: FakeExtractor) -> Self {
        Self::with_config(fake, |_| {}).await
    }

    pub async fn with_config(fake: FakeExtractor, tweak: impl FnOnce(&mut AppConfig)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let vars: HashMap<String, String> = [
            ("DEBUG", "true".to_string()),
            ("SECRET_KEY", "integration-test-secret-key".to_string()),
            ("DOWNLOAD_DIR", dir.path().join("downloads").display().to_string()),
            ("DATABASE_PATH", dir.path().join("data/jobs.sqlite3").display().to_string()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        let mut cfg = AppConfig::from_lookup(|k| vars.get(k).cloned()).unwrap();
        tweak(&mut cfg);
        std::fs::create_dir_all(&cfg.download_dir).unwrap();

        let store = JobStore::open(&cfg.database_path).await.unwrap();
        let fake = Arc::new(fake);
        let state = Arc::new(AppState::new(cfg, store, fake.clone()));
        let router = build_router(state.clone());

        Self {
            state,
            router,
            fake,
            session_id: Uuid::new_v4().to_string(),
            dir,
        }
    }

    pub fn cookie_for(&self, session_id: &str) -> String {
        format!(
            "{}={}",
            session::COOKIE_NAME,
            session::sign(&self.state.config.secret_key, session_id)
        )
    }

    pub fn get(&self, uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header(header::HOST, "localhost:8000")
            .header(header::COOKIE, self.cookie_for(&self.session_id))
            .body(Body::empty())
            .unwrap()
    }

    pub fn post_form(&self, uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::HOST, "localhost:8000")
            .header(header::COOKIE, self.cookie_for(&self.session_id))
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    pub async fn send(&self, req: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(req).await.unwrap()
    }
}

pub async fn body_string(resp: Response<Body>) -> String {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(resp: Response<Body>) -> serde_json::Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn location(resp: &Response<Body>) -> &str {
    resp.headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}
