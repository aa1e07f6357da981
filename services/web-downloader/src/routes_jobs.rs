use std::path::Path as FsPath;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::{Extension, Json};
use jobstore::DownloadJob;
use serde::Serialize;
use tokio_util::io::ReaderStream;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{HttpError, PageError};
use crate::session::Session;
use crate::state::{AppState, SharedState};

#[derive(Serialize)]
pub struct ProgressResponse {
    pub id: Uuid,
    pub title: String,
    pub status: String,
    pub progress: u8,
    pub error_message: Option<String>,
    pub file_available: bool,
    pub thumbnail: Option<String>,
    pub duration: String,
    pub format_type: String,
}

impl From<&DownloadJob> for ProgressResponse {
    fn from(job: &DownloadJob) -> Self {
        Self {
            id: job.id,
            title: job.display_title().to_string(),
            status: job.state.as_str().to_string(),
            progress: job.progress,
            error_message: job.error_message.clone(),
            file_available: job.file_available(),
            thumbnail: job.thumbnail.clone(),
            duration: job.duration_formatted(),
            format_type: job.format.as_str().to_string(),
        }
    }
}

// Non-UUID ids are treated like unknown ones.
fn parse_id(raw: &str) -> Option<Uuid> {
    Uuid::parse_str(raw).ok()
}

pub async fn progress(
    State(state): State<SharedState>,
    Extension(session): Extension<Session>,
    Path(raw_id): Path<String>,
) -> Result<Json<ProgressResponse>, HttpError> {
    let not_found = || HttpError::NotFound("Download not found".to_string());
    let id = parse_id(&raw_id).ok_or_else(not_found)?;
    let job = state
        .store
        .get_for_session(id, &session.id)
        .await?
        .ok_or_else(not_found)?;
    Ok(Json(ProgressResponse::from(&job)))
}

/// Characters that would break a quoted `filename=` parameter become `_`.
fn attachment_name(path: &FsPath) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "download".to_string());
    name.chars()
        .map(|c| if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' { c } else { '_' })
        .collect()
}

// The stored path must still resolve inside the download directory.
async fn resolve_inside(state: &AppState, path: &FsPath) -> Option<std::path::PathBuf> {
    let root = tokio::fs::canonicalize(&state.config.download_dir).await.ok()?;
    let file = tokio::fs::canonicalize(path).await.ok()?;
    (file.starts_with(&root) && file.is_file()).then_some(file)
}

pub async fn download(
    State(state): State<SharedState>,
    Extension(session): Extension<Session>,
    Path(raw_id): Path<String>,
) -> Result<Response, PageError> {
    let id = parse_id(&raw_id).ok_or_else(|| PageError::not_found("Download not found."))?;
    let job = state
        .store
        .get_for_session(id, &session.id)
        .await?
        .ok_or_else(|| PageError::not_found("Download not found."))?;

    let stored = match (&job.file_path, job.file_available()) {
        (Some(p), true) => p.clone(),
        _ => return Err(PageError::not_found("File not available.")),
    };
    let path = resolve_inside(&state, &stored)
        .await
        .ok_or_else(|| PageError::not_found("File not found on disk."))?;

    let file = tokio::fs::File::open(&path).await.map_err(|e| {
        warn!(job_id = %id, "download: open failed: {e}");
        PageError::not_found("File not found on disk.")
    })?;
    let len = file.metadata().await.map(|m| m.len()).ok();

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(job.format.content_type()));
    let disposition = format!("attachment; filename=\"{}\"", attachment_name(&path));
    if let Ok(v) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, v);
    }
    if let Some(len) = len {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    }

    info!(job_id = %id, path = %path.display(), "download: serving file");
    let body = Body::from_stream(ReaderStream::new(file));
    Ok((StatusCode::OK, headers, body).into_response())
}

/// Removes a job's output directory and, if it lives elsewhere, its file.
pub async fn remove_job_files(state: &AppState, job: &DownloadJob) {
    let dir = state.job_dir(job.id);
    if let Some(file) = &job.file_path {
        if !file.starts_with(&dir) && file.starts_with(&state.config.download_dir) {
            if let Err(e) = tokio::fs::remove_file(file).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(job_id = %job.id, "could not remove {}: {e}", file.display());
                }
            }
        }
    }
    if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(job_id = %job.id, "could not remove {}: {e}", dir.display());
        }
    }
}

#[derive(Serialize)]
struct DeleteResponse {
    success: bool,
    message: String,
}

fn is_ajax(headers: &HeaderMap) -> bool {
    headers
        .get("x-requested-with")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("XMLHttpRequest"))
        .unwrap_or(false)
}

pub async fn delete(
    State(state): State<SharedState>,
    Extension(session): Extension<Session>,
    Path(raw_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let ajax = is_ajax(&headers);
    let not_found = || {
        if ajax {
            (
                StatusCode::NOT_FOUND,
                Json(DeleteResponse { success: false, message: "Download not found".to_string() }),
            )
                .into_response()
        } else {
            PageError::not_found("Download not found.").into_response()
        }
    };

    let Some(id) = parse_id(&raw_id) else {
        return not_found();
    };

    let owned = match state.store.get_for_session(id, &session.id).await {
        Ok(Some(_)) => true,
        Ok(None) => false,
        Err(e) => {
            return if ajax { HttpError::from(e).into_response() } else { PageError::from(e).into_response() };
        }
    };
    if !owned {
        return not_found();
    }

    let removed = match state.store.delete(id).await {
        Ok(Some(job)) => job,
        Ok(None) => return not_found(),
        Err(e) => {
            return if ajax { HttpError::from(e).into_response() } else { PageError::from(e).into_response() };
        }
    };
    remove_job_files(&state, &removed).await;
    info!(job_id = %id, "download deleted");

    if ajax {
        Json(DeleteResponse { success: true, message: "Download deleted successfully!".to_string() })
            .into_response()
    } else {
        Redirect::to("/?notice=deleted").into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attachment_name_is_header_safe() {
        assert_eq!(attachment_name(FsPath::new("/d/My_Song.mp3")), "My_Song.mp3");
        assert_eq!(attachment_name(FsPath::new("/d/a\"b\\c.mp4")), "a_b_c.mp4");
        assert_eq!(attachment_name(FsPath::new("/d/Ünïcode.mp4")), "_n_code.mp4");
    }

    #[test]
    fn ajax_header_detection() {
        let mut h = HeaderMap::new();
        assert!(!is_ajax(&h));
        h.insert("X-Requested-With", HeaderValue::from_static("XMLHttpRequest"));
        assert!(is_ajax(&h));
    }
}
