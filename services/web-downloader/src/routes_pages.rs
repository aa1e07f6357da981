use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::{Extension, Form};
use jobstore::NewJob;
use serde::Deserialize;
use tracing::{info, warn};
use ytdl::validate_url;

use crate::error::PageError;
use crate::forms::{DownloadForm, FormErrors};
use crate::pages::{self, IndexView};
use crate::session::Session;
use crate::state::SharedState;

const RECENT_JOBS: u32 = 20;

#[derive(Deserialize, Default)]
pub struct IndexQuery {
    pub notice: Option<String>,
}

async fn render_index(
    state: &SharedState,
    session: &Session,
    form: &DownloadForm,
    errors: &FormErrors,
    notice: Option<&str>,
) -> Result<String, PageError> {
    let jobs = state.store.list_for_session(&session.id, RECENT_JOBS).await?;
    Ok(pages::index_page(&IndexView {
        form,
        errors,
        jobs: &jobs,
        notice,
        session_short: session.short_id(),
        retention: state.config.retention,
    }))
}

pub async fn index(
    State(state): State<SharedState>,
    Extension(session): Extension<Session>,
    Query(q): Query<IndexQuery>,
) -> Result<Html<String>, PageError> {
    let form = DownloadForm::with_url("");
    let html = render_index(&state, &session, &form, &FormErrors::default(), q.notice.as_deref()).await?;
    Ok(Html(html))
}

pub async fn submit(
    State(state): State<SharedState>,
    Extension(session): Extension<Session>,
    Form(form): Form<DownloadForm>,
) -> Result<Response, PageError> {
    let valid = match form.validate() {
        Ok(v) => v,
        Err(errors) => {
            let html = render_index(&state, &session, &form, &errors, None).await?;
            return Ok((StatusCode::BAD_REQUEST, Html(html)).into_response());
        }
    };

    let job = state
        .store
        .create(&NewJob::new(session.id.clone(), valid.url, valid.format, valid.quality))
        .await?;
    state.wake.notify_one();
    info!(job_id = %job.id, format = %job.format, quality = %job.quality, "download queued");

    Ok(Redirect::to("/?notice=started").into_response())
}

#[derive(Deserialize, Default)]
pub struct UrlQuery {
    #[serde(default)]
    pub url: String,
}

pub async fn preview(
    State(state): State<SharedState>,
    Query(q): Query<UrlQuery>,
) -> Result<Response, PageError> {
    if q.url.trim().is_empty() {
        return Ok(Redirect::to("/?notice=missing_url").into_response());
    }

    let url = validate_url(&q.url)
        .map_err(|e| PageError::new(StatusCode::BAD_REQUEST, "Invalid URL", e.to_string()))?;

    let meta = state.extractor.fetch_metadata(&url).await.map_err(|e| {
        warn!(%url, "preview: metadata fetch failed: {e}");
        PageError::new(
            StatusCode::NOT_FOUND,
            "Video Not Found",
            "Could not fetch video information. The video may be private, deleted, or the URL may be incorrect.",
        )
    })?;

    let form = DownloadForm::with_url(&url);
    Ok(Html(pages::preview_page(&meta, &form)).into_response())
}

#[derive(Deserialize, Default)]
pub struct ErrorQuery {
    pub title: Option<String>,
    pub message: Option<String>,
}

pub async fn error_view(Query(q): Query<ErrorQuery>) -> Html<String> {
    let title = q.title.filter(|t| !t.trim().is_empty()).unwrap_or_else(|| "Error".to_string());
    let message = q
        .message
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| "An unexpected error occurred.".to_string());
    Html(pages::error_page(&title, &message))
}
