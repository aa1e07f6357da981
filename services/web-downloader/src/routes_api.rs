use axum::extract::{Query, State};
use axum::Json;
use tracing::warn;
use ytdl::{validate_url, VideoMetadata};

use crate::error::HttpError;
use crate::routes_pages::UrlQuery;
use crate::state::SharedState;

/// `GET /api/video-info/?url=`: metadata only, nothing is queued.
pub async fn video_info(
    State(state): State<SharedState>,
    Query(q): Query<UrlQuery>,
) -> Result<Json<VideoMetadata>, HttpError> {
    if q.url.trim().is_empty() {
        return Err(HttpError::BadRequest("URL is required".to_string()));
    }
    let url = validate_url(&q.url).map_err(|e| HttpError::BadRequest(e.to_string()))?;

    match state.extractor.fetch_metadata(&url).await {
        Ok(meta) => Ok(Json(meta)),
        Err(e) => {
            warn!(%url, category = e.category().as_str(), "video-info: {e}");
            Err(HttpError::NotFound("Could not fetch video information".to_string()))
        }
    }
}
