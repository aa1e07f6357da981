use axum::extract::{Request, State};
use axum::http::header::HOST;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::warn;

use crate::error::PageError;
use crate::state::SharedState;

/// Rejects requests whose `Host` is not in `ALLOWED_HOSTS` with 400.
pub async fn check_host(State(state): State<SharedState>, req: Request, next: Next) -> Response {
    let host = req
        .headers()
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| req.uri().authority().map(|a| a.to_string()))
        .unwrap_or_default();

    if !state.config.host_allowed(&host) {
        warn!(host = %host, "rejected request for disallowed host");
        return PageError::new(
            StatusCode::BAD_REQUEST,
            "Bad Request (400)",
            "The requested host is not allowed.",
        )
        .into_response();
    }

    next.run(req).await
}
