//! Error responses for the JSON routes and the HTML pages.

use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use jobstore::StoreError;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::pages;

/// Error type of the JSON endpoints.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            HttpError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            HttpError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            HttpError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, axum::Json(ErrorBody { error: message })).into_response()
    }
}

impl From<StoreError> for HttpError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => HttpError::NotFound("Download not found".to_string()),
            other => {
                error!("jobstore: {other}");
                HttpError::Internal("Internal server error".to_string())
            }
        }
    }
}

/// Error type of the HTML routes; renders the error page.
#[derive(Debug)]
pub struct PageError {
    pub status: StatusCode,
    pub title: String,
    pub message: String,
}

impl PageError {
    pub fn new(status: StatusCode, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "Not Found", message)
    }
}

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        (self.status, Html(pages::error_page(&self.title, &self.message))).into_response()
    }
}

impl From<StoreError> for PageError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => PageError::not_found("Download not found."),
            other => {
                error!("jobstore: {other}");
                PageError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Server Error",
                    "Something went wrong on our side. Please try again.",
                )
            }
        }
    }
}
