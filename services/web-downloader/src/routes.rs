use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::SharedState;
use crate::{hosts, routes_api, routes_jobs, routes_pages, session};

pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(routes_pages::index).post(routes_pages::submit))
        .route("/preview/", get(routes_pages::preview))
        .route("/progress/:id/", get(routes_jobs::progress))
        .route("/download/:id/", get(routes_jobs::download))
        .route("/delete/:id/", post(routes_jobs::delete))
        .route("/api/video-info/", get(routes_api::video_info))
        .route("/error/", get(routes_pages::error_view))
        .layer(middleware::from_fn_with_state(state.clone(), session::session_layer))
        .layer(middleware::from_fn_with_state(state.clone(), hosts::check_host))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
