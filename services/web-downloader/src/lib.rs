pub mod cleanup;
pub mod config;
pub mod error;
pub mod forms;
pub mod hosts;
pub mod pages;
pub mod routes;
pub mod routes_api;
pub mod routes_jobs;
pub mod routes_pages;
pub mod session;
pub mod state;
pub mod worker_loop;

pub use config::AppConfig;
pub use routes::build_router;
pub use state::{AppState, SharedState};
