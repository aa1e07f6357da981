use std::sync::Arc;

use anyhow::{Context, Result};
use jobstore::JobStore;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use web_downloader::worker_loop::{run_worker_loop, RESTART_REASON};
use web_downloader::{build_router, cleanup, AppConfig, AppState};
use ytdl::YtDlp;

const DEFAULT_FILTER: &str = "web_downloader=info,tower_http=info";

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)))
        .init();

    let cfg = AppConfig::from_env()?;
    if cfg.debug {
        warn!("DEBUG is on; do not run like this in production");
    }

    tokio::fs::create_dir_all(&cfg.download_dir)
        .await
        .with_context(|| format!("Failed to create download dir {}", cfg.download_dir.display()))?;

    let store = JobStore::open(&cfg.database_path)
        .await
        .context("Failed to open job database")?;
    store.ping().await.context("Job database ping failed")?;

    // RECOVERY: nothing from a previous run is still downloading.
    let recovered = store
        .fail_unfinished(RESTART_REASON)
        .await
        .context("Job recovery failed")?;
    if recovered > 0 {
        warn!(jobs = recovered, "marked unfinished jobs from previous run as failed");
    }

    let extractor = YtDlp::from_command_line(&cfg.ytdlp_path)
        .context("YTDLP_PATH is empty")?
        .with_metadata_timeout(cfg.metadata_timeout);
    match extractor.version().await {
        Ok(v) => info!(version = %v, "yt-dlp: ok"),
        Err(e) => warn!("yt-dlp not usable ({e}); downloads will fail until it is installed"),
    }

    let state = Arc::new(AppState::new(cfg.clone(), store, Arc::new(extractor)));
    let shutdown = CancellationToken::new();

    let worker = tokio::spawn(run_worker_loop(state.clone(), shutdown.clone()));
    let cleaner = tokio::spawn(cleanup::run_cleanup_loop(state.clone(), shutdown.clone()));

    let app = build_router(state);
    let listener = TcpListener::bind(&cfg.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", cfg.bind_addr))?;
    info!(addr = %cfg.bind_addr, "web-downloader listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await
        .context("HTTP server error")?;

    shutdown.cancel();
    let _ = tokio::join!(worker, cleaner);
    info!("web-downloader stopped");
    Ok(())
}

async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("ctrl-c handler failed: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                warn!("SIGTERM handler failed: {e}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
        _ = token.cancelled() => {}
    }
    info!("shutdown requested");
    token.cancel();
}
