use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Router, routing::get, routing::post};
use tokio::net::TcpListener;
use tower_http::decompression::RequestDecompressionLayer;
use tracing::info;

use super::{
    services::{health, retry_downloads, session_status, start_downloads},
    state::AppState,
};
use crate::backend::YtDlpSource;
use crate::config::Config;
use crate::library::FsLibrary;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Build the application router. Shared with integration tests, which
/// supply an `AppState` wired to mock collaborators.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/downloads/start", post(start_downloads))
        .route("/downloads/retry", post(retry_downloads))
        .route("/downloads/status/session", get(session_status))
        .route("/health", get(health))
        .with_state(state)
        // Automatically decompress gzip/deflate/brotli request bodies
        .layer(RequestDecompressionLayer::new())
}

pub async fn run(address: Option<SocketAddr>) -> Result<(), AnyError> {
    info!("Loading configuration");
    let config = Config::load().map_err(|e| format!("Failed to load config: {}", e))?;

    info!(media_dir = %config.library.media_dir.display(), "Opening media library");
    let library = Arc::new(
        FsLibrary::open(&config.library)
            .await
            .map_err(|e| format!("Failed to open media library: {}", e))?,
    );

    let source = Arc::new(YtDlpSource::new(&config.media));

    let address = address.unwrap_or(config.server.bind_addr);
    let state = AppState::new(config, source, library);
    let app = router(state);

    let listener = TcpListener::bind(address).await?;
    info!(%address, "Songbox API listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = signal(SignalKind::terminate())
            .expect("failed to install signal handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
