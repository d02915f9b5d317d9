//! HTTP server lifecycle: open storage, bind, serve until signalled.

use anyhow::{Context, Result};
use chunkstore::{StorageConfig, VersionedFileStore};
use tracing::info;

use crate::http::{self, AppState};

/// Server configuration
pub struct ServeConfig {
    pub host: String,
    pub port: u16,
    pub body_limit: usize,
    pub storage: StorageConfig,
}

/// Run the file service
pub async fn run(config: ServeConfig) -> Result<()> {
    info!("chunkdrive starting");
    info!("   Storage: {}", config.storage.base_path.display());
    info!("   Chunk size: {} bytes", config.storage.chunk_size);
    if config.storage.read_only {
        info!("   Read-only mode");
    }

    let store = VersionedFileStore::open(&config.storage).with_context(|| {
        format!(
            "failed to open storage at {}",
            config.storage.base_path.display()
        )
    })?;
    let app = http::router(AppState::new(store), config.body_limit);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("chunkdrive ready on http://{}", addr);
    info!("   Files: GET http://{}/api/files", addr);
    info!("   Upload: POST http://{}/api/upload", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received SIGINT, shutting down...");
        }
        _ = terminate() => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            tracing::warn!("Failed to install SIGTERM handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}
