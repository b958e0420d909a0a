//! JSON API over HTTP

pub mod dto;
pub mod handlers;
pub mod routes;

use std::net::SocketAddr;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::core::config::ApiConfig;
use crate::error::{Result, SbbError};

pub use routes::{create_router, AppState};

/// Serve the API until `shutdown` is cancelled
pub async fn serve(
    api: &ApiConfig,
    port: u16,
    state: AppState,
    shutdown: CancellationToken,
) -> Result<()> {
    let addr: SocketAddr = format!("{}:{port}", api.bind_host())
        .parse()
        .map_err(|e| SbbError::config(format!("Invalid API address: {e}")))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| SbbError::config(format!("Failed to bind API on {addr}: {e}")))?;

    info!("JSON API listening on {addr}");
    info!("  GET  /health, /status");
    info!("  POST /interface, /module, /scan");
    info!("  PUT  /loglevel");

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| SbbError::internal(format!("API server error: {e}")))
}
