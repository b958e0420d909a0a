//! API routes configuration

use std::sync::Arc;
use std::time::Instant;

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::trace::TraceLayer;

use super::handlers::{
    get_status, health_check, post_interface, post_module, post_scan, put_log_level,
};
use crate::core::config::AppConfig;
use crate::service::SbbClient;

/// Shared handler state
#[derive(Debug, Clone)]
pub struct AppState {
    pub client: SbbClient,
    pub config: Arc<AppConfig>,
    pub started: Instant,
}

impl AppState {
    pub fn new(client: SbbClient, config: Arc<AppConfig>) -> Self {
        Self {
            client,
            config,
            started: Instant::now(),
        }
    }
}

/// Create API routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/status", get(get_status))
        .route("/interface", post(post_interface))
        .route("/module", post(post_module))
        .route("/scan", post(post_scan))
        .route("/loglevel", put(put_log_level))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
