//! HTTP API module for the backup service.

pub mod backup;
pub mod error;
pub mod health;
pub mod job_tracker;

use crate::backup::BackupOrchestrator;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<BackupOrchestrator>,
    pub job_tracker: job_tracker::JobTracker,
    /// Largest accepted request body, in bytes
    pub max_upload_bytes: usize,
}

/// Create shared application state
pub fn create_app_state(orchestrator: BackupOrchestrator, max_upload_mb: usize) -> AppState {
    AppState {
        orchestrator: Arc::new(orchestrator),
        job_tracker: job_tracker::JobTracker::new(),
        max_upload_bytes: max_upload_mb.saturating_mul(1024 * 1024),
    }
}

/// Create the API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    let body_limit = state.max_upload_bytes;

    Router::new()
        // Health endpoints
        .route("/health", get(health::health))
        .route("/version", get(health::version))
        // Backup endpoints
        .route("/api/admin/backup/download", get(backup::download_backup))
        .route("/api/admin/backup/restore", post(backup::restore_backup))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
