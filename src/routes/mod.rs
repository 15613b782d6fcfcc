//! API Routes
//!
//! - `POST /api/services/job-status` - pipeline status webhook
//! - `GET /api/jobs/{job_id}/status` - resolved status label per audience
//! - `GET /api/health` - health check

pub mod health;
pub mod status;
pub mod webhook;

use crate::models::AppState;
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    info!("Creating application router");

    Router::new()
        .merge(webhook::router(state.clone()))
        .merge(status::router(state.clone()))
        .merge(health::router(state))
        .layer(TraceLayer::new_for_http())
}
