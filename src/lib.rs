// Study Conductor - coordination service for multi-party research-study workflows

pub mod config;
pub mod db;
pub mod encryption; // multi-recipient envelope encryption for study artifacts
pub mod labels;
pub mod models;
pub mod registry;
pub mod routes;
pub mod storage;
pub mod store;
pub mod tracker;
pub mod types;

// Re-exports for convenience
pub use config::Config;
pub use models::AppState;

pub fn create_router(state: AppState) -> axum::Router {
    routes::create_router(state)
}
