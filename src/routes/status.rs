//! Resolved status labels for display layers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::error;
use uuid::Uuid;

use crate::labels::resolve_status_label;
use crate::models::AppState;
use crate::types::Audience;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/jobs/{job_id}/status", get(get_job_status))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct StatusQuery {
    audience: Audience,
}

async fn get_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
    Query(query): Query<StatusQuery>,
) -> Response {
    let job = match state.store.find_job(job_id).await {
        Ok(Some(job)) => job,
        Ok(None) => {
            return (StatusCode::NOT_FOUND, Json(json!({ "error": "job-not-found" })))
                .into_response()
        }
        Err(store_error) => {
            error!(job_id = %job_id, error = %format!("{store_error:#}"), "loading job for status display");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "internal-error" })),
            )
                .into_response();
        }
    };

    let history = match state.store.status_history(job_id).await {
        Ok(history) => history.into_iter().map(|c| c.status).collect::<Vec<_>>(),
        Err(store_error) => {
            error!(job_id = %job_id, error = %format!("{store_error:#}"), "loading status history");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "internal-error" })),
            )
                .into_response();
        }
    };

    let label = resolve_status_label(job.study_status, &history, query.audience);
    Json(label).into_response()
}
