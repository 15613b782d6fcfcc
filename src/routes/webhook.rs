//! Status webhook for the external build/execution pipeline.
//!
//! The handler is staged (authenticate, validate, record, archive) and
//! each stage owns its failure mode. Only the recording stage can produce
//! a 500; archival failures are contained inside the tracker and never
//! reach the response.

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::json;
use tracing::error;

use crate::encryption::constant_time_eq;
use crate::models::{AppState, JobStatusPayload};
use crate::tracker::{JobStatusTracker, TrackerError};

const ROUTE: &str = "/api/services/job-status";

pub fn router(state: AppState) -> Router {
    Router::new().route(ROUTE, post(post_job_status)).with_state(state)
}

#[derive(Debug)]
enum WebhookError {
    Unauthorized,
    InvalidPayload { issues: Vec<String> },
    JobNotFound,
    Internal,
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        match self {
            Self::Unauthorized => {
                (StatusCode::UNAUTHORIZED, Json(json!({ "error": "unauthorized" })))
                    .into_response()
            }
            Self::InvalidPayload { issues } => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "invalid-payload", "issues": issues })),
            )
                .into_response(),
            Self::JobNotFound => {
                (StatusCode::NOT_FOUND, Json(json!({ "error": "job-not-found" })))
                    .into_response()
            }
            Self::Internal => {
                (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "internal-error" })))
                    .into_response()
            }
        }
    }
}

/// Bearer-token check against the shared pipeline secret, compared in
/// constant time. The secret value itself is never logged.
fn authorize(headers: &HeaderMap, secret: &str) -> Result<(), WebhookError> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(WebhookError::Unauthorized)?;

    if constant_time_eq(token.as_bytes(), secret.as_bytes()) {
        Ok(())
    } else {
        Err(WebhookError::Unauthorized)
    }
}

/// Two-phase parse: raw JSON first (so we can log what arrived), then the
/// typed payload, collecting the issue for the caller.
fn parse_payload(raw: &serde_json::Value) -> Result<JobStatusPayload, WebhookError> {
    serde_json::from_value(raw.clone()).map_err(|e| WebhookError::InvalidPayload {
        issues: vec![e.to_string()],
    })
}

async fn post_job_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, &'static str), WebhookError> {
    authorize(&headers, &state.config.webhook.secret)?;

    let raw: serde_json::Value = serde_json::from_slice(&body).map_err(|e| {
        WebhookError::InvalidPayload {
            issues: vec![format!("body is not valid JSON: {e}")],
        }
    })?;

    let payload = match parse_payload(&raw) {
        Ok(payload) => payload,
        Err(err) => {
            error!(route = ROUTE, body = %raw, "invalid webhook payload");
            return Err(err);
        }
    };

    let tracker = JobStatusTracker::new(state.store.clone(), state.objects.clone());
    match tracker
        .record_status(
            payload.job_id,
            payload.status,
            None,
            payload.plaintext_log.as_deref(),
        )
        .await
    {
        Ok(_) => Ok((StatusCode::OK, "ok")),
        Err(TrackerError::NotFound(job_id)) => {
            error!(route = ROUTE, job_id = %job_id, "webhook for unknown job");
            Err(WebhookError::JobNotFound)
        }
        Err(TrackerError::Store(store_error)) => {
            error!(
                route = ROUTE,
                body = %raw,
                error = %format!("{store_error:#}"),
                "error handling job-status POST"
            );
            Err(WebhookError::Internal)
        }
    }
}
