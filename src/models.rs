use std::sync::Arc;

use crate::config::Config;
use crate::storage::ObjectStore;
use crate::store::StudyStore;
use crate::types::{FileType, JobStatus, StudyStatus};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn StudyStore>,
    pub objects: Arc<dyn ObjectStore>,
    pub config: Config,
}

// Core models. The store layer reads status columns as text and converts
// to the enums here, so the crate builds without DATABASE_URL at compile
// time.

/// One immutable audit event in a job's lifecycle. Rows are append-only;
/// total order is `(created_at, id)`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct JobStatusChange {
    pub id: i64,
    pub study_job_id: uuid::Uuid,
    pub user_id: Option<uuid::Uuid>,
    pub status: JobStatus,
    pub preceding_status: Option<JobStatus>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct StudyJobFile {
    pub id: uuid::Uuid,
    pub study_job_id: uuid::Uuid,
    pub name: String,
    pub path: String,
    pub file_type: FileType,
}

#[derive(Debug, Clone)]
pub struct NewJobFile {
    pub study_job_id: uuid::Uuid,
    pub name: String,
    pub path: String,
    pub file_type: FileType,
}

/// A registered public key. `public_key` holds the SPKI DER bytes the
/// fingerprint was computed from.
#[derive(Debug, Clone)]
pub struct UserPublicKey {
    pub user_id: uuid::Uuid,
    pub public_key: Vec<u8>,
    pub fingerprint: String,
}

/// The job joined with its owning study and org, as every tracker
/// operation needs it.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub job_id: uuid::Uuid,
    pub study_id: uuid::Uuid,
    pub study_status: StudyStatus,
    pub researcher_id: uuid::Uuid,
    pub org_id: uuid::Uuid,
    pub org_slug: String,
}

// API request/response types

/// Body of the pipeline status webhook. Unknown extra fields are ignored,
/// matching the tolerant parsing of the services that already call us.
#[derive(Debug, serde::Deserialize)]
pub struct JobStatusPayload {
    #[serde(rename = "jobId")]
    pub job_id: uuid::Uuid,
    pub status: JobStatus,
    #[serde(rename = "plaintextLog")]
    pub plaintext_log: Option<String>,
}

#[derive(Debug, serde::Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub database: String,
}
