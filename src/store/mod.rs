//! Persistence seam for studies, jobs, status history, job files and
//! registered public keys.
//!
//! `PgStudyStore` is the production backend; `InMemoryStudyStore` backs
//! unit tests and local development. Both honor the same contract:
//! status history is append-only, and `append_status` deduplicates on
//! `(study_job_id, status, preceding_status)` so concurrent duplicate
//! webhook deliveries cannot create two rows.

pub mod memory;
pub mod postgres;

pub use memory::InMemoryStudyStore;
pub use postgres::PgStudyStore;

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{JobContext, JobStatusChange, NewJobFile, StudyJobFile, UserPublicKey};
use crate::types::{FileType, JobStatus};

/// Result of attempting to append a status event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// A new row was written.
    Inserted,
    /// A concurrent writer already recorded the same transition; the
    /// losing writer treats this as success.
    AlreadyRecorded,
}

#[derive(Debug, Clone)]
pub struct NewStatusChange {
    pub study_job_id: Uuid,
    pub user_id: Option<Uuid>,
    pub status: JobStatus,
    pub preceding_status: Option<JobStatus>,
}

#[async_trait]
pub trait StudyStore: Send + Sync {
    /// The job joined with its study and org, or `None` if unknown.
    async fn find_job(&self, job_id: Uuid) -> Result<Option<JobContext>>;

    /// Last status event for the job, by `(created_at, id)` order.
    async fn last_status(&self, job_id: Uuid) -> Result<Option<JobStatus>>;

    /// Append a status event. Must be race-safe: two writers racing the
    /// same `(status, preceding_status)` pair produce exactly one row.
    async fn append_status(&self, change: NewStatusChange) -> Result<AppendOutcome>;

    /// Whether any event with this status was ever recorded for the job.
    async fn has_status(&self, job_id: Uuid, status: JobStatus) -> Result<bool>;

    /// Full ordered history for the job.
    async fn status_history(&self, job_id: Uuid) -> Result<Vec<JobStatusChange>>;

    async fn has_file_of_type(&self, job_id: Uuid, file_type: FileType) -> Result<bool>;

    /// Record a file attached to a job. Encrypted-log file types are
    /// constrained to at most one row per job; a duplicate insert is a
    /// silent no-op.
    async fn insert_job_file(&self, file: NewJobFile) -> Result<()>;

    async fn job_files(&self, job_id: Uuid) -> Result<Vec<StudyJobFile>>;

    // -- key registry persistence ------------------------------------

    async fn public_key_for_user(&self, user_id: Uuid) -> Result<Option<UserPublicKey>>;

    /// Insert or replace the user's registered key. The caller (the
    /// registry) is responsible for deciding whether replacement is
    /// permitted.
    async fn upsert_public_key(&self, key: UserPublicKey) -> Result<()>;

    /// Registered keys of every member of the org.
    async fn org_public_keys(&self, org_id: Uuid) -> Result<Vec<UserPublicKey>>;

    /// Connectivity probe for health checks.
    async fn ping(&self) -> Result<()>;
}
