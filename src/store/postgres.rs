use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::{AppendOutcome, NewStatusChange, StudyStore};
use crate::models::{JobContext, JobStatusChange, NewJobFile, StudyJobFile, UserPublicKey};
use crate::types::{FileType, JobStatus};

/// Postgres-backed store. Uses runtime-checked queries so the crate
/// compiles without a live DATABASE_URL.
pub struct PgStudyStore {
    pool: PgPool,
}

impl PgStudyStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct JobContextRow {
    job_id: Uuid,
    study_id: Uuid,
    study_status: String,
    researcher_id: Uuid,
    org_id: Uuid,
    org_slug: String,
}

#[derive(sqlx::FromRow)]
struct StatusChangeRow {
    id: i64,
    study_job_id: Uuid,
    user_id: Option<Uuid>,
    status: String,
    preceding_status: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(sqlx::FromRow)]
struct JobFileRow {
    id: Uuid,
    study_job_id: Uuid,
    name: String,
    path: String,
    file_type: String,
}

#[derive(sqlx::FromRow)]
struct PublicKeyRow {
    user_id: Uuid,
    public_key: Vec<u8>,
    fingerprint: String,
}

fn parse_status(raw: &str) -> Result<JobStatus> {
    raw.parse::<JobStatus>()
        .map_err(|e| anyhow::anyhow!("corrupt status row: {e}"))
}

impl TryFrom<StatusChangeRow> for JobStatusChange {
    type Error = anyhow::Error;

    fn try_from(row: StatusChangeRow) -> Result<Self> {
        Ok(JobStatusChange {
            id: row.id,
            study_job_id: row.study_job_id,
            user_id: row.user_id,
            status: parse_status(&row.status)?,
            preceding_status: row.preceding_status.as_deref().map(parse_status).transpose()?,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl StudyStore for PgStudyStore {
    async fn find_job(&self, job_id: Uuid) -> Result<Option<JobContext>> {
        let row = sqlx::query_as::<_, JobContextRow>(
            r#"
            SELECT sj.id AS job_id,
                   s.id AS study_id,
                   s.status AS study_status,
                   s.researcher_id,
                   o.id AS org_id,
                   o.slug AS org_slug
            FROM study_jobs sj
            INNER JOIN studies s ON s.id = sj.study_id
            INNER JOIN orgs o ON o.id = s.org_id
            WHERE sj.id = $1
            "#,
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| {
            Ok(JobContext {
                job_id: r.job_id,
                study_id: r.study_id,
                study_status: r
                    .study_status
                    .parse()
                    .map_err(|e| anyhow::anyhow!("corrupt study status: {e}"))?,
                researcher_id: r.researcher_id,
                org_id: r.org_id,
                org_slug: r.org_slug,
            })
        })
        .transpose()
    }

    async fn last_status(&self, job_id: Uuid) -> Result<Option<JobStatus>> {
        let raw: Option<String> = sqlx::query_scalar(
            r#"
            SELECT status FROM job_status_changes
            WHERE study_job_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;

        raw.as_deref().map(parse_status).transpose()
    }

    async fn append_status(&self, change: NewStatusChange) -> Result<AppendOutcome> {
        // The unique index on (study_job_id, status, preceding_status)
        // makes the losing side of a concurrent duplicate a no-op.
        let result = sqlx::query(
            r#"
            INSERT INTO job_status_changes (study_job_id, user_id, status, preceding_status)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(change.study_job_id)
        .bind(change.user_id)
        .bind(change.status.as_str())
        .bind(change.preceding_status.map(|s| s.as_str()))
        .execute(&self.pool)
        .await
        .context("inserting job status change")?;

        if result.rows_affected() == 0 {
            Ok(AppendOutcome::AlreadyRecorded)
        } else {
            Ok(AppendOutcome::Inserted)
        }
    }

    async fn has_status(&self, job_id: Uuid, status: JobStatus) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM job_status_changes
                WHERE study_job_id = $1 AND status = $2
            )
            "#,
        )
        .bind(job_id)
        .bind(status.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn status_history(&self, job_id: Uuid) -> Result<Vec<JobStatusChange>> {
        let rows = sqlx::query_as::<_, StatusChangeRow>(
            r#"
            SELECT id, study_job_id, user_id, status, preceding_status, created_at
            FROM job_status_changes
            WHERE study_job_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(JobStatusChange::try_from).collect()
    }

    async fn has_file_of_type(&self, job_id: Uuid, file_type: FileType) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM study_job_files
                WHERE study_job_id = $1 AND file_type = $2
            )
            "#,
        )
        .bind(job_id)
        .bind(file_type.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn insert_job_file(&self, file: NewJobFile) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO study_job_files (study_job_id, name, path, file_type)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(file.study_job_id)
        .bind(&file.name)
        .bind(&file.path)
        .bind(file.file_type.as_str())
        .execute(&self.pool)
        .await
        .context("inserting study job file")?;

        Ok(())
    }

    async fn job_files(&self, job_id: Uuid) -> Result<Vec<StudyJobFile>> {
        let rows = sqlx::query_as::<_, JobFileRow>(
            r#"
            SELECT id, study_job_id, name, path, file_type
            FROM study_job_files
            WHERE study_job_id = $1
            ORDER BY name ASC
            "#,
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| {
                Ok(StudyJobFile {
                    id: r.id,
                    study_job_id: r.study_job_id,
                    name: r.name,
                    path: r.path,
                    file_type: r
                        .file_type
                        .parse()
                        .map_err(|e| anyhow::anyhow!("corrupt file type: {e}"))?,
                })
            })
            .collect()
    }

    async fn public_key_for_user(&self, user_id: Uuid) -> Result<Option<UserPublicKey>> {
        let row = sqlx::query_as::<_, PublicKeyRow>(
            r#"
            SELECT user_id, public_key, fingerprint
            FROM user_public_keys
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| UserPublicKey {
            user_id: r.user_id,
            public_key: r.public_key,
            fingerprint: r.fingerprint,
        }))
    }

    async fn upsert_public_key(&self, key: UserPublicKey) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_public_keys (user_id, public_key, fingerprint)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id) DO UPDATE
            SET public_key = EXCLUDED.public_key,
                fingerprint = EXCLUDED.fingerprint,
                updated_at = NOW()
            "#,
        )
        .bind(key.user_id)
        .bind(&key.public_key)
        .bind(&key.fingerprint)
        .execute(&self.pool)
        .await
        .context("upserting user public key")?;

        Ok(())
    }

    async fn org_public_keys(&self, org_id: Uuid) -> Result<Vec<UserPublicKey>> {
        let rows = sqlx::query_as::<_, PublicKeyRow>(
            r#"
            SELECT upk.user_id, upk.public_key, upk.fingerprint
            FROM user_public_keys upk
            INNER JOIN org_users ou ON ou.user_id = upk.user_id
            WHERE ou.org_id = $1
            ORDER BY upk.fingerprint ASC
            "#,
        )
        .bind(org_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| UserPublicKey {
                user_id: r.user_id,
                public_key: r.public_key,
                fingerprint: r.fingerprint,
            })
            .collect())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }
}
