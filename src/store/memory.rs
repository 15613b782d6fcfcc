use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::{AppendOutcome, NewStatusChange, StudyStore};
use crate::models::{JobContext, JobStatusChange, NewJobFile, StudyJobFile, UserPublicKey};
use crate::types::{FileType, JobStatus};

/// In-memory store for unit tests and local development. A single mutex
/// makes the check-and-insert in `append_status` atomic, mirroring the
/// uniqueness constraint the Postgres backend relies on.
#[derive(Default)]
pub struct InMemoryStudyStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    jobs: HashMap<Uuid, JobContext>,
    changes: Vec<JobStatusChange>,
    files: Vec<StudyJobFile>,
    keys: HashMap<Uuid, UserPublicKey>,
    org_members: HashMap<Uuid, Vec<Uuid>>,
    next_change_id: i64,
}

impl InMemoryStudyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job (with its study/org context) so the tracker can
    /// find it.
    pub fn seed_job(&self, context: JobContext) {
        let mut inner = self.inner.lock().unwrap();
        inner.jobs.insert(context.job_id, context);
    }

    /// Register a user as a member of an org, so their key is returned
    /// by `org_public_keys`.
    pub fn seed_org_member(&self, org_id: Uuid, user_id: Uuid) {
        let mut inner = self.inner.lock().unwrap();
        inner.org_members.entry(org_id).or_default().push(user_id);
    }
}

#[async_trait]
impl StudyStore for InMemoryStudyStore {
    async fn find_job(&self, job_id: Uuid) -> Result<Option<JobContext>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.jobs.get(&job_id).cloned())
    }

    async fn last_status(&self, job_id: Uuid) -> Result<Option<JobStatus>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .changes
            .iter()
            .filter(|c| c.study_job_id == job_id)
            .next_back()
            .map(|c| c.status))
    }

    async fn append_status(&self, change: NewStatusChange) -> Result<AppendOutcome> {
        let mut inner = self.inner.lock().unwrap();

        let duplicate = inner.changes.iter().any(|c| {
            c.study_job_id == change.study_job_id
                && c.status == change.status
                && c.preceding_status == change.preceding_status
        });
        if duplicate {
            return Ok(AppendOutcome::AlreadyRecorded);
        }

        inner.next_change_id += 1;
        let id = inner.next_change_id;
        inner.changes.push(JobStatusChange {
            id,
            study_job_id: change.study_job_id,
            user_id: change.user_id,
            status: change.status,
            preceding_status: change.preceding_status,
            created_at: Utc::now(),
        });
        Ok(AppendOutcome::Inserted)
    }

    async fn has_status(&self, job_id: Uuid, status: JobStatus) -> Result<bool> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .changes
            .iter()
            .any(|c| c.study_job_id == job_id && c.status == status))
    }

    async fn status_history(&self, job_id: Uuid) -> Result<Vec<JobStatusChange>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .changes
            .iter()
            .filter(|c| c.study_job_id == job_id)
            .cloned()
            .collect())
    }

    async fn has_file_of_type(&self, job_id: Uuid, file_type: FileType) -> Result<bool> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .files
            .iter()
            .any(|f| f.study_job_id == job_id && f.file_type == file_type))
    }

    async fn insert_job_file(&self, file: NewJobFile) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();

        // At most one encrypted log of each kind per job, matching the
        // partial unique index in the Postgres schema.
        let constrained = matches!(
            file.file_type,
            FileType::EncryptedLog | FileType::EncryptedSecurityScanLog
        );
        if constrained
            && inner
                .files
                .iter()
                .any(|f| f.study_job_id == file.study_job_id && f.file_type == file.file_type)
        {
            return Ok(());
        }

        inner.files.push(StudyJobFile {
            id: Uuid::new_v4(),
            study_job_id: file.study_job_id,
            name: file.name,
            path: file.path,
            file_type: file.file_type,
        });
        Ok(())
    }

    async fn job_files(&self, job_id: Uuid) -> Result<Vec<StudyJobFile>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .files
            .iter()
            .filter(|f| f.study_job_id == job_id)
            .cloned()
            .collect())
    }

    async fn public_key_for_user(&self, user_id: Uuid) -> Result<Option<UserPublicKey>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.keys.get(&user_id).cloned())
    }

    async fn upsert_public_key(&self, key: UserPublicKey) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.keys.insert(key.user_id, key);
        Ok(())
    }

    async fn org_public_keys(&self, org_id: Uuid) -> Result<Vec<UserPublicKey>> {
        let inner = self.inner.lock().unwrap();
        let members = inner.org_members.get(&org_id).cloned().unwrap_or_default();
        Ok(members
            .iter()
            .filter_map(|user_id| inner.keys.get(user_id).cloned())
            .collect())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
