//! Study-job lifecycle tracking.
//!
//! `JobStatusTracker` is what the pipeline webhook drives: it records
//! status transitions idempotently and, on build failures, archives the
//! error log as an encrypted bundle for the org's reviewers. The archival
//! sub-step is strictly best-effort: it can never fail or roll back the
//! status write itself.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::encryption::BundleWriter;
use crate::models::{JobContext, NewJobFile};
use crate::registry::KeyFingerprintRegistry;
use crate::storage::{self, ObjectStore};
use crate::store::{AppendOutcome, NewStatusChange, StudyStore};
use crate::types::{FileType, JobStatus};

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("study job {0} not found")]
    NotFound(Uuid),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// A new status event was appended.
    Recorded,
    /// The job was already in this status; nothing was written.
    AlreadyCurrent,
}

pub struct JobStatusTracker {
    store: Arc<dyn StudyStore>,
    objects: Arc<dyn ObjectStore>,
    registry: KeyFingerprintRegistry,
}

impl JobStatusTracker {
    pub fn new(store: Arc<dyn StudyStore>, objects: Arc<dyn ObjectStore>) -> Self {
        let registry = KeyFingerprintRegistry::new(store.clone());
        Self {
            store,
            objects,
            registry,
        }
    }

    /// Record a lifecycle transition for a job.
    ///
    /// Re-submitting the job's current status is a no-op. Concurrent
    /// duplicate deliveries are resolved by the store's uniqueness rule
    /// on `(job, status, preceding_status)`; a losing writer sees
    /// `Recorded` like everyone else. Events with no explicit actor are
    /// attributed to the study's researcher, since the pipeline itself
    /// has no user.
    pub async fn record_status(
        &self,
        job_id: Uuid,
        status: JobStatus,
        actor_id: Option<Uuid>,
        plaintext_log: Option<&str>,
    ) -> Result<RecordOutcome, TrackerError> {
        let job = self
            .store
            .find_job(job_id)
            .await?
            .ok_or(TrackerError::NotFound(job_id))?;

        let last = self.store.last_status(job_id).await?;

        let outcome = if last == Some(status) {
            debug!(job_id = %job_id, status = %status, "status unchanged, skipping write");
            RecordOutcome::AlreadyCurrent
        } else {
            if let Some(prev) = last.filter(|s| s.is_terminal()) {
                warn!(
                    job_id = %job_id,
                    last = %prev,
                    status = %status,
                    "recording status after a terminal state"
                );
            }
            let appended = self
                .store
                .append_status(NewStatusChange {
                    study_job_id: job_id,
                    user_id: actor_id.or(Some(job.researcher_id)),
                    status,
                    preceding_status: last,
                })
                .await?;
            if appended == AppendOutcome::AlreadyRecorded {
                debug!(job_id = %job_id, status = %status, "lost duplicate-insert race, treating as recorded");
            }
            RecordOutcome::Recorded
        };

        // Best-effort log archival. Isolated from the status write above:
        // any failure is logged with its context and swallowed.
        if let Some(log) = plaintext_log {
            self.maybe_archive_log(&job, status, log).await;
        }

        Ok(outcome)
    }

    async fn maybe_archive_log(&self, job: &JobContext, status: JobStatus, log: &str) {
        let result = match status {
            JobStatus::JobErrored => {
                self.archive_log(job, log, FileType::EncryptedLog, "error-log.txt", true)
                    .await
            }
            JobStatus::CodeScanned => {
                self.archive_log(
                    job,
                    log,
                    FileType::EncryptedSecurityScanLog,
                    "security-scan-log.txt",
                    false,
                )
                .await
            }
            _ => return,
        };

        if let Err(archive_error) = result {
            error!(
                job_id = %job.job_id,
                study_id = %job.study_id,
                org_id = %job.org_id,
                error = %format!("{archive_error:#}"),
                "failed to encrypt and store log; status write is unaffected"
            );
        }
    }

    /// Encrypt `log` for the org's reviewers and persist it as a job file.
    ///
    /// Skipped when a file of this type already exists for the job. Error
    /// logs are additionally skipped when the job ever reached JOB-READY:
    /// from that point on the enclave produces its own logs, and this
    /// build-failure path no longer applies. (The guard asks "did any
    /// JOB-READY event exist", not "did one precede this error".)
    async fn archive_log(
        &self,
        job: &JobContext,
        log: &str,
        file_type: FileType,
        entry_name: &str,
        suppress_after_ready: bool,
    ) -> anyhow::Result<()> {
        if suppress_after_ready && self.store.has_status(job.job_id, JobStatus::JobReady).await? {
            debug!(job_id = %job.job_id, "job reached JOB-READY, skipping log archival");
            return Ok(());
        }
        if self.store.has_file_of_type(job.job_id, file_type).await? {
            debug!(job_id = %job.job_id, file_type = %file_type, "log already archived");
            return Ok(());
        }

        let recipients = self.registry.lookup_keys_for_org(job.org_id).await?;
        if recipients.is_empty() {
            warn!(
                job_id = %job.job_id,
                org_id = %job.org_id,
                "no registered recipient keys; cannot archive encrypted log"
            );
            return Ok(());
        }

        let file_name = match file_type {
            FileType::EncryptedSecurityScanLog => "encrypted-scan-logs.zip",
            _ => "encrypted-logs.zip",
        };

        let mut writer = BundleWriter::new(&recipients)?;
        writer.add_entry(entry_name, log.as_bytes());
        let bundle = writer.finish()?;

        let path = storage::study_job_file_path(&job.org_slug, job.study_id, job.job_id, file_name);
        self.objects.put(&path, &bundle).await?;

        self.store
            .insert_job_file(NewJobFile {
                study_job_id: job.job_id,
                name: file_name.to_string(),
                path,
                file_type,
            })
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encryption::keys::{generate_key_pair, public_key_to_der};
    use crate::encryption::{open_bundle, RsaKeyPair};
    use crate::models::UserPublicKey;
    use crate::storage::LocalObjectStore;
    use crate::store::InMemoryStudyStore;
    use crate::types::StudyStatus;
    use tempfile::TempDir;

    struct Fixture {
        tracker: Arc<JobStatusTracker>,
        store: Arc<InMemoryStudyStore>,
        objects: Arc<LocalObjectStore>,
        job: JobContext,
        _dir: TempDir,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(InMemoryStudyStore::new());
        let objects = Arc::new(LocalObjectStore::new(dir.path()));

        let job = JobContext {
            job_id: Uuid::new_v4(),
            study_id: Uuid::new_v4(),
            study_status: StudyStatus::Approved,
            researcher_id: Uuid::new_v4(),
            org_id: Uuid::new_v4(),
            org_slug: "open-lab".to_string(),
        };
        store.seed_job(job.clone());

        let tracker = Arc::new(JobStatusTracker::new(
            store.clone() as Arc<dyn StudyStore>,
            objects.clone() as Arc<dyn ObjectStore>,
        ));
        Fixture {
            tracker,
            store,
            objects,
            job,
            _dir: dir,
        }
    }

    async fn register_member(fx: &Fixture) -> RsaKeyPair {
        let pair = generate_key_pair().unwrap();
        let der = public_key_to_der(&pair.public_key).unwrap();
        let user_id = Uuid::new_v4();
        fx.store.seed_org_member(fx.job.org_id, user_id);
        fx.store
            .upsert_public_key(UserPublicKey {
                user_id,
                public_key: der.clone(),
                fingerprint: crate::encryption::fingerprint_public_key_der(&der),
            })
            .await
            .unwrap();
        pair
    }

    async fn history_of(fx: &Fixture) -> Vec<JobStatus> {
        fx.store
            .status_history(fx.job.job_id)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.status)
            .collect()
    }

    #[tokio::test]
    async fn repeated_status_is_recorded_once() {
        let fx = fixture();

        let first = fx
            .tracker
            .record_status(fx.job.job_id, JobStatus::JobPackaging, None, None)
            .await
            .unwrap();
        assert_eq!(first, RecordOutcome::Recorded);

        for _ in 0..3 {
            let again = fx
                .tracker
                .record_status(fx.job.job_id, JobStatus::JobPackaging, None, None)
                .await
                .unwrap();
            assert_eq!(again, RecordOutcome::AlreadyCurrent);
        }

        assert_eq!(history_of(&fx).await, vec![JobStatus::JobPackaging]);
    }

    #[tokio::test]
    async fn transitions_append_with_preceding_status() {
        let fx = fixture();

        for status in [
            JobStatus::Initiated,
            JobStatus::CodeSubmitted,
            JobStatus::JobPackaging,
        ] {
            fx.tracker
                .record_status(fx.job.job_id, status, None, None)
                .await
                .unwrap();
        }

        let history = fx.store.status_history(fx.job.job_id).await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].preceding_status, None);
        assert_eq!(history[1].preceding_status, Some(JobStatus::Initiated));
        assert_eq!(history[2].preceding_status, Some(JobStatus::CodeSubmitted));
        // Pipeline events are attributed to the researcher.
        assert_eq!(history[0].user_id, Some(fx.job.researcher_id));
    }

    #[tokio::test]
    async fn unknown_job_is_not_found() {
        let fx = fixture();
        let result = fx
            .tracker
            .record_status(Uuid::new_v4(), JobStatus::JobPackaging, None, None)
            .await;
        assert!(matches!(result, Err(TrackerError::NotFound(_))));
        assert!(history_of(&fx).await.is_empty());
    }

    #[tokio::test]
    async fn errored_job_archives_one_log_for_all_recipients() {
        let fx = fixture();
        let alice = register_member(&fx).await;
        let bob = register_member(&fx).await;

        fx.tracker
            .record_status(
                fx.job.job_id,
                JobStatus::JobErrored,
                None,
                Some("Build failed during code packaging."),
            )
            .await
            .unwrap();

        let files = fx.store.job_files(fx.job.job_id).await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].file_type, FileType::EncryptedLog);

        let bundle = fx.objects.get(&files[0].path).await.unwrap();
        for pair in [&alice, &bob] {
            let entries = open_bundle(&bundle, &pair.private_key).unwrap();
            assert_eq!(
                entries["error-log.txt"],
                b"Build failed during code packaging."
            );
        }

        let outsider = generate_key_pair().unwrap();
        assert!(open_bundle(&bundle, &outsider.private_key).is_err());
    }

    #[tokio::test]
    async fn repeated_errored_delivery_does_not_duplicate_the_log() {
        let fx = fixture();
        register_member(&fx).await;

        for _ in 0..2 {
            fx.tracker
                .record_status(fx.job.job_id, JobStatus::JobErrored, None, Some("boom"))
                .await
                .unwrap();
        }

        let files = fx.store.job_files(fx.job.job_id).await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(history_of(&fx).await, vec![JobStatus::JobErrored]);
    }

    #[tokio::test]
    async fn log_archival_is_suppressed_once_job_reached_ready() {
        let fx = fixture();
        register_member(&fx).await;

        fx.tracker
            .record_status(fx.job.job_id, JobStatus::JobReady, None, None)
            .await
            .unwrap();
        fx.tracker
            .record_status(fx.job.job_id, JobStatus::JobErrored, None, Some("boom"))
            .await
            .unwrap();

        assert!(fx.store.job_files(fx.job.job_id).await.unwrap().is_empty());
        assert_eq!(
            history_of(&fx).await,
            vec![JobStatus::JobReady, JobStatus::JobErrored]
        );
    }

    #[tokio::test]
    async fn missing_recipients_skip_archival_but_record_status() {
        let fx = fixture();

        fx.tracker
            .record_status(fx.job.job_id, JobStatus::JobErrored, None, Some("boom"))
            .await
            .unwrap();

        assert!(fx.store.job_files(fx.job.job_id).await.unwrap().is_empty());
        assert_eq!(history_of(&fx).await, vec![JobStatus::JobErrored]);
    }

    #[tokio::test]
    async fn corrupt_recipient_key_never_blocks_the_status_write() {
        let fx = fixture();

        // A member whose stored key bytes are garbage: encryption will
        // fail, the status write must not.
        let user_id = Uuid::new_v4();
        fx.store.seed_org_member(fx.job.org_id, user_id);
        fx.store
            .upsert_public_key(UserPublicKey {
                user_id,
                public_key: b"corrupted".to_vec(),
                fingerprint: "bogus".to_string(),
            })
            .await
            .unwrap();

        let outcome = fx
            .tracker
            .record_status(fx.job.job_id, JobStatus::JobErrored, None, Some("boom"))
            .await
            .unwrap();
        assert_eq!(outcome, RecordOutcome::Recorded);
        assert!(fx.store.job_files(fx.job.job_id).await.unwrap().is_empty());
        assert_eq!(history_of(&fx).await, vec![JobStatus::JobErrored]);
    }

    #[tokio::test]
    async fn scan_log_is_archived_once() {
        let fx = fixture();
        let member = register_member(&fx).await;

        fx.tracker
            .record_status(
                fx.job.job_id,
                JobStatus::CodeScanned,
                None,
                Some("scan: no findings"),
            )
            .await
            .unwrap();
        // Retry of the same webhook delivery.
        fx.tracker
            .record_status(
                fx.job.job_id,
                JobStatus::CodeScanned,
                None,
                Some("scan: no findings"),
            )
            .await
            .unwrap();

        let files = fx.store.job_files(fx.job.job_id).await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].file_type, FileType::EncryptedSecurityScanLog);

        let bundle = fx.objects.get(&files[0].path).await.unwrap();
        let entries = open_bundle(&bundle, &member.private_key).unwrap();
        assert_eq!(entries["security-scan-log.txt"], b"scan: no findings");
    }

    #[tokio::test]
    async fn concurrent_duplicate_submissions_write_one_row() {
        let fx = fixture();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tracker = fx.tracker.clone();
                let job_id = fx.job.job_id;
                tokio::spawn(async move {
                    tracker
                        .record_status(job_id, JobStatus::JobPackaging, None, None)
                        .await
                })
            })
            .collect();
        for result in futures::future::join_all(handles).await {
            assert!(result.unwrap().is_ok());
        }

        assert_eq!(history_of(&fx).await, vec![JobStatus::JobPackaging]);
    }
}
