// Type definitions and enums

use serde::{Deserialize, Serialize};

/// Lifecycle status of a study job. This is a closed set: webhook payloads
/// carrying anything else are rejected at the deserialization boundary.
///
/// Transitions form a DAG, not a strict chain. From any non-terminal state
/// the pipeline may report `JobErrored`, or a reviewer may issue
/// `CodeRejected`; both end that job instance (a resubmission creates a
/// fresh job).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    #[serde(rename = "INITIATED")]
    Initiated,
    #[serde(rename = "CODE-SUBMITTED")]
    CodeSubmitted,
    #[serde(rename = "CODE-SCANNED")]
    CodeScanned,
    #[serde(rename = "CODE-REJECTED")]
    CodeRejected,
    #[serde(rename = "JOB-PACKAGING")]
    JobPackaging,
    #[serde(rename = "JOB-READY")]
    JobReady,
    #[serde(rename = "JOB-RUNNING")]
    JobRunning,
    #[serde(rename = "JOB-ERRORED")]
    JobErrored,
    #[serde(rename = "RUN-COMPLETE")]
    RunComplete,
    #[serde(rename = "FILES-APPROVED")]
    FilesApproved,
    #[serde(rename = "FILES-REJECTED")]
    FilesRejected,
}

impl JobStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Initiated => "INITIATED",
            Self::CodeSubmitted => "CODE-SUBMITTED",
            Self::CodeScanned => "CODE-SCANNED",
            Self::CodeRejected => "CODE-REJECTED",
            Self::JobPackaging => "JOB-PACKAGING",
            Self::JobReady => "JOB-READY",
            Self::JobRunning => "JOB-RUNNING",
            Self::JobErrored => "JOB-ERRORED",
            Self::RunComplete => "RUN-COMPLETE",
            Self::FilesApproved => "FILES-APPROVED",
            Self::FilesRejected => "FILES-REJECTED",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::FilesApproved | Self::FilesRejected | Self::CodeRejected | Self::JobErrored
        )
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INITIATED" => Ok(Self::Initiated),
            "CODE-SUBMITTED" => Ok(Self::CodeSubmitted),
            "CODE-SCANNED" => Ok(Self::CodeScanned),
            "CODE-REJECTED" => Ok(Self::CodeRejected),
            "JOB-PACKAGING" => Ok(Self::JobPackaging),
            "JOB-READY" => Ok(Self::JobReady),
            "JOB-RUNNING" => Ok(Self::JobRunning),
            "JOB-ERRORED" => Ok(Self::JobErrored),
            "RUN-COMPLETE" => Ok(Self::RunComplete),
            "FILES-APPROVED" => Ok(Self::FilesApproved),
            "FILES-REJECTED" => Ok(Self::FilesRejected),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Overall status of a study proposal, used as the label fallback when a
/// job's own history resolves to nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StudyStatus {
    #[serde(rename = "DRAFT")]
    Draft,
    #[serde(rename = "PENDING-REVIEW")]
    PendingReview,
    #[serde(rename = "APPROVED")]
    Approved,
    #[serde(rename = "REJECTED")]
    Rejected,
}

impl StudyStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::PendingReview => "PENDING-REVIEW",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
        }
    }
}

impl std::str::FromStr for StudyStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DRAFT" => Ok(Self::Draft),
            "PENDING-REVIEW" => Ok(Self::PendingReview),
            "APPROVED" => Ok(Self::Approved),
            "REJECTED" => Ok(Self::Rejected),
            other => Err(format!("unknown study status: {other}")),
        }
    }
}

impl std::fmt::Display for StudyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of file attached to a study job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileType {
    #[serde(rename = "MAIN-CODE")]
    MainCode,
    #[serde(rename = "SUPPLEMENTAL-CODE")]
    SupplementalCode,
    #[serde(rename = "APPROVED-RESULT")]
    ApprovedResult,
    #[serde(rename = "APPROVED-LOG")]
    ApprovedLog,
    #[serde(rename = "ENCRYPTED-RESULT")]
    EncryptedResult,
    #[serde(rename = "ENCRYPTED-LOG")]
    EncryptedLog,
    #[serde(rename = "ENCRYPTED-SECURITY-SCAN-LOG")]
    EncryptedSecurityScanLog,
}

impl FileType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MainCode => "MAIN-CODE",
            Self::SupplementalCode => "SUPPLEMENTAL-CODE",
            Self::ApprovedResult => "APPROVED-RESULT",
            Self::ApprovedLog => "APPROVED-LOG",
            Self::EncryptedResult => "ENCRYPTED-RESULT",
            Self::EncryptedLog => "ENCRYPTED-LOG",
            Self::EncryptedSecurityScanLog => "ENCRYPTED-SECURITY-SCAN-LOG",
        }
    }
}

impl std::str::FromStr for FileType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MAIN-CODE" => Ok(Self::MainCode),
            "SUPPLEMENTAL-CODE" => Ok(Self::SupplementalCode),
            "APPROVED-RESULT" => Ok(Self::ApprovedResult),
            "APPROVED-LOG" => Ok(Self::ApprovedLog),
            "ENCRYPTED-RESULT" => Ok(Self::EncryptedResult),
            "ENCRYPTED-LOG" => Ok(Self::EncryptedLog),
            "ENCRYPTED-SECURITY-SCAN-LOG" => Ok(Self::EncryptedSecurityScanLog),
            other => Err(format!("unknown file type: {other}")),
        }
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who is looking at a study's status. Researchers and reviewers see
/// different labels for the same history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Audience {
    Researcher,
    Reviewer,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_status_round_trips_through_strings() {
        for status in [
            JobStatus::Initiated,
            JobStatus::CodeSubmitted,
            JobStatus::CodeScanned,
            JobStatus::CodeRejected,
            JobStatus::JobPackaging,
            JobStatus::JobReady,
            JobStatus::JobRunning,
            JobStatus::JobErrored,
            JobStatus::RunComplete,
            JobStatus::FilesApproved,
            JobStatus::FilesRejected,
        ] {
            let parsed: JobStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("JOB-PROVISIONING".parse::<JobStatus>().is_err());
    }

    #[test]
    fn terminal_states() {
        assert!(JobStatus::FilesApproved.is_terminal());
        assert!(JobStatus::FilesRejected.is_terminal());
        assert!(JobStatus::CodeRejected.is_terminal());
        assert!(JobStatus::JobErrored.is_terminal());
        assert!(!JobStatus::JobRunning.is_terminal());
        assert!(!JobStatus::RunComplete.is_terminal());
    }
}
