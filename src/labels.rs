//! Display-label resolution for study jobs.
//!
//! Pure policy, no I/O: raw status history plus an audience in, one label
//! out. Each audience has its own priority-ordered status→label table;
//! the first table entry whose status appears anywhere in the history
//! wins, regardless of chronological order.
//!
//! ORDER MATTERS in the tables below: most-terminal first. The one
//! exception is `JOB-ERRORED`, which takes precedence over everything for
//! reviewers, but is hidden from researchers until a reviewer has issued
//! a files decision.

use serde::Serialize;

use crate::types::{Audience, JobStatus, StudyStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
    Proposal,
    Code,
    Results,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusLabel {
    pub stage: Stage,
    pub label: &'static str,
    pub tooltip: &'static str,
}

const DRAFT_LABEL: StatusLabel = StatusLabel {
    stage: Stage::Proposal,
    label: "Draft",
    tooltip: "This study proposal has not been submitted yet.",
};

const ERRORED_REVIEWER: StatusLabel = StatusLabel {
    stage: Stage::Code,
    label: "Errored",
    tooltip: "The code ran into an error. Open the study for more details.",
};

const ERRORED_RESEARCHER: StatusLabel = StatusLabel {
    stage: Stage::Code,
    label: "Errored",
    tooltip: "Your study code needs revision. Open your study for more details.",
};

// Proposal -> Code -> Results, most-terminal first. CODE-SCANNED and
// INITIATED deliberately have no entry: they fall through to the study
// status, as they carry no information a reviewer acts on.
const REVIEWER_LABELS: &[(JobStatus, StatusLabel)] = &[
    (
        JobStatus::FilesRejected,
        StatusLabel {
            stage: Stage::Results,
            label: "Rejected",
            tooltip: "Sharing of results was rejected. The research lab needs to revise and resubmit.",
        },
    ),
    (
        JobStatus::FilesApproved,
        StatusLabel {
            stage: Stage::Results,
            label: "Approved",
            tooltip: "Approved! Study results have been shared with the researcher.",
        },
    ),
    (
        JobStatus::RunComplete,
        StatusLabel {
            stage: Stage::Results,
            label: "Awaiting Review",
            tooltip: "Study results are ready for review. Open the study for more details.",
        },
    ),
    (
        JobStatus::JobRunning,
        StatusLabel {
            stage: Stage::Code,
            label: "Processing",
            tooltip: "The code is running in the enclave.",
        },
    ),
    (
        JobStatus::JobReady,
        StatusLabel {
            stage: Stage::Code,
            label: "Ready",
            tooltip: "The code is packaged and ready to be picked up by the enclave.",
        },
    ),
    (
        JobStatus::JobPackaging,
        StatusLabel {
            stage: Stage::Code,
            label: "Packaging",
            tooltip: "Preparing code to run in the enclave.",
        },
    ),
    (
        JobStatus::CodeRejected,
        StatusLabel {
            stage: Stage::Proposal,
            label: "Rejected",
            tooltip: "Rejected. The research lab needs to revise and resubmit.",
        },
    ),
    (
        JobStatus::CodeSubmitted,
        StatusLabel {
            stage: Stage::Proposal,
            label: "Needs Review",
            tooltip: "This proposal is ready for review. Open the study for more details.",
        },
    ),
];

// The researcher table omits the mid-pipeline states (packaging, ready,
// running): those fall through to the study status, so researchers see
// "Approved" until there is a decision to act on.
const RESEARCHER_LABELS: &[(JobStatus, StatusLabel)] = &[
    (
        JobStatus::FilesRejected,
        StatusLabel {
            stage: Stage::Results,
            label: "Rejected",
            tooltip: "The results of your analysis have not been approved. Open your study for more details.",
        },
    ),
    (
        JobStatus::FilesApproved,
        StatusLabel {
            stage: Stage::Results,
            label: "Approved",
            tooltip: "The results of your analysis have been approved! Open your study to access them.",
        },
    ),
    (
        JobStatus::RunComplete,
        StatusLabel {
            stage: Stage::Results,
            label: "Under Review",
            tooltip: "Your code ran successfully! The results are now under review.",
        },
    ),
    (
        JobStatus::CodeRejected,
        StatusLabel {
            stage: Stage::Proposal,
            label: "Rejected",
            tooltip: "Your proposal has not been approved. Submit a new proposal to continue.",
        },
    ),
    (
        JobStatus::CodeSubmitted,
        StatusLabel {
            stage: Stage::Proposal,
            label: "Under Review",
            tooltip: "Your proposal is being reviewed.",
        },
    ),
];

fn study_status_label(study_status: StudyStatus, audience: Audience) -> StatusLabel {
    match (study_status, audience) {
        (StudyStatus::Draft, _) => DRAFT_LABEL,
        (StudyStatus::PendingReview, Audience::Reviewer) => StatusLabel {
            stage: Stage::Proposal,
            label: "Needs Review",
            tooltip: "This proposal is ready for review. Open the study for more details.",
        },
        (StudyStatus::PendingReview, Audience::Researcher) => StatusLabel {
            stage: Stage::Proposal,
            label: "Under Review",
            tooltip: "Your proposal is being reviewed.",
        },
        (StudyStatus::Approved, Audience::Reviewer) => StatusLabel {
            stage: Stage::Proposal,
            label: "Approved",
            tooltip: "Approved! The code is being prepared to run in the enclave.",
        },
        (StudyStatus::Approved, Audience::Researcher) => StatusLabel {
            stage: Stage::Proposal,
            label: "Approved",
            tooltip: "Your proposal has been approved, and its code is now running!",
        },
        (StudyStatus::Rejected, Audience::Reviewer) => StatusLabel {
            stage: Stage::Proposal,
            label: "Rejected",
            tooltip: "Rejected. The research lab needs to revise and resubmit.",
        },
        (StudyStatus::Rejected, Audience::Researcher) => StatusLabel {
            stage: Stage::Proposal,
            label: "Rejected",
            tooltip: "Your proposal has not been approved. Submit a new proposal to continue.",
        },
    }
}

/// Resolve the single display label for a job's status history.
///
/// 1. `JOB-ERRORED` anywhere in history takes absolute precedence for
///    reviewers. Researchers see it only once a files decision also
///    exists; until then the error is hidden and resolution continues.
/// 2. Otherwise the audience's priority table is scanned top-down and the
///    first status present in the history wins.
/// 3. With no match, the overall study status supplies the label; an
///    empty history on a draft study yields the `Draft` label.
pub fn resolve_status_label(
    study_status: StudyStatus,
    history: &[JobStatus],
    audience: Audience,
) -> StatusLabel {
    let has = |status: JobStatus| history.contains(&status);

    if has(JobStatus::JobErrored) {
        match audience {
            Audience::Reviewer => return ERRORED_REVIEWER,
            Audience::Researcher => {
                if has(JobStatus::FilesApproved) || has(JobStatus::FilesRejected) {
                    return ERRORED_RESEARCHER;
                }
            }
        }
    }

    let table = match audience {
        Audience::Reviewer => REVIEWER_LABELS,
        Audience::Researcher => RESEARCHER_LABELS,
    };
    for (status, label) in table {
        if has(*status) {
            return *label;
        }
    }

    study_status_label(study_status, audience)
}
