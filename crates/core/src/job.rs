//! Build job record and its status state machine.
//!
//! ```text
//! Pending ──▶ Running ──▶ Completed
//!                │
//!                └──────▶ Failed
//! ```
//!
//! `Running → Running` is allowed so the owning worker can publish progress
//! milestones; terminal states never transition again.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::project::Project;
use crate::types::{JobId, Timestamp};

/// Maximum length of a job / project identifier.
const MAX_ID_LEN: usize = 128;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// `Completed` and `Failed` are final.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// `Pending` and `Running` jobs occupy their id.
    pub fn is_active(self) -> bool {
        !self.is_terminal()
    }

    /// Whether the state machine permits moving from `self` to `next`.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Running)
                | (JobStatus::Running, JobStatus::Running)
                | (JobStatus::Running, JobStatus::Completed)
                | (JobStatus::Running, JobStatus::Failed)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Artifact handle
// ---------------------------------------------------------------------------

/// Opaque reference to a packaged build output held by an artifact store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactHandle {
    /// Store-specific key, unique per build.
    pub key: String,
    /// Size of the artifact in bytes.
    pub size: u64,
}

// ---------------------------------------------------------------------------
// BuildJob
// ---------------------------------------------------------------------------

/// One submitted build.
///
/// The job store owns the live record; everything handed out of the store is
/// a clone, so readers never observe a record mid-update.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildJob {
    #[serde(rename = "jobId")]
    pub id: JobId,
    #[serde(skip)]
    pub project: Arc<Project>,
    pub status: JobStatus,
    /// 0–100, non-decreasing while running.
    pub progress: u8,
    pub message: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    /// Fixed at creation to `created_at + ttl`.
    pub expires_at: Timestamp,
    #[serde(skip)]
    pub result: Option<ArtifactHandle>,
    /// Store-wide sequence number of the last mutation of this record.
    /// Lets observers discard stale notifications.
    pub revision: u64,
}

impl BuildJob {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Apply a status mutation, enforcing the state machine and progress
    /// monotonicity. Does not touch `updated_at` or `revision`; the store
    /// stamps those.
    pub fn advance(
        &mut self,
        status: JobStatus,
        progress: u8,
        message: impl Into<String>,
    ) -> Result<(), CoreError> {
        if !self.status.can_transition_to(status) {
            return Err(CoreError::Conflict(format!(
                "Job {} cannot move from {} to {}",
                self.id, self.status, status
            )));
        }
        let progress = progress.min(100);
        self.progress = match status {
            JobStatus::Running if self.status == JobStatus::Running => self.progress.max(progress),
            _ => progress,
        };
        self.status = status;
        self.message = message.into();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate an identifier used as a job id.
///
/// Rules:
/// - Must not be empty or exceed `MAX_ID_LEN` characters.
/// - Only ASCII alphanumeric, hyphen, underscore or dot (it ends up in file
///   names and URLs).
/// - Must not start with a dot (hidden file names, `.` and `..`).
pub fn validate_job_id(id: &str) -> Result<(), CoreError> {
    if id.trim().is_empty() {
        return Err(CoreError::Validation(
            "Project id must not be empty".to_string(),
        ));
    }
    if id.len() > MAX_ID_LEN {
        return Err(CoreError::Validation(format!(
            "Project id must not exceed {MAX_ID_LEN} characters"
        )));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(CoreError::Validation(
            "Project id may only contain alphanumeric, hyphen, underscore, or dot characters"
                .to_string(),
        ));
    }
    if id.starts_with('.') {
        return Err(CoreError::Validation(
            "Project id must not start with a dot".to_string(),
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
