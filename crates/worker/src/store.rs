//! Concurrent registry of build job records.
//!
//! [`JobStore`] is the only owner of [`BuildJob`] records. Every mutation
//! happens under one write lock, bumps the store-wide revision counter and
//! publishes a [`JobEvent`] before the lock is released, so the event order
//! on the bus matches the mutation order.
//!
//! The lock also guards the reaper's running flag: a submission claims the
//! flag in the same critical section that inserts its record, and the reaper
//! only clears it after observing an empty table under that lock.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sitepress_core::error::CoreError;
use sitepress_core::job::{validate_job_id, ArtifactHandle, BuildJob, JobStatus};
use sitepress_core::project::Project;
use sitepress_core::types::{JobId, Timestamp};
use sitepress_events::{JobEvent, StatusBus};
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Status message of a freshly admitted job.
pub const QUEUED_MESSAGE: &str = "Queued for build";

/// Fallback horizon when `now + ttl` is not representable.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Identifies one generation of a job record.
///
/// A resubmitted id gets a new generation, so a worker still holding the
/// ticket of a replaced or deleted record can never mutate its successor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub job_id: JobId,
    pub generation: u64,
}

/// Outcome of a successful [`JobStore::admit`].
#[derive(Debug)]
pub struct Admission {
    /// Snapshot of the new `Pending` record.
    pub job: BuildJob,
    pub ticket: Ticket,
    /// Artifact of the terminal record this submission replaced. The caller
    /// deletes it.
    pub replaced: Option<ArtifactHandle>,
    /// `true` if no reaper was running; the caller must start one.
    pub start_reaper: bool,
}

struct Entry {
    job: BuildJob,
    generation: u64,
    deadline: Instant,
}

#[derive(Default)]
struct StoreState {
    jobs: HashMap<JobId, Entry>,
    revision: u64,
    reaper_running: bool,
}

impl StoreState {
    /// Remove one record. Expiry, reset and `delete` all go through here.
    fn remove(&mut self, id: &str) -> Option<BuildJob> {
        self.jobs.remove(id).map(|entry| entry.job)
    }
}

pub struct JobStore {
    state: RwLock<StoreState>,
    bus: Arc<StatusBus>,
    ttl: Duration,
}

impl JobStore {
    pub fn new(bus: Arc<StatusBus>, ttl: Duration) -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            bus,
            ttl,
        }
    }

    pub fn bus(&self) -> &Arc<StatusBus> {
        &self.bus
    }

    /// Create a `Pending` record for `project`.
    ///
    /// Rejects an invalid id (`Validation`) and an id whose current record is
    /// still pending or running (`Conflict`). A terminal record under the
    /// same id is replaced; its artifact handle is returned for cleanup.
    pub async fn admit(&self, project: Project) -> Result<Admission, CoreError> {
        validate_job_id(&project.id)?;

        let (created_at, expires_at, deadline) = self.lifetime();
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let replaced = match state.jobs.get(&project.id).map(|e| e.job.status) {
            Some(status) if status.is_active() => {
                return Err(CoreError::Conflict(format!(
                    "Job {} is already {status}",
                    project.id
                )));
            }
            Some(_) => state.jobs.remove(&project.id).and_then(|e| e.job.result),
            None => None,
        };

        state.revision += 1;
        let generation = state.revision;
        let job = BuildJob {
            id: project.id.clone(),
            project: Arc::new(project),
            status: JobStatus::Pending,
            progress: 0,
            message: QUEUED_MESSAGE.to_string(),
            created_at,
            updated_at: created_at,
            expires_at,
            result: None,
            revision: generation,
        };

        let start_reaper = !state.reaper_running;
        state.reaper_running = true;

        state.jobs.insert(
            job.id.clone(),
            Entry {
                job: job.clone(),
                generation,
                deadline,
            },
        );
        self.bus.publish(JobEvent::from_job(&job));

        Ok(Admission {
            ticket: Ticket {
                job_id: job.id.clone(),
                generation,
            },
            job,
            replaced,
            start_reaper,
        })
    }

    /// Snapshot of the current record for `id`.
    pub async fn get(&self, id: &str) -> Result<BuildJob, CoreError> {
        self.state
            .read()
            .await
            .jobs
            .get(id)
            .map(|entry| entry.job.clone())
            .ok_or_else(|| CoreError::job_not_found(id))
    }

    /// Advance the ticket's record. `NotFound` if that generation no longer
    /// exists; `Conflict` if the state machine forbids the move.
    pub async fn update_status(
        &self,
        ticket: &Ticket,
        status: JobStatus,
        progress: u8,
        message: impl Into<String>,
    ) -> Result<BuildJob, CoreError> {
        let message = message.into();
        self.mutate(ticket, |job| job.advance(status, progress, message))
            .await
    }

    /// Mark the ticket's record failed, keeping its last progress value.
    pub async fn fail(
        &self,
        ticket: &Ticket,
        message: impl Into<String>,
    ) -> Result<BuildJob, CoreError> {
        let message = message.into();
        self.mutate(ticket, |job| {
            let progress = job.progress;
            job.advance(JobStatus::Failed, progress, message)
        })
        .await
    }

    /// Attach the artifact and move the record to `Completed` in one step.
    pub async fn complete(
        &self,
        ticket: &Ticket,
        handle: ArtifactHandle,
        message: impl Into<String>,
    ) -> Result<BuildJob, CoreError> {
        let message = message.into();
        self.mutate(ticket, |job| {
            job.advance(JobStatus::Completed, 100, message)?;
            job.result = Some(handle);
            Ok(())
        })
        .await
    }

    async fn mutate(
        &self,
        ticket: &Ticket,
        apply: impl FnOnce(&mut BuildJob) -> Result<(), CoreError>,
    ) -> Result<BuildJob, CoreError> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let entry = state
            .jobs
            .get_mut(&ticket.job_id)
            .filter(|entry| entry.generation == ticket.generation)
            .ok_or_else(|| CoreError::job_not_found(&ticket.job_id))?;
        apply(&mut entry.job)?;

        state.revision += 1;
        entry.job.revision = state.revision;
        entry.job.updated_at = Utc::now();

        let snapshot = entry.job.clone();
        self.bus.publish(JobEvent::from_job(&snapshot));
        Ok(snapshot)
    }

    /// Remove a record regardless of its state.
    #[cfg(test)]
    pub(crate) async fn delete(&self, id: &str) -> Option<BuildJob> {
        self.state.write().await.remove(id)
    }

    /// Remove every record whose deadline is at or before `now`.
    pub async fn take_expired(&self, now: Instant) -> Vec<BuildJob> {
        let mut state = self.state.write().await;
        let expired: Vec<JobId> = state
            .jobs
            .iter()
            .filter(|(_, entry)| entry.deadline <= now)
            .map(|(id, _)| id.clone())
            .collect();
        expired.iter().filter_map(|id| state.remove(id)).collect()
    }

    /// Earliest expiry deadline across all records.
    pub async fn next_deadline(&self) -> Option<Instant> {
        self.state
            .read()
            .await
            .jobs
            .values()
            .map(|entry| entry.deadline)
            .min()
    }

    /// Clear the reaper flag if the store is empty. Returns `true` when the
    /// calling reaper must exit.
    pub async fn release_reaper_if_empty(&self) -> bool {
        let mut state = self.state.write().await;
        if state.jobs.is_empty() {
            state.reaper_running = false;
            true
        } else {
            false
        }
    }

    /// Clear the reaper flag unconditionally (reaper cancelled).
    pub async fn release_reaper(&self) {
        self.state.write().await.reaper_running = false;
    }

    pub async fn reaper_running(&self) -> bool {
        self.state.read().await.reaper_running
    }

    /// Remove every record (full reset).
    pub async fn drain(&self) -> Vec<BuildJob> {
        let mut state = self.state.write().await;
        let ids: Vec<JobId> = state.jobs.keys().cloned().collect();
        ids.iter().filter_map(|id| state.remove(id)).collect()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.jobs.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.jobs.is_empty()
    }

    /// Number of records that are pending or running.
    pub async fn active_count(&self) -> usize {
        self.state
            .read()
            .await
            .jobs
            .values()
            .filter(|entry| entry.job.status.is_active())
            .count()
    }

    fn lifetime(&self) -> (Timestamp, Timestamp, Instant) {
        let created_at = Utc::now();
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::MAX);
        let expires_at = created_at
            .checked_add_signed(ttl)
            .unwrap_or(chrono::DateTime::<Utc>::MAX_UTC);

        let now = Instant::now();
        let deadline = now
            .checked_add(self.ttl)
            .unwrap_or_else(|| now + FAR_FUTURE);
        (created_at, expires_at, deadline)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
