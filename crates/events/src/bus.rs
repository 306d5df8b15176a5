//! In-process status bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`StatusBus`] fans every [`JobEvent`] out to all current subscribers. It is
//! designed to be shared via `Arc<StatusBus>` between the job store (the only
//! publisher) and any number of status subscriptions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sitepress_core::job::{BuildJob, JobStatus};
use sitepress_core::types::JobId;
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// JobEvent
// ---------------------------------------------------------------------------

/// A status change of one build job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobEvent {
    pub job_id: JobId,
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
    /// Revision of the record after the change. Strictly increasing across
    /// all events published by one store.
    pub revision: u64,
    /// When the change happened (UTC).
    pub timestamp: DateTime<Utc>,
}

impl JobEvent {
    /// Capture the current state of a job record.
    pub fn from_job(job: &BuildJob) -> Self {
        Self {
            job_id: job.id.clone(),
            status: job.status,
            progress: job.progress,
            message: job.message.clone(),
            revision: job.revision,
            timestamp: job.updated_at,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

// ---------------------------------------------------------------------------
// StatusBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out bus for job status changes.
///
/// # Usage
///
/// ```rust
/// use sitepress_events::StatusBus;
///
/// let bus = StatusBus::default();
/// let rx = bus.subscribe();
/// assert_eq!(bus.subscriber_count(), 1);
/// # drop(rx);
/// ```
pub struct StatusBus {
    sender: broadcast::Sender<JobEvent>,
}

impl StatusBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed events are dropped and
    /// slow receivers observe `RecvError::Lagged`; subscriptions recover by
    /// re-reading the job snapshot.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// If there are no active subscribers the event is silently dropped.
    pub fn publish(&self, event: JobEvent) {
        // Ignore the SendError: it only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    /// Subscribe to every event published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }

    /// Number of live receivers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for StatusBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
