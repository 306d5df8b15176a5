//! Per-observer status subscription.
//!
//! A [`JobSubscription`] yields the job's current state first, then every
//! later change of that job until a terminal state, then ends. It subscribes
//! to the bus before reading the snapshot, so no change between the two is
//! lost; events at or below the last delivered revision are dropped, so none
//! is delivered twice. If the receiver lags behind the bus it resynchronises
//! from a fresh snapshot.
//!
//! When no change arrives within the idle timeout the subscription yields a
//! synthetic failure frame and ends, even if the job is still running.

use std::sync::Arc;
use std::time::Duration;

use sitepress_core::error::CoreError;
use sitepress_core::job::JobStatus;
use sitepress_core::types::JobId;
use sitepress_events::{JobEvent, StatusBus};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::Instant;

use crate::store::JobStore;

/// Message of the frame sent when a subscription times out.
pub const TIMEOUT_MESSAGE: &str = "Connection timeout";

/// One item yielded by [`JobSubscription::next`].
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Non-terminal status change.
    Update(JobEvent),
    /// Terminal status; the subscription is finished.
    Final(JobEvent),
    /// No change within the idle timeout; the subscription is finished.
    TimedOut(JobEvent),
}

impl Frame {
    pub fn event(&self) -> &JobEvent {
        match self {
            Frame::Update(event) | Frame::Final(event) | Frame::TimedOut(event) => event,
        }
    }
}

pub struct JobSubscription {
    job_id: JobId,
    store: Arc<JobStore>,
    rx: broadcast::Receiver<JobEvent>,
    idle_timeout: Duration,
    /// Reset whenever a frame is delivered; `next` may be dropped and
    /// re-polled without extending it.
    idle_deadline: Instant,
    initial: Option<JobEvent>,
    last: Option<JobEvent>,
    done: bool,
}

impl std::fmt::Debug for JobSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobSubscription")
            .field("job_id", &self.job_id)
            .field("idle_timeout", &self.idle_timeout)
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}

impl JobSubscription {
    /// Open a subscription. `NotFound` if the job is unknown.
    pub async fn open(
        store: Arc<JobStore>,
        bus: &StatusBus,
        job_id: &str,
        idle_timeout: Duration,
    ) -> Result<Self, CoreError> {
        let rx = bus.subscribe();
        let snapshot = store.get(job_id).await?;
        Ok(Self {
            job_id: job_id.to_string(),
            store,
            rx,
            idle_timeout,
            idle_deadline: Instant::now() + idle_timeout,
            initial: Some(JobEvent::from_job(&snapshot)),
            last: None,
            done: false,
        })
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Next frame, or `None` once a terminal or timeout frame has been
    /// yielded or the job disappeared.
    pub async fn next(&mut self) -> Option<Frame> {
        if self.done {
            return None;
        }
        if let Some(initial) = self.initial.take() {
            return Some(self.deliver(initial));
        }

        loop {
            let received = match tokio::time::timeout_at(self.idle_deadline, self.rx.recv()).await {
                Ok(received) => received,
                Err(_) => return Some(self.time_out()),
            };
            match received {
                Ok(event) => {
                    if self.is_fresh(&event) {
                        return Some(self.deliver(event));
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(job_id = %self.job_id, skipped, "Subscription lagged, resyncing");
                    match self.store.get(&self.job_id).await {
                        Ok(job) => {
                            let event = JobEvent::from_job(&job);
                            if self.is_fresh(&event) {
                                return Some(self.deliver(event));
                            }
                        }
                        Err(_) => {
                            self.done = true;
                            return None;
                        }
                    }
                }
                Err(RecvError::Closed) => {
                    self.done = true;
                    return None;
                }
            }
        }
    }

    fn is_fresh(&self, event: &JobEvent) -> bool {
        event.job_id == self.job_id
            && self
                .last
                .as_ref()
                .map_or(true, |last| event.revision > last.revision)
    }

    fn deliver(&mut self, event: JobEvent) -> Frame {
        self.idle_deadline = Instant::now() + self.idle_timeout;
        self.last = Some(event.clone());
        if event.is_terminal() {
            self.done = true;
            Frame::Final(event)
        } else {
            Frame::Update(event)
        }
    }

    fn time_out(&mut self) -> Frame {
        self.done = true;
        tracing::debug!(job_id = %self.job_id, "Subscription idle timeout");
        let (progress, revision) = self
            .last
            .as_ref()
            .map_or((0, 0), |last| (last.progress, last.revision));
        Frame::TimedOut(JobEvent {
            job_id: self.job_id.clone(),
            status: JobStatus::Failed,
            progress,
            message: TIMEOUT_MESSAGE.to_string(),
            revision,
            timestamp: chrono::Utc::now(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
