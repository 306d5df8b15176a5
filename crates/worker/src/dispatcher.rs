//! Fixed-size worker pool draining the build queue.
//!
//! Every worker pulls [`Ticket`]s from one shared FIFO channel and runs the
//! three pipeline stages for one job at a time:
//!
//! | Step      | Status    | Progress | Message                              |
//! |-----------|-----------|----------|--------------------------------------|
//! | dequeue   | running   | 0        | `Starting build process`             |
//! | each file | running   | 0..=24   | `Generating static page: i of N ...` |
//! | render    | running   | 25       | `Generating HTML`                    |
//! | styles    | running   | 50       | `Compiling CSS`                      |
//! | archive   | running   | 75       | `Creating zip file`                  |
//! | done      | completed | 100      | `Build completed successfully`       |
//!
//! A stage error fails the job with a message naming the stage. There are
//! no retries.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use sitepress_core::job::{ArtifactHandle, BuildJob, JobStatus};
use sitepress_pipeline::{ArtifactStore, BuildPipeline, PageProgress};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::Instrument;

use crate::store::{JobStore, Ticket};

pub const MSG_STARTING: &str = "Starting build process";
pub const MSG_RENDERING: &str = "Generating HTML";
pub const MSG_STYLING: &str = "Compiling CSS";
pub const MSG_ARCHIVING: &str = "Creating zip file";
pub const MSG_COMPLETED: &str = "Build completed successfully";

/// Per-file render progress stays below the render milestone.
const RENDER_BAND: usize = 24;

pub fn page_progress_message(done: usize, total: usize) -> String {
    format!("Generating static page: {done} of {total} ...")
}

/// Receiving half of the work queue, shared by all workers.
pub type WorkReceiver = Arc<Mutex<mpsc::Receiver<Ticket>>>;

pub struct Dispatcher {
    store: Arc<JobStore>,
    pipeline: BuildPipeline,
    artifacts: Arc<dyn ArtifactStore>,
    queue: WorkReceiver,
    stop: CancellationToken,
}

impl Dispatcher {
    pub fn new(
        store: Arc<JobStore>,
        pipeline: BuildPipeline,
        artifacts: Arc<dyn ArtifactStore>,
        queue: mpsc::Receiver<Ticket>,
        stop: CancellationToken,
    ) -> Self {
        Self {
            store,
            pipeline,
            artifacts,
            queue: Arc::new(Mutex::new(queue)),
            stop,
        }
    }

    /// Spawn `workers` worker tasks on `tracker`.
    pub fn spawn(self: Arc<Self>, workers: usize, tracker: &TaskTracker) {
        for worker_id in 0..workers {
            let dispatcher = Arc::clone(&self);
            tracker.spawn(
                async move { dispatcher.run_worker().await }
                    .instrument(tracing::info_span!("build_worker", worker_id)),
            );
        }
        tracing::info!(workers, "Build workers started");
    }

    async fn run_worker(&self) {
        tracing::debug!("Worker waiting for jobs");
        while let Some(ticket) = self.next_ticket().await {
            self.process(ticket).await;
        }
        tracing::debug!("Worker stopped");
    }

    /// Next ticket, or `None` once stopped or the queue is closed. A stop
    /// request wins over a ready ticket, so queued jobs are left alone.
    async fn next_ticket(&self) -> Option<Ticket> {
        if self.stop.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.stop.cancelled() => None,
            ticket = async { self.queue.lock().await.recv().await } => ticket,
        }
    }

    /// Run the whole pipeline for one ticket.
    pub async fn process(&self, ticket: Ticket) {
        let job_id = ticket.job_id.clone();
        let job = match self
            .store
            .update_status(&ticket, JobStatus::Running, 0, MSG_STARTING)
            .await
        {
            Ok(job) => job,
            Err(e) => {
                // Replaced or deleted while queued.
                tracing::debug!(job_id = %job_id, error = %e, "Skipping stale job");
                return;
            }
        };
        tracing::info!(job_id = %job_id, "Build started");

        let outcome = AssertUnwindSafe(self.run_stages(&ticket, &job))
            .catch_unwind()
            .await;
        if outcome.is_err() {
            tracing::error!(job_id = %job_id, "Build stage panicked");
            self.record_failure(&ticket, "Build failed: internal error".to_string())
                .await;
        }
    }

    async fn run_stages(&self, ticket: &Ticket, job: &BuildJob) {
        let project = &job.project;

        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
        let render = async move {
            let progress = progress_tx;
            self.pipeline.renderer.render(project, &progress).await
        };
        let forward = async {
            while let Some(update) = progress_rx.recv().await {
                self.page_rendered(ticket, &update).await;
            }
        };
        let (rendered, ()) = tokio::join!(render, forward);

        let site = match rendered {
            Ok(site) => site,
            Err(e) => {
                return self
                    .record_failure(ticket, format!("Failed to generate HTML: {e}"))
                    .await
            }
        };
        if !self.milestone(ticket, 25, MSG_RENDERING).await {
            return;
        }

        let stylesheet = match self.pipeline.styles.compile(project, &site).await {
            Ok(css) => css,
            Err(e) => {
                return self
                    .record_failure(ticket, format!("Failed to compile CSS: {e}"))
                    .await
            }
        };
        if !self.milestone(ticket, 50, MSG_STYLING).await {
            return;
        }

        let handle = match self
            .pipeline
            .archiver
            .archive(&ticket.job_id, &site, &stylesheet)
            .await
        {
            Ok(handle) => handle,
            Err(e) => {
                return self
                    .record_failure(ticket, format!("Failed to create zip file: {e}"))
                    .await
            }
        };
        if !self.milestone(ticket, 75, MSG_ARCHIVING).await {
            self.discard_artifact(ticket, &handle).await;
            return;
        }

        match self
            .store
            .complete(ticket, handle.clone(), MSG_COMPLETED)
            .await
        {
            Ok(_) => tracing::info!(job_id = %ticket.job_id, key = %handle.key, "Build completed"),
            Err(_) => self.discard_artifact(ticket, &handle).await,
        }
    }

    /// Publish a progress milestone. `false` if the record is gone and the
    /// pipeline should stop.
    async fn milestone(&self, ticket: &Ticket, progress: u8, message: &str) -> bool {
        match self
            .store
            .update_status(ticket, JobStatus::Running, progress, message)
            .await
        {
            Ok(_) => {
                tracing::debug!(job_id = %ticket.job_id, progress, detail = message, "Build progress");
                true
            }
            Err(e) => {
                tracing::warn!(job_id = %ticket.job_id, error = %e, "Job vanished mid-build");
                false
            }
        }
    }

    async fn page_rendered(&self, ticket: &Ticket, update: &PageProgress) {
        let progress = (update.done.min(update.total) * RENDER_BAND / update.total.max(1)) as u8;
        let message = page_progress_message(update.done, update.total);
        if let Err(e) = self
            .store
            .update_status(ticket, JobStatus::Running, progress, &message)
            .await
        {
            tracing::debug!(job_id = %ticket.job_id, error = %e, "Dropping page progress");
        } else {
            tracing::trace!(job_id = %ticket.job_id, file = %update.file_name, progress, "Rendered file");
        }
    }

    async fn record_failure(&self, ticket: &Ticket, message: String) {
        tracing::warn!(job_id = %ticket.job_id, reason = %message, "Build failed");
        if let Err(e) = self.store.fail(ticket, message).await {
            tracing::warn!(job_id = %ticket.job_id, error = %e, "Could not record build failure");
        }
    }

    /// Delete an artifact whose record no longer exists.
    async fn discard_artifact(&self, ticket: &Ticket, handle: &ArtifactHandle) {
        tracing::info!(job_id = %ticket.job_id, key = %handle.key, "Discarding orphaned artifact");
        if let Err(e) = self.artifacts.delete(handle).await {
            tracing::error!(job_id = %ticket.job_id, key = %handle.key, error = %e, "Failed to delete artifact");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
