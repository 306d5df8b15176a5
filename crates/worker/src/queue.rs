//! Submission façade over the job store, worker pool and reaper.
//!
//! [`BuildQueue`] is the only type the HTTP layer talks to. It owns the
//! sending half of the bounded work queue, the task tracker for workers and
//! the reaper, and the lifecycle token that shutdown cancels.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sitepress_core::error::CoreError;
use sitepress_core::job::{validate_job_id, BuildJob, JobStatus};
use sitepress_core::project::Project;
use sitepress_core::types::JobId;
use sitepress_events::StatusBus;
use sitepress_pipeline::{ArtifactStore, BuildPipeline};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::Instrument;

use crate::config::BuildConfig;
use crate::dispatcher::Dispatcher;
use crate::reaper;
use crate::store::{JobStore, Ticket};
use crate::subscription::JobSubscription;

pub struct BuildQueue {
    config: BuildConfig,
    store: Arc<JobStore>,
    artifacts: Arc<dyn ArtifactStore>,
    sender: mpsc::Sender<Ticket>,
    lifecycle: CancellationToken,
    tracker: TaskTracker,
    accepting: AtomicBool,
}

impl BuildQueue {
    /// Create the queue and spawn its workers. Must be called inside a Tokio
    /// runtime.
    pub fn start(
        config: BuildConfig,
        pipeline: BuildPipeline,
        artifacts: Arc<dyn ArtifactStore>,
    ) -> Arc<Self> {
        Self::with_bus(config, pipeline, artifacts, Arc::new(StatusBus::default()))
    }

    /// Like [`BuildQueue::start`], publishing on an existing bus.
    pub fn with_bus(
        config: BuildConfig,
        pipeline: BuildPipeline,
        artifacts: Arc<dyn ArtifactStore>,
        bus: Arc<StatusBus>,
    ) -> Arc<Self> {
        let store = Arc::new(JobStore::new(bus, config.job_ttl));
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let lifecycle = CancellationToken::new();
        let tracker = TaskTracker::new();

        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&store),
            pipeline,
            Arc::clone(&artifacts),
            receiver,
            lifecycle.child_token(),
        ));
        dispatcher.spawn(config.workers.max(1), &tracker);

        Arc::new(Self {
            config,
            store,
            artifacts,
            sender,
            lifecycle,
            tracker,
            accepting: AtomicBool::new(true),
        })
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    /// Admit and enqueue a build of `project`. Returns the job id.
    ///
    /// Waits while the work queue is full. Fails with `Unavailable` once
    /// shutdown has begun. A queue slot is reserved before the record is
    /// created, so abandoning the call while it waits leaves nothing behind.
    pub async fn submit(&self, project: Project) -> Result<JobId, CoreError> {
        if !self.is_accepting() {
            return Err(shutting_down());
        }
        validate_job_id(&project.id)?;

        let permit = tokio::select! {
            biased;
            _ = self.lifecycle.cancelled() => return Err(shutting_down()),
            permit = self.sender.reserve() => {
                permit.map_err(|_| CoreError::Internal("build queue is closed".into()))?
            }
        };

        let admission = self.store.admit(project).await?;
        let job_id = admission.job.id.clone();
        permit.send(admission.ticket);
        tracing::info!(job_id = %job_id, "Build job submitted");

        if admission.start_reaper {
            self.spawn_reaper();
        }
        if let Some(old) = admission.replaced {
            let artifacts = Arc::clone(&self.artifacts);
            let job_id = job_id.clone();
            self.tracker.spawn(async move {
                tracing::debug!(job_id = %job_id, key = %old.key, "Removing artifact of replaced job");
                if let Err(e) = artifacts.delete(&old).await {
                    tracing::error!(job_id = %job_id, key = %old.key, error = %e, "Failed to delete replaced artifact");
                }
            });
        }
        Ok(job_id)
    }

    /// Snapshot of a job.
    pub async fn status(&self, job_id: &str) -> Result<BuildJob, CoreError> {
        self.store.get(job_id).await
    }

    /// Bytes of a completed job's artifact.
    ///
    /// `NotFound` for an unknown job, `InvalidState` before completion and
    /// `Gone` if the artifact no longer exists.
    pub async fn artifact(&self, job_id: &str) -> Result<Vec<u8>, CoreError> {
        let job = self.store.get(job_id).await?;
        if job.status != JobStatus::Completed {
            return Err(CoreError::InvalidState(format!(
                "Job {job_id} is {}, not completed",
                job.status
            )));
        }
        let Some(handle) = job.result else {
            return Err(CoreError::Gone(format!("Artifact for job {job_id} is gone")));
        };
        match self.artifacts.read(&handle).await {
            Ok(Some(bytes)) => Ok(bytes),
            Ok(None) => Err(CoreError::Gone(format!(
                "Artifact for job {job_id} is gone"
            ))),
            Err(e) => {
                tracing::error!(job_id, key = %handle.key, error = %e, "Failed to read artifact");
                Err(CoreError::Internal(format!("failed to read artifact: {e}")))
            }
        }
    }

    /// Open a live status subscription for `job_id`.
    pub async fn subscribe(&self, job_id: &str) -> Result<JobSubscription, CoreError> {
        JobSubscription::open(
            Arc::clone(&self.store),
            self.store.bus(),
            job_id,
            self.config.subscription_idle_timeout,
        )
        .await
    }

    /// Stop the queue.
    ///
    /// 1. New submissions fail with `Unavailable`.
    /// 2. The reaper is cancelled and idle workers stop taking queued jobs.
    /// 3. In-flight builds get up to `grace` to finish; they are never
    ///    aborted.
    /// 4. Every record is removed and every stored artifact deleted.
    pub async fn shutdown(&self, grace: Duration) {
        self.accepting.store(false, Ordering::SeqCst);
        self.lifecycle.cancel();
        self.tracker.close();

        if tokio::time::timeout(grace, self.tracker.wait()).await.is_err() {
            tracing::warn!(
                grace_secs = grace.as_secs(),
                "Builds still running after shutdown grace period",
            );
        }

        let drained = self.store.drain().await;
        let mut deleted = 0usize;
        for job in &drained {
            let Some(handle) = &job.result else {
                continue;
            };
            match self.artifacts.delete(handle).await {
                Ok(()) => deleted += 1,
                Err(e) => {
                    tracing::error!(job_id = %job.id, key = %handle.key, error = %e, "Failed to delete artifact");
                }
            }
        }
        tracing::info!(jobs = drained.len(), artifacts = deleted, "Build queue shut down");
    }

    fn spawn_reaper(&self) {
        let store = Arc::clone(&self.store);
        let artifacts = Arc::clone(&self.artifacts);
        let tick = self.config.reaper_tick;
        let cancel = self.lifecycle.child_token();
        self.tracker.spawn(
            reaper::run(store, artifacts, tick, cancel).instrument(tracing::info_span!("job_reaper")),
        );
    }
}

fn shutting_down() -> CoreError {
    CoreError::Unavailable("Server is shutting down".into())
}
