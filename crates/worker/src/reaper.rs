//! Expiry reaper.
//!
//! One task at a time, started by the first submission that finds no reaper
//! running. Each cycle sleeps until the earliest record deadline or the
//! safety tick, whichever comes first, then deletes expired records and
//! their artifacts. It exits once the store is empty; the next submission
//! starts a new one.

use std::sync::Arc;
use std::time::Duration;

use sitepress_pipeline::ArtifactStore;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::store::JobStore;

/// Run the reaper loop until the store is empty or `cancel` is triggered.
pub async fn run(
    store: Arc<JobStore>,
    artifacts: Arc<dyn ArtifactStore>,
    tick: Duration,
    cancel: CancellationToken,
) {
    tracing::info!(tick_secs = tick.as_secs(), "Job reaper started");

    loop {
        let safety = Instant::now() + tick;
        let wake = match store.next_deadline().await {
            Some(deadline) => deadline.min(safety),
            None => safety,
        };

        tokio::select! {
            _ = cancel.cancelled() => {
                store.release_reaper().await;
                tracing::info!("Job reaper cancelled");
                return;
            }
            _ = tokio::time::sleep_until(wake) => {}
        }

        sweep(&store, artifacts.as_ref()).await;

        if store.release_reaper_if_empty().await {
            tracing::info!("Job reaper stopping, store is empty");
            return;
        }
    }
}

/// Delete every expired record and its artifact. Returns the number of
/// records removed.
pub async fn sweep(store: &JobStore, artifacts: &dyn ArtifactStore) -> usize {
    let expired = store.take_expired(Instant::now()).await;
    for job in &expired {
        tracing::info!(job_id = %job.id, status = %job.status, "Job expired");
        let Some(handle) = &job.result else {
            continue;
        };
        if let Err(e) = artifacts.delete(handle).await {
            tracing::error!(
                job_id = %job.id,
                key = %handle.key,
                error = %e,
                "Failed to delete expired artifact",
            );
        }
    }
    if !expired.is_empty() {
        tracing::debug!(removed = expired.len(), "Reaper sweep finished");
    }
    expired.len()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
