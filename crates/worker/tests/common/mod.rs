//! Shared helpers for build queue integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sitepress_core::job::ArtifactHandle;
use sitepress_core::project::Project;
use sitepress_pipeline::{
    Archiver, ArtifactStore, BuildPipeline, MemoryArtifactStore, PipelineError, ProgressSink,
    RenderedSite, Renderer, StyleCompiler,
};
use sitepress_worker::{BuildConfig, BuildQueue, Frame, JobSubscription};
use tokio::sync::{mpsc, Semaphore};

/// Project description that makes [`FakeStyles`] fail.
pub const BROKEN_STYLES: &str = "broken-styles";

/// Renderer that reports each job id it starts on and then waits for a
/// permit from the gate.
pub struct GatedRenderer {
    gate: Arc<Semaphore>,
    entered: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl Renderer for GatedRenderer {
    async fn render(
        &self,
        project: &Project,
        _progress: &ProgressSink,
    ) -> Result<RenderedSite, PipelineError> {
        let _ = self.entered.send(project.id.clone());
        self.gate
            .acquire()
            .await
            .map_err(|e| PipelineError::Render(e.to_string()))?
            .forget();

        let mut site = RenderedSite::default();
        site.pages.insert(
            "index.html".into(),
            format!("<h1>{}</h1>", project.name).into_bytes(),
        );
        Ok(site)
    }
}

pub struct FakeStyles;

#[async_trait]
impl StyleCompiler for FakeStyles {
    async fn compile(
        &self,
        project: &Project,
        _site: &RenderedSite,
    ) -> Result<Vec<u8>, PipelineError> {
        if project.description == BROKEN_STYLES {
            return Err(PipelineError::Style("tailwind exited with 1".into()));
        }
        Ok(b"body{}".to_vec())
    }
}

/// Stores the concatenated pages and stylesheet as the artifact.
pub struct FakeArchiver {
    store: Arc<MemoryArtifactStore>,
}

#[async_trait]
impl Archiver for FakeArchiver {
    async fn archive(
        &self,
        job_id: &str,
        site: &RenderedSite,
        stylesheet: &[u8],
    ) -> Result<ArtifactHandle, PipelineError> {
        let mut bytes = site.combined_html();
        bytes.extend_from_slice(stylesheet);
        Ok(self.store.put(job_id, bytes).await?)
    }
}

pub struct Harness {
    pub queue: Arc<BuildQueue>,
    pub artifacts: Arc<MemoryArtifactStore>,
    /// Each permit lets one render finish.
    pub gate: Arc<Semaphore>,
    /// Job ids in the order renders started.
    pub entered: mpsc::UnboundedReceiver<String>,
}

impl Harness {
    /// Let every current and future render through.
    pub fn open_gate(&self) {
        self.gate.add_permits(1_000);
    }

    /// Wait until a render for some job has started and return its id.
    pub async fn next_started(&mut self) -> String {
        self.entered.recv().await.expect("renderer dropped")
    }
}

pub fn config() -> BuildConfig {
    BuildConfig {
        workers: 2,
        queue_capacity: 8,
        job_ttl: Duration::from_secs(30 * 60),
        reaper_tick: Duration::from_secs(60),
        subscription_idle_timeout: Duration::from_secs(30),
    }
}

/// Queue wired to gated fakes. Renders block until the gate is opened.
pub fn harness(config: BuildConfig) -> Harness {
    let artifacts = Arc::new(MemoryArtifactStore::new());
    let gate = Arc::new(Semaphore::new(0));
    let (entered_tx, entered) = mpsc::unbounded_channel();

    let pipeline = BuildPipeline::new(
        Arc::new(GatedRenderer {
            gate: gate.clone(),
            entered: entered_tx,
        }),
        Arc::new(FakeStyles),
        Arc::new(FakeArchiver {
            store: artifacts.clone(),
        }),
    );
    let queue = BuildQueue::start(config, pipeline, artifacts.clone());

    Harness {
        queue,
        artifacts,
        gate,
        entered,
    }
}

pub fn project(id: &str) -> Project {
    Project {
        id: id.to_string(),
        name: format!("Site {id}"),
        ..Project::default()
    }
}

/// Drain a subscription to its end.
pub async fn collect(mut sub: JobSubscription) -> Vec<Frame> {
    let mut frames = Vec::new();
    while let Some(frame) = sub.next().await {
        frames.push(frame);
    }
    frames
}

/// Follow a job until its final frame.
pub async fn wait_final(queue: &BuildQueue, id: &str) -> Frame {
    let sub = queue.subscribe(id).await.expect("job exists");
    collect(sub).await.pop().expect("at least one frame")
}
