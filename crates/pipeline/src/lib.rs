//! Build pipeline collaborators.
//!
//! The worker pool drives three stages in order and never looks inside them:
//!
//! 1. [`Renderer`] turns a [`Project`] into a [`RenderedSite`], reporting
//!    each finished file on a [`ProgressSink`].
//! 2. [`StyleCompiler`] produces the stylesheet for the rendered markup.
//! 3. [`Archiver`] packages both and returns an [`ArtifactHandle`] held by an
//!    [`ArtifactStore`].
//!
//! Each stage has a production implementation here; tests swap in fakes.

pub mod archive;
pub mod artifact;
pub mod error;
pub mod render;
pub mod style;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use sitepress_core::job::ArtifactHandle;
use sitepress_core::project::Project;
use tokio::sync::mpsc;

pub use archive::ZipArchiver;
pub use artifact::{ArtifactStore, FsArtifactStore, MemoryArtifactStore};
pub use error::{ArtifactError, PipelineError};
pub use render::HtmlRenderer;
pub use style::{TailwindCompiler, ThemeStyleCompiler};

/// Rendered HTML files keyed by their path inside the archive
/// (e.g. `index.html`, `first-post.html`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedSite {
    pub pages: BTreeMap<String, Vec<u8>>,
}

impl RenderedSite {
    /// All pages concatenated, in file-name order. Used as the content scan
    /// input for stylesheet compilation.
    pub fn combined_html(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.pages.values().map(Vec::len).sum());
        for page in self.pages.values() {
            out.extend_from_slice(page);
            out.push(b'\n');
        }
        out
    }
}

/// One output file finished by a [`Renderer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageProgress {
    /// Files rendered so far, including this one.
    pub done: usize,
    pub total: usize,
    pub file_name: String,
}

/// Channel a renderer reports [`PageProgress`] on. Sends to a dropped
/// receiver are ignored.
pub type ProgressSink = mpsc::UnboundedSender<PageProgress>;

#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(
        &self,
        project: &Project,
        progress: &ProgressSink,
    ) -> Result<RenderedSite, PipelineError>;
}

#[async_trait]
pub trait StyleCompiler: Send + Sync {
    async fn compile(
        &self,
        project: &Project,
        site: &RenderedSite,
    ) -> Result<Vec<u8>, PipelineError>;
}

#[async_trait]
pub trait Archiver: Send + Sync {
    async fn archive(
        &self,
        job_id: &str,
        site: &RenderedSite,
        stylesheet: &[u8],
    ) -> Result<ArtifactHandle, PipelineError>;
}

/// The three collaborators a worker runs for every job.
#[derive(Clone)]
pub struct BuildPipeline {
    pub renderer: Arc<dyn Renderer>,
    pub styles: Arc<dyn StyleCompiler>,
    pub archiver: Arc<dyn Archiver>,
}

impl BuildPipeline {
    pub fn new(
        renderer: Arc<dyn Renderer>,
        styles: Arc<dyn StyleCompiler>,
        archiver: Arc<dyn Archiver>,
    ) -> Self {
        Self {
            renderer,
            styles,
            archiver,
        }
    }
}
