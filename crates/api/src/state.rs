use std::sync::Arc;

use sitepress_pipeline::{
    ArtifactStore, BuildPipeline, FsArtifactStore, HtmlRenderer, StyleCompiler, TailwindCompiler,
    ThemeStyleCompiler, ZipArchiver,
};
use sitepress_worker::BuildQueue;

use crate::config::ServerConfig;
use crate::ws::WsManager;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Build submission, status and download façade.
    pub builds: Arc<BuildQueue>,
    /// Open status WebSocket connections.
    pub ws_manager: Arc<WsManager>,
}

impl AppState {
    /// Wire the production pipeline (askama renderer, theme or Tailwind
    /// stylesheet, zip archive on disk) and start the build queue.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn from_config(config: ServerConfig) -> Self {
        let artifacts: Arc<dyn ArtifactStore> =
            Arc::new(FsArtifactStore::new(config.artifact_dir.clone()));

        let styles: Arc<dyn StyleCompiler> = match &config.tailwind_bin {
            Some(bin) => {
                tracing::info!(binary = %bin.display(), "Using Tailwind stylesheet compiler");
                Arc::new(TailwindCompiler::new(bin.clone()))
            }
            None => Arc::new(ThemeStyleCompiler::new()),
        };

        let pipeline = BuildPipeline::new(
            Arc::new(HtmlRenderer::new()),
            styles,
            Arc::new(ZipArchiver::new(Arc::clone(&artifacts))),
        );
        let builds = BuildQueue::start(config.build.clone(), pipeline, artifacts);

        Self {
            config: Arc::new(config),
            builds,
            ws_manager: Arc::new(WsManager::new()),
        }
    }
}
