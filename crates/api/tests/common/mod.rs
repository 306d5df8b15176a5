//! Shared helpers for API integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use sitepress_api::config::ServerConfig;
use sitepress_api::router::build_app_router;
use sitepress_api::state::AppState;
use sitepress_api::ws::WsManager;
use sitepress_core::project::Project;
use sitepress_pipeline::{
    ArtifactStore, BuildPipeline, FsArtifactStore, HtmlRenderer, PipelineError, ProgressSink,
    RenderedSite, Renderer, ThemeStyleCompiler, ZipArchiver,
};
use sitepress_worker::{BuildConfig, BuildQueue};
use tempfile::TempDir;
use tokio::sync::Semaphore;
use tower::ServiceExt;

/// Build a test `ServerConfig` that stores artifacts under `artifact_dir`.
pub fn test_config(artifact_dir: &Path) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:3000".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        artifact_dir: artifact_dir.to_path_buf(),
        tailwind_bin: None,
        build: BuildConfig {
            workers: 2,
            queue_capacity: 8,
            job_ttl: Duration::from_secs(30 * 60),
            reaper_tick: Duration::from_secs(60),
            subscription_idle_timeout: Duration::from_secs(10),
        },
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    /// Present on gated apps; each permit lets one render finish.
    pub gate: Option<Arc<Semaphore>>,
    _artifact_dir: TempDir,
}

impl TestApp {
    pub fn open_gate(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1_000);
        }
    }
}

/// App wired exactly like production: askama renderer, theme stylesheet and
/// zip archives in a temporary directory.
pub fn build_test_app() -> TestApp {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let state = AppState::from_config(config.clone());
    TestApp {
        router: build_app_router(state.clone(), &config),
        state,
        gate: None,
        _artifact_dir: dir,
    }
}

/// Production pipeline whose renders wait for [`TestApp::open_gate`].
pub fn build_gated_test_app(customize: impl FnOnce(&mut ServerConfig)) -> TestApp {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path());
    customize(&mut config);

    let gate = Arc::new(Semaphore::new(0));
    let artifacts: Arc<dyn ArtifactStore> =
        Arc::new(FsArtifactStore::new(config.artifact_dir.clone()));
    let pipeline = BuildPipeline::new(
        Arc::new(GatedRenderer { gate: gate.clone() }),
        Arc::new(ThemeStyleCompiler::new()),
        Arc::new(ZipArchiver::new(Arc::clone(&artifacts))),
    );

    let state = AppState {
        config: Arc::new(config.clone()),
        builds: BuildQueue::start(config.build.clone(), pipeline, artifacts),
        ws_manager: Arc::new(WsManager::new()),
    };
    TestApp {
        router: build_app_router(state.clone(), &config),
        state,
        gate: Some(gate),
        _artifact_dir: dir,
    }
}

struct GatedRenderer {
    gate: Arc<Semaphore>,
}

#[async_trait]
impl Renderer for GatedRenderer {
    async fn render(
        &self,
        project: &Project,
        progress: &ProgressSink,
    ) -> Result<RenderedSite, PipelineError> {
        self.gate
            .acquire()
            .await
            .map_err(|e| PipelineError::Render(e.to_string()))?
            .forget();
        HtmlRenderer::new().render(project, progress).await
    }
}

/// A small valid project document with a home page and one blog post.
pub fn project_json(id: &str) -> Value {
    json!({
        "id": id,
        "name": "Demo Site",
        "description": "A demo",
        "globalConfig": {
            "theme": {
                "colors": { "primary": "#0044cc", "text": "#111111" },
                "typography": { "fontFamily": "Inter" }
            }
        },
        "pages": [
            {
                "id": "home",
                "name": "Home",
                "path": "/",
                "components": [
                    { "type": "heading", "level": 1, "text": "Welcome" },
                    { "type": "paragraph", "text": "Hello there" }
                ]
            }
        ],
        "blogPosts": []
    })
}

// ---------------------------------------------------------------------------
// HTTP helpers
// ---------------------------------------------------------------------------

pub async fn get(app: Router, uri: &str) -> Response {
    app.oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: Value) -> Response {
    post_raw(app, uri, body.to_string()).await
}

pub async fn post_raw(app: Router, uri: &str, body: impl Into<String>) -> Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.into()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_bytes(response: Response) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// Poll `GET /jobs/{id}` until the job reaches `status`, returning its body.
pub async fn wait_for_status(app: &Router, job_id: &str, status: &str) -> Value {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let json = body_json(get(app.clone(), &format!("/jobs/{job_id}")).await).await;
            if json["data"]["status"] == status {
                return json;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("job {job_id} never reached {status}"))
}

/// Serve `router` on an ephemeral local port.
pub async fn spawn_server(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}
