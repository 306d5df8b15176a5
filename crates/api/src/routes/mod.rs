pub mod health;
pub mod jobs;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::ws;

/// Build the route tree.
///
/// ```text
/// /ws?jobId={id}                    status WebSocket
///
/// /projects/{id}/build              submit a build (POST)
///
/// /jobs/{id}                        job status
/// /jobs/{id}/download               zip archive of a completed build
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Live job status.
        .route("/ws", get(ws::ws_handler))
        // Build submission.
        .nest("/projects", jobs::project_router())
        // Status polling and downloads.
        .nest("/jobs", jobs::router())
}
