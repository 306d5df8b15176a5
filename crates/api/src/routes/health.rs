use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// `ok`, or `shutting_down` once submissions are refused.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// Size of the build worker pool.
    pub workers: usize,
    /// Jobs currently pending or running.
    pub active_jobs: usize,
}

/// GET /health -- returns service and build queue health.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = if state.builds.is_accepting() {
        "ok"
    } else {
        "shutting_down"
    };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        workers: state.builds.config().workers,
        active_jobs: state.builds.store().active_count().await,
    })
}

/// Mount health check routes.
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
