//! Route definitions for build submission and the `/jobs` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::jobs;
use crate::state::AppState;

/// Routes mounted at `/projects`.
///
/// ```text
/// POST   /{id}/build      -> submit_build
/// ```
pub fn project_router() -> Router<AppState> {
    Router::new().route("/{id}/build", post(jobs::submit_build))
}

/// Routes mounted at `/jobs`.
///
/// ```text
/// GET    /{id}            -> get_job
/// GET    /{id}/download   -> download_job
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{id}", get(jobs::get_job))
        .route("/{id}/download", get(jobs::download_job))
}
