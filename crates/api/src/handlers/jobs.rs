//! Handlers for build submission, status polling and artifact download.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use sitepress_core::job::{BuildJob, JobStatus};
use sitepress_core::project::Project;
use sitepress_core::types::{JobId, Timestamp};

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub job_id: JobId,
    /// Relative URL of the status WebSocket for this job.
    pub socket_url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusResponse {
    pub job_id: JobId,
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub expires_at: Timestamp,
    /// Download URL, present only once the build has completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download: Option<String>,
}

impl From<BuildJob> for JobStatusResponse {
    fn from(job: BuildJob) -> Self {
        let download =
            (job.status == JobStatus::Completed).then(|| format!("/jobs/{}/download", job.id));
        Self {
            job_id: job.id,
            status: job.status,
            progress: job.progress,
            message: job.message,
            created_at: job.created_at,
            updated_at: job.updated_at,
            expires_at: job.expires_at,
            download,
        }
    }
}

// ---------------------------------------------------------------------------
// POST /projects/{id}/build
// ---------------------------------------------------------------------------

/// Queue a build of the posted project.
///
/// The body's `id` may be omitted, in which case the path id is used; a
/// body id that differs from the path id is rejected.
pub async fn submit_build(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    payload: Result<Json<Project>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(mut project) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;

    if project.id.is_empty() {
        project.id = project_id;
    } else if project.id != project_id {
        return Err(AppError::BadRequest(format!(
            "Project id \"{}\" does not match path id \"{project_id}\"",
            project.id
        )));
    }

    let job_id = state.builds.submit(project).await?;
    let socket_url = format!("/ws?jobId={job_id}");

    Ok((
        StatusCode::ACCEPTED,
        Json(DataResponse {
            data: SubmitResponse { job_id, socket_url },
        }),
    ))
}

// ---------------------------------------------------------------------------
// GET /jobs/{id}
// ---------------------------------------------------------------------------

pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<Json<DataResponse<JobStatusResponse>>> {
    let job = state.builds.status(&job_id).await?;
    Ok(Json(DataResponse { data: job.into() }))
}

// ---------------------------------------------------------------------------
// GET /jobs/{id}/download
// ---------------------------------------------------------------------------

/// Stream the zip archive of a completed build.
pub async fn download_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<Response> {
    let bytes = state.builds.artifact(&job_id).await?;

    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{job_id}.zip\""))
        .map_err(|e| AppError::InternalError(format!("invalid content disposition: {e}")))?;

    tracing::debug!(job_id = %job_id, bytes = bytes.len(), "Serving build artifact");
    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/zip")),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}
