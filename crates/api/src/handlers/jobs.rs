//! Handlers for the `/jobs` resource.
//!
//! All endpoints require authentication via [`AuthUser`], and a job is only
//! visible to the user who owns it.

use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use meshvault_core::error::CoreError;
use meshvault_core::types::{JobId, UserId};
use meshvault_db::models::job::{Job, JobListQuery};
use meshvault_pipeline::VideoUpload;
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

/// Body of a successful submission.
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub job_id: JobId,
}

/// Body of an accepted simulation request.
#[derive(Debug, Serialize)]
pub struct SimulateResponse {
    pub job_id: JobId,
    pub accepted: bool,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Verify the caller owns `job`. `action` is used in the error message
/// (e.g. "view", "delete").
pub fn authorize(job: &Job, auth: &AuthUser, action: &str) -> AppResult<()> {
    if job.user_id != auth.user_id {
        return Err(AppError::Core(CoreError::Forbidden(format!(
            "Cannot {action} another user's job"
        ))));
    }
    Ok(())
}

/// Fetch a job by ID and verify the caller owns it.
///
/// Returns `NotFound` if the job does not exist and `Forbidden` if the
/// caller is not the owner.
async fn find_and_authorize(
    state: &AppState,
    job_id: JobId,
    auth: &AuthUser,
    action: &str,
) -> AppResult<Job> {
    let job = state
        .store
        .find_by_id(job_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Job",
            id: job_id,
        }))?;

    authorize(&job, auth, action)?;
    Ok(job)
}

/// Resolve the owner of a new job from the optional `user_id` form field.
/// The field may only name the authenticated user.
fn resolve_owner(field: Option<&str>, auth: &AuthUser) -> AppResult<UserId> {
    let Some(raw) = field.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(auth.user_id);
    };
    let user_id: UserId = raw
        .parse()
        .map_err(|_| AppError::BadRequest(format!("Invalid user_id: {raw}")))?;
    if user_id != auth.user_id {
        return Err(AppError::Core(CoreError::Forbidden(
            "Cannot submit jobs for another user".into(),
        )));
    }
    Ok(user_id)
}

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs
///
/// Multipart upload with a `file` part and an optional `user_id` part.
/// Returns 201 with the new job id once the video is stored and processing
/// has been started; the run itself continues in the background.
pub async fn submit_job(
    auth: AuthUser,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    let mut file = None;
    let mut user_field = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await?;
                file = Some(VideoUpload {
                    filename,
                    bytes: bytes.to_vec(),
                });
            }
            "user_id" => user_field = Some(field.text().await?),
            _ => {}
        }
    }

    let user_id = resolve_owner(user_field.as_deref(), &auth)?;
    let job_id = state.submission.submit(file, Some(user_id)).await?;

    Ok((
        StatusCode::CREATED,
        Json(DataResponse {
            data: SubmitResponse { job_id },
        }),
    ))
}

// ---------------------------------------------------------------------------
// Simulate
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs/{id}/simulate
///
/// Run the built-in simulation for a job that has not finished. Returns 202;
/// 409 if the job is terminal or already has a driver.
pub async fn simulate_job(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    let job = find_and_authorize(&state, job_id, &auth, "simulate").await?;
    state.runner.simulate(&job).await?;

    tracing::info!(job_id = %job_id, user_id = %auth.user_id, "Simulation started");

    Ok((
        StatusCode::ACCEPTED,
        Json(DataResponse {
            data: SimulateResponse {
                job_id,
                accepted: true,
            },
        }),
    ))
}

// ---------------------------------------------------------------------------
// Read
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs
///
/// The caller's jobs, newest first. Supports `limit` (default 50, max 100)
/// and `offset`.
pub async fn list_jobs(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<JobListQuery>,
) -> AppResult<impl IntoResponse> {
    let jobs = state.store.list_by_user(auth.user_id, &params).await?;
    Ok(Json(DataResponse { data: jobs }))
}

/// GET /api/v1/jobs/{id}
pub async fn get_job(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    let job = find_and_authorize(&state, job_id, &auth, "view").await?;
    Ok(Json(DataResponse { data: job }))
}

// ---------------------------------------------------------------------------
// Delete
// ---------------------------------------------------------------------------

/// DELETE /api/v1/jobs/{id}
///
/// Removes the job's blobs, then the row. Blob removal is best-effort: a
/// failure is logged and the row is still deleted. Returns 204.
pub async fn delete_job(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    let job = find_and_authorize(&state, job_id, &auth, "delete").await?;

    for key in job.blob_keys() {
        if let Err(e) = state.blobs.delete(key).await {
            tracing::warn!(job_id = %job_id, key, error = %e, "Failed to delete blob");
        }
    }

    state.store.delete(job_id).await?;
    tracing::info!(job_id = %job_id, user_id = %auth.user_id, "Job deleted");

    Ok(StatusCode::NO_CONTENT)
}
