//! Route definitions for the `/jobs` resource.
//!
//! All endpoints require authentication.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;

use crate::handlers::jobs;
use crate::state::AppState;
use crate::ws;

/// Routes mounted at `/jobs`.
///
/// ```text
/// GET    /                -> list_jobs
/// POST   /                -> submit_job
/// GET    /{id}            -> get_job
/// DELETE /{id}            -> delete_job
/// POST   /{id}/simulate   -> simulate_job
/// GET    /{id}/ws         -> job_ws_handler
/// ```
pub fn router(upload_limit: usize) -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(jobs::list_jobs)
                .post(jobs::submit_job)
                .layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/{id}", get(jobs::get_job).delete(jobs::delete_job))
        .route("/{id}/simulate", post(jobs::simulate_job))
        .route("/{id}/ws", get(ws::job_ws_handler))
}
