pub mod health;
pub mod jobs;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /jobs                          list, submit
/// /jobs/{id}                     get, delete
/// /jobs/{id}/simulate            start simulated processing
/// /jobs/{id}/ws                  WebSocket observation stream
/// ```
///
/// `upload_limit` caps the request body of the submission route.
pub fn api_routes(upload_limit: usize) -> Router<AppState> {
    Router::new().nest("/jobs", jobs::router(upload_limit))
}
