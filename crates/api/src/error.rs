use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use meshvault_core::error::CoreError;
use meshvault_db::StoreError;
use meshvault_pipeline::{PipelineError, SubmitError};
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps the domain, store, submission and pipeline errors and adds
/// HTTP-specific variants. Implements [`IntoResponse`] to produce consistent
/// JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `meshvault_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A job store error.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A rejected or failed submission.
    #[error(transparent)]
    Submit(#[from] SubmitError),

    /// A driver could not be started for the job.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// The multipart body could not be read.
    #[error(transparent)]
    Multipart(#[from] MultipartError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

type ErrorParts = (StatusCode, &'static str, String);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Core(core) => classify_core_error(core),
            AppError::Store(err) => classify_store_error(err),

            AppError::Submit(err) => match err {
                SubmitError::MissingFile | SubmitError::MissingUser => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", err.to_string())
                }
                SubmitError::Invalid(core) => classify_core_error(core),
                SubmitError::Storage { job_id, source } => {
                    tracing::error!(job_id = %job_id, error = %source, "Video storage failed");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "STORAGE_ERROR",
                        "Failed to store the uploaded video".to_string(),
                    )
                }
                SubmitError::Store(err) => classify_store_error(err),
            },

            AppError::Pipeline(err) => match err {
                PipelineError::AlreadyRunning(_) | PipelineError::Finished { .. } => {
                    (StatusCode::CONFLICT, "CONFLICT", err.to_string())
                }
                PipelineError::Store(err) => classify_store_error(err),
                other => {
                    tracing::error!(error = %other, "Pipeline error");
                    internal()
                }
            },

            AppError::Multipart(err) => (err.status(), "BAD_REQUEST", err.body_text()),

            // --- HTTP-specific errors ---
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

fn internal() -> ErrorParts {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}

fn classify_core_error(core: &CoreError) -> ErrorParts {
    match core {
        CoreError::NotFound { entity, id } => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("{entity} with id {id} not found"),
        ),
        CoreError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
        CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
        CoreError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone()),
        CoreError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone()),
    }
}

/// Classify a store error into an HTTP status, error code, and message.
///
/// - Domain rejections map like [`CoreError`].
/// - Pool exhaustion and connection failures map to 503.
/// - Everything else maps to 500 with a sanitized message.
fn classify_store_error(err: &StoreError) -> ErrorParts {
    match err {
        StoreError::Core(core) => classify_core_error(core),
        StoreError::Database(sqlx::Error::RowNotFound) => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            "Resource not found".to_string(),
        ),
        StoreError::Database(db) if err.is_transient() => {
            tracing::warn!(error = %db, "Job store unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "STORE_UNAVAILABLE",
                "The job store is temporarily unavailable".to_string(),
            )
        }
        StoreError::Database(db) => {
            tracing::error!(error = %db, "Database error");
            internal()
        }
    }
}
