//! Repository for the `jobs` table.
//!
//! Every status-changing statement carries its allowed source states in the
//! `WHERE` clause, so a write that would violate the state machine matches
//! no row and returns `None` instead of corrupting the job.

use meshvault_core::job_status::{JobStatus, PROGRESS_COMPLETE};
use meshvault_core::stages::STAGE_COMPLETED;
use meshvault_core::types::{JobId, UserId};
use sqlx::PgPool;

use crate::models::job::{Job, JobListQuery, NewJob, PublishedModel};

/// Column list for `jobs` queries.
const COLUMNS: &str = "\
    id, user_id, status, filename, video_path, model_path, \
    model_url, error, metadata, created_at, updated_at";

/// Provides CRUD and lifecycle operations for scan jobs.
pub struct JobRepo;

impl JobRepo {
    /// Insert a new job with zero progress.
    pub async fn insert(pool: &PgPool, input: &NewJob) -> Result<Job, sqlx::Error> {
        let query = format!(
            "INSERT INTO jobs (id, user_id, status, filename) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(input.id)
            .bind(input.user_id)
            .bind(input.status.as_str())
            .bind(&input.filename)
            .fetch_one(pool)
            .await
    }

    /// Find a job by its ID.
    pub async fn find_by_id(pool: &PgPool, id: JobId) -> Result<Option<Job>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = $1");
        sqlx::query_as::<_, Job>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List a user's jobs, newest first.
    pub async fn list_by_user(
        pool: &PgPool,
        user_id: UserId,
        params: &JobListQuery,
    ) -> Result<Vec<Job>, sqlx::Error> {
        let (limit, offset) = params.page();
        let query = format!(
            "SELECT {COLUMNS} FROM jobs \
             WHERE user_id = $1 \
             ORDER BY created_at DESC \
             LIMIT $2 OFFSET $3"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(user_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// Move a `pending`/`uploading` job to `processing`, recording the
    /// stored video key when given.
    pub async fn start_processing(
        pool: &PgPool,
        id: JobId,
        video_path: Option<&str>,
    ) -> Result<Option<Job>, sqlx::Error> {
        let query = format!(
            "UPDATE jobs \
             SET status = $2, video_path = COALESCE($3, video_path), updated_at = NOW() \
             WHERE id = $1 AND status IN ($4, $5) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(id)
            .bind(JobStatus::Processing.as_str())
            .bind(video_path)
            .bind(JobStatus::Pending.as_str())
            .bind(JobStatus::Uploading.as_str())
            .fetch_optional(pool)
            .await
    }

    /// Write a stage update. Only applies while `processing` and only if
    /// progress does not go backwards.
    pub async fn update_progress(
        pool: &PgPool,
        id: JobId,
        progress: u8,
        stage: &str,
    ) -> Result<Option<Job>, sqlx::Error> {
        let query = format!(
            "UPDATE jobs \
             SET metadata = jsonb_build_object('progress', $2::int, 'current_stage', $3::text), \
                 updated_at = NOW() \
             WHERE id = $1 AND status = $4 \
               AND COALESCE((metadata->>'progress')::int, 0) <= $2::int \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(id)
            .bind(i32::from(progress))
            .bind(stage)
            .bind(JobStatus::Processing.as_str())
            .fetch_optional(pool)
            .await
    }

    /// Mark a `processing` job completed with its model location.
    pub async fn complete(
        pool: &PgPool,
        id: JobId,
        model: &PublishedModel,
    ) -> Result<Option<Job>, sqlx::Error> {
        let query = format!(
            "UPDATE jobs \
             SET status = $2, model_url = $3, model_path = $4, error = NULL, \
                 metadata = jsonb_build_object('progress', $5::int, 'current_stage', $6::text), \
                 updated_at = NOW() \
             WHERE id = $1 AND status = $7 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(id)
            .bind(JobStatus::Completed.as_str())
            .bind(&model.url)
            .bind(model.path.as_deref())
            .bind(i32::from(PROGRESS_COMPLETE))
            .bind(STAGE_COMPLETED)
            .bind(JobStatus::Processing.as_str())
            .fetch_optional(pool)
            .await
    }

    /// Mark a non-terminal job failed. Progress is left as it was.
    ///
    /// No automatic retry is performed.
    pub async fn fail(pool: &PgPool, id: JobId, error: &str) -> Result<Option<Job>, sqlx::Error> {
        let query = format!(
            "UPDATE jobs \
             SET status = $2, error = $3, model_url = NULL, updated_at = NOW() \
             WHERE id = $1 AND status IN ($4, $5, $6) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(id)
            .bind(JobStatus::Failed.as_str())
            .bind(error)
            .bind(JobStatus::Pending.as_str())
            .bind(JobStatus::Uploading.as_str())
            .bind(JobStatus::Processing.as_str())
            .fetch_optional(pool)
            .await
    }

    /// Delete a job, returning the removed row.
    pub async fn delete(pool: &PgPool, id: JobId) -> Result<Option<Job>, sqlx::Error> {
        let query = format!("DELETE FROM jobs WHERE id = $1 RETURNING {COLUMNS}");
        sqlx::query_as::<_, Job>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Count jobs currently in `status`.
    pub async fn count_by_status(pool: &PgPool, status: JobStatus) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM jobs WHERE status = $1")
            .bind(status.as_str())
            .fetch_one(pool)
            .await
    }
}
