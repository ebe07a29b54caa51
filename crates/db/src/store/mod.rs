//! The job store seam.
//!
//! Submission, the processing driver and the observer all talk to a
//! `dyn JobStore` handed to them at construction, never to a global client.
//! Implementations must:
//!
//! - enforce the status state machine and monotonic progress, rejecting
//!   violating writes with [`CoreError::Conflict`];
//! - publish a [`JobChange`] for every successful write, after the write.

mod feed;
mod memory;
mod pg;

use async_trait::async_trait;
use meshvault_core::error::CoreError;
use meshvault_core::job_status::JobStatus;
use meshvault_core::types::{JobId, UserId};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::models::job::{Job, JobListQuery, NewJob, PublishedModel};

pub use feed::ChangeFeed;
pub use memory::MemoryJobStore;
pub use pg::PgJobStore;

/// Errors returned by [`JobStore`] operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Domain rejection: not found, invalid transition, bad input.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A database error from sqlx.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    pub fn not_found(id: JobId) -> Self {
        Self::Core(CoreError::NotFound { entity: "Job", id })
    }

    /// Whether retrying the same read could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Database(sqlx::Error::PoolTimedOut | sqlx::Error::Io(_))
        )
    }
}

/// What happened to the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Inserted,
    Updated,
    Deleted,
}

/// A row-level change notification carrying the row after the change
/// (or the removed row, for deletes).
#[derive(Debug, Clone, Serialize)]
pub struct JobChange {
    pub kind: ChangeKind,
    pub job: Job,
}

/// Persistent table of scan jobs with change notifications.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new job in `pending` or `uploading` with zero progress.
    async fn insert(&self, new_job: NewJob) -> Result<Job, StoreError>;

    async fn find_by_id(&self, id: JobId) -> Result<Option<Job>, StoreError>;

    /// A user's jobs, newest first.
    async fn list_by_user(&self, user_id: UserId, query: &JobListQuery) -> Result<Vec<Job>, StoreError>;

    /// `pending`/`uploading` -> `processing`, optionally recording the video key.
    async fn start_processing(&self, id: JobId, video_path: Option<&str>) -> Result<Job, StoreError>;

    /// Write `metadata.progress` / `metadata.current_stage` while processing.
    async fn update_progress(&self, id: JobId, progress: u8, stage: &str) -> Result<Job, StoreError>;

    /// `processing` -> `completed` with the published model.
    async fn complete(&self, id: JobId, model: &PublishedModel) -> Result<Job, StoreError>;

    /// Any non-terminal status -> `failed` with a message.
    async fn fail(&self, id: JobId, error: &str) -> Result<Job, StoreError>;

    /// Remove a job row, returning it if it existed.
    async fn delete(&self, id: JobId) -> Result<Option<Job>, StoreError>;

    async fn count_by_status(&self, status: JobStatus) -> Result<i64, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;

    /// Subscribe to changes on all jobs. Consumers filter by id.
    fn subscribe(&self) -> broadcast::Receiver<JobChange>;
}
