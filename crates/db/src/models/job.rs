//! Scan job entity model and DTOs.

use meshvault_core::job_status::{JobMetadata, JobStatus};
use meshvault_core::types::{JobId, Timestamp, UserId};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `jobs` table. This is also the wire shape clients see.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub user_id: UserId,
    #[sqlx(try_from = "String")]
    pub status: JobStatus,
    pub filename: String,
    /// Blob-store key of the raw video, once stored.
    pub video_path: Option<String>,
    /// Blob-store key of the published model, if one was uploaded.
    pub model_path: Option<String>,
    pub model_url: Option<String>,
    pub error: Option<String>,
    #[sqlx(json)]
    pub metadata: JobMetadata,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Job {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn progress(&self) -> u8 {
        self.metadata.progress
    }

    /// Blob keys owned by this job, for cleanup on delete.
    pub fn blob_keys(&self) -> Vec<&str> {
        self.video_path
            .iter()
            .chain(self.model_path.iter())
            .map(String::as_str)
            .collect()
    }
}

/// Input for inserting a new job row.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub id: JobId,
    pub user_id: UserId,
    pub filename: String,
    /// Initial status; `pending` or `uploading`.
    pub status: JobStatus,
}

/// The artifact recorded on a job at the `completed` transition.
#[derive(Debug, Clone)]
pub struct PublishedModel {
    /// Public URL clients download the model from.
    pub url: String,
    /// Blob key, when the model lives in our own storage.
    pub path: Option<String>,
}

/// Maximum page size for job listing.
pub const MAX_LIMIT: i64 = 100;

/// Default page size for job listing.
pub const DEFAULT_LIMIT: i64 = 50;

/// Query parameters for `GET /api/v1/jobs`.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct JobListQuery {
    /// Maximum number of results. Defaults to 50, capped at 100.
    pub limit: Option<i64>,
    /// Number of results to skip. Defaults to 0.
    pub offset: Option<i64>,
}

impl JobListQuery {
    /// Resolved `(limit, offset)` with defaults and bounds applied.
    pub fn page(&self) -> (i64, i64) {
        let limit = self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        let offset = self.offset.unwrap_or(0).max(0);
        (limit, offset)
    }
}
