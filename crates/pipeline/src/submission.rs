//! Accepting a video upload and turning it into a running scan job.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use meshvault_core::error::CoreError;
use meshvault_core::job_status::JobStatus;
use meshvault_core::types::{JobId, UserId};
use meshvault_core::upload::{content_type_for, validate_video, video_storage_key};
use meshvault_db::models::job::NewJob;
use meshvault_db::{JobStore, StoreError};
use meshvault_storage::{BlobError, BlobStore};
use uuid::Uuid;

use crate::runner::JobRunner;

/// A video received from a client.
#[derive(Debug, Clone)]
pub struct VideoUpload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Errors returned by [`JobSubmission::submit`].
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("A video file is required")]
    MissingFile,

    #[error("A user id is required")]
    MissingUser,

    /// Bad extension, empty or oversized file. No job was created.
    #[error(transparent)]
    Invalid(CoreError),

    /// The job was created but its video could not be stored; the job has
    /// been marked failed.
    #[error("Failed to store video for job {job_id}: {source}")]
    Storage {
        job_id: JobId,
        #[source]
        source: BlobError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Validates uploads, creates jobs and hands them to the [`JobRunner`].
#[derive(Clone)]
pub struct JobSubmission {
    store: Arc<dyn JobStore>,
    blobs: Arc<dyn BlobStore>,
    runner: JobRunner,
    max_upload_bytes: u64,
}

impl JobSubmission {
    pub fn new(store: Arc<dyn JobStore>, blobs: Arc<dyn BlobStore>, runner: JobRunner, max_upload_bytes: u64) -> Self {
        Self {
            store,
            blobs,
            runner,
            max_upload_bytes,
        }
    }

    /// Create a job for `file`, store the video, move the job to
    /// `processing` and start its driver in the background.
    ///
    /// Input problems are rejected before any row is written. A storage
    /// failure after the row exists marks the job failed. A driver that
    /// cannot be started is logged and does not fail the submission.
    pub async fn submit(&self, file: Option<VideoUpload>, user_id: Option<UserId>) -> Result<JobId, SubmitError> {
        let file = file.ok_or(SubmitError::MissingFile)?;
        let user_id = user_id.ok_or(SubmitError::MissingUser)?;

        let ext = validate_video(&file.filename, file.bytes.len() as u64, self.max_upload_bytes)
            .map_err(SubmitError::Invalid)?;

        let job_id = Uuid::new_v4();
        self.store
            .insert(NewJob {
                id: job_id,
                user_id,
                filename: file.filename.clone(),
                status: JobStatus::Uploading,
            })
            .await?;
        tracing::info!(job_id = %job_id, user_id = %user_id, filename = %file.filename, size = file.bytes.len(), "Scan job created");

        let staged = if self.runner.needs_local_video() {
            self.stage_locally(job_id, &ext, &file.bytes).await
        } else {
            None
        };

        let key = video_storage_key(user_id, job_id, &file.filename, Utc::now());
        if let Err(source) = self.blobs.put(&key, file.bytes, content_type_for(&file.filename)).await {
            tracing::error!(job_id = %job_id, key = %key, error = %source, "Failed to store video");
            let message = format!("Failed to store video: {source}");
            if let Err(e) = self.store.fail(job_id, &message).await {
                tracing::error!(job_id = %job_id, error = %e, "Failed to mark job as failed");
            }
            self.discard_staged(job_id).await;
            return Err(SubmitError::Storage { job_id, source });
        }

        let job = self.store.start_processing(job_id, Some(&key)).await?;

        if let Err(e) = self.runner.start(&job, staged) {
            tracing::warn!(job_id = %job_id, error = %e, "Failed to start processing driver");
            self.discard_staged(job_id).await;
        }

        Ok(job_id)
    }

    /// Write a local copy of the video for the external pipeline. A failure
    /// is logged; the driver then fails the job for lack of a video.
    async fn stage_locally(&self, job_id: JobId, ext: &str, bytes: &[u8]) -> Option<PathBuf> {
        let dir = self.runner.job_dir(job_id);
        let path = dir.join(format!("input.{ext}"));

        let result = async {
            tokio::fs::create_dir_all(&dir).await?;
            tokio::fs::write(&path, bytes).await
        }
        .await;

        match result {
            Ok(()) => Some(path),
            Err(e) => {
                tracing::warn!(job_id = %job_id, path = %path.display(), error = %e, "Failed to stage video locally");
                None
            }
        }
    }

    /// Remove the scratch directory of a job whose driver never ran.
    async fn discard_staged(&self, job_id: JobId) {
        let dir = self.runner.job_dir(job_id);
        if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(job_id = %job_id, path = %dir.display(), error = %e, "Failed to remove staged video");
            }
        }
    }
}
