use std::path::PathBuf;
use std::time::Duration;

use meshvault_core::job_status::JobStatus;
use meshvault_core::types::JobId;
use meshvault_db::StoreError;
use meshvault_storage::BlobError;

/// Errors raised while driving a job to completion.
///
/// The `Display` text is what ends up in the job's `error` column, so each
/// message is written for the end user.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Failed to start the scan pipeline: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Scan pipeline I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Non-zero exit or termination by signal.
    #[error("{message}")]
    Exit { code: Option<i32>, message: String },

    #[error("Scan pipeline timed out after {} seconds", .0.as_secs())]
    Timeout(Duration),

    #[error("Scan pipeline finished but no model file was found in {}", .0.display())]
    MissingArtifact(PathBuf),

    #[error("Scan pipeline reported a failure and produced no model file")]
    ReportedFailure,

    #[error("No local copy of the video is available for job {0}")]
    MissingVideo(JobId),

    #[error("Failed to upload model file: {0}")]
    Publish(#[source] BlobError),

    #[error("Job {0} is already being processed")]
    AlreadyRunning(JobId),

    #[error("Job {id} is already {status}")]
    Finished { id: JobId, status: JobStatus },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl PipelineError {
    /// Build an [`Exit`](Self::Exit) error from an exit code and the tail of
    /// the child's stderr.
    pub fn exit(code: Option<i32>, stderr_tail: Option<&str>) -> Self {
        let mut message = match code {
            Some(code) => format!("Scan pipeline exited with code {code}"),
            None => "Scan pipeline was terminated by a signal".to_string(),
        };
        if let Some(tail) = stderr_tail.map(str::trim).filter(|t| !t.is_empty()) {
            message.push_str(": ");
            message.push_str(tail);
        }
        Self::Exit { code, message }
    }
}
