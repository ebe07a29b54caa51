//! WebSocket message type constants for scan job events.
//!
//! Used by the per-job observation socket in the API crate when forwarding
//! observer events to connected clients.

/// Progress update during processing (percentage + current stage).
pub const MSG_TYPE_JOB_PROGRESS: &str = "job_progress";

/// Job completed successfully and has a model URL.
pub const MSG_TYPE_JOB_COMPLETED: &str = "job_completed";

/// Job failed with an error.
pub const MSG_TYPE_JOB_FAILED: &str = "job_failed";

/// The job was deleted; the stream ends after this message.
pub const MSG_TYPE_JOB_DELETED: &str = "job_deleted";
