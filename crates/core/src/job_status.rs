//! Scan job status state machine and progress metadata.
//!
//! A job moves forward only:
//!
//! ```text
//! pending   -> uploading | processing | failed
//! uploading -> processing | failed
//! processing -> completed | failed
//! ```
//!
//! `completed` and `failed` are terminal. Both store implementations call
//! [`JobStatus::check_transition`] and [`JobMetadata::advance`] before
//! writing, so a violating update is rejected instead of applied.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Progress value written when a job completes.
pub const PROGRESS_COMPLETE: u8 = 100;

/// Lifecycle status of a scan job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Uploading,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// Database / wire representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Uploading => "uploading",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// `completed` or `failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    ///
    /// Self-transitions are not transitions and return `false`.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Uploading)
                | (Pending, Processing)
                | (Pending, Failed)
                | (Uploading, Processing)
                | (Uploading, Failed)
                | (Processing, Completed)
                | (Processing, Failed)
        )
    }

    /// Like [`can_transition_to`](Self::can_transition_to) but returns a
    /// [`CoreError::Conflict`] describing the rejected move.
    pub fn check_transition(self, next: JobStatus) -> Result<(), CoreError> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(CoreError::Conflict(format!(
                "Invalid job status transition: {self} -> {next}"
            )))
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "uploading" => Ok(Self::Uploading),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(CoreError::Validation(format!(
                "Unknown job status '{other}'"
            ))),
        }
    }
}

impl TryFrom<String> for JobStatus {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// The `metadata` object stored on every job row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobMetadata {
    /// Completion percentage (0-100).
    #[serde(default)]
    pub progress: u8,
    /// Display label of the active processing stage.
    #[serde(default)]
    pub current_stage: Option<String>,
}

impl JobMetadata {
    /// Apply a stage update, enforcing that progress never decreases and
    /// never exceeds 100.
    pub fn advance(&mut self, progress: u8, stage: &str) -> Result<(), CoreError> {
        if progress > PROGRESS_COMPLETE {
            return Err(CoreError::Validation(format!(
                "Progress {progress} is out of range 0-100"
            )));
        }
        if progress < self.progress {
            return Err(CoreError::Conflict(format!(
                "Progress may not decrease ({} -> {progress})",
                self.progress
            )));
        }
        self.progress = progress;
        self.current_stage = Some(stage.to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
