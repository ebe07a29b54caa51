//! The fixed processing stage table.
//!
//! The simulation driver walks this table in order; the external pipeline
//! reports its own labels but follows the same increasing-progress contract.

use std::time::Duration;

/// One named processing phase with its target progress percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage {
    /// Display label written to `metadata.current_stage`.
    pub name: &'static str,
    /// Progress percentage reached when the stage starts.
    pub progress: u8,
    /// How long the simulation dwells in this stage.
    pub duration: Duration,
}

impl Stage {
    const fn new(name: &'static str, progress: u8, secs: u64) -> Self {
        Self {
            name,
            progress,
            duration: Duration::from_secs(secs),
        }
    }
}

/// Stage label written together with `status = completed`.
pub const STAGE_COMPLETED: &str = "completed";

/// Stage label the external pipeline prints when it gives up.
pub const STAGE_FAILED: &str = "failed";

/// Ordered stages, strictly increasing in progress, all below 100.
pub const SCAN_STAGES: &[Stage] = &[
    Stage::new("analyzing video", 10, 2),
    Stage::new("extracting frames", 20, 3),
    Stage::new("detecting features", 30, 3),
    Stage::new("generating point cloud", 50, 4),
    Stage::new("building mesh", 70, 4),
    Stage::new("applying textures", 85, 3),
    Stage::new("finalizing model", 95, 2),
];

/// Total simulated wall-clock time for the whole table at scale 1.0.
pub fn total_duration(stages: &[Stage]) -> Duration {
    stages.iter().map(|s| s.duration).sum()
}

/// Scale a stage duration by a non-negative factor.
///
/// Negative or non-finite factors are treated as zero.
pub fn scaled(duration: Duration, factor: f64) -> Duration {
    if !factor.is_finite() || factor <= 0.0 {
        return Duration::ZERO;
    }
    duration.mul_f64(factor)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
