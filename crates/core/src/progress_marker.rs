//! Parser for the progress markers printed by the external scan pipeline.
//!
//! The pipeline reports progress on stdout as two independent lines:
//!
//! ```text
//! Progress: 20%
//! Stage: generating depth maps
//! ```
//!
//! [`MarkerParser`] consumes lines one at a time and yields a
//! [`StageUpdate`] once both a progress value and a stage label have been
//! seen. Any other output is ignored.

use std::sync::LazyLock;

use regex::Regex;

use crate::job_status::PROGRESS_COMPLETE;

static PROGRESS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Progress:\s*(\d+)\s*%").expect("valid regex"));

static STAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Stage:\s*(\S.*?)\s*$").expect("valid regex"));

/// A complete progress report parsed from pipeline output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageUpdate {
    pub progress: u8,
    pub stage: String,
}

/// A single recognised marker line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Marker {
    Progress(u8),
    Stage(String),
}

/// Recognise a single line. Progress values above 100 are clamped.
pub fn parse_line(line: &str) -> Option<Marker> {
    if let Some(caps) = PROGRESS_RE.captures(line) {
        let value: u64 = caps[1].parse().unwrap_or(u64::MAX);
        let clamped = value.min(u64::from(PROGRESS_COMPLETE)) as u8;
        return Some(Marker::Progress(clamped));
    }
    STAGE_RE
        .captures(line)
        .map(|caps| Marker::Stage(caps[1].to_string()))
}

/// Stateful pairing of progress and stage markers.
#[derive(Debug, Default)]
pub struct MarkerParser {
    progress: Option<u8>,
    stage: Option<String>,
}

impl MarkerParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line of output. Returns an update when the line completes a
    /// progress/stage pair; the pair is then cleared.
    pub fn feed(&mut self, line: &str) -> Option<StageUpdate> {
        match parse_line(line)? {
            Marker::Progress(p) => self.progress = Some(p),
            Marker::Stage(s) => self.stage = Some(s),
        }

        if self.progress.is_some() && self.stage.is_some() {
            let progress = self.progress.take()?;
            let stage = self.stage.take()?;
            Some(StageUpdate { progress, stage })
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
