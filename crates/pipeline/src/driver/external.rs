//! Driver that runs the reconstruction pipeline as a child process.
//!
//! The child is invoked as
//! `<program> [args..] --video <path> --output <dir> --job_id <id>`.
//! Its stdout is parsed line by line for `Progress: N%` / `Stage: <label>`
//! pairs; stderr is drained in the background and its last few lines are
//! attached to the error if the child exits non-zero.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use meshvault_core::progress_marker::MarkerParser;
use meshvault_core::stages::STAGE_FAILED;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};

use super::{Artifact, ProgressSink, RunRequest, StageSource};
use crate::error::PipelineError;

/// Subdirectory of the output directory the pipeline writes meshes into.
pub const ARTIFACT_DIR: &str = "point_clouds";

/// Artifact names in order of preference.
pub const ARTIFACT_CANDIDATES: &[&str] = &["final_mesh.ply", "simplified_mesh.ply"];

/// Number of trailing stderr lines kept for error messages.
const STDERR_TAIL_LINES: usize = 5;

/// Runs the external reconstruction executable.
#[derive(Debug, Clone)]
pub struct ExternalPipelineDriver {
    program: String,
    args: Vec<String>,
    timeout: Option<Duration>,
}

/// How the child's stdout stream ended.
struct StreamOutcome {
    status: ExitStatus,
    reported_failure: bool,
}

impl ExternalPipelineDriver {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Option<Duration>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    fn command(&self, video: &Path, output_dir: &Path, request: &RunRequest) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg("--video")
            .arg(video)
            .arg("--output")
            .arg(output_dir)
            .arg("--job_id")
            .arg(request.job_id.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    /// Forward stage updates until stdout closes, then reap the child.
    async fn follow(
        child: &mut Child,
        request: &RunRequest,
        sink: &dyn ProgressSink,
    ) -> Result<StreamOutcome, PipelineError> {
        let mut reported_failure = false;

        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            let mut parser = MarkerParser::new();

            while let Some(line) = lines.next_line().await? {
                tracing::trace!(job_id = %request.job_id, line = %line, "pipeline stdout");
                let Some(update) = parser.feed(&line) else {
                    continue;
                };
                if update.stage.eq_ignore_ascii_case(STAGE_FAILED) {
                    tracing::warn!(job_id = %request.job_id, progress = update.progress, "Pipeline reported failure");
                    reported_failure = true;
                    continue;
                }
                sink.stage(update.progress, &update.stage).await?;
            }
        }

        let status = child.wait().await?;
        Ok(StreamOutcome {
            status,
            reported_failure,
        })
    }
}

#[async_trait]
impl StageSource for ExternalPipelineDriver {
    async fn run(&self, request: &RunRequest, sink: &dyn ProgressSink) -> Result<Artifact, PipelineError> {
        let video = request
            .video
            .as_deref()
            .ok_or(PipelineError::MissingVideo(request.job_id))?;

        let output_dir = request.job_dir.join("output");
        tokio::fs::create_dir_all(&output_dir).await?;

        let mut child = self
            .command(video, &output_dir, request)
            .spawn()
            .map_err(PipelineError::Spawn)?;
        tracing::info!(job_id = %request.job_id, pid = child.id(), program = %self.program, "Started scan pipeline");

        let stderr_task = tokio::spawn(drain_stderr(child.stderr.take(), request.job_id.to_string()));

        let followed = Self::follow(&mut child, request, sink);
        let outcome = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, followed).await {
                Ok(result) => result,
                Err(_) => {
                    // Dropping `child` kills it (kill_on_drop).
                    stderr_task.abort();
                    return Err(PipelineError::Timeout(limit));
                }
            },
            None => followed.await,
        };
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                stderr_task.abort();
                return Err(e);
            }
        };

        let stderr_tail = stderr_task.await.unwrap_or_default();

        if !outcome.status.success() {
            return Err(PipelineError::exit(outcome.status.code(), stderr_tail.last().map(String::as_str)));
        }

        match find_artifact(&output_dir).await {
            Some(path) => {
                tracing::info!(job_id = %request.job_id, artifact = %path.display(), "Scan pipeline produced a model");
                Ok(Artifact::File(path))
            }
            None if outcome.reported_failure => Err(PipelineError::ReportedFailure),
            None => Err(PipelineError::MissingArtifact(output_dir.join(ARTIFACT_DIR))),
        }
    }
}

/// First existing artifact under `{output_dir}/point_clouds/`.
pub async fn find_artifact(output_dir: &Path) -> Option<PathBuf> {
    let dir = output_dir.join(ARTIFACT_DIR);
    for name in ARTIFACT_CANDIDATES {
        let candidate = dir.join(name);
        if tokio::fs::metadata(&candidate).await.is_ok_and(|m| m.is_file()) {
            return Some(candidate);
        }
    }
    None
}

/// Log stderr at debug level and return its last few lines.
async fn drain_stderr<R: AsyncRead + Unpin>(stream: Option<R>, job_id: String) -> Vec<String> {
    let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
    let Some(stream) = stream else {
        return Vec::new();
    };
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::debug!(job_id = %job_id, line = %line, "pipeline stderr");
        if line.trim().is_empty() {
            continue;
        }
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    tail.into()
}
