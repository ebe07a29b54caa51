//! Processing drivers.
//!
//! A driver advances one job through its stages and hands back an
//! [`Artifact`]. Two [`StageSource`] implementations exist behind the
//! [`ProcessingDriver`] enum, chosen once at startup by [`DriverSelector`]:
//!
//! - [`SimulationDriver`] walks the fixed stage table on a timer;
//! - [`ExternalPipelineDriver`] runs the reconstruction executable and
//!   parses its progress markers.

mod external;
mod simulation;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use meshvault_core::types::JobId;

use crate::config::PipelineConfig;
use crate::error::PipelineError;

pub use external::{find_artifact, ExternalPipelineDriver, ARTIFACT_CANDIDATES, ARTIFACT_DIR};
pub use simulation::SimulationDriver;

/// Receives stage updates as a driver makes progress.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    /// Record that the job reached `progress` in `stage`.
    async fn stage(&self, progress: u8, stage: &str) -> Result<(), PipelineError>;
}

/// What a driver needs to process one job.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub job_id: JobId,
    /// Local copy of the raw video, if one was staged.
    pub video: Option<PathBuf>,
    /// Scratch directory for this run.
    pub job_dir: PathBuf,
    /// Progress already recorded on the job; stages below it are skipped.
    pub resume_from: u8,
}

/// The result of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifact {
    /// A model file on local disk, to be uploaded.
    File(PathBuf),
    /// A URL recorded as-is, with nothing to upload.
    Placeholder(String),
}

/// The "advance to next stage" capability shared by both driver modes.
#[async_trait]
pub trait StageSource: Send + Sync {
    /// Drive the job to the end, reporting each stage through `sink`.
    async fn run(&self, request: &RunRequest, sink: &dyn ProgressSink) -> Result<Artifact, PipelineError>;
}

/// Which driver implementation is in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverMode {
    Simulation,
    External,
}

impl DriverMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Simulation => "simulation",
            Self::External => "external",
        }
    }
}

/// A processing driver, fixed for the lifetime of the process.
#[derive(Debug, Clone)]
pub enum ProcessingDriver {
    Simulation(SimulationDriver),
    External(ExternalPipelineDriver),
}

impl ProcessingDriver {
    pub fn mode(&self) -> DriverMode {
        match self {
            Self::Simulation(_) => DriverMode::Simulation,
            Self::External(_) => DriverMode::External,
        }
    }

    /// Whether runs need a local copy of the raw video.
    pub fn needs_local_video(&self) -> bool {
        matches!(self, Self::External(_))
    }
}

#[async_trait]
impl StageSource for ProcessingDriver {
    async fn run(&self, request: &RunRequest, sink: &dyn ProgressSink) -> Result<Artifact, PipelineError> {
        match self {
            Self::Simulation(driver) => driver.run(request, sink).await,
            Self::External(driver) => driver.run(request, sink).await,
        }
    }
}

/// Picks the driver mode from the availability of the pipeline executable.
pub struct DriverSelector;

impl DriverSelector {
    /// External pipeline when its program (and any path-like leading
    /// argument, such as a script) exists; otherwise simulation.
    pub fn detect(config: &PipelineConfig) -> ProcessingDriver {
        let simulation = SimulationDriver::from_config(config);

        let Some((program, args)) = config.command_parts() else {
            tracing::warn!("PIPELINE_COMMAND is empty, using simulated processing");
            return ProcessingDriver::Simulation(simulation);
        };

        if !Self::executable_available(&program) {
            tracing::warn!(program = %program, "Scan pipeline executable not found, using simulated processing");
            return ProcessingDriver::Simulation(simulation);
        }

        if let Some(missing) = args.iter().find(|a| looks_like_path(a) && !Path::new(a.as_str()).exists()) {
            tracing::warn!(script = %missing, "Scan pipeline script not found, using simulated processing");
            return ProcessingDriver::Simulation(simulation);
        }

        tracing::info!(command = %config.command, "Using external scan pipeline");
        ProcessingDriver::External(ExternalPipelineDriver::new(program, args, config.timeout))
    }

    /// Whether `program` names an executable file, either directly (when
    /// it contains a path separator) or via a `PATH` lookup.
    pub fn executable_available(program: &str) -> bool {
        if looks_like_path(program) {
            return is_executable(Path::new(program));
        }
        std::env::var_os("PATH")
            .map(|paths| std::env::split_paths(&paths).any(|dir| is_executable(&dir.join(program))))
            .unwrap_or(false)
    }
}

fn looks_like_path(s: &str) -> bool {
    s.contains('/') || s.contains(std::path::MAIN_SEPARATOR)
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_is_found_on_path() {
        assert!(DriverSelector::executable_available("sh"));
    }

    #[test]
    fn unknown_program_is_unavailable() {
        assert!(!DriverSelector::executable_available("meshvault-no-such-binary-7f3a"));
        assert!(!DriverSelector::executable_available("/nonexistent/dir/pipeline"));
    }

    #[test]
    fn detect_falls_back_to_simulation_for_missing_script() {
        let config = PipelineConfig {
            command: "sh /nonexistent/pipeline/main.sh".into(),
            ..Default::default()
        };
        assert_eq!(DriverSelector::detect(&config).mode(), DriverMode::Simulation);
    }

    #[test]
    fn detect_uses_external_when_script_exists() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("pipeline.sh");
        std::fs::write(&script, "exit 0\n").unwrap();

        let config = PipelineConfig {
            command: format!("sh {}", script.display()),
            ..Default::default()
        };
        let driver = DriverSelector::detect(&config);
        assert_eq!(driver.mode(), DriverMode::External);
        assert!(driver.needs_local_video());
    }

    #[test]
    fn detect_falls_back_for_empty_command() {
        let config = PipelineConfig {
            command: String::new(),
            ..Default::default()
        };
        assert_eq!(DriverSelector::detect(&config).mode(), DriverMode::Simulation);
    }
}
