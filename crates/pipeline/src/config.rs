use std::path::PathBuf;
use std::time::Duration;

use meshvault_core::upload::DEFAULT_MAX_UPLOAD_BYTES;

/// Default command used to run the reconstruction pipeline.
pub const DEFAULT_PIPELINE_COMMAND: &str = "python3 pipeline/main.py";

/// Default model URL recorded by simulated runs.
pub const DEFAULT_PLACEHOLDER_MODEL_URL: &str = "/static/models/placeholder_scan.glb";

/// Processing configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Program plus leading arguments, whitespace separated. The driver
    /// appends `--video`, `--output` and `--job_id`.
    pub command: String,
    /// Scratch root; each job gets `{work_dir}/{job_id}/`.
    pub work_dir: PathBuf,
    /// Wall-clock ceiling for one external run. `None` disables it.
    pub timeout: Option<Duration>,
    /// Multiplier applied to simulated stage durations.
    pub simulation_time_scale: f64,
    /// Largest accepted upload in bytes.
    pub max_upload_bytes: u64,
    /// Model URL recorded when a run produces no real artifact.
    pub placeholder_model_url: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            command: DEFAULT_PIPELINE_COMMAND.into(),
            work_dir: PathBuf::from("./pipeline_work"),
            timeout: None,
            simulation_time_scale: 1.0,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            placeholder_model_url: DEFAULT_PLACEHOLDER_MODEL_URL.into(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                 | Default                                 |
    /// |-------------------------|-----------------------------------------|
    /// | `PIPELINE_COMMAND`      | `python3 pipeline/main.py`              |
    /// | `PIPELINE_WORK_DIR`     | `./pipeline_work`                       |
    /// | `PIPELINE_TIMEOUT_SECS` | `0` (disabled)                          |
    /// | `SIMULATION_TIME_SCALE` | `1.0`                                   |
    /// | `MAX_UPLOAD_BYTES`      | `524288000` (500 MiB)                   |
    /// | `PLACEHOLDER_MODEL_URL` | `/static/models/placeholder_scan.glb`   |
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let command = std::env::var("PIPELINE_COMMAND").unwrap_or(defaults.command);

        let work_dir = std::env::var("PIPELINE_WORK_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.work_dir);

        let timeout_secs: u64 = std::env::var("PIPELINE_TIMEOUT_SECS")
            .unwrap_or_else(|_| "0".into())
            .parse()
            .expect("PIPELINE_TIMEOUT_SECS must be a valid u64");

        let simulation_time_scale: f64 = std::env::var("SIMULATION_TIME_SCALE")
            .unwrap_or_else(|_| "1.0".into())
            .parse()
            .expect("SIMULATION_TIME_SCALE must be a number");

        let max_upload_bytes: u64 = std::env::var("MAX_UPLOAD_BYTES")
            .map(|v| v.parse().expect("MAX_UPLOAD_BYTES must be a valid u64"))
            .unwrap_or(defaults.max_upload_bytes);

        let placeholder_model_url =
            std::env::var("PLACEHOLDER_MODEL_URL").unwrap_or(defaults.placeholder_model_url);

        Self {
            command,
            work_dir,
            timeout: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
            simulation_time_scale,
            max_upload_bytes,
            placeholder_model_url,
        }
    }

    /// Split [`command`](Self::command) into program and leading arguments.
    pub fn command_parts(&self) -> Option<(String, Vec<String>)> {
        let mut parts = self.command.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some((program, parts.collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_parts_splits_program_and_args() {
        let config = PipelineConfig {
            command: "  python3   pipeline/main.py  ".into(),
            ..Default::default()
        };
        let (program, args) = config.command_parts().unwrap();
        assert_eq!(program, "python3");
        assert_eq!(args, vec!["pipeline/main.py"]);
    }

    #[test]
    fn blank_command_has_no_parts() {
        let config = PipelineConfig {
            command: "   ".into(),
            ..Default::default()
        };
        assert!(config.command_parts().is_none());
    }

    #[test]
    fn timeout_disabled_by_default() {
        assert!(PipelineConfig::default().timeout.is_none());
    }
}
