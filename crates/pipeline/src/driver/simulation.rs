use async_trait::async_trait;
use meshvault_core::stages::{scaled, Stage, SCAN_STAGES};

use super::{Artifact, ProgressSink, RunRequest, StageSource};
use crate::config::PipelineConfig;
use crate::error::PipelineError;

/// Timed walk through the stage table, ending with a placeholder model.
#[derive(Debug, Clone)]
pub struct SimulationDriver {
    stages: &'static [Stage],
    time_scale: f64,
    placeholder_url: String,
}

impl SimulationDriver {
    pub fn new(time_scale: f64, placeholder_url: impl Into<String>) -> Self {
        Self {
            stages: SCAN_STAGES,
            time_scale,
            placeholder_url: placeholder_url.into(),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.simulation_time_scale, config.placeholder_model_url.clone())
    }
}

#[async_trait]
impl StageSource for SimulationDriver {
    async fn run(&self, request: &RunRequest, sink: &dyn ProgressSink) -> Result<Artifact, PipelineError> {
        for stage in self.stages.iter().filter(|s| s.progress >= request.resume_from) {
            tracing::debug!(job_id = %request.job_id, stage = stage.name, progress = stage.progress, "Simulated stage");
            sink.stage(stage.progress, stage.name).await?;
            tokio::time::sleep(scaled(stage.duration, self.time_scale)).await;
        }
        Ok(Artifact::Placeholder(self.placeholder_url.clone()))
    }
}
