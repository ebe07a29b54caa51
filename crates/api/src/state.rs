use std::sync::Arc;

use meshvault_db::JobStore;
use meshvault_pipeline::driver::SimulationDriver;
use meshvault_pipeline::{JobRunner, JobSubmission, PipelineConfig, ProcessingDriver, ResultPublisher};
use meshvault_storage::BlobStore;

use crate::config::ServerConfig;

/// Shared application state available to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn JobStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub runner: JobRunner,
    pub submission: JobSubmission,
    pub config: Arc<ServerConfig>,
    pub pipeline: Arc<PipelineConfig>,
}

impl AppState {
    /// Wire the runner and submission service over the given store, blob
    /// store and driver.
    pub fn new(
        store: Arc<dyn JobStore>,
        blobs: Arc<dyn BlobStore>,
        driver: ProcessingDriver,
        config: ServerConfig,
        pipeline: PipelineConfig,
    ) -> Self {
        let runner = JobRunner::new(
            Arc::clone(&store),
            driver,
            SimulationDriver::from_config(&pipeline),
            ResultPublisher::new(Arc::clone(&blobs)),
            pipeline.work_dir.clone(),
        );
        let submission = JobSubmission::new(
            Arc::clone(&store),
            Arc::clone(&blobs),
            runner.clone(),
            pipeline.max_upload_bytes,
        );

        Self {
            store,
            blobs,
            runner,
            submission,
            config: Arc::new(config),
            pipeline: Arc::new(pipeline),
        }
    }
}
