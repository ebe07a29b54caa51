#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use meshvault_core::retry::RetryPolicy;
use meshvault_core::types::JobId;
use meshvault_db::models::job::Job;
use meshvault_db::{JobStore, MemoryJobStore};
use meshvault_pipeline::driver::{ExternalPipelineDriver, SimulationDriver};
use meshvault_pipeline::{JobObserver, JobRunner, JobSubmission, ProcessingDriver, ResultPublisher, VideoUpload};
use meshvault_storage::{BlobStore, LocalBlobStore};
use tempfile::TempDir;

pub const PUBLIC_URL: &str = "http://localhost:3000/files";
pub const PLACEHOLDER_URL: &str = "https://cdn.example.com/placeholder.glb";

/// A submission stack over the in-memory store and a temp-dir blob store.
pub struct Harness {
    pub store: Arc<MemoryJobStore>,
    pub blobs: Arc<LocalBlobStore>,
    pub runner: JobRunner,
    pub submission: JobSubmission,
    pub storage: TempDir,
    pub work: TempDir,
    pub scripts: TempDir,
}

impl Harness {
    pub fn simulated() -> Self {
        Self::build(|_| ProcessingDriver::Simulation(SimulationDriver::new(1.0, PLACEHOLDER_URL)), 1024)
    }

    /// Harness whose driver runs `sh <script>` with `body` as the script.
    pub fn with_script(body: &str, timeout: Option<Duration>) -> Self {
        let body = body.to_string();
        Self::build(
            move |scripts| {
                let script = scripts.path().join("pipeline.sh");
                std::fs::write(&script, body).expect("write script");
                ProcessingDriver::External(ExternalPipelineDriver::new(
                    "sh",
                    vec![script.display().to_string()],
                    timeout,
                ))
            },
            1024,
        )
    }

    pub fn with_upload_limit(max_upload_bytes: u64) -> Self {
        Self::build(
            |_| ProcessingDriver::Simulation(SimulationDriver::new(0.0, PLACEHOLDER_URL)),
            max_upload_bytes,
        )
    }

    fn build(driver: impl FnOnce(&TempDir) -> ProcessingDriver, max_upload_bytes: u64) -> Self {
        let storage = tempfile::tempdir().expect("storage dir");
        let work = tempfile::tempdir().expect("work dir");
        let scripts = tempfile::tempdir().expect("scripts dir");

        let store = Arc::new(MemoryJobStore::new());
        let blobs = Arc::new(LocalBlobStore::new(storage.path(), PUBLIC_URL));
        let store_dyn: Arc<dyn JobStore> = store.clone();
        let blobs_dyn: Arc<dyn BlobStore> = blobs.clone();

        let runner = JobRunner::new(
            Arc::clone(&store_dyn),
            driver(&scripts),
            SimulationDriver::new(0.0, PLACEHOLDER_URL),
            ResultPublisher::new(Arc::clone(&blobs_dyn)),
            work.path().to_path_buf(),
        );
        let submission = JobSubmission::new(store_dyn, blobs_dyn, runner.clone(), max_upload_bytes);

        Self {
            store,
            blobs,
            runner,
            submission,
            storage,
            work,
            scripts,
        }
    }

    pub fn store_dyn(&self) -> Arc<dyn JobStore> {
        self.store.clone()
    }

    /// Wait until the job reaches a terminal status and return it.
    pub async fn wait_for_terminal(&self, job_id: JobId) -> Job {
        let mut observer = JobObserver::open(self.store_dyn(), job_id, &RetryPolicy::default())
            .await
            .expect("open observer");

        tokio::time::timeout(Duration::from_secs(20), async {
            if observer.current().is_terminal() {
                return observer.current().clone();
            }
            while let Some(event) = observer.next_event().await {
                if event.is_terminal() {
                    break;
                }
            }
            observer.current().clone()
        })
        .await
        .expect("job did not finish in time")
    }
}

pub fn video(name: &str) -> VideoUpload {
    VideoUpload {
        filename: name.to_string(),
        bytes: b"\x00\x00\x00\x18ftypmp42 fake video".to_vec(),
    }
}
