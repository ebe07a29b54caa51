//! Runs processing drivers on background tasks and records the outcome.
//!
//! No automatic retry is performed: any error during a run marks the job
//! `failed` with the error's message and leaves its progress as it was.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use meshvault_core::job_status::JobStatus;
use meshvault_core::types::{JobId, UserId};
use meshvault_db::models::job::Job;
use meshvault_db::JobStore;
use tokio::task::JoinHandle;

use crate::driver::{DriverMode, ProcessingDriver, ProgressSink, RunRequest, SimulationDriver, StageSource};
use crate::error::PipelineError;
use crate::publisher::ResultPublisher;

type ActiveJobs = Arc<Mutex<HashSet<JobId>>>;

/// Marks a job as having a live driver. Released on drop, including when
/// the driver task panics.
pub struct ActiveJob {
    id: JobId,
    active: ActiveJobs,
}

impl Drop for ActiveJob {
    fn drop(&mut self) {
        if let Ok(mut set) = self.active.lock() {
            set.remove(&self.id);
        }
    }
}

/// Starts drivers for jobs and writes their results back to the store.
#[derive(Clone)]
pub struct JobRunner {
    store: Arc<dyn JobStore>,
    driver: Arc<ProcessingDriver>,
    simulation: Arc<ProcessingDriver>,
    publisher: ResultPublisher,
    work_dir: PathBuf,
    active: ActiveJobs,
}

impl JobRunner {
    pub fn new(
        store: Arc<dyn JobStore>,
        driver: ProcessingDriver,
        simulation: SimulationDriver,
        publisher: ResultPublisher,
        work_dir: PathBuf,
    ) -> Self {
        Self {
            store,
            driver: Arc::new(driver),
            simulation: Arc::new(ProcessingDriver::Simulation(simulation)),
            publisher,
            work_dir,
            active: Arc::default(),
        }
    }

    pub fn mode(&self) -> DriverMode {
        self.driver.mode()
    }

    pub fn needs_local_video(&self) -> bool {
        self.driver.needs_local_video()
    }

    /// Scratch directory for one job's run.
    pub fn job_dir(&self, job_id: JobId) -> PathBuf {
        self.work_dir.join(job_id.to_string())
    }

    pub fn is_running(&self, job_id: JobId) -> bool {
        self.active.lock().map(|set| set.contains(&job_id)).unwrap_or(false)
    }

    /// Claim the single driver slot for `job_id`.
    fn claim(&self, job_id: JobId) -> Result<ActiveJob, PipelineError> {
        let mut set = self
            .active
            .lock()
            .map_err(|_| PipelineError::AlreadyRunning(job_id))?;
        if !set.insert(job_id) {
            return Err(PipelineError::AlreadyRunning(job_id));
        }
        Ok(ActiveJob {
            id: job_id,
            active: Arc::clone(&self.active),
        })
    }

    /// Start the configured driver for a job that is already `processing`.
    pub fn start(&self, job: &Job, video: Option<PathBuf>) -> Result<JoinHandle<()>, PipelineError> {
        if job.status != JobStatus::Processing {
            return Err(PipelineError::Finished {
                id: job.id,
                status: job.status,
            });
        }
        let guard = self.claim(job.id)?;
        Ok(self.launch(guard, Arc::clone(&self.driver), job, video))
    }

    /// Run the simulation for `job`, moving it to `processing` first if it
    /// has not started yet.
    pub async fn simulate(&self, job: &Job) -> Result<JoinHandle<()>, PipelineError> {
        if job.is_terminal() {
            return Err(PipelineError::Finished {
                id: job.id,
                status: job.status,
            });
        }
        let guard = self.claim(job.id)?;

        let job = if job.status == JobStatus::Processing {
            job.clone()
        } else {
            self.store.start_processing(job.id, None).await?
        };
        Ok(self.launch(guard, Arc::clone(&self.simulation), &job, None))
    }

    fn launch(
        &self,
        guard: ActiveJob,
        driver: Arc<ProcessingDriver>,
        job: &Job,
        video: Option<PathBuf>,
    ) -> JoinHandle<()> {
        let request = RunRequest {
            job_id: job.id,
            video,
            job_dir: self.job_dir(job.id),
            resume_from: job.progress(),
        };
        let user_id = job.user_id;
        let runner = self.clone();

        tracing::info!(job_id = %job.id, mode = driver.mode().as_str(), "Starting scan processing");

        tokio::spawn(async move {
            let _guard = guard;
            runner.drive(&driver, user_id, request).await;
        })
    }

    /// Run to the end and record `completed` or `failed`.
    async fn drive(&self, driver: &ProcessingDriver, user_id: UserId, request: RunRequest) {
        let job_id = request.job_id;
        let sink = StoreProgress {
            store: Arc::clone(&self.store),
            job_id,
            last: AtomicU8::new(request.resume_from),
        };

        let result = async {
            let artifact = driver.run(&request, &sink).await?;
            let model = self.publisher.publish(user_id, job_id, &artifact).await?;
            match self.store.complete(job_id, &model).await {
                Ok(job) => Ok(job),
                Err(e) => {
                    self.publisher.retract(job_id, &model).await;
                    Err(PipelineError::from(e))
                }
            }
        }
        .await;

        match result {
            Ok(job) => {
                tracing::info!(job_id = %job_id, model_url = ?job.model_url, "Scan job completed");
            }
            Err(e) => {
                tracing::warn!(job_id = %job_id, error = %e, "Scan job failed");
                if let Err(fail_err) = self.store.fail(job_id, &e.to_string()).await {
                    tracing::error!(job_id = %job_id, error = %fail_err, "Failed to mark job as failed");
                }
            }
        }

        if driver.mode() == DriverMode::External {
            if let Err(e) = tokio::fs::remove_dir_all(&request.job_dir).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(job_id = %job_id, error = %e, "Failed to remove job scratch directory");
                }
            }
        }
    }
}

/// Writes each stage update to the job row. Updates that would move
/// progress backwards are dropped.
struct StoreProgress {
    store: Arc<dyn JobStore>,
    job_id: JobId,
    last: AtomicU8,
}

#[async_trait]
impl ProgressSink for StoreProgress {
    async fn stage(&self, progress: u8, stage: &str) -> Result<(), PipelineError> {
        let last = self.last.load(Ordering::Acquire);
        if progress < last {
            tracing::debug!(job_id = %self.job_id, progress, last, stage, "Ignoring non-advancing stage update");
            return Ok(());
        }
        self.store.update_progress(self.job_id, progress, stage).await?;
        self.last.store(progress, Ordering::Release);
        tracing::debug!(job_id = %self.job_id, progress, stage, "Stage update");
        Ok(())
    }
}
