//! PostgreSQL-backed [`JobStore`].

use async_trait::async_trait;
use meshvault_core::error::CoreError;
use meshvault_core::job_status::JobStatus;
use meshvault_core::types::{JobId, UserId};
use tokio::sync::broadcast;

use super::{ChangeFeed, ChangeKind, JobChange, JobStore, StoreError};
use crate::models::job::{Job, JobListQuery, NewJob, PublishedModel};
use crate::repositories::JobRepo;
use crate::DbPool;

/// [`JobStore`] over the `jobs` table.
///
/// Change notifications are published in-process after each committed
/// write, so observers in this process see every write this process makes.
pub struct PgJobStore {
    pool: DbPool,
    feed: ChangeFeed,
}

impl PgJobStore {
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            feed: ChangeFeed::default(),
        }
    }

    /// Turn a conditional update that matched no row into the right error.
    async fn rejected(&self, id: JobId, action: &str) -> StoreError {
        match JobRepo::find_by_id(&self.pool, id).await {
            Ok(None) => StoreError::not_found(id),
            Ok(Some(job)) => StoreError::Core(CoreError::Conflict(format!(
                "Cannot {action} job {id} in status {} at progress {}",
                job.status,
                job.progress()
            ))),
            Err(e) => StoreError::Database(e),
        }
    }

    fn publish(&self, kind: ChangeKind, job: Job) -> Job {
        self.feed.publish(kind, &job);
        job
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn insert(&self, new_job: NewJob) -> Result<Job, StoreError> {
        if !matches!(new_job.status, JobStatus::Pending | JobStatus::Uploading) {
            return Err(CoreError::Validation(format!(
                "New jobs must start pending or uploading, not {}",
                new_job.status
            ))
            .into());
        }
        let job = JobRepo::insert(&self.pool, &new_job).await?;
        Ok(self.publish(ChangeKind::Inserted, job))
    }

    async fn find_by_id(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        Ok(JobRepo::find_by_id(&self.pool, id).await?)
    }

    async fn list_by_user(&self, user_id: UserId, query: &JobListQuery) -> Result<Vec<Job>, StoreError> {
        Ok(JobRepo::list_by_user(&self.pool, user_id, query).await?)
    }

    async fn start_processing(&self, id: JobId, video_path: Option<&str>) -> Result<Job, StoreError> {
        match JobRepo::start_processing(&self.pool, id, video_path).await? {
            Some(job) => Ok(self.publish(ChangeKind::Updated, job)),
            None => Err(self.rejected(id, "start processing").await),
        }
    }

    async fn update_progress(&self, id: JobId, progress: u8, stage: &str) -> Result<Job, StoreError> {
        if progress > meshvault_core::job_status::PROGRESS_COMPLETE {
            return Err(CoreError::Validation(format!("Progress {progress} is out of range 0-100")).into());
        }
        match JobRepo::update_progress(&self.pool, id, progress, stage).await? {
            Some(job) => Ok(self.publish(ChangeKind::Updated, job)),
            None => Err(self.rejected(id, &format!("set progress {progress} on")).await),
        }
    }

    async fn complete(&self, id: JobId, model: &PublishedModel) -> Result<Job, StoreError> {
        match JobRepo::complete(&self.pool, id, model).await? {
            Some(job) => Ok(self.publish(ChangeKind::Updated, job)),
            None => Err(self.rejected(id, "complete").await),
        }
    }

    async fn fail(&self, id: JobId, error: &str) -> Result<Job, StoreError> {
        match JobRepo::fail(&self.pool, id, error).await? {
            Some(job) => Ok(self.publish(ChangeKind::Updated, job)),
            None => Err(self.rejected(id, "fail").await),
        }
    }

    async fn delete(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        let removed = JobRepo::delete(&self.pool, id).await?;
        Ok(removed.map(|job| self.publish(ChangeKind::Deleted, job)))
    }

    async fn count_by_status(&self, status: JobStatus) -> Result<i64, StoreError> {
        Ok(JobRepo::count_by_status(&self.pool, status).await?)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(crate::health_check(&self.pool).await?)
    }

    fn subscribe(&self) -> broadcast::Receiver<JobChange> {
        self.feed.subscribe()
    }
}
