//! In-memory [`JobStore`] used by tests and database-less local runs.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use meshvault_core::error::CoreError;
use meshvault_core::job_status::{JobMetadata, JobStatus, PROGRESS_COMPLETE};
use meshvault_core::stages::STAGE_COMPLETED;
use meshvault_core::types::{JobId, UserId};
use tokio::sync::{broadcast, RwLock};

use super::{ChangeFeed, ChangeKind, JobChange, JobStore, StoreError};
use crate::models::job::{Job, JobListQuery, NewJob, PublishedModel};

#[derive(Default)]
struct Inner {
    /// Job plus its insertion sequence number (tie-break for ordering).
    jobs: HashMap<JobId, (u64, Job)>,
    next_seq: u64,
}

/// A [`JobStore`] holding rows in a map behind an async `RwLock`.
///
/// Applies the same state-machine checks the SQL statements encode.
#[derive(Default)]
pub struct MemoryJobStore {
    inner: RwLock<Inner>,
    feed: ChangeFeed,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `mutate` to an existing job under the write lock, then publish.
    async fn modify<F>(&self, id: JobId, mutate: F) -> Result<Job, StoreError>
    where
        F: FnOnce(&mut Job) -> Result<(), CoreError> + Send,
    {
        let updated = {
            let mut inner = self.inner.write().await;
            let (_, job) = inner.jobs.get_mut(&id).ok_or_else(|| StoreError::not_found(id))?;

            // Mutate a copy so a rejected write leaves the row untouched.
            let mut candidate = job.clone();
            mutate(&mut candidate)?;
            candidate.updated_at = Utc::now();
            *job = candidate.clone();
            candidate
        };
        self.feed.publish(ChangeKind::Updated, &updated);
        Ok(updated)
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert(&self, new_job: NewJob) -> Result<Job, StoreError> {
        if !matches!(new_job.status, JobStatus::Pending | JobStatus::Uploading) {
            return Err(CoreError::Validation(format!(
                "New jobs must start pending or uploading, not {}",
                new_job.status
            ))
            .into());
        }

        let now = Utc::now();
        let job = Job {
            id: new_job.id,
            user_id: new_job.user_id,
            status: new_job.status,
            filename: new_job.filename,
            video_path: None,
            model_path: None,
            model_url: None,
            error: None,
            metadata: JobMetadata::default(),
            created_at: now,
            updated_at: now,
        };

        {
            let mut inner = self.inner.write().await;
            if inner.jobs.contains_key(&job.id) {
                return Err(CoreError::Conflict(format!("Job {} already exists", job.id)).into());
            }
            let seq = inner.next_seq;
            inner.next_seq += 1;
            inner.jobs.insert(job.id, (seq, job.clone()));
        }

        self.feed.publish(ChangeKind::Inserted, &job);
        Ok(job)
    }

    async fn find_by_id(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        Ok(self.inner.read().await.jobs.get(&id).map(|(_, job)| job.clone()))
    }

    async fn list_by_user(&self, user_id: UserId, query: &JobListQuery) -> Result<Vec<Job>, StoreError> {
        let (limit, offset) = query.page();
        let inner = self.inner.read().await;

        let mut owned: Vec<&(u64, Job)> = inner
            .jobs
            .values()
            .filter(|(_, job)| job.user_id == user_id)
            .collect();
        owned.sort_by(|(seq_a, a), (seq_b, b)| {
            b.created_at.cmp(&a.created_at).then(seq_b.cmp(seq_a))
        });

        Ok(owned
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .map(|(_, job)| job.clone())
            .collect())
    }

    async fn start_processing(&self, id: JobId, video_path: Option<&str>) -> Result<Job, StoreError> {
        let video_path = video_path.map(str::to_string);
        self.modify(id, move |job| {
            job.status.check_transition(JobStatus::Processing)?;
            job.status = JobStatus::Processing;
            if video_path.is_some() {
                job.video_path = video_path;
            }
            Ok(())
        })
        .await
    }

    async fn update_progress(&self, id: JobId, progress: u8, stage: &str) -> Result<Job, StoreError> {
        let stage = stage.to_string();
        self.modify(id, move |job| {
            if job.status != JobStatus::Processing {
                return Err(CoreError::Conflict(format!(
                    "Cannot set progress on job {id} in status {}",
                    job.status
                )));
            }
            job.metadata.advance(progress, &stage)
        })
        .await
    }

    async fn complete(&self, id: JobId, model: &PublishedModel) -> Result<Job, StoreError> {
        let model = model.clone();
        self.modify(id, move |job| {
            job.status.check_transition(JobStatus::Completed)?;
            job.status = JobStatus::Completed;
            job.model_url = Some(model.url);
            job.model_path = model.path;
            job.error = None;
            job.metadata.progress = PROGRESS_COMPLETE;
            job.metadata.current_stage = Some(STAGE_COMPLETED.to_string());
            Ok(())
        })
        .await
    }

    async fn fail(&self, id: JobId, error: &str) -> Result<Job, StoreError> {
        let error = error.to_string();
        self.modify(id, move |job| {
            job.status.check_transition(JobStatus::Failed)?;
            job.status = JobStatus::Failed;
            job.error = Some(error);
            job.model_url = None;
            Ok(())
        })
        .await
    }

    async fn delete(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        let removed = self.inner.write().await.jobs.remove(&id).map(|(_, job)| job);
        if let Some(job) = &removed {
            self.feed.publish(ChangeKind::Deleted, job);
        }
        Ok(removed)
    }

    async fn count_by_status(&self, status: JobStatus) -> Result<i64, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.jobs.values().filter(|(_, job)| job.status == status).count() as i64)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<JobChange> {
        self.feed.subscribe()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
