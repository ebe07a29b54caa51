//! Watching a single job's state for display.
//!
//! [`JobObserver::open`] subscribes to the store's change feed, reads the
//! job once, and then [`JobObserver::next_event`] yields one event per
//! change to that job. The terminal event (`Completed` / `Failed`) is
//! emitted exactly once: only when the status changes into a terminal
//! status from something else, as tracked by `previous_status`.

use std::sync::Arc;

use meshvault_core::job_status::JobStatus;
use meshvault_core::retry::{retry_with_backoff, RetryPolicy};
use meshvault_core::types::JobId;
use meshvault_db::models::job::Job;
use meshvault_db::{ChangeKind, JobChange, JobStore, StoreError};
use tokio::sync::broadcast::{self, error::RecvError};

/// One observation of a job.
#[derive(Debug, Clone, PartialEq)]
pub enum ObserverEvent {
    /// The job changed; not a terminal transition.
    Updated(Job),
    /// The job just transitioned to `completed`.
    Completed(Job),
    /// The job just transitioned to `failed`.
    Failed(Job),
    /// The job row was removed.
    Deleted(JobId),
}

impl ObserverEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Updated(_))
    }
}

/// Read-only view over one job that follows its changes.
pub struct JobObserver {
    job_id: JobId,
    store: Arc<dyn JobStore>,
    changes: Option<broadcast::Receiver<JobChange>>,
    current: Job,
    previous_status: JobStatus,
}

impl std::fmt::Debug for JobObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobObserver")
            .field("job_id", &self.job_id)
            .field("current", &self.current)
            .field("previous_status", &self.previous_status)
            .finish_non_exhaustive()
    }
}

impl JobObserver {
    /// Subscribe to changes and read the current state, retrying transient
    /// read failures per `policy`.
    pub async fn open(store: Arc<dyn JobStore>, job_id: JobId, policy: &RetryPolicy) -> Result<Self, StoreError> {
        // Subscribe first so nothing written after the read is missed.
        let changes = store.subscribe();

        let current = retry_with_backoff(policy, StoreError::is_transient, || {
            let store = Arc::clone(&store);
            async move { store.find_by_id(job_id).await }
        })
        .await?
        .ok_or_else(|| StoreError::not_found(job_id))?;

        Ok(Self {
            job_id,
            store,
            changes: Some(changes),
            previous_status: current.status,
            current,
        })
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Latest known state.
    pub fn current(&self) -> &Job {
        &self.current
    }

    pub fn is_closed(&self) -> bool {
        self.changes.is_none()
    }

    /// Stop following changes. Further calls to `next_event` return `None`.
    pub fn close(&mut self) {
        self.changes = None;
    }

    /// Wait for the next change to this job. Returns `None` once closed or
    /// when the change feed shuts down.
    pub async fn next_event(&mut self) -> Option<ObserverEvent> {
        loop {
            let changes = self.changes.as_mut()?;
            match changes.recv().await {
                Ok(change) if change.job.id != self.job_id => continue,
                Ok(JobChange {
                    kind: ChangeKind::Deleted,
                    ..
                }) => {
                    self.close();
                    return Some(ObserverEvent::Deleted(self.job_id));
                }
                Ok(change) => {
                    if let Some(event) = self.apply(change.job) {
                        return Some(event);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(job_id = %self.job_id, skipped, "Observer lagged, re-reading job");
                    match self.store.find_by_id(self.job_id).await {
                        Ok(Some(job)) => {
                            if let Some(event) = self.apply(job) {
                                return Some(event);
                            }
                        }
                        Ok(None) => {
                            self.close();
                            return Some(ObserverEvent::Deleted(self.job_id));
                        }
                        Err(e) => {
                            tracing::warn!(job_id = %self.job_id, error = %e, "Failed to re-read job");
                        }
                    }
                }
                Err(RecvError::Closed) => {
                    self.close();
                    return None;
                }
            }
        }
    }

    /// Replace local state with `job`. Returns `None` for a state older than
    /// the one already held.
    fn apply(&mut self, job: Job) -> Option<ObserverEvent> {
        if self.is_stale(&job) {
            return None;
        }

        let previous = std::mem::replace(&mut self.previous_status, job.status);
        self.current = job.clone();

        let entered = job.status != previous;
        Some(match job.status {
            JobStatus::Completed if entered => ObserverEvent::Completed(job),
            JobStatus::Failed if entered => ObserverEvent::Failed(job),
            _ => ObserverEvent::Updated(job),
        })
    }

    /// A state is stale when it sits earlier in the lifecycle than the held
    /// one. Forward jumps past skipped states are accepted.
    fn is_stale(&self, job: &Job) -> bool {
        let held = &self.current;
        if job.status == held.status {
            return job.progress() < held.progress();
        }
        let (held_rank, rank) = (lifecycle_rank(held.status), lifecycle_rank(job.status));
        // Equal ranks with different statuses are two terminal outcomes.
        rank <= held_rank
    }
}

fn lifecycle_rank(status: JobStatus) -> u8 {
    match status {
        JobStatus::Pending => 0,
        JobStatus::Uploading => 1,
        JobStatus::Processing => 2,
        JobStatus::Completed | JobStatus::Failed => 3,
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use meshvault_core::job_status::JobMetadata;
    use meshvault_db::MemoryJobStore;
    use uuid::Uuid;

    use super::*;

    fn job(status: JobStatus, progress: u8) -> Job {
        Job {
            id: Uuid::nil(),
            user_id: Uuid::nil(),
            status,
            filename: "scan.mp4".into(),
            video_path: None,
            model_path: None,
            model_url: (status == JobStatus::Completed).then(|| "https://cdn/m.ply".to_string()),
            error: (status == JobStatus::Failed).then(|| "boom".to_string()),
            metadata: JobMetadata {
                progress,
                current_stage: None,
            },
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn observer(initial: Job) -> JobObserver {
        JobObserver {
            job_id: initial.id,
            store: Arc::new(MemoryJobStore::new()),
            changes: None,
            previous_status: initial.status,
            current: initial,
        }
    }

    #[test]
    fn repeated_completed_notifies_once() {
        let mut obs = observer(job(JobStatus::Processing, 95));

        let first = obs.apply(job(JobStatus::Completed, 100));
        let second = obs.apply(job(JobStatus::Completed, 100));

        assert!(matches!(first, Some(ObserverEvent::Completed(_))));
        assert!(matches!(second, Some(ObserverEvent::Updated(_))));
    }

    #[test]
    fn failed_transition_notifies_once() {
        let mut obs = observer(job(JobStatus::Processing, 30));
        assert!(matches!(obs.apply(job(JobStatus::Failed, 30)), Some(ObserverEvent::Failed(_))));
        assert!(matches!(obs.apply(job(JobStatus::Failed, 30)), Some(ObserverEvent::Updated(_))));
    }

    #[test]
    fn opening_on_terminal_job_does_not_notify() {
        let mut obs = observer(job(JobStatus::Completed, 100));
        assert!(matches!(obs.apply(job(JobStatus::Completed, 100)), Some(ObserverEvent::Updated(_))));
    }

    #[test]
    fn stale_states_are_ignored() {
        let mut obs = observer(job(JobStatus::Processing, 10));
        obs.apply(job(JobStatus::Processing, 50));
        assert_eq!(obs.apply(job(JobStatus::Processing, 30)), None);

        obs.apply(job(JobStatus::Completed, 100));
        assert_eq!(obs.apply(job(JobStatus::Processing, 95)), None);
        assert_eq!(obs.current().status, JobStatus::Completed);
    }

    #[test]
    fn skipped_states_still_fire_the_terminal_event() {
        let mut obs = observer(job(JobStatus::Uploading, 0));
        let event = obs.apply(job(JobStatus::Completed, 100));
        assert!(matches!(event, Some(ObserverEvent::Completed(_))));
        assert_eq!(obs.current().status, JobStatus::Completed);

        let mut obs = observer(job(JobStatus::Pending, 0));
        assert!(matches!(obs.apply(job(JobStatus::Processing, 40)), Some(ObserverEvent::Updated(_))));
        assert!(matches!(obs.apply(job(JobStatus::Failed, 40)), Some(ObserverEvent::Failed(_))));
    }

    #[test]
    fn terminal_outcome_is_not_replaced_by_the_other() {
        let mut obs = observer(job(JobStatus::Failed, 30));
        assert_eq!(obs.apply(job(JobStatus::Completed, 100)), None);
        assert_eq!(obs.current().status, JobStatus::Failed);
    }

    #[test]
    fn progress_updates_replace_local_state() {
        let mut obs = observer(job(JobStatus::Processing, 0));
        let event = obs.apply(job(JobStatus::Processing, 20)).unwrap();
        assert!(!event.is_terminal());
        assert_eq!(obs.current().progress(), 20);
    }

    #[tokio::test]
    async fn closed_observer_yields_nothing() {
        let mut obs = observer(job(JobStatus::Processing, 0));
        obs.close();
        assert!(obs.is_closed());
        assert!(obs.next_event().await.is_none());
    }
}
