//! In-process change feed backed by a `tokio::sync::broadcast` channel.

use tokio::sync::broadcast;

use super::{ChangeKind, JobChange};
use crate::models::job::Job;

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// Fan-out of [`JobChange`] notifications to any number of observers.
///
/// When the buffer is full the oldest un-consumed changes are dropped and
/// slow receivers observe `RecvError::Lagged`. The row itself always holds
/// the latest state, so a lagging observer re-reads instead.
pub struct ChangeFeed {
    sender: broadcast::Sender<JobChange>,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish a change. Dropped silently when nobody is subscribed.
    pub fn publish(&self, kind: ChangeKind, job: &Job) {
        let _ = self.sender.send(JobChange {
            kind,
            job: job.clone(),
        });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobChange> {
        self.sender.subscribe()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
