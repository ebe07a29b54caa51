//! JSON frames sent over the job observation socket.
//!
//! Every frame is `{"type": ..., "job_id": ..., "job": {...}}`; the `job`
//! field is omitted for deletions.

use meshvault_core::job_events::{
    MSG_TYPE_JOB_COMPLETED, MSG_TYPE_JOB_DELETED, MSG_TYPE_JOB_FAILED, MSG_TYPE_JOB_PROGRESS,
};
use meshvault_core::job_status::JobStatus;
use meshvault_db::models::job::Job;
use meshvault_pipeline::ObserverEvent;
use serde_json::{json, Value};

/// Frame describing the state a client sees on connect.
pub fn snapshot(job: &Job) -> Value {
    let kind = match job.status {
        JobStatus::Completed => MSG_TYPE_JOB_COMPLETED,
        JobStatus::Failed => MSG_TYPE_JOB_FAILED,
        _ => MSG_TYPE_JOB_PROGRESS,
    };
    job_frame(kind, job)
}

/// Frame for one observer event.
pub fn event(event: &ObserverEvent) -> Value {
    match event {
        ObserverEvent::Updated(job) => job_frame(MSG_TYPE_JOB_PROGRESS, job),
        ObserverEvent::Completed(job) => job_frame(MSG_TYPE_JOB_COMPLETED, job),
        ObserverEvent::Failed(job) => job_frame(MSG_TYPE_JOB_FAILED, job),
        ObserverEvent::Deleted(id) => json!({
            "type": MSG_TYPE_JOB_DELETED,
            "job_id": id,
        }),
    }
}

fn job_frame(kind: &str, job: &Job) -> Value {
    json!({
        "type": kind,
        "job_id": job.id,
        "job": job,
    })
}
