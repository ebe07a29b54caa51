//! Domain logic for the meshvault scan service.
//!
//! Everything in this crate is pure (no database, no network): identifiers,
//! the job status state machine, the processing stage table, pipeline output
//! parsing, upload validation and retry policy. The `db`, `pipeline` and
//! `api` crates build on these types.

pub mod error;
pub mod job_events;
pub mod job_status;
pub mod progress_marker;
pub mod retry;
pub mod stages;
pub mod types;
pub mod upload;
