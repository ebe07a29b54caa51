//! Scan job lifecycle: submission, processing drivers, result publishing
//! and status observation.
//!
//! Data flows one way:
//!
//! ```text
//! JobSubmission -> JobStore (insert) -> JobRunner / ProcessingDriver
//!     -> ResultPublisher -> JobStore (completed | failed) -> JobObserver
//! ```

pub mod config;
pub mod driver;
pub mod error;
pub mod observer;
pub mod publisher;
pub mod runner;
pub mod submission;

pub use config::PipelineConfig;
pub use driver::{Artifact, DriverMode, DriverSelector, ProcessingDriver, ProgressSink, RunRequest, StageSource};
pub use error::PipelineError;
pub use observer::{JobObserver, ObserverEvent};
pub use publisher::ResultPublisher;
pub use runner::JobRunner;
pub use submission::{JobSubmission, SubmitError, VideoUpload};
