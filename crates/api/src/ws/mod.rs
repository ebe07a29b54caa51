//! Per-job WebSocket observation stream.

pub mod handler;
pub mod messages;

pub use handler::job_ws_handler;
