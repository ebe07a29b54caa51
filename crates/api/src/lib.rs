//! HTTP surface of the scan service.
//!
//! Everything the binary wires together lives here so integration tests can
//! build the same router over an in-memory store.

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod router;
pub mod routes;
pub mod state;
pub mod ws;
