//! Floodgate - In-process Request Admission
//!
//! This crate gates inbound HTTP requests with a per-key sliding-window rate
//! limiter. State lives in memory in a single process; a background sweep
//! evicts idle keys so memory stays bounded by the set of active callers.

pub mod config;
pub mod error;
pub mod middleware;
pub mod ratelimit;
pub mod server;
