#![deny(missing_docs)]

//! Core library for the docsift document structuring server.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Text extraction adapters.
pub mod extraction;
/// Structured logging and tracing setup.
pub mod logging;
/// Pipeline metrics helpers.
pub mod metrics;
/// Batch orchestration across staging, extraction and structuring.
pub mod pipeline;
/// Transient result persistence and privacy erasure.
pub mod sink;
/// Per-request staging of uploads on disk.
pub mod staging;
/// Structuring adapters turning text into records.
pub mod structuring;
