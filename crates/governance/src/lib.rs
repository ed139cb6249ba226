#![deny(unused)]
//! Observability for Code Runner.
//!
//! This crate provides:
//! - Structured logging setup (`tracing-subscriber`)
//! - Prometheus metrics for submissions, executions and cleanup failures

pub mod metrics;
pub mod tracing_layer;

pub use metrics::{
    setup_metrics_recorder, track_cleanup_failure, track_execution, track_request,
    track_submission,
};
pub use tracing_layer::{configure_tracing, DEFAULT_LOG_FILTER};
