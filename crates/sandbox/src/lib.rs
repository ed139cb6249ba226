#![deny(unused)]
//! Sandboxed execution for Code Runner.
//!
//! Untrusted code runs in a throwaway Docker container with no network,
//! bounded memory and (inline mode) bounded CPU. Every run ends with its
//! container removed, whatever happened inside it.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────┐
//! │  ExecutionService                      │
//! │    creates record, spawns the run      │
//! ├────────────────────────────────────────┤
//! │  InlineExecutor / ProjectExecutor      │
//! │    run → classify → record → teardown  │
//! ├────────────────────────────────────────┤
//! │  IsolationEngine (DockerEngine)        │
//! │    Docker API via bollard              │
//! ├────────────────────────────────────────┤
//! │  Docker Container (isolated)           │
//! │    network_mode=none, memory capped    │
//! └────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use code_runner_sandbox::{DockerEngine, ExecutionService};
//!
//! let engine = Arc::new(DockerEngine::new(Duration::from_secs(360))?);
//! let service = ExecutionService::new(engine, store, config.sandbox.clone());
//!
//! let id = service.submit_inline(InlineSubmission { code, timeout: None }).await?;
//! let result = service.status(&id).await?;
//! ```

pub mod archive;
pub mod engine;
pub mod executor;
pub mod service;
pub mod source;
pub mod status;

pub use engine::{
    ContainerHandle, ContainerSpec, DockerEngine, IsolationEngine, MockEngine, MockStage,
    ResourceLimits, WaitOutcome,
};
pub use executor::{classify_error, InlineExecutor, ProjectExecutor, LOGS_UNAVAILABLE};
pub use service::ExecutionService;
pub use status::StatusReporter;
