#![deny(unused)]
//! Execution record store for Code Runner.
//!
//! Holds one record per submission and is the single source of truth for
//! status polling. Records are kept for the process lifetime unless a
//! [`RetentionPolicy`] is configured.

pub mod memory;
pub mod retention;

pub use memory::InMemoryExecutionStore;
pub use retention::{Prunable, RetentionPolicy};
