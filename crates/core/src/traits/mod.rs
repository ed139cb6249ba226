//! Core traits for Code Runner.
//!
//! - `store`: execution record storage (ExecutionStore)

pub mod store;

pub use store::*;
