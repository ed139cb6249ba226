//! Core type definitions for Code Runner.

pub mod execution;

pub use execution::*;
