#![deny(unused)]
//! Core types, traits, and error definitions for Code Runner.
//!
//! This crate provides the building blocks shared by the store, the sandbox
//! execution manager and the HTTP gateway.

pub mod config;
pub mod error;
pub mod fs_policy;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use traits::*;
pub use types::*;
