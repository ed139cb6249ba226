#![deny(unused)]
//! HTTP gateway for Code Runner.
//!
//! This crate exposes the execution service over HTTP: inline and
//! multipart project submissions, status polling, health and metrics.

pub mod server;
pub mod upload;

pub use server::{ApiError, ErrorResponse, GatewayConfig, GatewayServer};
pub use upload::{receive_project, UploadedProject};
