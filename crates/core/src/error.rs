//! Error types for Code Runner.

use thiserror::Error;

use crate::types::ExecutionStatus;

/// Result type alias using Code Runner's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for Code Runner.
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Execution Errors
    // =========================================================================
    /// The sandboxed program itself exited abnormally.
    #[error("Container error: {0}")]
    ContainerRuntime(String),

    /// The isolation engine could not be reached or could not allocate resources.
    #[error("Isolation engine error: {0}")]
    Infrastructure(String),

    /// The run did not finish within its bound.
    #[error("Execution timeout: {0}")]
    Timeout(String),

    // =========================================================================
    // Store Errors
    // =========================================================================
    #[error("Execution not found: {0}")]
    ExecutionNotFound(String),

    #[error("Execution already exists: {0}")]
    DuplicateExecution(String),

    #[error("Invalid status transition for {id}: {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: ExecutionStatus,
        to: ExecutionStatus,
    },

    // =========================================================================
    // Gateway Errors
    // =========================================================================
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Gateway error: {0}")]
    Gateway(String),

    #[error("Security violation: {0}")]
    SecurityViolation(String),

    // =========================================================================
    // Generic Errors
    // =========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Create a container runtime error.
    pub fn container_runtime(msg: impl Into<String>) -> Self {
        Self::ContainerRuntime(msg.into())
    }

    /// Create an isolation engine (infrastructure) error.
    pub fn infrastructure(msg: impl Into<String>) -> Self {
        Self::Infrastructure(msg.into())
    }

    /// Create a timeout error.
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create an execution not found error.
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::ExecutionNotFound(id.into())
    }

    /// Create an invalid request error.
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Create a gateway error.
    pub fn gateway(msg: impl Into<String>) -> Self {
        Self::Gateway(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error means the run exceeded its time bound.
    ///
    /// Structured timeouts are recognised directly. Engine errors that only
    /// carry text fall back to a case-insensitive search for "timeout".
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::ContainerRuntime(_) => false,
            other => other.to_string().to_lowercase().contains("timeout"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structured_timeout() {
        assert!(Error::timeout("wait exceeded 3s").is_timeout());
    }

    #[test]
    fn test_container_runtime_is_never_timeout() {
        // The program's own output may mention timeouts; that is still a program failure.
        let err = Error::container_runtime("socket.timeout: timed out");
        assert!(!err.is_timeout());
    }

    #[test]
    fn test_text_fallback_is_case_insensitive() {
        let err = Error::infrastructure("Request TIMEOUT while talking to daemon");
        assert!(err.is_timeout());

        let err = Error::infrastructure("no such image: python-sandbox:latest");
        assert!(!err.is_timeout());
    }

    #[test]
    fn test_invalid_transition_message() {
        let err = Error::InvalidTransition {
            id: "abc".into(),
            from: ExecutionStatus::Completed,
            to: ExecutionStatus::Running,
        };
        assert_eq!(
            err.to_string(),
            "Invalid status transition for abc: completed -> running"
        );
    }
}
