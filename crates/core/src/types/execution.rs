use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Instant;

// =============================================================================
// Identifiers & Status
// =============================================================================

/// Opaque unique identifier of one submission.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionId(pub String);

impl ExecutionId {
    /// Generate a new random identifier.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Wrap an existing identifier string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of an execution.
///
/// Moves forward only: `Pending -> Running -> {Completed | Failed | TimedOut}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    #[serde(rename = "timeout")]
    TimedOut,
}

impl ExecutionStatus {
    /// Wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::TimedOut => "timeout",
        }
    }

    /// Whether no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::TimedOut)
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Running => 1,
            Self::Completed | Self::Failed | Self::TimedOut => 2,
        }
    }

    /// Whether moving from `self` to `next` keeps the lifecycle monotonic.
    ///
    /// `Pending` may jump straight to a terminal state when the run fails
    /// before it could be marked running.
    pub fn can_transition_to(&self, next: ExecutionStatus) -> bool {
        next.rank() > self.rank()
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which executor handled a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// A single snippet passed as a command argument.
    Inline,
    /// A directory tree copied into the sandbox.
    Project,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inline => "inline",
            Self::Project => "project",
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Execution Record
// =============================================================================

/// Stored state of one submission.
#[derive(Debug, Clone)]
pub struct Execution {
    /// Lookup key; immutable.
    pub execution_id: ExecutionId,
    /// Executor path that owns the run.
    pub mode: ExecutionMode,
    /// Current lifecycle state.
    pub status: ExecutionStatus,
    /// Wall-clock timestamp captured at record creation.
    pub start_time: DateTime<Utc>,
    /// Monotonic twin of `start_time`, used for live elapsed time.
    pub started_at: Instant,
    /// Source line count computed at submission.
    pub lines_of_code: usize,
    /// Combined stdout/stderr of the run.
    pub output: String,
    /// Human-readable failure description.
    pub error: String,
    /// Wall-clock seconds of the run, set once terminal.
    pub execution_time: Option<f64>,
    /// Monotonic instant the record became terminal.
    pub finished_at: Option<Instant>,
}

impl Execution {
    /// Create a fresh `Pending` record.
    pub fn pending(execution_id: ExecutionId, mode: ExecutionMode, lines_of_code: usize) -> Self {
        Self {
            execution_id,
            mode,
            status: ExecutionStatus::Pending,
            start_time: Utc::now(),
            started_at: Instant::now(),
            lines_of_code,
            output: String::new(),
            error: String::new(),
            execution_time: None,
            finished_at: None,
        }
    }

    /// Seconds elapsed since the record was created.
    pub fn elapsed_secs(&self) -> f64 {
        self.started_at.elapsed().as_secs_f64()
    }
}

/// Partial update merged into a stored record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionUpdate {
    pub status: Option<ExecutionStatus>,
    pub output: Option<String>,
    pub error: Option<String>,
    pub execution_time: Option<f64>,
}

impl ExecutionUpdate {
    /// Mark the run as started.
    pub fn running() -> Self {
        Self {
            status: Some(ExecutionStatus::Running),
            ..Default::default()
        }
    }

    /// Successful completion.
    pub fn completed(output: impl Into<String>, execution_time: f64) -> Self {
        Self {
            status: Some(ExecutionStatus::Completed),
            output: Some(output.into()),
            execution_time: Some(execution_time),
            ..Default::default()
        }
    }

    /// Failure of the program or of the engine.
    pub fn failed(error: impl Into<String>, output: impl Into<String>, execution_time: f64) -> Self {
        Self {
            status: Some(ExecutionStatus::Failed),
            output: Some(output.into()),
            error: Some(error.into()),
            execution_time: Some(execution_time),
        }
    }

    /// The run exceeded its time bound.
    pub fn timed_out(error: impl Into<String>, output: impl Into<String>, execution_time: f64) -> Self {
        Self {
            status: Some(ExecutionStatus::TimedOut),
            output: Some(output.into()),
            error: Some(error.into()),
            execution_time: Some(execution_time),
        }
    }

    /// Terminal update for the given status.
    pub fn terminal(
        status: ExecutionStatus,
        error: impl Into<String>,
        output: impl Into<String>,
        execution_time: f64,
    ) -> Self {
        match status {
            ExecutionStatus::TimedOut => Self::timed_out(error, output, execution_time),
            ExecutionStatus::Completed => Self::completed(output, execution_time),
            _ => Self::failed(error, output, execution_time),
        }
    }
}

// =============================================================================
// Boundary Types
// =============================================================================

/// Caller-facing projection of an execution record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub execution_id: ExecutionId,
    pub status: ExecutionStatus,
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub error: String,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time: Option<f64>,
    #[serde(default)]
    pub lines_of_code: usize,
}

/// Inline-mode submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InlineSubmission {
    pub code: String,
    /// Timeout in seconds; the configured default (10) when absent.
    #[serde(default)]
    pub timeout: Option<u64>,
}

/// Project-mode submission; `project_path` is already populated on the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSubmission {
    pub project_path: PathBuf,
    pub entry_file: String,
    /// Timeout in seconds; the configured default (30) when absent.
    #[serde(default)]
    pub timeout: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions_are_forward_only() {
        use ExecutionStatus::*;

        assert!(Pending.can_transition_to(Running));
        assert!(Pending.can_transition_to(Failed));
        assert!(Running.can_transition_to(Completed));
        assert!(Running.can_transition_to(TimedOut));

        assert!(!Running.can_transition_to(Pending));
        assert!(!Running.can_transition_to(Running));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!TimedOut.can_transition_to(Completed));
    }

    #[test]
    fn test_status_wire_names() {
        let json = serde_json::to_string(&ExecutionStatus::TimedOut).unwrap();
        assert_eq!(json, "\"timeout\"");
        let parsed: ExecutionStatus = serde_json::from_str("\"completed\"").unwrap();
        assert_eq!(parsed, ExecutionStatus::Completed);
    }

    #[test]
    fn test_submission_defaults() {
        let inline: InlineSubmission = serde_json::from_str(r#"{"code": "print(1)"}"#).unwrap();
        assert_eq!(inline.timeout, None);

        let project: ProjectSubmission =
            serde_json::from_str(r#"{"project_path": "/tmp/p", "entry_file": "main.py", "timeout": 5}"#)
                .unwrap();
        assert_eq!(project.timeout, Some(5));
    }

    #[test]
    fn test_result_omits_missing_execution_time() {
        let result = ExecutionResult {
            execution_id: ExecutionId::from_string("id-1"),
            status: ExecutionStatus::Running,
            output: String::new(),
            error: String::new(),
            start_time: Utc::now(),
            execution_time: None,
            lines_of_code: 3,
        };
        let value = serde_json::to_value(&result).unwrap();
        assert!(value.get("execution_time").is_none());
        assert_eq!(value["status"], "running");
        assert_eq!(value["execution_id"], "id-1");
    }

    #[test]
    fn test_terminal_update_builder() {
        let update = ExecutionUpdate::terminal(ExecutionStatus::TimedOut, "too slow", "", 1.5);
        assert_eq!(update.status, Some(ExecutionStatus::TimedOut));
        assert_eq!(update.error.as_deref(), Some("too slow"));
        assert_eq!(update.execution_time, Some(1.5));
    }
}
