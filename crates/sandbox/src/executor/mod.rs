//! Inline and project executors.
//!
//! Both executors share one contract: a run blocks until its record is
//! terminal, never surfaces an execution failure to the caller, and removes
//! its container on every exit path. Scheduling runs in the background is the
//! job of [`crate::service::ExecutionService`].

pub mod inline;
pub mod project;

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;

use code_runner_core::{
    traits::ExecutionStore,
    types::{ExecutionId, ExecutionMode, ExecutionStatus, ExecutionUpdate},
    Error, Result,
};

use crate::engine::{ContainerHandle, IsolationEngine, WaitOutcome};

pub use inline::InlineExecutor;
pub use project::ProjectExecutor;

/// Output recorded when the container's logs cannot be read.
pub const LOGS_UNAVAILABLE: &str = "[logs unavailable]";

/// Map an engine or unexpected error onto a terminal status.
pub fn classify_error(err: &Error) -> ExecutionStatus {
    if err.is_timeout() {
        ExecutionStatus::TimedOut
    } else {
        ExecutionStatus::Failed
    }
}

/// Terminal result of one run, before it is written to the store.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RunReport {
    pub status: ExecutionStatus,
    pub output: String,
    pub error: String,
    pub elapsed: Duration,
}

impl RunReport {
    /// Report for a container that stopped or outlived its bound.
    pub fn from_outcome(
        outcome: WaitOutcome,
        output: String,
        elapsed: Duration,
        timeout: Duration,
    ) -> Self {
        let (status, error) = match outcome {
            WaitOutcome::Exited { status_code: 0 } => (ExecutionStatus::Completed, String::new()),
            WaitOutcome::Exited { status_code } => (
                ExecutionStatus::Failed,
                Error::container_runtime(format!(
                    "Container exited with non-zero status code {}",
                    status_code
                ))
                .to_string(),
            ),
            WaitOutcome::TimedOut => (
                ExecutionStatus::TimedOut,
                Error::timeout(format!("Execution timed out after {}s", timeout.as_secs()))
                    .to_string(),
            ),
        };

        Self {
            status,
            output,
            error,
            elapsed,
        }
    }

    /// Report for a run aborted by an error.
    pub fn from_error(err: &Error, elapsed: Duration) -> Self {
        Self {
            status: classify_error(err),
            output: String::new(),
            error: err.to_string(),
            elapsed,
        }
    }

    fn into_update(self) -> ExecutionUpdate {
        ExecutionUpdate::terminal(
            self.status,
            self.error,
            self.output,
            self.elapsed.as_secs_f64(),
        )
    }
}

/// Await a run's driver and turn its error or panic into a terminal report.
///
/// A panic inside the driver would otherwise unwind the spawned task and
/// skip the record update and container removal that follow it.
pub(crate) async fn settle<F>(id: &ExecutionId, drive: F, started: Instant) -> RunReport
where
    F: Future<Output = Result<RunReport>>,
{
    match AssertUnwindSafe(drive).catch_unwind().await {
        Ok(Ok(report)) => report,
        Ok(Err(e)) => RunReport::from_error(&e, started.elapsed()),
        Err(panic) => {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!(execution_id = %id, reason = %reason, "Execution task panicked");
            RunReport::from_error(
                &Error::internal(format!("Execution task panicked: {}", reason)),
                started.elapsed(),
            )
        }
    }
}

/// Move the record to `Running`. A store error is logged, not propagated.
pub(crate) async fn mark_running(store: &Arc<dyn ExecutionStore>, id: &ExecutionId) {
    if let Err(e) = store.update(id, ExecutionUpdate::running()).await {
        tracing::warn!(execution_id = %id, error = %e, "Failed to mark execution running");
    }
}

/// Write the terminal state of a run and emit its metrics.
pub(crate) async fn record_outcome(
    store: &Arc<dyn ExecutionStore>,
    id: &ExecutionId,
    mode: ExecutionMode,
    report: RunReport,
) {
    let status = report.status;
    let secs = report.elapsed.as_secs_f64();

    code_runner_governance::track_execution(mode.as_str(), status.as_str(), secs);

    match status {
        ExecutionStatus::Completed => {
            tracing::info!(execution_id = %id, %mode, elapsed_secs = secs, "Execution completed")
        }
        _ => tracing::warn!(
            execution_id = %id,
            %mode,
            %status,
            elapsed_secs = secs,
            error = %report.error,
            "Execution did not complete"
        ),
    }

    if let Err(e) = store.update(id, report.into_update()).await {
        tracing::error!(execution_id = %id, error = %e, "Failed to record execution outcome");
    }
}

/// Read combined output, substituting [`LOGS_UNAVAILABLE`] on failure.
pub(crate) async fn capture_output(
    engine: &Arc<dyn IsolationEngine>,
    handle: &ContainerHandle,
) -> String {
    match engine.read_combined_output(handle).await {
        Ok(output) => output,
        Err(e) => {
            tracing::warn!(container = %handle, error = %e, "Failed to read sandbox logs");
            LOGS_UNAVAILABLE.to_string()
        }
    }
}

/// Force-remove a container. Errors are logged and swallowed.
pub(crate) async fn remove_container(
    engine: &Arc<dyn IsolationEngine>,
    id: &ExecutionId,
    handle: &ContainerHandle,
) {
    if let Err(e) = engine.force_remove(handle).await {
        code_runner_governance::track_cleanup_failure("container");
        tracing::warn!(execution_id = %id, container = %handle, error = %e, "Failed to remove sandbox container");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_zero_completes() {
        let report = RunReport::from_outcome(
            WaitOutcome::Exited { status_code: 0 },
            "hi\n".into(),
            Duration::from_millis(300),
            Duration::from_secs(10),
        );
        assert_eq!(report.status, ExecutionStatus::Completed);
        assert!(report.error.is_empty());
        assert_eq!(report.output, "hi\n");
    }

    #[test]
    fn test_non_zero_exit_fails_with_engine_message() {
        let report = RunReport::from_outcome(
            WaitOutcome::Exited { status_code: 1 },
            "Traceback...".into(),
            Duration::from_millis(300),
            Duration::from_secs(10),
        );
        assert_eq!(report.status, ExecutionStatus::Failed);
        assert!(report.error.contains("status code 1"));
        assert_eq!(report.output, "Traceback...");
    }

    #[test]
    fn test_wait_timeout_is_structural() {
        let report = RunReport::from_outcome(
            WaitOutcome::TimedOut,
            String::new(),
            Duration::from_secs(1),
            Duration::from_secs(1),
        );
        assert_eq!(report.status, ExecutionStatus::TimedOut);
        assert!(report.error.contains("timed out after 1s"));
    }

    #[test]
    fn test_error_classification() {
        assert_eq!(
            classify_error(&Error::infrastructure("Timeout error")),
            ExecutionStatus::TimedOut
        );
        assert_eq!(
            classify_error(&Error::infrastructure("connection refused")),
            ExecutionStatus::Failed
        );
        assert_eq!(
            classify_error(&Error::container_runtime("exit 137")),
            ExecutionStatus::Failed
        );
        assert_eq!(
            classify_error(&Error::Timeout("wait".into())),
            ExecutionStatus::TimedOut
        );
    }
}
