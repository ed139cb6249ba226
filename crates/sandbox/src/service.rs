//! Execution service: accepts submissions and runs them in the background.

use std::sync::Arc;
use std::time::Duration;

use code_runner_core::{
    config::SandboxConfig,
    traits::ExecutionStore,
    types::{ExecutionId, ExecutionMode, ExecutionResult, InlineSubmission, ProjectSubmission},
    Error, Result,
};

use crate::engine::IsolationEngine;
use crate::executor::{InlineExecutor, ProjectExecutor};
use crate::status::StatusReporter;

/// Front door for submissions and status queries.
///
/// A submission returns as soon as its `Pending` record exists; the run
/// itself is an independent tokio task that is never cancelled by the caller.
#[derive(Clone)]
pub struct ExecutionService {
    engine: Arc<dyn IsolationEngine>,
    inline: Arc<InlineExecutor>,
    project: Arc<ProjectExecutor>,
    reporter: StatusReporter,
    config: SandboxConfig,
}

impl ExecutionService {
    pub fn new(
        engine: Arc<dyn IsolationEngine>,
        store: Arc<dyn ExecutionStore>,
        config: SandboxConfig,
    ) -> Self {
        Self {
            inline: Arc::new(InlineExecutor::new(
                engine.clone(),
                store.clone(),
                config.clone(),
            )),
            project: Arc::new(ProjectExecutor::new(
                engine.clone(),
                store.clone(),
                config.clone(),
            )),
            reporter: StatusReporter::new(store),
            engine,
            config,
        }
    }

    /// Accept a snippet and start running it in the background.
    pub async fn submit_inline(&self, submission: InlineSubmission) -> Result<ExecutionId> {
        let timeout = self.resolve_timeout(
            submission.timeout,
            self.config.default_inline_timeout_secs,
        )?;

        let id = self.inline.prepare(&submission.code).await?;
        code_runner_governance::track_submission(ExecutionMode::Inline.as_str());
        tracing::debug!(execution_id = %id, "Inline submission accepted");

        let executor = self.inline.clone();
        let run_id = id.clone();
        tokio::spawn(async move {
            executor.run(&run_id, &submission.code, timeout).await;
        });

        Ok(id)
    }

    /// Accept a project directory and start running it in the background.
    ///
    /// The directory is owned by the run from here on and is deleted when it
    /// finishes. A rejected submission leaves it to the caller.
    pub async fn submit_project(&self, submission: ProjectSubmission) -> Result<ExecutionId> {
        let timeout = self.resolve_timeout(
            submission.timeout,
            self.config.default_project_timeout_secs,
        )?;

        let id = self.project.prepare(&submission.project_path).await?;
        code_runner_governance::track_submission(ExecutionMode::Project.as_str());
        tracing::debug!(
            execution_id = %id,
            entry_file = %submission.entry_file,
            "Project submission accepted"
        );

        let executor = self.project.clone();
        let run_id = id.clone();
        tokio::spawn(async move {
            executor
                .run(
                    &run_id,
                    &submission.project_path,
                    &submission.entry_file,
                    timeout,
                )
                .await;
        });

        Ok(id)
    }

    pub async fn status(&self, id: &ExecutionId) -> Result<ExecutionResult> {
        self.reporter.status(id).await
    }

    /// Whether the isolation engine answers.
    pub async fn is_available(&self) -> bool {
        self.engine.is_available().await
    }

    fn resolve_timeout(&self, requested: Option<u64>, default_secs: u64) -> Result<Duration> {
        let secs = requested.unwrap_or(default_secs);
        if secs == 0 {
            return Err(Error::invalid_request("timeout must be at least 1 second"));
        }
        let max = self.config.max_timeout_secs;
        if secs > max {
            tracing::debug!(requested = secs, max, "Clamping execution timeout");
        }
        Ok(Duration::from_secs(secs.min(max)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MockEngine;
    use code_runner_store::InMemoryExecutionStore;

    fn service() -> ExecutionService {
        ExecutionService::new(
            Arc::new(MockEngine::default()),
            Arc::new(InMemoryExecutionStore::new()),
            SandboxConfig::default(),
        )
    }

    #[test]
    fn test_timeout_resolution() {
        let service = service();
        assert_eq!(
            service.resolve_timeout(None, 10).unwrap(),
            Duration::from_secs(10)
        );
        assert_eq!(
            service.resolve_timeout(Some(5), 10).unwrap(),
            Duration::from_secs(5)
        );
        assert_eq!(
            service.resolve_timeout(Some(10_000), 10).unwrap(),
            Duration::from_secs(300)
        );
        assert!(matches!(
            service.resolve_timeout(Some(0), 10),
            Err(Error::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_zero_timeout_creates_no_record() {
        let store = Arc::new(InMemoryExecutionStore::new());
        let service = ExecutionService::new(
            Arc::new(MockEngine::default()),
            store.clone(),
            SandboxConfig::default(),
        );

        let result = service
            .submit_inline(InlineSubmission {
                code: "print(1)".into(),
                timeout: Some(0),
            })
            .await;

        assert!(result.is_err());
        assert!(store.is_empty().await);
    }
}
