//! Inline executor: runs a single snippet passed as a command argument.

use std::sync::Arc;
use std::time::{Duration, Instant};

use code_runner_core::{
    config::SandboxConfig,
    traits::ExecutionStore,
    types::{Execution, ExecutionId, ExecutionMode},
    Result,
};

use super::{
    capture_output, mark_running, record_outcome, remove_container, settle, RunReport,
};
use crate::engine::{ContainerHandle, ContainerSpec, IsolationEngine, ResourceLimits};
use crate::source::{count_code_lines, inline_command};

/// Runs one code snippet in a detached, immediately started container.
pub struct InlineExecutor {
    engine: Arc<dyn IsolationEngine>,
    store: Arc<dyn ExecutionStore>,
    config: SandboxConfig,
}

impl InlineExecutor {
    pub fn new(
        engine: Arc<dyn IsolationEngine>,
        store: Arc<dyn ExecutionStore>,
        config: SandboxConfig,
    ) -> Self {
        Self {
            engine,
            store,
            config,
        }
    }

    /// Run `code` to a terminal state and return its id.
    ///
    /// Blocks for up to `timeout` plus container setup and teardown.
    pub async fn execute(&self, code: &str, timeout: Duration) -> Result<ExecutionId> {
        let id = self.prepare(code).await?;
        self.run(&id, code, timeout).await;
        Ok(id)
    }

    /// Create the `Pending` record for a snippet.
    pub async fn prepare(&self, code: &str) -> Result<ExecutionId> {
        let id = ExecutionId::new();
        let execution = Execution::pending(id.clone(), ExecutionMode::Inline, count_code_lines(code));
        self.store.create(execution).await?;
        Ok(id)
    }

    /// Drive a prepared execution to a terminal state.
    ///
    /// Never fails: every error becomes the record's terminal state, and the
    /// container is removed before this returns.
    pub async fn run(&self, id: &ExecutionId, code: &str, timeout: Duration) {
        let started = Instant::now();
        mark_running(&self.store, id).await;

        tracing::info!(execution_id = %id, timeout_secs = timeout.as_secs(), "Inline execution started");

        let mut container = None;
        let report = settle(id, self.drive(code, timeout, &mut container), started).await;

        record_outcome(&self.store, id, ExecutionMode::Inline, report).await;

        if let Some(handle) = container {
            remove_container(&self.engine, id, &handle).await;
        }
    }

    fn container_spec(&self, code: &str) -> ContainerSpec {
        let limits = ResourceLimits::memory(self.config.inline_memory_bytes)
            .with_cpu(self.config.inline_cpu_period, self.config.inline_cpu_quota);
        ContainerSpec::new(
            self.config.image.clone(),
            inline_command(&self.config.interpreter, code),
            limits,
        )
    }

    async fn drive(
        &self,
        code: &str,
        timeout: Duration,
        container: &mut Option<ContainerHandle>,
    ) -> Result<RunReport> {
        let handle = self.engine.create_detached(&self.container_spec(code)).await?;
        *container = Some(handle.clone());

        let wait_started = Instant::now();
        let outcome = self.engine.wait(&handle, timeout).await?;
        let elapsed = wait_started.elapsed();

        let output = capture_output(&self.engine, &handle).await;

        Ok(RunReport::from_outcome(outcome, output, elapsed, timeout))
    }
}
