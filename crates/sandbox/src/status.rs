//! Read-only projection of execution records for status queries.

use std::sync::Arc;

use code_runner_core::{
    traits::ExecutionStore,
    types::{Execution, ExecutionId, ExecutionResult},
    Error, Result,
};

/// Answers status queries against the execution store.
#[derive(Clone)]
pub struct StatusReporter {
    store: Arc<dyn ExecutionStore>,
}

impl StatusReporter {
    pub fn new(store: Arc<dyn ExecutionStore>) -> Self {
        Self { store }
    }

    /// Current view of an execution. Unknown ids are `ExecutionNotFound`.
    pub async fn status(&self, id: &ExecutionId) -> Result<ExecutionResult> {
        self.store
            .get(id)
            .await?
            .map(|execution| project(&execution))
            .ok_or_else(|| Error::not_found(id.as_str()))
    }
}

/// Terminal records report their stored duration; live ones report time so far.
pub fn project(execution: &Execution) -> ExecutionResult {
    let execution_time = execution
        .execution_time
        .or_else(|| Some(execution.elapsed_secs()));

    ExecutionResult {
        execution_id: execution.execution_id.clone(),
        status: execution.status,
        output: execution.output.clone(),
        error: execution.error.clone(),
        start_time: execution.start_time,
        execution_time,
        lines_of_code: execution.lines_of_code,
    }
}
