//! In-memory execution store implementation using DashMap.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use code_runner_core::{
    traits::ExecutionStore,
    types::{Execution, ExecutionId, ExecutionUpdate},
    Error, Result,
};

/// In-memory execution table using DashMap for concurrent access.
///
/// DashMap shards its locks, so updates to distinct executions do not
/// contend with each other. Records stay until a retention sweep evicts them.
#[derive(Debug, Default)]
pub struct InMemoryExecutionStore {
    /// Thread-safe concurrent hashmap keyed by execution id.
    pub(crate) records: DashMap<String, Execution>,
}

impl InMemoryExecutionStore {
    /// Create a new in-memory execution store.
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    /// Number of records that have not reached a terminal state.
    pub fn in_flight(&self) -> usize {
        self.records
            .iter()
            .filter(|r| !r.status.is_terminal())
            .count()
    }
}

#[async_trait]
impl ExecutionStore for InMemoryExecutionStore {
    async fn create(&self, execution: Execution) -> Result<()> {
        match self.records.entry(execution.execution_id.0.clone()) {
            Entry::Occupied(_) => Err(Error::DuplicateExecution(execution.execution_id.0)),
            Entry::Vacant(slot) => {
                tracing::trace!(
                    execution_id = %execution.execution_id,
                    mode = %execution.mode,
                    lines_of_code = execution.lines_of_code,
                    "Execution record created"
                );
                slot.insert(execution);
                Ok(())
            }
        }
    }

    async fn update(&self, id: &ExecutionId, update: ExecutionUpdate) -> Result<Execution> {
        // get_mut holds the shard write lock for the whole check-and-merge.
        let mut record = self
            .records
            .get_mut(&id.0)
            .ok_or_else(|| Error::not_found(id.as_str()))?;

        let current = record.status;
        let next = update.status.unwrap_or(current);

        if current.is_terminal() || (update.status.is_some() && !current.can_transition_to(next)) {
            return Err(Error::InvalidTransition {
                id: id.0.clone(),
                from: current,
                to: next,
            });
        }

        record.status = next;
        if let Some(output) = update.output {
            record.output = output;
        }
        if let Some(error) = update.error {
            record.error = error;
        }
        if let Some(secs) = update.execution_time {
            record.execution_time = Some(secs);
        }
        if next.is_terminal() {
            record.finished_at = Some(std::time::Instant::now());
        }

        tracing::trace!(execution_id = %id, from = %current, to = %next, "Execution record updated");

        Ok(record.clone())
    }

    async fn get(&self, id: &ExecutionId) -> Result<Option<Execution>> {
        Ok(self.records.get(&id.0).map(|r| r.clone()))
    }

    async fn len(&self) -> usize {
        self.records.len()
    }
}
