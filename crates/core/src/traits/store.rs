//! Execution store traits.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Execution, ExecutionId, ExecutionUpdate};

/// Table of execution records keyed by execution identifier.
///
/// Single source of truth for status polling. Implementations must allow
/// concurrent `create`/`update` on distinct keys without serializing them
/// behind one global lock.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Insert a new record. Fails if the id is already present.
    async fn create(&self, execution: Execution) -> Result<()>;

    /// Merge `update` into the stored record and return the merged record.
    ///
    /// Rejects unknown ids, status regressions and any change to a terminal record.
    async fn update(&self, id: &ExecutionId, update: ExecutionUpdate) -> Result<Execution>;

    /// Look up a record. `None` means the id is unknown.
    async fn get(&self, id: &ExecutionId) -> Result<Option<Execution>>;

    /// Number of stored records.
    async fn len(&self) -> usize;

    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
