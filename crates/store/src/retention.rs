//! Retention policy and pruning of execution records.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use code_runner_core::config::StoreConfig;

use crate::memory::InMemoryExecutionStore;

/// Configuration for record retention.
///
/// With both limits unset the store grows for the lifetime of the process.
/// Only terminal records are ever evicted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// Maximum age of a terminal record, measured from the moment it finished.
    pub max_age: Option<Duration>,
    /// Maximum number of terminal records kept.
    pub max_records: Option<usize>,
}

impl RetentionPolicy {
    /// Policy that never evicts anything.
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn is_unbounded(&self) -> bool {
        self.max_age.is_none() && self.max_records.is_none()
    }
}

impl From<&StoreConfig> for RetentionPolicy {
    fn from(config: &StoreConfig) -> Self {
        Self {
            max_age: config.max_age(),
            max_records: config.max_records,
        }
    }
}

/// Trait for stores that support pruning old data.
#[async_trait]
pub trait Prunable: Send + Sync {
    /// Apply `policy` and return the number of records removed.
    async fn prune(&self, policy: &RetentionPolicy) -> usize;
}

#[async_trait]
impl Prunable for InMemoryExecutionStore {
    async fn prune(&self, policy: &RetentionPolicy) -> usize {
        if policy.is_unbounded() {
            return 0;
        }

        let mut removed = 0;

        if let Some(max_age) = policy.max_age {
            let expired: Vec<String> = self
                .records
                .iter()
                .filter(|r| {
                    r.status.is_terminal()
                        && r.finished_at.is_some_and(|at| at.elapsed() > max_age)
                })
                .map(|r| r.key().clone())
                .collect();

            for key in expired {
                if self
                    .records
                    .remove_if(&key, |_, r| r.status.is_terminal())
                    .is_some()
                {
                    removed += 1;
                }
            }
        }

        if let Some(max_records) = policy.max_records {
            let mut terminal: Vec<(String, std::time::Instant)> = self
                .records
                .iter()
                .filter(|r| r.status.is_terminal())
                .map(|r| (r.key().clone(), r.started_at))
                .collect();

            if terminal.len() > max_records {
                terminal.sort_by_key(|(_, started_at)| *started_at);
                let excess = terminal.len() - max_records;
                for (key, _) in terminal.into_iter().take(excess) {
                    if self
                        .records
                        .remove_if(&key, |_, r| r.status.is_terminal())
                        .is_some()
                    {
                        removed += 1;
                    }
                }
            }
        }

        if removed > 0 {
            tracing::debug!(removed, remaining = self.records.len(), "Pruned execution records");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use code_runner_core::traits::ExecutionStore;
    use code_runner_core::types::{Execution, ExecutionId, ExecutionMode, ExecutionUpdate};

    async fn seed(store: &InMemoryExecutionStore, finish: bool) -> ExecutionId {
        let exec = Execution::pending(ExecutionId::new(), ExecutionMode::Inline, 1);
        let id = exec.execution_id.clone();
        store.create(exec).await.unwrap();
        if finish {
            store.update(&id, ExecutionUpdate::running()).await.unwrap();
            store
                .update(&id, ExecutionUpdate::completed("", 0.0))
                .await
                .unwrap();
        }
        id
    }

    #[tokio::test]
    async fn test_unbounded_policy_keeps_everything() {
        let store = InMemoryExecutionStore::new();
        for _ in 0..5 {
            seed(&store, true).await;
        }
        assert_eq!(store.prune(&RetentionPolicy::unbounded()).await, 0);
        assert_eq!(store.len().await, 5);
    }

    #[tokio::test]
    async fn test_max_records_evicts_oldest_terminal() {
        let store = InMemoryExecutionStore::new();
        let oldest = seed(&store, true).await;
        std::thread::sleep(Duration::from_millis(2));
        let middle = seed(&store, true).await;
        std::thread::sleep(Duration::from_millis(2));
        let newest = seed(&store, true).await;
        let running = seed(&store, false).await;

        let policy = RetentionPolicy {
            max_age: None,
            max_records: Some(2),
        };
        assert_eq!(store.prune(&policy).await, 1);

        assert!(store.get(&oldest).await.unwrap().is_none());
        assert!(store.get(&middle).await.unwrap().is_some());
        assert!(store.get(&newest).await.unwrap().is_some());
        assert!(store.get(&running).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_max_age_never_evicts_in_flight() {
        let store = InMemoryExecutionStore::new();
        let done = seed(&store, true).await;
        let running = seed(&store, false).await;
        std::thread::sleep(Duration::from_millis(5));

        let policy = RetentionPolicy {
            max_age: Some(Duration::from_millis(1)),
            max_records: None,
        };
        assert_eq!(store.prune(&policy).await, 1);
        assert!(store.get(&done).await.unwrap().is_none());
        assert!(store.get(&running).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_max_age_counts_from_completion() {
        let store = InMemoryExecutionStore::new();
        let exec = Execution::pending(ExecutionId::new(), ExecutionMode::Inline, 1);
        let id = exec.execution_id.clone();
        store.create(exec).await.unwrap();
        store.update(&id, ExecutionUpdate::running()).await.unwrap();

        // The run outlives max_age before it finishes.
        std::thread::sleep(Duration::from_millis(60));
        store
            .update(&id, ExecutionUpdate::completed("late", 0.06))
            .await
            .unwrap();

        let policy = RetentionPolicy {
            max_age: Some(Duration::from_millis(50)),
            max_records: None,
        };
        assert_eq!(store.prune(&policy).await, 0);
        assert!(store.get(&id).await.unwrap().is_some());

        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(store.prune(&policy).await, 1);
        assert!(store.get(&id).await.unwrap().is_none());
    }

    #[test]
    fn test_policy_from_config() {
        let config = StoreConfig {
            max_age_secs: Some(3600),
            max_records: None,
            prune_interval_secs: 30,
        };
        let policy = RetentionPolicy::from(&config);
        assert_eq!(policy.max_age, Some(Duration::from_secs(3600)));
        assert!(!policy.is_unbounded());
        assert!(RetentionPolicy::from(&StoreConfig::default()).is_unbounded());
    }
}
