#![deny(unused)]
//! Code Runner - sandboxed code execution service
//!
//! Accepts untrusted Python snippets or multi-file projects over HTTP, runs each
//! one in a throwaway Docker container and exposes the result for polling.

use std::sync::Arc;
use std::time::Duration;

use code_runner_core::config::AppConfig;
use code_runner_gateway::{GatewayConfig, GatewayServer};
use code_runner_sandbox::{DockerEngine, ExecutionService, IsolationEngine};
use code_runner_store::{InMemoryExecutionStore, Prunable, RetentionPolicy};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (config, config_error) = match AppConfig::load() {
        Ok(config) => (config, None),
        Err(e) => (AppConfig::default(), Some(e)),
    };

    // Initialize tracing
    code_runner_governance::configure_tracing(config.logging.json)?;

    if let Some(e) = config_error {
        tracing::warn!(error = %e, "Failed to load configuration, using defaults");
    }

    tracing::info!("Starting Code Runner v{}", env!("CARGO_PKG_VERSION"));

    let metrics_handle = code_runner_governance::setup_metrics_recorder()?;

    // =========================================================================
    // Isolation engine
    // =========================================================================
    // Docker requests must outlive the longest allowed wait.
    let request_timeout = Duration::from_secs(config.sandbox.max_timeout_secs + 60);
    let engine = Arc::new(DockerEngine::new(request_timeout)?);
    if engine.is_available().await {
        tracing::info!(image = %config.sandbox.image, "Docker daemon reachable");
    } else {
        tracing::warn!("Docker daemon not reachable, executions will fail until it is");
    }

    // =========================================================================
    // Execution store
    // =========================================================================
    let store = Arc::new(InMemoryExecutionStore::new());
    let policy = RetentionPolicy::from(&config.store);
    if policy.is_unbounded() {
        tracing::info!("Execution records are kept for the process lifetime (no retention policy)");
    } else {
        spawn_sweeper(
            store.clone(),
            policy,
            Duration::from_secs(config.store.prune_interval_secs.max(1)),
        );
    }

    // =========================================================================
    // Service & gateway
    // =========================================================================
    let service = ExecutionService::new(engine, store, config.sandbox.clone());

    tokio::fs::create_dir_all(&config.uploads.root_dir).await?;

    let gateway_config = GatewayConfig::from(&config.server);
    let server = GatewayServer::new(gateway_config, service, &config.uploads)
        .with_metrics(metrics_handle);

    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        uploads = %config.uploads.root_dir,
        "Gateway initialized"
    );

    server.run().await?;

    Ok(())
}

/// Periodically evict terminal records the policy no longer retains.
fn spawn_sweeper(store: Arc<InMemoryExecutionStore>, policy: RetentionPolicy, every: Duration) {
    tracing::info!(
        max_age = ?policy.max_age,
        max_records = ?policy.max_records,
        interval_secs = every.as_secs(),
        "Retention sweeper started"
    );

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            let removed = store.prune(&policy).await;
            if removed > 0 {
                tracing::debug!(removed, in_flight = store.in_flight(), "Pruned execution records");
            }
        }
    });
}
