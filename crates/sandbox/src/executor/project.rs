//! Project executor: runs a multi-file project copied into the sandbox.
//!
//! The container is created stopped, the project is injected as a tar
//! archive, and only then is the container started, so the entry file is in
//! place before the interpreter runs.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use code_runner_core::{
    config::SandboxConfig,
    traits::ExecutionStore,
    types::{Execution, ExecutionId, ExecutionMode},
    Error, Result,
};

use super::{
    capture_output, mark_running, record_outcome, remove_container, settle, RunReport,
};
use crate::archive::archive_directory;
use crate::engine::{ContainerHandle, ContainerSpec, IsolationEngine, ResourceLimits};
use crate::source::count_project_lines;

/// Runs a project directory in a create-copy-start container.
pub struct ProjectExecutor {
    engine: Arc<dyn IsolationEngine>,
    store: Arc<dyn ExecutionStore>,
    config: SandboxConfig,
}

impl ProjectExecutor {
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

    /// Run the project in `project_dir` to a terminal state and return its id.
    ///
    /// `project_dir` is consumed: it is deleted before this returns, even
    /// when no record could be created for it.
    pub async fn execute(
        &self,
        project_dir: &Path,
        entry_file: &str,
        timeout: Duration,
    ) -> Result<ExecutionId> {
        let id = match self.prepare(project_dir).await {
            Ok(id) => id,
            Err(e) => {
                remove_project_dir(None, project_dir).await;
                return Err(e);
            }
        };
        self.run(&id, project_dir, entry_file, timeout).await;
        Ok(id)
    }

    /// Count source lines and create the `Pending` record.
    pub async fn prepare(&self, project_dir: &Path) -> Result<ExecutionId> {
        let dir = project_dir.to_path_buf();
        let extension = self.config.source_extension.clone();
        let counted = tokio::task::spawn_blocking(move || count_project_lines(&dir, &extension))
            .await
            .map_err(|e| Error::internal(format!("Line count task failed: {}", e)))?;

        // An unreadable directory is reported by the run itself.
        let lines_of_code = counted.unwrap_or_else(|e| {
            tracing::warn!(path = %project_dir.display(), error = %e, "Failed to count project lines");
            0
        });

        let id = ExecutionId::new();
        let execution = Execution::pending(id.clone(), ExecutionMode::Project, lines_of_code);
        self.store.create(execution).await?;
        Ok(id)
    }

    /// Drive a prepared execution to a terminal state.
    ///
    /// Never fails. The container is removed first, then `project_dir`, and
    /// both happen on every exit path.
    pub async fn run(
        &self,
        id: &ExecutionId,
        project_dir: &Path,
        entry_file: &str,
        timeout: Duration,
    ) {
        let started = Instant::now();
        mark_running(&self.store, id).await;

        tracing::info!(
            execution_id = %id,
            entry_file,
            timeout_secs = timeout.as_secs(),
            "Project execution started"
        );

        let mut container = None;
        let report = settle(
            id,
            self.drive(project_dir, entry_file, timeout, &mut container),
            started,
        )
        .await;

        record_outcome(&self.store, id, ExecutionMode::Project, report).await;

        if let Some(handle) = container {
            remove_container(&self.engine, id, &handle).await;
        }
        remove_project_dir(Some(id), project_dir).await;
    }

    fn container_spec(&self, entry_file: &str) -> ContainerSpec {
        ContainerSpec::new(
            self.config.image.clone(),
            vec![self.config.interpreter.clone(), entry_file.to_string()],
            ResourceLimits::memory(self.config.project_memory_bytes),
        )
        .with_working_dir(self.config.project_workdir.clone())
    }

    async fn drive(
        &self,
        project_dir: &Path,
        entry_file: &str,
        timeout: Duration,
        container: &mut Option<ContainerHandle>,
    ) -> Result<RunReport> {
        let handle = self
            .engine
            .create_pending(&self.container_spec(entry_file))
            .await?;
        *container = Some(handle.clone());

        let dir: PathBuf = project_dir.to_path_buf();
        let archive = tokio::task::spawn_blocking(move || archive_directory(&dir))
            .await
            .map_err(|e| Error::internal(format!("Archive task failed: {}", e)))??;

        self.engine
            .copy_archive_into(&handle, &self.config.project_workdir, archive)
            .await?;

        let run_started = Instant::now();
        self.engine.start(&handle).await?;
        let outcome = self.engine.wait(&handle, timeout).await?;
        let elapsed = run_started.elapsed();

        let output = capture_output(&self.engine, &handle).await;

        Ok(RunReport::from_outcome(outcome, output, elapsed, timeout))
    }
}

/// Delete the host-side project directory, logging failures.
async fn remove_project_dir(id: Option<&ExecutionId>, project_dir: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(project_dir).await {
        code_runner_governance::track_cleanup_failure("project_dir");
        tracing::warn!(
            execution_id = ?id.map(ExecutionId::as_str),
            path = %project_dir.display(),
            error = %e,
            "Failed to remove project directory"
        );
    }
}
