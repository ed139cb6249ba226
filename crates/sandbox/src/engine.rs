//! Isolation engine client.
//!
//! This module provides the `IsolationEngine` trait consumed by the executors,
//! a Docker-based implementation using the `bollard` crate, and an in-memory
//! mock for tests. The engine creates containers with resource caps fixed at
//! creation time and no network access.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use code_runner_core::{Error, Result};

// =============================================================================
// Sandbox Types
// =============================================================================

/// Handle of a container owned by one execution.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct ContainerHandle(pub String);

impl std::fmt::Display for ContainerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Resource caps applied when the container is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceLimits {
    /// Memory ceiling in bytes.
    pub memory_bytes: i64,
    /// CFS period in microseconds.
    pub cpu_period: Option<i64>,
    /// CFS quota in microseconds per period.
    pub cpu_quota: Option<i64>,
}

impl ResourceLimits {
    /// Memory cap only.
    pub fn memory(memory_bytes: i64) -> Self {
        Self {
            memory_bytes,
            cpu_period: None,
            cpu_quota: None,
        }
    }

    /// Add a CPU share expressed as a period/quota pair.
    pub fn with_cpu(mut self, period: i64, quota: i64) -> Self {
        self.cpu_period = Some(period);
        self.cpu_quota = Some(quota);
        self
    }
}

/// Everything needed to create one container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub image: String,
    pub command: Vec<String>,
    pub working_dir: Option<String>,
    pub limits: ResourceLimits,
    pub network_disabled: bool,
}

impl ContainerSpec {
    /// New spec with networking disabled.
    pub fn new(image: impl Into<String>, command: Vec<String>, limits: ResourceLimits) -> Self {
        Self {
            image: image.into(),
            command,
            working_dir: None,
            limits,
            network_disabled: true,
        }
    }

    pub fn with_working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

/// How a wait on a container resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The container stopped on its own.
    Exited { status_code: i64 },
    /// The bound elapsed while the container was still running.
    TimedOut,
}

// =============================================================================
// Isolation Engine Trait
// =============================================================================

/// Backend that provisions and tears down isolated containers.
///
/// The default implementation uses Docker via `bollard`.
#[async_trait]
pub trait IsolationEngine: Send + Sync {
    /// Create and immediately start a container.
    async fn create_detached(&self, spec: &ContainerSpec) -> Result<ContainerHandle>;

    /// Create a container without starting it.
    async fn create_pending(&self, spec: &ContainerSpec) -> Result<ContainerHandle>;

    /// Extract a tar archive into `dest_path` inside the container.
    async fn copy_archive_into(
        &self,
        handle: &ContainerHandle,
        dest_path: &str,
        archive: Bytes,
    ) -> Result<()>;

    /// Start a container created with `create_pending`.
    async fn start(&self, handle: &ContainerHandle) -> Result<()>;

    /// Block until the container stops or `timeout` elapses.
    async fn wait(&self, handle: &ContainerHandle, timeout: Duration) -> Result<WaitOutcome>;

    /// Combined stdout and stderr produced so far.
    async fn read_combined_output(&self, handle: &ContainerHandle) -> Result<String>;

    /// Kill (if running) and remove the container.
    async fn force_remove(&self, handle: &ContainerHandle) -> Result<()>;

    /// Check if the backend is reachable.
    async fn is_available(&self) -> bool;
}

// =============================================================================
// Docker Engine Implementation
// =============================================================================

/// Docker-based isolation engine using the `bollard` crate.
///
/// Containers are created with:
/// - No network (`network_disabled` and `network_mode: none`)
/// - Memory and CPU limits
/// - Auto-removal disabled; removal is always explicit
pub struct DockerEngine {
    docker: bollard::Docker,
}

impl DockerEngine {
    /// Connect to the local Docker daemon.
    ///
    /// `request_timeout` must exceed the longest execution timeout, since
    /// `wait` is a single long-poll request.
    pub fn new(request_timeout: Duration) -> Result<Self> {
        let docker = bollard::Docker::connect_with_local_defaults()
            .map_err(|e| {
                Error::infrastructure(format!(
                    "Failed to connect to Docker daemon: {}. Is Docker running?",
                    e
                ))
            })?
            .with_timeout(request_timeout);
        Ok(Self { docker })
    }

    /// Create from an existing bollard Docker client.
    pub fn from_client(docker: bollard::Docker) -> Self {
        Self { docker }
    }

    async fn create(&self, spec: &ContainerSpec) -> Result<ContainerHandle> {
        use bollard::container::{Config, CreateContainerOptions};
        use bollard::models::HostConfig;

        let name = format!("code-runner-{}", uuid::Uuid::new_v4());

        let host_config = HostConfig {
            memory: Some(spec.limits.memory_bytes),
            cpu_period: spec.limits.cpu_period,
            cpu_quota: spec.limits.cpu_quota,
            network_mode: spec.network_disabled.then(|| "none".to_string()),
            auto_remove: Some(false),
            ..Default::default()
        };

        let container_config = Config {
            image: Some(spec.image.clone()),
            cmd: Some(spec.command.clone()),
            working_dir: spec.working_dir.clone(),
            network_disabled: Some(spec.network_disabled),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            tty: Some(false),
            host_config: Some(host_config),
            labels: Some(HashMap::from([(
                "managed-by".to_string(),
                "code-runner".to_string(),
            )])),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: name.as_str(),
            platform: None,
        };

        self.docker
            .create_container(Some(options), container_config)
            .await
            .map_err(|e| {
                Error::infrastructure(format!("Failed to create sandbox container: {}", e))
            })?;

        tracing::debug!(container = %name, image = %spec.image, "Sandbox container created");

        Ok(ContainerHandle(name))
    }
}

#[async_trait]
impl IsolationEngine for DockerEngine {
    async fn create_detached(&self, spec: &ContainerSpec) -> Result<ContainerHandle> {
        let handle = self.create(spec).await?;
        start_or_discard(self, handle).await
    }

    async fn create_pending(&self, spec: &ContainerSpec) -> Result<ContainerHandle> {
        self.create(spec).await
    }

    async fn copy_archive_into(
        &self,
        handle: &ContainerHandle,
        dest_path: &str,
        archive: Bytes,
    ) -> Result<()> {
        use bollard::container::UploadToContainerOptions;

        let size = archive.len();
        let options = UploadToContainerOptions {
            path: dest_path.to_string(),
            ..Default::default()
        };

        self.docker
            .upload_to_container(&handle.0, Some(options), archive)
            .await
            .map_err(|e| {
                Error::infrastructure(format!(
                    "Failed to copy project archive into sandbox: {}",
                    e
                ))
            })?;

        tracing::debug!(container = %handle, dest = dest_path, size, "Project archive copied");
        Ok(())
    }

    async fn start(&self, handle: &ContainerHandle) -> Result<()> {
        self.docker
            .start_container::<String>(&handle.0, None)
            .await
            .map_err(|e| Error::infrastructure(format!("Failed to start sandbox container: {}", e)))
    }

    async fn wait(&self, handle: &ContainerHandle, timeout: Duration) -> Result<WaitOutcome> {
        use bollard::container::WaitContainerOptions;
        use futures::StreamExt;

        let options = WaitContainerOptions {
            condition: "not-running",
        };
        let mut stream = self.docker.wait_container(&handle.0, Some(options));

        let next = match tokio::time::timeout(timeout, stream.next()).await {
            Ok(next) => next,
            Err(_) => {
                tracing::warn!(container = %handle, timeout_secs = timeout.as_secs(), "Sandbox wait timed out");
                return Ok(WaitOutcome::TimedOut);
            }
        };

        wait_outcome(next)
    }

    async fn read_combined_output(&self, handle: &ContainerHandle) -> Result<String> {
        use bollard::container::{LogOutput, LogsOptions};
        use futures::StreamExt;

        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            follow: false,
            ..Default::default()
        };

        let mut output = String::new();
        let mut stream = self.docker.logs(&handle.0, Some(options));
        while let Some(msg) = stream.next().await {
            match msg {
                Ok(LogOutput::StdOut { message })
                | Ok(LogOutput::StdErr { message })
                | Ok(LogOutput::Console { message }) => {
                    output.push_str(&String::from_utf8_lossy(&message));
                }
                Ok(LogOutput::StdIn { .. }) => {}
                Err(e) => {
                    return Err(Error::infrastructure(format!(
                        "Failed to read sandbox logs: {}",
                        e
                    )))
                }
            }
        }

        Ok(output)
    }

    async fn force_remove(&self, handle: &ContainerHandle) -> Result<()> {
        use bollard::container::RemoveContainerOptions;

        self.docker
            .remove_container(
                &handle.0,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| {
                Error::infrastructure(format!("Failed to remove sandbox container: {}", e))
            })?;

        tracing::debug!(container = %handle, "Sandbox container removed");
        Ok(())
    }

    async fn is_available(&self) -> bool {
        self.docker.ping().await.is_ok()
    }
}

/// Map the first item of a Docker wait stream onto a [`WaitOutcome`].
fn wait_outcome(
    next: Option<std::result::Result<bollard::models::ContainerWaitResponse, bollard::errors::Error>>,
) -> Result<WaitOutcome> {
    match next {
        Some(Ok(response)) => Ok(WaitOutcome::Exited {
            status_code: response.status_code,
        }),
        // bollard reports non-zero exits as an error carrying the code
        Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => {
            Ok(WaitOutcome::Exited { status_code: code })
        }
        Some(Err(e)) => Err(Error::infrastructure(format!(
            "Failed to wait for sandbox container: {}",
            e
        ))),
        None => Err(Error::infrastructure(
            "Sandbox wait stream ended without an exit status",
        )),
    }
}

/// Start a freshly created container, removing it again if the start fails.
///
/// The caller never receives the handle on failure, so a container that
/// cannot be removed here is leaked and only logged.
async fn start_or_discard<E>(engine: &E, handle: ContainerHandle) -> Result<ContainerHandle>
where
    E: IsolationEngine + ?Sized,
{
    if let Err(e) = engine.start(&handle).await {
        if let Err(cleanup) = engine.force_remove(&handle).await {
            code_runner_governance::track_cleanup_failure("container");
            tracing::warn!(
                container = %handle,
                error = %cleanup,
                "Failed to remove container that never started"
            );
        }
        return Err(e);
    }
    Ok(handle)
}

// =============================================================================
// Mock Engine (for testing without Docker)
// =============================================================================

/// Engine operation a [`MockEngine`] can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockStage {
    Create,
    Copy,
    Start,
    Wait,
    Logs,
    Remove,
}

#[derive(Debug, Clone)]
struct MockContainer {
    spec: ContainerSpec,
    started: bool,
}

/// In-memory engine for unit testing.
///
/// Tracks live containers so tests can assert that every container was torn
/// down, and records uploaded archives for inspection.
pub struct MockEngine {
    outcome: WaitOutcome,
    output: String,
    echo_command: bool,
    wait_delay: Duration,
    failures: HashMap<MockStage, String>,
    panics: HashSet<MockStage>,
    live: Mutex<HashMap<String, MockContainer>>,
    created: Mutex<Vec<ContainerSpec>>,
    removed: Mutex<Vec<ContainerHandle>>,
    archives: Mutex<Vec<(String, Bytes)>>,
}

impl Default for MockEngine {
    fn default() -> Self {
        Self {
            outcome: WaitOutcome::Exited { status_code: 0 },
            output: "[mock] command executed\n".to_string(),
            echo_command: false,
            wait_delay: Duration::ZERO,
            failures: HashMap::new(),
            panics: HashSet::new(),
            live: Mutex::new(HashMap::new()),
            created: Mutex::new(Vec::new()),
            removed: Mutex::new(Vec::new()),
            archives: Mutex::new(Vec::new()),
        }
    }
}

impl MockEngine {
    /// A mock whose containers exit 0 with the given output.
    pub fn new(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            ..Default::default()
        }
    }

    /// Exit code reported by `wait`.
    pub fn with_exit_code(mut self, status_code: i64) -> Self {
        self.outcome = WaitOutcome::Exited { status_code };
        self
    }

    /// Simulated run time; waits shorter than this report `TimedOut`.
    pub fn with_wait_delay(mut self, delay: Duration) -> Self {
        self.wait_delay = delay;
        self
    }

    /// Report the last command argument as the container's output.
    pub fn echoing_command(mut self) -> Self {
        self.echo_command = true;
        self
    }

    /// Make `stage` fail with `message`.
    pub fn failing_on(mut self, stage: MockStage, message: impl Into<String>) -> Self {
        self.failures.insert(stage, message.into());
        self
    }

    /// Make `stage` panic instead of returning.
    pub fn panicking_on(mut self, stage: MockStage) -> Self {
        self.panics.insert(stage);
        self
    }

    /// Number of containers created and not yet removed.
    pub fn live_containers(&self) -> usize {
        self.lock(&self.live).len()
    }

    /// Whether the handle still resolves to a container.
    pub fn contains(&self, handle: &ContainerHandle) -> bool {
        self.lock(&self.live).contains_key(&handle.0)
    }

    /// Specs of every container created so far.
    pub fn created_specs(&self) -> Vec<ContainerSpec> {
        self.lock(&self.created).clone()
    }

    /// Handles passed to `force_remove`, in call order.
    pub fn removed(&self) -> Vec<ContainerHandle> {
        self.lock(&self.removed).clone()
    }

    /// `(dest_path, archive)` pairs passed to `copy_archive_into`.
    pub fn archives(&self) -> Vec<(String, Bytes)> {
        self.lock(&self.archives).clone()
    }

    fn lock<'a, T>(&self, m: &'a Mutex<T>) -> std::sync::MutexGuard<'a, T> {
        m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check(&self, stage: MockStage) -> Result<()> {
        if self.panics.contains(&stage) {
            panic!("mock engine panicked during {:?}", stage);
        }
        match self.failures.get(&stage) {
            Some(message) => Err(Error::infrastructure(message.clone())),
            None => Ok(()),
        }
    }

    fn create(&self, spec: &ContainerSpec, started: bool) -> Result<ContainerHandle> {
        self.check(MockStage::Create)?;
        let handle = ContainerHandle(format!("mock-sandbox-{}", uuid::Uuid::new_v4()));
        self.lock(&self.live).insert(
            handle.0.clone(),
            MockContainer {
                spec: spec.clone(),
                started,
            },
        );
        self.lock(&self.created).push(spec.clone());
        Ok(handle)
    }

    fn container(&self, handle: &ContainerHandle) -> Result<MockContainer> {
        self.lock(&self.live)
            .get(&handle.0)
            .cloned()
            .ok_or_else(|| Error::infrastructure(format!("No such container: {}", handle)))
    }
}

#[async_trait]
impl IsolationEngine for MockEngine {
    async fn create_detached(&self, spec: &ContainerSpec) -> Result<ContainerHandle> {
        let handle = self.create(spec, false)?;
        start_or_discard(self, handle).await
    }

    async fn create_pending(&self, spec: &ContainerSpec) -> Result<ContainerHandle> {
        self.create(spec, false)
    }

    async fn copy_archive_into(
        &self,
        handle: &ContainerHandle,
        dest_path: &str,
        archive: Bytes,
    ) -> Result<()> {
        self.check(MockStage::Copy)?;
        if self.container(handle)?.started {
            return Err(Error::infrastructure(format!(
                "Container {} is already running",
                handle
            )));
        }
        self.lock(&self.archives)
            .push((dest_path.to_string(), archive));
        Ok(())
    }

    async fn start(&self, handle: &ContainerHandle) -> Result<()> {
        self.check(MockStage::Start)?;
        let mut live = self.lock(&self.live);
        let container = live
            .get_mut(&handle.0)
            .ok_or_else(|| Error::infrastructure(format!("No such container: {}", handle)))?;
        container.started = true;
        Ok(())
    }

    async fn wait(&self, handle: &ContainerHandle, timeout: Duration) -> Result<WaitOutcome> {
        self.check(MockStage::Wait)?;
        if !self.container(handle)?.started {
            return Err(Error::infrastructure(format!(
                "Container {} is not running",
                handle
            )));
        }

        if self.wait_delay > timeout {
            tokio::time::sleep(timeout).await;
            return Ok(WaitOutcome::TimedOut);
        }
        tokio::time::sleep(self.wait_delay).await;
        Ok(self.outcome)
    }

    async fn read_combined_output(&self, handle: &ContainerHandle) -> Result<String> {
        self.check(MockStage::Logs)?;
        let container = self.container(handle)?;
        if self.echo_command {
            return Ok(container.spec.command.last().cloned().unwrap_or_default());
        }
        Ok(self.output.clone())
    }

    async fn force_remove(&self, handle: &ContainerHandle) -> Result<()> {
        self.lock(&self.removed).push(handle.clone());
        self.check(MockStage::Remove)?;
        self.lock(&self.live).remove(&handle.0);
        Ok(())
    }

    async fn is_available(&self) -> bool {
        true
    }
}

// =============================================================================
// Tests
// =============================================================================
