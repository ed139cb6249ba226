use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub sandbox: SandboxConfig,
    pub store: StoreConfig,
    pub uploads: UploadConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub enable_cors: bool,
    pub enable_tracing: bool,
}

/// Container image, interpreter and resource caps for both executors.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct SandboxConfig {
    /// Image every sandbox is created from.
    pub image: String,
    /// Interpreter binary inside the image.
    pub interpreter: String,
    /// Memory ceiling for inline runs, in bytes.
    pub inline_memory_bytes: i64,
    /// CFS period for inline runs, in microseconds.
    pub inline_cpu_period: i64,
    /// CFS quota for inline runs; quota / period is the share of one core.
    pub inline_cpu_quota: i64,
    /// Memory ceiling for project runs, in bytes.
    pub project_memory_bytes: i64,
    /// In-sandbox directory the project archive is unpacked into.
    pub project_workdir: String,
    /// Extension (without dot) of files counted as source in project mode.
    pub source_extension: String,
    pub default_inline_timeout_secs: u64,
    pub default_project_timeout_secs: u64,
    /// Upper bound applied to caller-supplied timeouts.
    pub max_timeout_secs: u64,
}

/// Retention of execution records.
///
/// Both limits unset means records live for the whole process lifetime.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StoreConfig {
    /// Evict terminal records older than this many seconds.
    pub max_age_secs: Option<u64>,
    /// Keep at most this many terminal records.
    pub max_records: Option<usize>,
    pub prune_interval_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct UploadConfig {
    /// Parent directory for per-submission project directories.
    pub root_dir: String,
    /// Request body ceiling for multipart uploads, in bytes.
    pub max_upload_bytes: usize,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct LoggingConfig {
    pub json: bool,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("CODE_RUNNER_ENV").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(File::with_name("config/local").required(false))
            // Map APP__SERVER__PORT=8000 to server.port
            .add_source(Environment::with_prefix("APP").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

impl StoreConfig {
    pub fn max_age(&self) -> Option<Duration> {
        self.max_age_secs.map(Duration::from_secs)
    }

    /// Whether any eviction limit is configured.
    pub fn is_bounded(&self) -> bool {
        self.max_age_secs.is_some() || self.max_records.is_some()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            sandbox: SandboxConfig::default(),
            store: StoreConfig::default(),
            uploads: UploadConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8000,
            enable_cors: true,
            enable_tracing: true,
        }
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            image: "python-sandbox:latest".into(),
            interpreter: "python".into(),
            inline_memory_bytes: 50 * 1024 * 1024,   // 50MB
            inline_cpu_period: 100_000,
            inline_cpu_quota: 50_000,                // half a core
            project_memory_bytes: 100 * 1024 * 1024, // 100MB
            project_workdir: "/app".into(),
            source_extension: "py".into(),
            default_inline_timeout_secs: 10,
            default_project_timeout_secs: 30,
            max_timeout_secs: 300,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_age_secs: None,
            max_records: None,
            prune_interval_secs: 60,
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            root_dir: std::env::temp_dir()
                .join("code-runner-uploads")
                .to_string_lossy()
                .into_owned(),
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}
