use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use crate::queue::Stage;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub package: PackageConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub workers: WorkersConfig,
    #[serde(default)]
    pub toolkit: ToolkitConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    8080
}

/// Database configuration.
///
/// Exactly one of `path` and `url` must be set. `url` accepts
/// `sqlite://<path>` and `file:<path>`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: Some(PathBuf::from("archivist.db")),
            url: None,
        }
    }
}

impl DatabaseConfig {
    /// Resolve the SQLite file the stores should open.
    ///
    /// Returns `None` when neither or both locations are configured, or the
    /// URL scheme is not understood. `validate_config` reports those cases.
    pub fn resolved_path(&self) -> Option<PathBuf> {
        match (&self.path, &self.url) {
            (Some(path), None) => Some(path.clone()),
            (None, Some(url)) => url
                .strip_prefix("sqlite://")
                .or_else(|| url.strip_prefix("file:"))
                .filter(|rest| !rest.is_empty())
                .map(PathBuf::from),
            _ => None,
        }
    }
}

/// Package working directories and preservation timing.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PackageConfig {
    /// Directory holding one working directory per object being processed.
    #[serde(default = "default_package_dir")]
    pub package_dir: PathBuf,
    /// Directory where logs of confirmed packages are archived.
    #[serde(default = "default_archive_dir")]
    pub archive_dir: PathBuf,
    /// Seconds an object must exist before its first preservation.
    #[serde(default = "default_delay_secs")]
    pub preservation_delay_secs: u64,
    /// Seconds a modification must age before the object is preserved again.
    #[serde(default = "default_delay_secs")]
    pub update_delay_secs: u64,
}

impl Default for PackageConfig {
    fn default() -> Self {
        Self {
            package_dir: default_package_dir(),
            archive_dir: default_archive_dir(),
            preservation_delay_secs: default_delay_secs(),
            update_delay_secs: default_delay_secs(),
        }
    }
}

fn default_package_dir() -> PathBuf {
    PathBuf::from("packages")
}

fn default_archive_dir() -> PathBuf {
    PathBuf::from("archive")
}

fn default_delay_secs() -> u64 {
    // 30 days
    2_592_000
}

/// Job queue behaviour.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
    /// How often idle workers poll their queue (milliseconds).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Upper bound on a single job's runtime.
    #[serde(default = "default_job_timeout")]
    pub job_timeout_secs: u64,
    /// Attempts before a job failing with infrastructure errors is parked as failed.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before a retried job becomes claimable again.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            job_timeout_secs: default_job_timeout(),
            max_attempts: default_max_attempts(),
            retry_delay_secs: default_retry_delay(),
        }
    }
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_job_timeout() -> u64 {
    // 4 hours
    14_400
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    60
}

/// Worker pool sizing, one entry per stage queue.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkersConfig {
    /// When disabled, jobs accumulate until workers are started elsewhere.
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_worker_count")]
    pub download: usize,
    #[serde(default = "default_worker_count")]
    pub package: usize,
    #[serde(default = "default_worker_count")]
    pub submit: usize,
    #[serde(default = "default_worker_count")]
    pub confirm: usize,
    #[serde(default = "default_worker_count")]
    pub enqueue_objects: usize,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            download: default_worker_count(),
            package: default_worker_count(),
            submit: default_worker_count(),
            confirm: default_worker_count(),
            enqueue_objects: default_worker_count(),
        }
    }
}

impl WorkersConfig {
    /// Number of worker loops to run for a stage.
    pub fn count_for(&self, stage: Stage) -> usize {
        match stage {
            Stage::Download => self.download,
            Stage::Package => self.package,
            Stage::Submit => self.submit,
            Stage::Confirm => self.confirm,
            Stage::EnqueueObjects => self.enqueue_objects,
        }
    }
}

fn default_worker_count() -> usize {
    1
}

/// External preservation toolkit invocation.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolkitConfig {
    /// Executable invoked with one subcommand per stage.
    #[serde(default = "default_toolkit_command")]
    pub command: String,
    /// Arguments placed before the subcommand.
    #[serde(default)]
    pub args: Vec<String>,
}

impl Default for ToolkitConfig {
    fn default() -> Self {
        Self {
            command: default_toolkit_command(),
            args: Vec::new(),
        }
    }
}

fn default_toolkit_command() -> String {
    "preservation-toolkit".to_string()
}

/// Where the archive publishes ingest reports.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ArchiveConfig {
    /// Root containing `accepted/` and `rejected/` report trees.
    #[serde(default = "default_processed_dir")]
    pub processed_dir: PathBuf,
    /// How many days of reports a synchronisation run scans.
    #[serde(default = "default_sync_days")]
    pub sync_days: u32,
    /// Interval of the background synchronisation loop (0 disables it).
    #[serde(default = "default_sync_interval")]
    pub sync_interval_secs: u64,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            processed_dir: default_processed_dir(),
            sync_days: default_sync_days(),
            sync_interval_secs: default_sync_interval(),
        }
    }
}

fn default_processed_dir() -> PathBuf {
    PathBuf::from("processed")
}

fn default_sync_days() -> u32 {
    31
}

fn default_sync_interval() -> u64 {
    3600
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of human readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info,tower_http=debug".to_string()
}

/// Sanitized config for API responses (database URL redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub database: SanitizedDatabaseConfig,
    pub package: PackageConfig,
    pub queue: QueueConfig,
    pub workers: WorkersConfig,
    pub archive: ArchiveConfig,
}

/// Database location with any URL hidden
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedDatabaseConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    pub url_configured: bool,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            database: SanitizedDatabaseConfig {
                path: config.database.path.clone(),
                url_configured: config.database.url.is_some(),
            },
            package: config.package.clone(),
            queue: config.queue.clone(),
            workers: config.workers.clone(),
            archive: config.archive.clone(),
        }
    }
}
