use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub api: ApiConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    pub push: PushConfig,
    #[serde(default)]
    pub watcher: WatcherConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
}

/// Backend HTTP API configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    /// Base URL every request path is appended to (e.g., "http://localhost:8080/api")
    pub base_url: String,
    /// Request timeout in seconds (default: 10)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
}

fn default_timeout() -> u32 {
    10
}

/// Queue status endpoint configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
    /// Path of the status endpoint; `{resource_id}` is substituted.
    #[serde(default = "default_status_path")]
    pub status_path: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            status_path: default_status_path(),
        }
    }
}

fn default_status_path() -> String {
    "/queue/concerts/{resource_id}/status".to_string()
}

/// Push channel configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PushConfig {
    /// WebSocket endpoint (e.g., "ws://localhost:8080/ws/queue")
    pub url: String,
    /// Query parameter carrying the resource id
    #[serde(default = "default_resource_param")]
    pub resource_param: String,
    /// Upper bound for opening the channel, handshake included (milliseconds).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
}

fn default_resource_param() -> String {
    "concertId".to_string()
}

fn default_connect_timeout() -> u64 {
    10000
}

impl PushConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Admission watcher timing policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WatcherConfig {
    /// Fallback polling interval (milliseconds).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Reconnect delay after the first failure (milliseconds).
    #[serde(default = "default_initial_retry")]
    pub initial_retry_delay_ms: u64,

    /// Upper bound for the reconnect delay (milliseconds).
    #[serde(default = "default_max_retry")]
    pub max_retry_delay_ms: u64,

    /// Reconnect delay once a sync confirmed the session is waiting (milliseconds).
    #[serde(default = "default_synced_retry")]
    pub synced_retry_delay_ms: u64,

    /// Delay between admission and navigation (milliseconds).
    #[serde(default = "default_navigation_delay")]
    pub navigation_delay_ms: u64,
}

fn default_poll_interval() -> u64 {
    4000
}

fn default_initial_retry() -> u64 {
    5000
}

fn default_max_retry() -> u64 {
    30000
}

fn default_synced_retry() -> u64 {
    2000
}

fn default_navigation_delay() -> u64 {
    1000
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            initial_retry_delay_ms: default_initial_retry(),
            max_retry_delay_ms: default_max_retry(),
            synced_retry_delay_ms: default_synced_retry(),
            navigation_delay_ms: default_navigation_delay(),
        }
    }
}

impl WatcherConfig {
    /// Never zero: a zero period cannot drive an interval.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn navigation_delay(&self) -> Duration {
        Duration::from_millis(self.navigation_delay_ms)
    }
}

/// Where admission credentials are kept.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CredentialsConfig {
    #[serde(default)]
    pub backend: CredentialBackend,
    /// SQLite database path (used when backend = "sqlite")
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            backend: CredentialBackend::default(),
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("waitroom.db")
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CredentialBackend {
    /// Lives as long as the process.
    #[default]
    Memory,
    Sqlite,
}
