//! Configuration for agora

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::scheduler::RetryPolicy;

/// Default storage directory
pub fn default_storage_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("agora")
}

/// Which deferred-execution backend publishes scheduled posts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerBackend {
    /// In-process tokio timers
    #[default]
    Tokio,
    /// Records registrations only; tasks fire when driven explicitly
    Manual,
}

impl std::str::FromStr for SchedulerBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tokio" => Ok(SchedulerBackend::Tokio),
            "manual" => Ok(SchedulerBackend::Manual),
            other => Err(format!("unknown scheduler backend '{}'", other)),
        }
    }
}

/// Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the SQLite database
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    /// HTTP API port
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Maximum pooled SQLite connections
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    /// SQLite busy timeout; bounds every lock wait
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Minimum seconds between two comments by the same author
    #[serde(default = "default_comment_interval")]
    pub comment_min_interval_secs: u64,

    /// Default page size for list endpoints
    #[serde(default = "default_page_size")]
    pub default_page_size: i64,

    /// Upper bound on the `page_size` query parameter
    #[serde(default = "default_max_page_size")]
    pub max_page_size: i64,

    /// Deferred task backend
    #[serde(default)]
    pub scheduler_backend: SchedulerBackend,

    /// Maximum retries for background tasks (publish, profile creation)
    #[serde(default = "default_task_max_retries")]
    pub task_max_retries: u32,

    /// First retry delay in milliseconds; doubles on each attempt
    #[serde(default = "default_task_retry_base_ms")]
    pub task_retry_base_ms: u64,
}

fn default_http_port() -> u16 {
    8088
}

fn default_pool_size() -> u32 {
    8
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

fn default_comment_interval() -> u64 {
    30
}

fn default_page_size() -> i64 {
    10
}

fn default_max_page_size() -> i64 {
    100
}

fn default_task_max_retries() -> u32 {
    5
}

fn default_task_retry_base_ms() -> u64 {
    500
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            http_port: default_http_port(),
            pool_size: default_pool_size(),
            busy_timeout_ms: default_busy_timeout_ms(),
            comment_min_interval_secs: default_comment_interval(),
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
            scheduler_backend: SchedulerBackend::default(),
            task_max_retries: default_task_max_retries(),
            task_retry_base_ms: default_task_retry_base_ms(),
        }
    }
}

impl Config {
    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Save config to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), std::io::Error> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Get SQLite database path
    pub fn database_path(&self) -> PathBuf {
        self.storage_dir.join("agora.db")
    }

    /// Get config file path
    pub fn config_path(&self) -> PathBuf {
        self.storage_dir.join("config.toml")
    }

    pub fn comment_min_interval(&self) -> Duration {
        Duration::from_secs(self.comment_min_interval_secs)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Retry policy shared by the publish and profile-creation tasks
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.task_max_retries,
            base_delay: Duration::from_millis(self.task_retry_base_ms),
            ..RetryPolicy::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            http_port = 9000
            scheduler_backend = "manual"
            "#,
        )
        .unwrap();
        assert_eq!(config.http_port, 9000);
        assert_eq!(config.scheduler_backend, SchedulerBackend::Manual);
        assert_eq!(config.comment_min_interval_secs, 30);
        assert_eq!(config.max_page_size, 100);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        let config = Config {
            storage_dir: dir.path().to_path_buf(),
            pool_size: 2,
            ..Default::default()
        };
        config.save(&path).unwrap();
        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.pool_size, 2);
        assert_eq!(loaded.database_path(), dir.path().join("agora.db"));
    }
}
