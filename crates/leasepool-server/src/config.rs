//! Server configuration
//!
//! Settings come from an optional TOML file; command line flags override
//! individual values. Every key has a default, so an empty file is valid.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use leasepool_node::{PoolConfig, RetryPolicy};
use leasepool_storage::RedbStoreConfig;

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    4242
}

fn default_db_path() -> PathBuf {
    RedbStoreConfig::default().db_path
}

fn default_log_level() -> String {
    "info".into()
}

fn default_release_timeout_mins() -> u64 {
    leasepool_node::DEFAULT_RELEASE_TIMEOUT_MINS
}

fn default_reaper_interval_secs() -> u64 {
    leasepool_node::DEFAULT_REAPER_INTERVAL_SECS
}

fn default_max_queue_size() -> usize {
    leasepool_node::DEFAULT_MAX_QUEUE_SIZE
}

fn default_allocation_lock_timeout_secs() -> u64 {
    leasepool_node::DEFAULT_ALLOCATION_LOCK_TIMEOUT_SECS
}

/// Top-level server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// redb database file
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Used when RUST_LOG is not set
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Minutes without an update before a lease is released
    #[serde(default = "default_release_timeout_mins")]
    pub account_release_timeout: u64,

    #[serde(default = "default_reaper_interval_secs")]
    pub reaper_interval: u64,

    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,

    #[serde(default = "default_allocation_lock_timeout_secs")]
    pub allocation_lock_timeout: u64,

    #[serde(default)]
    pub retry: RetrySettings,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            db_path: default_db_path(),
            log_level: default_log_level(),
            account_release_timeout: default_release_timeout_mins(),
            reaper_interval: default_reaper_interval_secs(),
            max_queue_size: default_max_queue_size(),
            allocation_lock_timeout: default_allocation_lock_timeout_secs(),
            retry: RetrySettings::default(),
        }
    }
}

/// `[retry]` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub warn_after: u32,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            base_delay_ms: policy.base_delay.as_millis() as u64,
            max_delay_ms: policy.max_delay.as_millis() as u64,
            warn_after: policy.warn_after,
        }
    }
}

impl ServerConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Socket address to bind
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn store_config(&self) -> RedbStoreConfig {
        RedbStoreConfig::with_path(&self.db_path)
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig::default()
            .with_release_timeout(Duration::from_secs(self.account_release_timeout * 60))
            .with_reaper_interval(Duration::from_secs(self.reaper_interval.max(1)))
            .with_max_queue_size(self.max_queue_size)
            .with_allocation_lock_timeout(Duration::from_secs(self.allocation_lock_timeout))
            .with_retry(RetryPolicy {
                max_attempts: self.retry.max_attempts.max(1),
                base_delay: Duration::from_millis(self.retry.base_delay_ms),
                max_delay: Duration::from_millis(self.retry.max_delay_ms),
                warn_after: self.retry.warn_after,
            })
    }
}

/// Command line arguments
#[derive(Debug, Parser)]
#[command(name = "leasepool-server", about = "Account lease pool HTTP server")]
pub struct Cli {
    /// Path to a TOML config file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Address to listen on
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(long)]
    pub port: Option<u16>,

    /// redb database file
    #[arg(long)]
    pub db_path: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
}

impl Cli {
    /// Load the config file (if any) and apply flag overrides
    pub fn load_config(&self) -> Result<ServerConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::from_file(path)?,
            None => ServerConfig::default(),
        };

        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(db_path) = &self.db_path {
            config.db_path = db_path.clone();
        }
        if let Some(log_level) = &self.log_level {
            config.log_level = log_level.clone();
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = ServerConfig::from_toml("").unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.port, 4242);

        let pool = config.pool_config();
        assert_eq!(pool.account_release_timeout, Duration::from_secs(120 * 60));
        assert_eq!(pool.max_queue_size, 50);
        assert_eq!(pool.retry, RetryPolicy::default());
    }

    #[test]
    fn test_partial_file() {
        let config = ServerConfig::from_toml(
            r#"
            port = 8080
            account_release_timeout = 30

            [retry]
            max_attempts = 4
            "#,
        )
        .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.host, "127.0.0.1");
        let pool = config.pool_config();
        assert_eq!(pool.account_release_timeout, Duration::from_secs(30 * 60));
        assert_eq!(pool.retry.max_attempts, 4);
        assert_eq!(pool.retry.base_delay, Duration::from_millis(500));
    }

    #[test]
    fn test_unknown_value_type_is_rejected() {
        assert!(matches!(
            ServerConfig::from_toml("port = \"high\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_flags_override_file() {
        let cli = Cli::parse_from(["leasepool-server", "--port", "5000", "--log-level", "debug"]);
        let config = cli.load_config().unwrap();
        assert_eq!(config.port, 5000);
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.bind_addr(), "127.0.0.1:5000");
    }
}
