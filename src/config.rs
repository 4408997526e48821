//! Configuration management for the daemon.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// How the directory watcher detects new files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchMode {
    /// Platform notifications (inotify, FSEvents, ...).
    Native,
    /// Periodic directory scans.
    Poll,
}

/// What the hub does when a subscriber's queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Close the slow subscriber.
    Evict,
    /// Skip this event for the slow subscriber only.
    Drop,
}

/// Main configuration for the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory watched for new files
    pub watch_dir: PathBuf,

    /// Create the watch directory if it is missing
    pub create_dir: bool,

    /// Notification or polling based watching
    pub watch_mode: WatchMode,

    /// Poll interval in milliseconds (poll mode only)
    pub poll_interval_ms: u64,

    /// Announce files already present at startup
    pub emit_existing: bool,

    /// Host to bind the server to
    pub host: String,

    /// Port to bind the server to
    pub port: u16,

    /// WebSocket endpoint path
    pub ws_path: String,

    /// Per-connection outbound queue capacity
    pub send_queue: usize,

    /// Policy for subscribers whose queue is full
    pub overflow: OverflowPolicy,

    /// Log level
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));

        Self {
            watch_dir: home.join("Desktop").join("in"),
            create_dir: true,
            watch_mode: WatchMode::Native,
            poll_interval_ms: 1000,
            emit_existing: true,
            host: "127.0.0.1".to_string(),
            port: 8080,
            ws_path: "/ws/files".to_string(),
            send_queue: 256,
            overflow: OverflowPolicy::Evict,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Default location of the config file.
    pub fn default_path() -> PathBuf {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        dirs::config_dir()
            .unwrap_or_else(|| home.join(".config"))
            .join("filecast")
            .join("config.json")
    }

    /// Load configuration from a file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(())
    }

    /// Ensure the watch directory exists, creating it when allowed.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        if self.create_dir {
            std::fs::create_dir_all(&self.watch_dir)?;
        }
        Ok(())
    }

    /// Address the server binds to.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
