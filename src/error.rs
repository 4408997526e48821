//! Error types for the daemon.

use std::path::PathBuf;
use thiserror::Error;

/// Why a single delivery to a subscriber's sink failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// The receiving side of the sink is gone.
    #[error("subscriber sink is closed")]
    Closed,

    /// The subscriber's queue is full.
    #[error("subscriber queue is full")]
    Full,
}

/// Failure writing to a client connection.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to serialize event: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("websocket write failed: {0}")]
    Write(String),
}

/// Failure setting up the directory watcher.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("watch directory {0:?} does not exist")]
    MissingDir(PathBuf),

    #[error("watch path {0:?} is not a directory")]
    NotADirectory(PathBuf),

    #[error("i/o error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),
}

/// Failure loading or saving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write config {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}
