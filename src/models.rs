//! Data models for file arrival broadcasting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Identifier of one client connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh connection id.
    pub fn new() -> Self {
        Self(format!("conn_{}", Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A file discovered in the watched directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileArrival {
    /// Absolute path of the new file.
    pub path: PathBuf,
    pub discovered_at: DateTime<Utc>,
}

impl FileArrival {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            discovered_at: Utc::now(),
        }
    }
}

/// The event a single subscriber receives for one arrival.
///
/// Instantiated once per subscriber at delivery time, so `session_id`
/// always names the receiving connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileArrivalEvent {
    pub session_id: String,
    pub path: String,
}

impl FileArrivalEvent {
    /// Stamp an arrival for delivery to `session_id`.
    pub fn stamp(session_id: &SessionId, arrival: &FileArrival) -> Self {
        Self {
            session_id: session_id.as_str().to_string(),
            path: arrival.path.to_string_lossy().into_owned(),
        }
    }
}

/// Lifecycle state of a connection session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Connecting,
    Active,
    Closed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Connecting => write!(f, "connecting"),
            SessionState::Active => write!(f, "active"),
            SessionState::Closed => write!(f, "closed"),
        }
    }
}

/// Why a connection session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// The client closed the connection or the stream ended.
    ClientClosed,
    /// Writing to the client failed.
    TransportError,
    /// The hub dropped the subscription (replaced or too slow).
    Evicted,
    /// The daemon is shutting down.
    Shutdown,
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloseReason::ClientClosed => write!(f, "client_closed"),
            CloseReason::TransportError => write!(f, "transport_error"),
            CloseReason::Evicted => write!(f, "evicted"),
            CloseReason::Shutdown => write!(f, "shutdown"),
        }
    }
}
