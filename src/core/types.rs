use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ring-facing identity of a replica.
///
/// Allocated strictly monotonically by the scaling controller and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerId(pub u64);

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ServerId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Liveness {
    Starting,
    Ready,
    Stopping,
    Stopped,
}

/// One running instance of the backend worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replica {
    pub name: String,
    pub server_id: ServerId,
    pub liveness: Liveness,
    pub started_at: DateTime<Utc>,
}

impl Replica {
    pub fn new(name: impl Into<String>, server_id: ServerId) -> Self {
        Self {
            name: name.into(),
            server_id,
            liveness: Liveness::Starting,
            started_at: Utc::now(),
        }
    }

    pub fn mark(&mut self, liveness: Liveness) {
        self.liveness = liveness;
    }
}

/// Raw status and body returned by a backend worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamResponse {
    pub status: u16,
    pub body: String,
}

impl UpstreamResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Address of a started worker, as returned by the supervisor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerHandle {
    pub name: String,
    pub server_id: ServerId,
    /// Base URL or supervisor-specific locator used to reach the worker.
    pub endpoint: String,
}

impl WorkerHandle {
    pub fn new(name: impl Into<String>, server_id: ServerId, endpoint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            server_id,
            endpoint: endpoint.into(),
        }
    }
}
