use crate::core::ServerId;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouterError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Not enough replicas to remove: requested {requested}, available {available}")]
    InsufficientReplicas { requested: usize, available: usize },

    #[error("Not enough ring capacity: requested {requested} replicas, room for {available}")]
    InsufficientCapacity { requested: usize, available: usize },

    #[error("Ring is full: no free slot left for server {0}")]
    RingFull(ServerId),

    #[error("Ring has no registered servers")]
    EmptyRing,

    #[error("No available server to handle request: {0}")]
    NoAvailableServer(String),

    #[error("Replica '{name}' did not become ready within {timeout:?}")]
    StartTimeout { name: String, timeout: Duration },

    #[error("Failed to start replica '{name}': {reason}")]
    WorkerStart { name: String, reason: String },

    #[error("Failed to stop replica '{name}': {reason}")]
    WorkerStop { name: String, reason: String },

    #[error("Upstream replica '{replica}' failed: {}", upstream_detail(*status, reason))]
    Upstream {
        replica: String,
        status: Option<u16>,
        reason: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(String),
}

fn upstream_detail(status: Option<u16>, reason: &str) -> String {
    match status {
        Some(status) => format!("status {} ({})", status, reason),
        None => reason.to_string(),
    }
}

impl RouterError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Upstream failure with no HTTP status, e.g. a transport error or timeout.
    pub fn upstream(replica: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Upstream {
            replica: replica.into(),
            status: None,
            reason: reason.into(),
        }
    }

    pub fn upstream_status(replica: impl Into<String>, status: u16) -> Self {
        Self::Upstream {
            replica: replica.into(),
            status: Some(status),
            reason: "non-success status".to_string(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            Self::StartTimeout { .. } => true,
            Self::Upstream { status: None, reason, .. } => reason == "timeout",
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, RouterError>;

impl From<std::io::Error> for RouterError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
