//! Worker lifecycle and request execution.
//!
//! The core never talks to a container runtime or a socket directly; it goes
//! through [`WorkerSupervisor`]. Three implementations are provided:
//! - [`InMemorySupervisor`]: simulated workers with fault injection, for tests.
//! - [`LocalSupervisor`]: in-process HTTP workers on loopback ports.
//! - [`DockerSupervisor`]: one container per worker, driven by the docker CLI.

mod docker;
mod http_client;
mod in_memory;
mod local;

pub use docker::{DockerSettings, DockerSupervisor};
pub use http_client::HttpWorkerClient;
pub use in_memory::{InMemorySupervisor, SupervisorEvent};
pub use local::LocalSupervisor;

use crate::core::{Result, ServerId, UpstreamResponse, WorkerHandle};
use async_trait::async_trait;

/// Starts, probes, stops and forwards requests to backend workers.
#[async_trait]
pub trait WorkerSupervisor: Send + Sync {
    /// Launches a worker tagged with `server_id` under `name`.
    ///
    /// Returns once the worker has been launched; readiness is checked
    /// separately through [`WorkerSupervisor::heartbeat`].
    async fn start(&self, name: &str, server_id: ServerId) -> Result<WorkerHandle>;

    /// Succeeds once the worker answers its liveness endpoint.
    async fn heartbeat(&self, handle: &WorkerHandle) -> Result<()>;

    /// Best-effort teardown.
    async fn stop(&self, name: &str) -> Result<()>;

    /// Forwards one `GET /<path>` to the worker and returns its raw answer.
    async fn execute(&self, handle: &WorkerHandle, path: &str) -> Result<UpstreamResponse>;
}
