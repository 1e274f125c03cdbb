use super::WorkerSupervisor;
use crate::core::{Result, RouterError, ServerId, UpstreamResponse, WorkerHandle};
use crate::worker;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Lifecycle calls observed by an [`InMemorySupervisor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorEvent {
    Started { name: String, server_id: ServerId },
    Stopped { name: String },
}

#[derive(Debug, Clone)]
struct SimulatedWorker {
    server_id: ServerId,
    served: usize,
}

#[derive(Debug, Clone, Default)]
struct FaultPlan {
    fail_start: HashSet<String>,
    never_ready: HashSet<String>,
    fail_stop: HashSet<String>,
    start_delay: Option<Duration>,
    execute_delay: Option<Duration>,
}

/// An in-memory implementation of `WorkerSupervisor` for testing.
///
/// Workers are table entries answering the worker endpoints directly.
/// Faults can be injected per worker name.
#[derive(Clone, Default)]
pub struct InMemorySupervisor {
    workers: Arc<Mutex<HashMap<String, SimulatedWorker>>>,
    faults: Arc<Mutex<FaultPlan>>,
    events: Arc<Mutex<Vec<SupervisorEvent>>>,
}

impl InMemorySupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// `start` fails for `name`.
    pub async fn fail_start_for(&self, name: impl Into<String>) {
        self.faults.lock().await.fail_start.insert(name.into());
    }

    /// `name` starts but never passes a heartbeat.
    pub async fn never_ready(&self, name: impl Into<String>) {
        self.faults.lock().await.never_ready.insert(name.into());
    }

    /// `stop` reports an error for `name` (the worker is still torn down).
    pub async fn fail_stop_for(&self, name: impl Into<String>) {
        self.faults.lock().await.fail_stop.insert(name.into());
    }

    /// Every `start` sleeps for `delay` before launching the worker.
    pub async fn set_start_delay(&self, delay: Option<Duration>) {
        self.faults.lock().await.start_delay = delay;
    }

    /// Every `execute` sleeps for `delay` before answering.
    pub async fn set_execute_delay(&self, delay: Option<Duration>) {
        self.faults.lock().await.execute_delay = delay;
    }

    /// Names of running workers, sorted.
    pub async fn running(&self) -> Vec<String> {
        let mut names = self.workers.lock().await.keys().cloned().collect::<Vec<_>>();
        names.sort();
        names
    }

    pub async fn is_running(&self, name: &str) -> bool {
        self.workers.lock().await.contains_key(name)
    }

    /// Requests answered by `name` so far.
    pub async fn served_by(&self, name: &str) -> usize {
        self.workers
            .lock()
            .await
            .get(name)
            .map(|worker| worker.served)
            .unwrap_or(0)
    }

    pub async fn events(&self) -> Vec<SupervisorEvent> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl WorkerSupervisor for InMemorySupervisor {
    async fn start(&self, name: &str, server_id: ServerId) -> Result<WorkerHandle> {
        let delay = self.faults.lock().await.start_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.faults.lock().await.fail_start.contains(name) {
            return Err(RouterError::WorkerStart {
                name: name.to_string(),
                reason: "injected start failure".to_string(),
            });
        }

        let mut workers = self.workers.lock().await;
        if workers.contains_key(name) {
            return Err(RouterError::WorkerStart {
                name: name.to_string(),
                reason: "a worker with this name is already running".to_string(),
            });
        }
        workers.insert(
            name.to_string(),
            SimulatedWorker {
                server_id,
                served: 0,
            },
        );
        drop(workers);

        self.events.lock().await.push(SupervisorEvent::Started {
            name: name.to_string(),
            server_id,
        });
        Ok(WorkerHandle::new(name, server_id, format!("mem://{}", name)))
    }

    async fn heartbeat(&self, handle: &WorkerHandle) -> Result<()> {
        if self.faults.lock().await.never_ready.contains(&handle.name) {
            return Err(RouterError::upstream(&handle.name, "worker not ready"));
        }
        if self.is_running(&handle.name).await {
            Ok(())
        } else {
            Err(RouterError::upstream(&handle.name, "worker not running"))
        }
    }

    async fn stop(&self, name: &str) -> Result<()> {
        let removed = self.workers.lock().await.remove(name);
        if removed.is_none() {
            return Err(RouterError::WorkerStop {
                name: name.to_string(),
                reason: "no such worker".to_string(),
            });
        }
        self.events.lock().await.push(SupervisorEvent::Stopped {
            name: name.to_string(),
        });

        if self.faults.lock().await.fail_stop.contains(name) {
            return Err(RouterError::WorkerStop {
                name: name.to_string(),
                reason: "injected stop failure".to_string(),
            });
        }
        Ok(())
    }

    async fn execute(&self, handle: &WorkerHandle, path: &str) -> Result<UpstreamResponse> {
        let delay = self.faults.lock().await.execute_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut workers = self.workers.lock().await;
        let worker = workers
            .get_mut(&handle.name)
            .ok_or_else(|| RouterError::upstream(&handle.name, "worker not running"))?;
        worker.served += 1;
        Ok(worker::respond(&worker.server_id.to_string(), path))
    }
}
