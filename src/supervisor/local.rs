use super::{HttpWorkerClient, WorkerSupervisor};
use crate::core::{Result, RouterError, ServerId, UpstreamResponse, WorkerHandle};
use crate::worker::build_worker_router;
use async_trait::async_trait;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error};

const STOP_GRACE: Duration = Duration::from_secs(5);

struct LocalWorker {
    addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Runs each worker as an axum server inside this process, on an ephemeral
/// loopback port. Lets the router run end to end without a container runtime.
#[derive(Clone)]
pub struct LocalSupervisor {
    workers: Arc<Mutex<HashMap<String, LocalWorker>>>,
    client: HttpWorkerClient,
}

impl LocalSupervisor {
    pub fn new(request_timeout: Duration) -> Result<Self> {
        Ok(Self {
            workers: Arc::new(Mutex::new(HashMap::new())),
            client: HttpWorkerClient::new(request_timeout)?,
        })
    }

    pub async fn address_of(&self, name: &str) -> Option<SocketAddr> {
        self.workers.lock().await.get(name).map(|worker| worker.addr)
    }
}

#[async_trait]
impl WorkerSupervisor for LocalSupervisor {
    async fn start(&self, name: &str, server_id: ServerId) -> Result<WorkerHandle> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|err| RouterError::WorkerStart {
                name: name.to_string(),
                reason: err.to_string(),
            })?;
        let addr = listener.local_addr()?;

        let mut workers = self.workers.lock().await;
        if workers.contains_key(name) {
            return Err(RouterError::WorkerStart {
                name: name.to_string(),
                reason: "a worker with this name is already running".to_string(),
            });
        }
        let (shutdown, signal) = oneshot::channel::<()>();
        let app = build_worker_router(server_id.to_string());
        let worker_name = name.to_string();
        let task = tokio::spawn(async move {
            let served = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = signal.await;
            });
            if let Err(err) = served.await {
                error!(worker = %worker_name, error = %err, "local worker stopped with error");
            }
        });

        debug!(worker = %name, %server_id, %addr, "local worker listening");
        workers.insert(
            name.to_string(),
            LocalWorker {
                addr,
                shutdown,
                task,
            },
        );
        Ok(WorkerHandle::new(name, server_id, format!("http://{}", addr)))
    }

    async fn heartbeat(&self, handle: &WorkerHandle) -> Result<()> {
        self.client.heartbeat(handle).await
    }

    async fn stop(&self, name: &str) -> Result<()> {
        let worker = self
            .workers
            .lock()
            .await
            .remove(name)
            .ok_or_else(|| RouterError::WorkerStop {
                name: name.to_string(),
                reason: "no such worker".to_string(),
            })?;

        let _ = worker.shutdown.send(());
        let mut task = worker.task;
        match tokio::time::timeout(STOP_GRACE, &mut task).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(RouterError::WorkerStop {
                name: name.to_string(),
                reason: err.to_string(),
            }),
            Err(_) => {
                task.abort();
                debug!(worker = %name, "local worker aborted after grace period");
                Ok(())
            }
        }
    }

    async fn execute(&self, handle: &WorkerHandle, path: &str) -> Result<UpstreamResponse> {
        self.client.get(handle, path).await
    }
}
