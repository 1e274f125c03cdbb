use crate::cluster::RoutingState;
use crate::core::{Result, RouterError, ServerId, UpstreamResponse, WorkerHandle};
use crate::supervisor::WorkerSupervisor;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

/// How the ring key of an inbound request is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum KeyDerivation {
    /// A fresh random identifier per request. Identical requests may land on
    /// different replicas; load spreads evenly.
    #[default]
    Ephemeral,
    /// The request path. Identical requests stick to one replica while the
    /// pool is unchanged.
    Path,
}

/// A request answered by a replica.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutedResponse {
    pub replica: String,
    pub server_id: ServerId,
    pub response: UpstreamResponse,
}

/// Maps requests onto replicas through the ring and forwards them.
pub struct RequestRouter {
    state: Arc<RwLock<RoutingState>>,
    supervisor: Arc<dyn WorkerSupervisor>,
    request_timeout: Duration,
    key_derivation: KeyDerivation,
}

impl RequestRouter {
    pub fn new(
        state: Arc<RwLock<RoutingState>>,
        supervisor: Arc<dyn WorkerSupervisor>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            state,
            supervisor,
            request_timeout,
            key_derivation: KeyDerivation::default(),
        }
    }

    pub fn with_key_derivation(mut self, key_derivation: KeyDerivation) -> Self {
        self.key_derivation = key_derivation;
        self
    }

    /// Ring key for a request to `path`.
    pub fn request_key(&self, path: &str) -> String {
        match self.key_derivation {
            KeyDerivation::Ephemeral => Uuid::new_v4().as_u128().to_string(),
            KeyDerivation::Path => path.trim_start_matches('/').to_string(),
        }
    }

    /// Resolves the replica owning `key`.
    ///
    /// Ring lookup and registry resolution happen under one read guard.
    pub async fn resolve(&self, key: &str) -> Result<WorkerHandle> {
        let state = self.state.read().await;
        let slot = state.ring().slot_for_key(key);
        state.route(slot)
    }

    /// Forwards `GET /<path>` to the replica chosen by the ring.
    ///
    /// Non-success answers and timeouts come back as `RouterError::Upstream`;
    /// nothing is retried.
    pub async fn route(&self, path: &str) -> Result<RoutedResponse> {
        let key = self.request_key(path);
        let handle = self.resolve(&key).await?;
        debug!(replica = %handle.name, server_id = %handle.server_id, path, "routing request");

        let response =
            match tokio::time::timeout(self.request_timeout, self.supervisor.execute(&handle, path))
                .await
            {
                Err(_) => {
                    warn!(replica = %handle.name, path, timeout = ?self.request_timeout, "upstream timed out");
                    return Err(RouterError::upstream(&handle.name, "timeout"));
                }
                Ok(Err(err @ RouterError::Upstream { .. })) => return Err(err),
                Ok(Err(err)) => return Err(RouterError::upstream(&handle.name, err.to_string())),
                Ok(Ok(response)) => response,
            };

        if !response.is_success() {
            debug!(replica = %handle.name, status = response.status, path, "upstream rejected request");
            return Err(RouterError::upstream_status(&handle.name, response.status));
        }

        Ok(RoutedResponse {
            replica: handle.name,
            server_id: handle.server_id,
            response,
        })
    }
}
