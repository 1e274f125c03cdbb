//! Online scale-up and scale-down of the replica pool.
//!
//! A scaling request moves through
//! `Requested -> Resolving -> Provisioning | Decommissioning -> Committing -> Done | Failed`.
//! Workers are provisioned outside any routing lock; ring and registry change
//! together under the routing write lock; a replica leaves routing before its
//! worker is stopped.

use crate::cluster::{RegisteredReplica, ReplicaSet, RoutingState};
use crate::core::{Liveness, Replica, Result, RouterError, ServerId, WorkerHandle};
use crate::supervisor::WorkerSupervisor;
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

const GENERATED_NAME_LEN: usize = 5;
const MAX_NAME_LEN: usize = 63;
/// Draws allowed per generated name before the request is rejected.
const NAME_ATTEMPTS_PER_REPLICA: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalePhase {
    Requested,
    Resolving,
    Provisioning,
    Decommissioning,
    Committing,
    Done,
    Failed,
}

/// A candidate that never made it into routing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvisionFailure {
    pub name: String,
    pub reason: String,
}

/// Result of a scaling request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScaleOutcome {
    /// Pool after the request.
    #[serde(flatten)]
    pub replicas: ReplicaSet,
    /// Replicas admitted or removed by this request, with their final liveness.
    #[serde(skip)]
    pub changed: Vec<Replica>,
    /// Candidates discarded during provisioning.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed: Vec<ProvisionFailure>,
}

impl ScaleOutcome {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn changed_names(&self) -> Vec<String> {
        self.changed.iter().map(|replica| replica.name.clone()).collect()
    }
}

/// Checks that `name` can be used as a worker hostname.
pub fn validate_replica_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return Err(RouterError::invalid("replica name must not be empty"));
    };
    if name.len() > MAX_NAME_LEN {
        return Err(RouterError::invalid(format!(
            "replica name '{}' is longer than {} characters",
            name, MAX_NAME_LEN
        )));
    }
    if !first.is_ascii_alphanumeric()
        || !chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(RouterError::invalid(format!(
            "replica name '{}' must be alphanumeric (with '-', '_' or '.')",
            name
        )));
    }
    Ok(())
}

/// Adds and removes replicas while keeping ring, registry and workers in step.
pub struct ScalingController {
    state: Arc<RwLock<RoutingState>>,
    supervisor: Arc<dyn WorkerSupervisor>,
    next_server_id: AtomicU64,
    /// Serialises scaling requests; routing only takes `state`.
    scaling: Mutex<()>,
    readiness_timeout: Duration,
    heartbeat_interval: Duration,
}

impl ScalingController {
    pub fn new(
        state: Arc<RwLock<RoutingState>>,
        supervisor: Arc<dyn WorkerSupervisor>,
        readiness_timeout: Duration,
        heartbeat_interval: Duration,
    ) -> Self {
        Self {
            state,
            supervisor,
            next_server_id: AtomicU64::new(1),
            scaling: Mutex::new(()),
            readiness_timeout,
            heartbeat_interval,
        }
    }

    pub async fn replica_set(&self) -> ReplicaSet {
        self.state.read().await.replica_set()
    }

    /// Starts the initial pool `Server1..ServerN`.
    pub async fn bootstrap(&self, count: usize) -> Result<ScaleOutcome> {
        let names = (1..=count).map(|i| format!("Server{}", i)).collect();
        self.scale_add(count, names).await
    }

    /// Brings `count` new replicas into routing.
    ///
    /// Fails without side effects if the ring has no room for `count` more
    /// servers. `names` are used first; the rest are generated. Candidates that fail to
    /// start or to become ready in time are stopped and reported in
    /// `ScaleOutcome::failed`; the others are admitted.
    pub async fn scale_add(&self, count: usize, names: Vec<String>) -> Result<ScaleOutcome> {
        let _serial = self.scaling.lock().await;
        debug!(phase = ?ScalePhase::Requested, count, explicit = names.len(), "scale up");

        if names.len() > count {
            return Err(RouterError::invalid(
                "Length of hostname list is more than newly added instances",
            ));
        }

        debug!(phase = ?ScalePhase::Resolving, "resolving new replica names");
        let names = self.resolve_new_names(count, names).await?;

        debug!(phase = ?ScalePhase::Provisioning, candidates = names.len(), "provisioning replicas");
        let candidates = names
            .into_iter()
            .map(|name| (name, self.allocate_server_id()))
            .collect::<Vec<_>>();
        let attempts = join_all(
            candidates
                .iter()
                .map(|(name, server_id)| self.provision(name, *server_id)),
        )
        .await;

        let mut ready = Vec::new();
        let mut failed = Vec::new();
        for ((name, _), attempt) in candidates.into_iter().zip(attempts) {
            match attempt {
                Ok(handle) => ready.push((name, handle)),
                Err(err) => failed.push(ProvisionFailure {
                    name,
                    reason: err.to_string(),
                }),
            }
        }

        debug!(phase = ?ScalePhase::Committing, ready = ready.len(), "committing replicas");
        let mut changed = Vec::new();
        let mut rejected = Vec::new();
        let replicas = {
            let mut state = self.state.write().await;
            for (name, handle) in ready {
                let server_id = handle.server_id;
                let admitted = if handle.name == name {
                    state.admit(handle)
                } else {
                    Err(RouterError::WorkerStart {
                        name: name.clone(),
                        reason: format!("supervisor reported it as '{}'", handle.name),
                    })
                };
                match admitted {
                    Ok(()) => {
                        if let Some(entry) = state.registry().get(&name) {
                            changed.push(entry.replica.clone());
                        }
                        info!(replica = %name, %server_id, liveness = ?Liveness::Ready, "replica admitted");
                    }
                    Err(err) => rejected.push((name, err)),
                }
            }
            state.replica_set()
        };

        for (name, err) in rejected {
            warn!(replica = %name, error = %err, "replica rejected at commit");
            self.discard(&name).await;
            failed.push(ProvisionFailure {
                name,
                reason: err.to_string(),
            });
        }

        let phase = if failed.is_empty() {
            ScalePhase::Done
        } else {
            ScalePhase::Failed
        };
        info!(
            phase = ?phase,
            added = changed.len(),
            failed = failed.len(),
            total = replicas.n,
            "scale up finished"
        );
        Ok(ScaleOutcome {
            replicas,
            changed,
            failed,
        })
    }

    /// Takes `count` replicas out of routing and stops their workers.
    ///
    /// `names` are removed first; the remainder is taken newest-first. The
    /// request is validated in full before anything changes. Stop failures are
    /// logged; routing-level removal has already happened by then.
    pub async fn scale_remove(&self, count: usize, names: Vec<String>) -> Result<ScaleOutcome> {
        let _serial = self.scaling.lock().await;
        debug!(phase = ?ScalePhase::Requested, count, explicit = names.len(), "scale down");

        if names.len() > count {
            return Err(RouterError::invalid(
                "Length of hostname list is more than removable instances",
            ));
        }

        let (evicted, replicas) = {
            let mut state = self.state.write().await;

            debug!(phase = ?ScalePhase::Resolving, "resolving replicas to remove");
            let targets = Self::resolve_removal_targets(&state, count, names)?;

            debug!(phase = ?ScalePhase::Committing, targets = targets.len(), "removing from ring");
            let evicted = targets
                .iter()
                .filter_map(|name| state.evict(name))
                .collect::<Vec<_>>();
            (evicted, state.replica_set())
        };

        debug!(phase = ?ScalePhase::Decommissioning, count = evicted.len(), "stopping workers");
        let changed = self.decommission(evicted).await;

        info!(
            phase = ?ScalePhase::Done,
            removed = changed.len(),
            total = replicas.n,
            "scale down finished"
        );
        Ok(ScaleOutcome {
            replicas,
            changed,
            failed: Vec::new(),
        })
    }

    /// Removes every replica. Used on shutdown.
    pub async fn drain(&self) -> ScaleOutcome {
        let _serial = self.scaling.lock().await;
        let (evicted, replicas) = {
            let mut state = self.state.write().await;
            let names = state.registry().names();
            let evicted = names
                .iter()
                .filter_map(|name| state.evict(name))
                .collect::<Vec<_>>();
            (evicted, state.replica_set())
        };
        let changed = self.decommission(evicted).await;
        info!(removed = changed.len(), "replica pool drained");
        ScaleOutcome {
            replicas,
            changed,
            failed: Vec::new(),
        }
    }

    fn allocate_server_id(&self) -> ServerId {
        ServerId(self.next_server_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn resolve_new_names(&self, count: usize, names: Vec<String>) -> Result<Vec<String>> {
        let state = self.state.read().await;
        let available = state.ring().free_capacity();
        if count > available {
            return Err(RouterError::InsufficientCapacity {
                requested: count,
                available,
            });
        }

        let mut seen = HashSet::new();
        for name in &names {
            validate_replica_name(name)?;
            if state.registry().contains_name(name) {
                return Err(RouterError::invalid(format!(
                    "replica '{}' already exists",
                    name
                )));
            }
            if !seen.insert(name.clone()) {
                return Err(RouterError::invalid(format!(
                    "replica '{}' is listed more than once",
                    name
                )));
            }
        }

        let mut resolved = names;
        let mut attempts = (count - resolved.len()).saturating_mul(NAME_ATTEMPTS_PER_REPLICA);
        while resolved.len() < count {
            if attempts == 0 {
                return Err(RouterError::invalid(
                    "could not generate enough unique replica names",
                ));
            }
            attempts -= 1;
            let candidate = random_replica_name();
            if !state.registry().contains_name(&candidate) && seen.insert(candidate.clone()) {
                resolved.push(candidate);
            }
        }
        Ok(resolved)
    }

    fn resolve_removal_targets(
        state: &RoutingState,
        count: usize,
        names: Vec<String>,
    ) -> Result<Vec<String>> {
        let registry = state.registry();
        let mut seen = HashSet::new();
        for name in &names {
            if !registry.contains_name(name) {
                return Err(RouterError::invalid(format!(
                    "replica '{}' does not exist",
                    name
                )));
            }
            if !seen.insert(name.clone()) {
                return Err(RouterError::invalid(format!(
                    "replica '{}' is listed more than once",
                    name
                )));
            }
        }

        if registry.len() < count {
            return Err(RouterError::InsufficientReplicas {
                requested: count,
                available: registry.len(),
            });
        }

        let mut targets = names;
        let extra = count - targets.len();
        targets.extend(
            registry
                .list()
                .into_iter()
                .rev()
                .map(|(name, _)| name)
                .filter(|name| !seen.contains(name))
                .take(extra),
        );
        Ok(targets)
    }

    /// Starts a worker and waits for its heartbeat.
    ///
    /// `start` always runs to completion so a half-launched worker is never left
    /// untracked; only the heartbeat wait is bounded by the readiness timeout.
    async fn provision(&self, name: &str, server_id: ServerId) -> Result<WorkerHandle> {
        debug!(replica = %name, %server_id, liveness = ?Liveness::Starting, "starting replica");
        let handle = match self.supervisor.start(name, server_id).await {
            Ok(handle) => handle,
            Err(err) => {
                warn!(replica = %name, error = %err, "replica failed to start");
                self.discard(name).await;
                return Err(err);
            }
        };

        match tokio::time::timeout(self.readiness_timeout, self.wait_until_ready(&handle)).await {
            Ok(()) => Ok(handle),
            Err(_) => {
                warn!(replica = %name, timeout = ?self.readiness_timeout, "replica not ready in time");
                self.discard(name).await;
                Err(RouterError::StartTimeout {
                    name: name.to_string(),
                    timeout: self.readiness_timeout,
                })
            }
        }
    }

    async fn wait_until_ready(&self, handle: &WorkerHandle) {
        loop {
            match self.supervisor.heartbeat(handle).await {
                Ok(()) => return,
                Err(err) => {
                    debug!(replica = %handle.name, error = %err, "waiting for heartbeat");
                    tokio::time::sleep(self.heartbeat_interval).await;
                }
            }
        }
    }

    /// Best-effort stop of a candidate that never entered routing.
    async fn discard(&self, name: &str) {
        if let Err(err) = self.supervisor.stop(name).await {
            debug!(replica = %name, error = %err, "discarded candidate did not stop cleanly");
        }
    }

    async fn decommission(&self, evicted: Vec<RegisteredReplica>) -> Vec<Replica> {
        let stops = join_all(
            evicted
                .iter()
                .map(|entry| self.supervisor.stop(&entry.replica.name)),
        )
        .await;

        evicted
            .into_iter()
            .zip(stops)
            .map(|(entry, stopped)| {
                let mut replica = entry.replica;
                match stopped {
                    Ok(()) => {
                        replica.mark(Liveness::Stopped);
                        info!(replica = %replica.name, server_id = %replica.server_id, "replica stopped");
                    }
                    Err(err) => {
                        warn!(replica = %replica.name, error = %err, "replica removed from routing but failed to stop");
                    }
                }
                replica
            })
            .collect()
    }
}

fn random_replica_name() -> String {
    Uuid::new_v4().simple().to_string()[..GENERATED_NAME_LEN].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replica_names_are_hostname_safe() {
        assert!(validate_replica_name("Server1").is_ok());
        assert!(validate_replica_name("a-b_c.d").is_ok());
        assert!(validate_replica_name("").is_err());
        assert!(validate_replica_name("-lead").is_err());
        assert!(validate_replica_name("with space").is_err());
        assert!(validate_replica_name(&"x".repeat(64)).is_err());
    }

    #[test]
    fn generated_names_are_valid() {
        for _ in 0..100 {
            let name = random_replica_name();
            assert_eq!(name.len(), GENERATED_NAME_LEN);
            assert!(validate_replica_name(&name).is_ok());
        }
    }
}
