// ============================================================================
// hashring-router library
// ============================================================================

pub mod cluster;
pub mod config;
pub mod core;
pub mod router;
pub mod scaling;
pub mod supervisor;
pub mod web;
pub mod worker;

// Re-export main types for convenience
pub use cluster::{
    DEFAULT_NUM_SLOTS, DEFAULT_VIRTUAL_REPLICAS, HashRing, ReplicaRegistry, ReplicaSet,
    RoutingState, key_hash, vnode_hash,
};
pub use config::{RouterConfig, SupervisorKind};
pub use crate::core::{Liveness, Replica, Result, RouterError, ServerId, UpstreamResponse, WorkerHandle};
pub use router::{KeyDerivation, RequestRouter, RoutedResponse};
pub use scaling::{ProvisionFailure, ScaleOutcome, ScalingController};
pub use supervisor::{
    DockerSupervisor, InMemorySupervisor, LocalSupervisor, SupervisorEvent, WorkerSupervisor,
};

use std::sync::Arc;
use tokio::sync::RwLock;

// ============================================================================
// Load balancer facade
// ============================================================================

/// Ring, registry, router and scaling controller wired around one shared state.
///
/// # Examples
///
/// ```ignore
/// let supervisor = Arc::new(InMemorySupervisor::new());
/// let balancer = LoadBalancer::new(&RouterConfig::default(), supervisor)?;
/// balancer.scaling().bootstrap(3).await?;
///
/// let routed = balancer.router().route("home").await?;
/// println!("{} answered {}", routed.replica, routed.response.body);
/// ```
#[derive(Clone)]
pub struct LoadBalancer {
    state: Arc<RwLock<RoutingState>>,
    router: Arc<RequestRouter>,
    scaling: Arc<ScalingController>,
}

impl LoadBalancer {
    pub fn new(config: &RouterConfig, supervisor: Arc<dyn WorkerSupervisor>) -> Result<Self> {
        config.validate()?;
        let ring = HashRing::new(config.num_slots, config.virtual_replicas)?;
        let state = Arc::new(RwLock::new(RoutingState::new(ring)));

        let router = RequestRouter::new(
            Arc::clone(&state),
            Arc::clone(&supervisor),
            config.request_timeout_duration(),
        )
        .with_key_derivation(config.key_derivation);
        let scaling = ScalingController::new(
            Arc::clone(&state),
            supervisor,
            config.readiness_timeout_duration(),
            config.heartbeat_interval_duration(),
        );

        Ok(Self {
            state,
            router: Arc::new(router),
            scaling: Arc::new(scaling),
        })
    }

    pub fn router(&self) -> &Arc<RequestRouter> {
        &self.router
    }

    pub fn scaling(&self) -> &Arc<ScalingController> {
        &self.scaling
    }

    /// Shared routing state. Hold the guard briefly; writers wait on it.
    pub fn state(&self) -> &Arc<RwLock<RoutingState>> {
        &self.state
    }
}
