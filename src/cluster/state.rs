/// Replica names visible to operators, in admission order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaSet {
    #[serde(rename = "N")]
    pub n: usize,
    pub replicas: Vec<String>,
}

/// The ring and the registry as one consistency domain.
///
/// Every mutation touches both structures, so a reader holding a shared
/// reference can never see a server id present in one and absent from the
/// other. Callers share it behind a single `RwLock`.
#[derive(Debug, Clone, Default)]
pub struct RoutingState {
    ring: HashRing,
    registry: ReplicaRegistry,
}

impl RoutingState {
    pub fn new(ring: HashRing) -> Self {
        Self {
            ring,
            registry: ReplicaRegistry::new(),
        }
    }

    pub fn ring(&self) -> &HashRing {
        &self.ring
    }

    pub fn registry(&self) -> &ReplicaRegistry {
        &self.registry
    }

    pub fn replica_set(&self) -> ReplicaSet {
        let replicas = self.registry.names();
        ReplicaSet {
            n: replicas.len(),
            replicas,
        }
    }

    /// Places a ready worker on the ring and registers it.
    ///
    /// Either both structures change or neither does.
    pub fn admit(&mut self, handle: WorkerHandle) -> Result<()> {
        let server_id = handle.server_id;
        if self.ring.contains(server_id) {
            return Err(RouterError::invalid(format!(
                "server id {} is already on the ring",
                server_id
            )));
        }
        self.ring.add_server(server_id)?;
        if let Err(err) = self.registry.put(handle) {
            self.ring.remove_server(server_id);
            return Err(err);
        }
        Ok(())
    }

    /// Pulls the replica called `name` out of routing.
    pub fn evict(&mut self, name: &str) -> Option<RegisteredReplica> {
        let entry = self.registry.remove(name)?;
        self.ring.remove_server(entry.replica.server_id);
        Some(entry)
    }

    /// Resolves the worker owning `key_slot`.
    pub fn route(&self, key_slot: u64) -> Result<WorkerHandle> {
        let server_id = self.ring.lookup(key_slot).map_err(|err| match err {
            RouterError::EmptyRing => {
                RouterError::NoAvailableServer("no replicas registered".to_string())
            }
            other => other,
        })?;
        match self.registry.handle(server_id) {
            Some(handle) => Ok(handle.clone()),
            None => {
                error!(%server_id, "server on ring has no registered replica");
                debug_assert!(false, "ring and registry diverged for server {server_id}");
                Err(RouterError::NoAvailableServer(format!(
                    "server {} is not registered",
                    server_id
                )))
            }
        }
    }

    /// Ring and registry hold exactly the same server ids.
    pub fn is_consistent(&self) -> bool {
        let registered = self
            .registry
            .list()
            .into_iter()
            .map(|(_, server_id)| server_id)
            .collect::<Vec<_>>();
        self.ring.is_consistent() && registered == self.ring.servers()
    }
}
