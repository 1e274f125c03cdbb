/// A replica admitted to routing together with the handle used to reach it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredReplica {
    pub replica: Replica,
    pub handle: WorkerHandle,
}

/// Replica name <-> server id table.
///
/// Plain table; pairing with the ring is the job of [`RoutingState`].
#[derive(Debug, Clone, Default)]
pub struct ReplicaRegistry {
    by_server: BTreeMap<ServerId, RegisteredReplica>,
    names: HashMap<String, ServerId>,
}

impl ReplicaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a ready replica under `handle.name`.
    pub fn put(&mut self, handle: WorkerHandle) -> Result<()> {
        if handle.name.trim().is_empty() {
            return Err(RouterError::invalid("replica name must not be empty"));
        }
        if self.names.contains_key(&handle.name) {
            return Err(RouterError::invalid(format!(
                "replica '{}' is already registered",
                handle.name
            )));
        }
        if self.by_server.contains_key(&handle.server_id) {
            return Err(RouterError::invalid(format!(
                "server id {} is already registered",
                handle.server_id
            )));
        }

        let mut replica = Replica::new(handle.name.clone(), handle.server_id);
        replica.mark(Liveness::Ready);
        self.names.insert(handle.name.clone(), handle.server_id);
        self.by_server
            .insert(handle.server_id, RegisteredReplica { replica, handle });
        Ok(())
    }

    /// Drops the replica called `name`, returning it marked as stopping.
    pub fn remove(&mut self, name: &str) -> Option<RegisteredReplica> {
        let server_id = self.names.remove(name)?;
        let mut entry = self.by_server.remove(&server_id)?;
        entry.replica.mark(Liveness::Stopping);
        Some(entry)
    }

    /// Name of the replica behind `server_id`.
    pub fn resolve(&self, server_id: ServerId) -> Option<&str> {
        self.by_server
            .get(&server_id)
            .map(|entry| entry.replica.name.as_str())
    }

    pub fn handle(&self, server_id: ServerId) -> Option<&WorkerHandle> {
        self.by_server.get(&server_id).map(|entry| &entry.handle)
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredReplica> {
        let server_id = self.names.get(name)?;
        self.by_server.get(server_id)
    }

    pub fn server_id_of(&self, name: &str) -> Option<ServerId> {
        self.names.get(name).copied()
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    /// `(name, server_id)` pairs in admission (server id) order.
    pub fn list(&self) -> Vec<(String, ServerId)> {
        self.by_server
            .values()
            .map(|entry| (entry.replica.name.clone(), entry.replica.server_id))
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.by_server
            .values()
            .map(|entry| entry.replica.name.clone())
            .collect()
    }

    pub fn replicas(&self) -> impl Iterator<Item = &Replica> + '_ {
        self.by_server.values().map(|entry| &entry.replica)
    }

    pub fn len(&self) -> usize {
        self.by_server.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_server.is_empty()
    }
}
