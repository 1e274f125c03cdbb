/// Default size of the slot space. Prime, to reduce collision clustering.
pub const DEFAULT_NUM_SLOTS: u64 = 104_729;

/// Default number of virtual nodes per server.
pub const DEFAULT_VIRTUAL_REPLICAS: u32 = 500;

/// Consistent-hash ring over a bounded slot space `[0, num_slots)`.
///
/// Every server owns `virtual_replicas` slots. A key is owned by the server of
/// the first occupied slot strictly greater than the key's slot, wrapping
/// around to the smallest occupied slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashRing {
    num_slots: u64,
    virtual_replicas: u32,
    /// Occupied slot -> owning server. Iteration order is the sorted slot sequence.
    slots: BTreeMap<u64, ServerId>,
    /// Reverse index used by `remove_server`.
    owned: HashMap<ServerId, Vec<u64>>,
}

impl Default for HashRing {
    fn default() -> Self {
        Self {
            num_slots: DEFAULT_NUM_SLOTS,
            virtual_replicas: DEFAULT_VIRTUAL_REPLICAS,
            slots: BTreeMap::new(),
            owned: HashMap::new(),
        }
    }
}

impl HashRing {
    /// Creates an empty ring.
    pub fn new(num_slots: u64, virtual_replicas: u32) -> Result<Self> {
        if num_slots == 0 {
            return Err(RouterError::Config("num_slots must be >= 1".to_string()));
        }
        if virtual_replicas == 0 {
            return Err(RouterError::Config(
                "virtual_replicas must be >= 1".to_string(),
            ));
        }
        Ok(Self {
            num_slots,
            virtual_replicas,
            ..Self::default()
        })
    }

    pub fn num_slots(&self) -> u64 {
        self.num_slots
    }

    pub fn virtual_replicas(&self) -> u32 {
        self.virtual_replicas
    }

    /// Number of occupied slots.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn server_count(&self) -> usize {
        self.owned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, server_id: ServerId) -> bool {
        self.owned.contains_key(&server_id)
    }

    /// Registered servers in ascending id order.
    pub fn servers(&self) -> Vec<ServerId> {
        let mut servers = self.owned.keys().copied().collect::<Vec<_>>();
        servers.sort();
        servers
    }

    /// Occupied slots in ascending order with their owners.
    pub fn slots(&self) -> impl Iterator<Item = (u64, ServerId)> + '_ {
        self.slots.iter().map(|(slot, server)| (*slot, *server))
    }

    /// How many more servers fit on the ring.
    pub fn free_capacity(&self) -> usize {
        let free = self.num_slots.saturating_sub(self.slots.len() as u64);
        (free / u64::from(self.virtual_replicas)) as usize
    }

    /// Slots owned by `server_id`, ascending. Empty if the server is unknown.
    pub fn slots_of(&self, server_id: ServerId) -> &[u64] {
        self.owned
            .get(&server_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Places all virtual nodes of `server_id` on the ring.
    ///
    /// Colliding candidates are probed forward one slot at a time, wrapping at
    /// `num_slots`. Every slot is chosen before any is committed, so a
    /// `RingFull` failure leaves the ring untouched. Adding a server that is
    /// already present is a no-op.
    pub fn add_server(&mut self, server_id: ServerId) -> Result<()> {
        if self.contains(server_id) {
            debug!(%server_id, "server already on ring");
            return Ok(());
        }

        let wanted = self.virtual_replicas as usize;
        if self.slots.len() + wanted > self.num_slots as usize {
            return Err(RouterError::RingFull(server_id));
        }

        let mut placed = Vec::with_capacity(wanted);
        let mut pending = HashSet::with_capacity(wanted);
        for replica_index in 0..self.virtual_replicas {
            let candidate = self.reduce(vnode_hash(server_id, replica_index));
            let slot = self
                .probe_free_slot(candidate, &pending)
                .ok_or(RouterError::RingFull(server_id))?;
            pending.insert(slot);
            placed.push(slot);
        }

        for slot in &placed {
            self.slots.insert(*slot, server_id);
        }
        placed.sort_unstable();
        self.owned.insert(server_id, placed);

        debug!(%server_id, occupied = self.slots.len(), "added server to ring");
        Ok(())
    }

    /// Removes every slot owned by `server_id`.
    ///
    /// Returns false (and changes nothing) if the server owns no slots.
    pub fn remove_server(&mut self, server_id: ServerId) -> bool {
        let Some(owned) = self.owned.remove(&server_id) else {
            return false;
        };
        for slot in owned {
            self.slots.remove(&slot);
        }
        debug!(%server_id, occupied = self.slots.len(), "removed server from ring");
        true
    }

    /// Returns the owner of the first occupied slot strictly after `key_slot`.
    pub fn lookup(&self, key_slot: u64) -> Result<ServerId> {
        self.slots
            .range((Excluded(key_slot), Unbounded))
            .next()
            .or_else(|| self.slots.iter().next())
            .map(|(_, server)| *server)
            .ok_or(RouterError::EmptyRing)
    }

    /// Slot of a request key, `H(key) mod num_slots`.
    pub fn slot_for_key(&self, key: &str) -> u64 {
        self.reduce(key_hash(key))
    }

    /// Owner of a request key.
    pub fn server_for_key(&self, key: &str) -> Result<ServerId> {
        self.lookup(self.slot_for_key(key))
    }

    /// Checks that the slot map and the per-server index agree.
    pub fn is_consistent(&self) -> bool {
        let indexed: usize = self.owned.values().map(Vec::len).sum();
        indexed == self.slots.len()
            && self.owned.iter().all(|(server, slots)| {
                slots
                    .iter()
                    .all(|slot| self.slots.get(slot) == Some(server))
            })
    }

    fn reduce(&self, hash: u128) -> u64 {
        (hash % self.num_slots as u128) as u64
    }

    fn probe_free_slot(&self, start: u64, pending: &HashSet<u64>) -> Option<u64> {
        let mut slot = start;
        for _ in 0..self.num_slots {
            if !self.slots.contains_key(&slot) && !pending.contains(&slot) {
                return Some(slot);
            }
            slot = (slot + 1) % self.num_slots;
        }
        None
    }
}
