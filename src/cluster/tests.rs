use super::*;

fn ring_with(servers: &[u64]) -> HashRing {
    let mut ring = HashRing::default();
    for id in servers {
        ring.add_server(ServerId(*id)).unwrap();
    }
    ring
}

fn assert_structure(ring: &HashRing) {
    let slots = ring.slots().map(|(slot, _)| slot).collect::<Vec<_>>();
    assert!(slots.windows(2).all(|w| w[0] < w[1]), "slots must be strictly ascending");
    assert!(slots.iter().all(|slot| *slot < ring.num_slots()));
    assert!(ring.is_consistent());
    assert_eq!(
        ring.slot_count(),
        ring.server_count() * ring.virtual_replicas() as usize
    );
}

#[test]
fn add_and_remove_keep_slots_sorted_and_indexed() {
    let mut ring = HashRing::default();
    for id in 1..=6 {
        ring.add_server(ServerId(id)).unwrap();
        assert_structure(&ring);
    }
    for id in [2, 5, 1] {
        assert!(ring.remove_server(ServerId(id)));
        assert_structure(&ring);
    }
    assert!(ring.slots_of(ServerId(2)).is_empty());
    ring.add_server(ServerId(7)).unwrap();
    assert_structure(&ring);
    assert_eq!(ring.slots_of(ServerId(7)).len(), ring.virtual_replicas() as usize);
    assert_eq!(ring.servers(), vec![ServerId(3), ServerId(4), ServerId(6), ServerId(7)]);
}

#[test]
fn removing_unknown_server_is_noop() {
    let mut ring = ring_with(&[1, 2]);
    let before = ring.clone();
    assert!(!ring.remove_server(ServerId(99)));
    assert_eq!(ring, before);
}

#[test]
fn adding_present_server_is_noop() {
    let mut ring = ring_with(&[1]);
    let before = ring.clone();
    ring.add_server(ServerId(1)).unwrap();
    assert_eq!(ring, before);
}

#[test]
fn same_servers_same_order_build_identical_rings() {
    let a = ring_with(&[1, 2, 3, 4]);
    let b = ring_with(&[1, 2, 3, 4]);
    assert_eq!(a.slots().collect::<Vec<_>>(), b.slots().collect::<Vec<_>>());
}

#[test]
fn lookup_covers_every_slot() {
    let ring = ring_with(&[1, 2, 3]);
    let servers = ring.servers();
    for slot in 0..ring.num_slots() {
        let owner = ring.lookup(slot).unwrap();
        assert!(servers.contains(&owner));
    }
}

#[test]
fn lookup_is_strict_successor_and_wraps() {
    let ring = ring_with(&[1, 2]);
    let slots = ring.slots().collect::<Vec<_>>();
    let (first_slot, first_owner) = slots[0];
    let (second_slot, second_owner) = slots[1];
    let (last_slot, _) = *slots.last().unwrap();

    // An exact hit routes to the next slot clockwise.
    assert_eq!(ring.lookup(first_slot).unwrap(), second_owner);
    assert_eq!(ring.lookup(second_slot - 1).unwrap(), second_owner);
    // Past the last slot the ring wraps to the smallest one.
    assert_eq!(ring.lookup(last_slot).unwrap(), first_owner);
    assert_eq!(ring.lookup(ring.num_slots() - 1).unwrap(), first_owner);
}

#[test]
fn empty_ring_lookup_fails() {
    let ring = HashRing::default();
    assert_eq!(ring.lookup(42), Err(RouterError::EmptyRing));
    assert_eq!(ring.server_for_key("7"), Err(RouterError::EmptyRing));
}

#[test]
fn three_servers_share_ten_thousand_requests_evenly() {
    let ring = ring_with(&[1, 2, 3]);
    let mut counts: HashMap<ServerId, usize> = HashMap::new();
    for request_id in 0..10_000 {
        let owner = ring.server_for_key(&request_id.to_string()).unwrap();
        *counts.entry(owner).or_default() += 1;
    }
    assert_eq!(counts.len(), 3);
    for (server, count) in counts {
        assert!(
            (2_500..=4_500).contains(&count),
            "server {} received {} of 10000 requests",
            server,
            count
        );
    }
}

#[test]
fn adding_a_server_only_moves_keys_to_it() {
    let before = ring_with(&[1, 2, 3, 4]);
    let mut after = before.clone();
    after.add_server(ServerId(5)).unwrap();

    let sample = 20_000;
    let mut moved = 0;
    for key in 0..sample {
        let key = format!("key-{}", key);
        let old = before.server_for_key(&key).unwrap();
        let new = after.server_for_key(&key).unwrap();
        if old != new {
            assert_eq!(new, ServerId(5), "key {} moved between old servers", key);
            moved += 1;
        }
    }
    let fraction = moved as f64 / sample as f64;
    assert!(
        (0.12..=0.28).contains(&fraction),
        "expected about 1/5 of keys to move, got {:.3}",
        fraction
    );
}

#[test]
fn collisions_probe_forward_within_small_ring() {
    let mut ring = HashRing::new(7, 5).unwrap();
    ring.add_server(ServerId(1)).unwrap();
    assert_eq!(ring.slot_count(), 5);
    assert_structure(&ring);
    ring.remove_server(ServerId(1));
    assert!(ring.is_empty());
}

#[test]
fn full_ring_rejects_server_without_changes() {
    let mut ring = HashRing::new(10, 4).unwrap();
    ring.add_server(ServerId(1)).unwrap();
    ring.add_server(ServerId(2)).unwrap();
    let before = ring.clone();

    assert_eq!(ring.add_server(ServerId(3)), Err(RouterError::RingFull(ServerId(3))));
    assert_eq!(ring, before);
}

#[test]
fn free_capacity_counts_whole_servers() {
    let mut ring = HashRing::new(10, 4).unwrap();
    assert_eq!(ring.free_capacity(), 2);
    ring.add_server(ServerId(1)).unwrap();
    assert_eq!(ring.free_capacity(), 1);
    ring.add_server(ServerId(2)).unwrap();
    assert_eq!(ring.free_capacity(), 0);
    ring.remove_server(ServerId(1));
    assert_eq!(ring.free_capacity(), 1);
}

#[test]
fn ring_rejects_zero_sizes() {
    assert!(matches!(HashRing::new(0, 1), Err(RouterError::Config(_))));
    assert!(matches!(HashRing::new(10, 0), Err(RouterError::Config(_))));
}

#[test]
fn registry_tracks_names_and_ids() {
    let mut registry = ReplicaRegistry::new();
    registry
        .put(WorkerHandle::new("Server1", ServerId(1), "mem://Server1"))
        .unwrap();
    registry
        .put(WorkerHandle::new("Server2", ServerId(2), "mem://Server2"))
        .unwrap();

    assert_eq!(registry.resolve(ServerId(2)), Some("Server2"));
    assert_eq!(registry.server_id_of("Server1"), Some(ServerId(1)));
    assert_eq!(
        registry.list(),
        vec![
            ("Server1".to_string(), ServerId(1)),
            ("Server2".to_string(), ServerId(2))
        ]
    );
    assert!(registry.replicas().all(|r| r.liveness == Liveness::Ready));

    let removed = registry.remove("Server1").unwrap();
    assert_eq!(removed.replica.liveness, Liveness::Stopping);
    assert_eq!(registry.resolve(ServerId(1)), None);
    assert!(registry.remove("Server1").is_none());
    assert_eq!(registry.len(), 1);
}

#[test]
fn registry_rejects_duplicates() {
    let mut registry = ReplicaRegistry::new();
    registry
        .put(WorkerHandle::new("a", ServerId(1), "mem://a"))
        .unwrap();
    assert!(registry.put(WorkerHandle::new("a", ServerId(2), "mem://a")).is_err());
    assert!(registry.put(WorkerHandle::new("b", ServerId(1), "mem://b")).is_err());
    assert!(registry.put(WorkerHandle::new(" ", ServerId(3), "mem://")).is_err());
    assert_eq!(registry.len(), 1);
}

#[test]
fn routing_state_admits_and_evicts_as_a_pair() {
    let mut state = RoutingState::default();
    state
        .admit(WorkerHandle::new("a", ServerId(1), "mem://a"))
        .unwrap();
    state
        .admit(WorkerHandle::new("b", ServerId(2), "mem://b"))
        .unwrap();
    assert!(state.is_consistent());

    // Duplicate name: the ring must not keep the new server's slots.
    let err = state
        .admit(WorkerHandle::new("a", ServerId(3), "mem://a2"))
        .unwrap_err();
    assert!(matches!(err, RouterError::InvalidRequest(_)));
    assert!(!state.ring().contains(ServerId(3)));
    assert!(state.is_consistent());

    let evicted = state.evict("a").unwrap();
    assert_eq!(evicted.replica.server_id, ServerId(1));
    assert!(!state.ring().contains(ServerId(1)));
    assert!(state.is_consistent());
    assert_eq!(state.replica_set().replicas, vec!["b".to_string()]);
}

#[test]
fn routing_state_on_empty_ring_reports_no_server() {
    let state = RoutingState::default();
    assert!(matches!(
        state.route(5),
        Err(RouterError::NoAvailableServer(_))
    ));
}

#[test]
fn replica_set_serializes_with_upper_case_count() {
    let set = ReplicaSet {
        n: 1,
        replicas: vec!["Server1".to_string()],
    };
    let json = serde_json::to_value(&set).unwrap();
    assert_eq!(json, serde_json::json!({"N": 1, "replicas": ["Server1"]}));
}
