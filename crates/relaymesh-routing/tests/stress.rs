//! Stress tests for relaymesh-routing
//!
//! Many concurrent engine handles hammer one node's shared state with
//! randomized interleavings. Whatever the schedule, the accounting must add
//! up: one journal entry per distinct payload, and a load table whose sum is
//! exactly the number of successful forwards.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use relaymesh_core::{
    AddressBook, Fingerprint, MockTransport, NodeIdentity, NodeName, Payload, RoutingTable,
    Topology,
};
use relaymesh_routing::{
    DedupStore, ForwardOutcome, ForwardingEngine, SharedState, StrategyKind,
};

// Test helpers
fn name(s: &str) -> NodeName {
    NodeName::new(s).unwrap()
}

fn make_topology(node: &str, neighbors: &[&str]) -> Arc<Topology> {
    let routing =
        RoutingTable::new().with_route(name(node), neighbors.iter().map(|n| name(n)).collect());
    let addresses: AddressBook = neighbors
        .iter()
        .enumerate()
        .map(|(i, n)| (name(n), format!("127.0.0.1:{}", 51000 + i)))
        .collect();
    let identity = NodeIdentity::new(name(node), "127.0.0.1:50999".parse().unwrap());
    Arc::new(Topology::new(identity, routing, addresses).unwrap())
}

fn make_engine(
    strategy: StrategyKind,
    neighbors: &[&str],
    transport: Arc<MockTransport>,
) -> ForwardingEngine<MockTransport> {
    let topology = make_topology("HUB", neighbors);
    let shared = Arc::new(SharedState::new(topology.neighbors(), 1 << 16));
    ForwardingEngine::new(topology, shared, strategy, transport)
        .with_send_timeout(Duration::from_millis(200))
}

/// Run `payloads` through `workers` engine handles in random order
async fn run_interleaved(
    engine: &ForwardingEngine<MockTransport>,
    payloads: Vec<Payload>,
    workers: usize,
    seed: u64,
) -> Vec<ForwardOutcome> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut shuffled = payloads;
    shuffled.shuffle(&mut rng);

    let mut queues: Vec<Vec<(Payload, u64)>> = vec![Vec::new(); workers];
    for (i, payload) in shuffled.into_iter().enumerate() {
        let jitter = rng.random_range(0..3);
        queues[i % workers].push((payload, jitter));
    }

    let handles: Vec<_> = queues
        .into_iter()
        .map(|queue| {
            let engine = engine.clone();
            tokio::spawn(async move {
                let mut outcomes = Vec::with_capacity(queue.len());
                for (payload, jitter) in queue {
                    for _ in 0..jitter {
                        tokio::task::yield_now().await;
                    }
                    outcomes.push(engine.process(payload).await.unwrap());
                }
                outcomes
            })
        })
        .collect();

    let mut all = Vec::new();
    for handle in handles {
        all.extend(handle.await.unwrap());
    }
    all
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_distinct_payloads_accounting() {
    const PAYLOADS: usize = 2_000;
    const WORKERS: usize = 8;

    for (seed, strategy) in [(7, StrategyKind::RoundRobin), (11, StrategyKind::LeastLoaded)] {
        let transport = Arc::new(MockTransport::new());
        transport.set_unreachable(name("E"));
        let engine = make_engine(strategy, &["C", "D", "E"], transport.clone());

        let payloads: Vec<Payload> = (0..PAYLOADS)
            .map(|i| Payload::from(format!("userID:{:05},event:click", i)))
            .collect();

        let start = Instant::now();
        let outcomes = run_interleaved(&engine, payloads, WORKERS, seed).await;
        println!("{}: {} payloads in {:?}", strategy, PAYLOADS, start.elapsed());

        let forwarded = outcomes.iter().filter(|o| o.is_forwarded()).count();
        let failed = outcomes
            .iter()
            .filter(|o| matches!(o, ForwardOutcome::ForwardFailed { .. }))
            .count();

        assert_eq!(engine.journal().total(), PAYLOADS as u64);
        assert_eq!(forwarded + failed, PAYLOADS);
        assert_eq!(
            engine.shared().load_snapshot().unwrap().total(),
            forwarded as u64
        );
        assert_eq!(transport.total_deliveries(), forwarded);
        assert_eq!(engine.shared().load_snapshot().unwrap().get(&name("E")), Some(0));

        let stats = engine.stats().snapshot();
        assert_eq!(stats.processed, PAYLOADS as u64);
        assert_eq!(stats.forwarded, forwarded as u64);
        assert_eq!(stats.failed, failed as u64);
        assert_eq!(stats.duplicates, 0);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_duplicates_forwarded_once() {
    const DISTINCT: usize = 500;
    const COPIES: usize = 4;

    let transport = Arc::new(MockTransport::new());
    let engine = make_engine(StrategyKind::LeastLoaded, &["C", "D"], transport.clone());

    let payloads: Vec<Payload> = (0..DISTINCT)
        .flat_map(|i| std::iter::repeat_n(Payload::from(format!("p-{}", i)), COPIES))
        .collect();

    let outcomes = run_interleaved(&engine, payloads, 6, 42).await;

    let duplicates = outcomes
        .iter()
        .filter(|o| **o == ForwardOutcome::Duplicate)
        .count();
    assert_eq!(duplicates, DISTINCT * (COPIES - 1));
    assert_eq!(engine.journal().total(), DISTINCT as u64);
    assert_eq!(transport.total_deliveries(), DISTINCT);
    assert_eq!(engine.shared().load_snapshot().unwrap().total(), DISTINCT as u64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_slow_neighbor_does_not_stall_others() {
    let transport = Arc::new(MockTransport::new());
    transport.set_target_latency(name("C"), Duration::from_millis(150));
    let engine = make_engine(StrategyKind::RoundRobin, &["C", "D"], transport.clone());

    let slow = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.process(Payload::from("to-c")).await.unwrap() })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    let start = Instant::now();
    let fast = engine.process(Payload::from("to-d")).await.unwrap();
    assert!(start.elapsed() < Duration::from_millis(100));
    assert_eq!(fast.target().map(NodeName::as_str), Some("D"));

    assert_eq!(slow.await.unwrap().target().map(NodeName::as_str), Some("C"));
}

#[test]
fn test_dedup_store_throughput() {
    const ENTRIES: usize = 100_000;
    let mut store = DedupStore::new(2048);

    let start = Instant::now();
    for i in 0..ENTRIES {
        store.mark_seen(Fingerprint::of(&(i as u64).to_le_bytes()));
    }
    println!("Marked {} fingerprints in {:?}", ENTRIES, start.elapsed());

    assert_eq!(store.len(), 2048);
    assert_eq!(store.evictions(), (ENTRIES - 2048) as u64);
    assert!(store.is_seen(&Fingerprint::of(&((ENTRIES - 1) as u64).to_le_bytes())));
    assert!(!store.is_seen(&Fingerprint::of(&0u64.to_le_bytes())));
}
