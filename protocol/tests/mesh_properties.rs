//! Integration tests for the mesh components, driven through the public API
//! with the in-memory transport. Each test pins down one behavioural
//! guarantee of the mesh.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use hypha_protocol::config::MeshConfig;
use hypha_protocol::coordinator::MeshCoordinator;
use hypha_protocol::events::{EventBus, MeshEvent};
use hypha_protocol::growth::{GrowthConfig, GrowthDirective, GrowthEngine, GrowthPattern};
use hypha_protocol::path::{HyphalPathManager, PathConfig, PathMetrics, PathState, StaticProber};
use hypha_protocol::routing::{CostMetric, Edge, Pathfinder, PathfinderConfig};
use hypha_protocol::signal::{Signal, SignalConfig, SignalPropagator, SignalType};
use hypha_protocol::transport::MemoryTransport;
use hypha_protocol::types::NodeInfo;

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

fn path_manager(max_paths: usize) -> (HyphalPathManager, EventBus) {
    let bus = EventBus::new(256);
    let config = PathConfig {
        max_paths_per_destination: max_paths,
        ..PathConfig::default()
    };
    let manager = HyphalPathManager::new(
        "local",
        config,
        Arc::new(StaticProber::healthy()),
        bus.clone(),
    );
    (manager, bus)
}

fn unbatched_propagator(rate_limit: u32) -> (SignalPropagator, Arc<MemoryTransport>) {
    let transport = Arc::new(MemoryTransport::new());
    let config = SignalConfig {
        rate_limit,
        batching: false,
        ..SignalConfig::default()
    };
    let propagator = SignalPropagator::new("local", config, transport.clone(), EventBus::new(256));
    (propagator, transport)
}

fn latency_edge(latency_ms: f64) -> Edge {
    Edge {
        latency_ms,
        bandwidth_bps: 1_000_000,
        reliability: 1.0,
    }
}

fn quiet_coordinator(prober: StaticProber) -> (MeshCoordinator, Arc<MemoryTransport>) {
    let mut config = MeshConfig::default();
    config.coordinator.auto_growth = false;
    config.signals.batching = false;
    config.growth.growth_cooldown_ms = 0;

    let transport = Arc::new(MemoryTransport::new());
    let coordinator =
        MeshCoordinator::with_prober("local", config, transport.clone(), Arc::new(prober)).unwrap();
    (coordinator, transport)
}

async fn eventually<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}

fn drain(rx: &mut tokio::sync::broadcast::Receiver<MeshEvent>) -> Vec<MeshEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

#[tokio::test]
async fn establishing_the_same_path_twice_is_idempotent() {
    let (manager, _bus) = path_manager(3);
    let hops = vec!["relay-1".to_string(), "relay-2".to_string()];

    let first = manager.establish_path("dest", hops.clone()).await;
    let second = manager.establish_path("dest", hops).await;

    assert_eq!(first.id, second.id);
    assert_eq!(manager.path_count(), 1);
}

#[tokio::test]
async fn live_paths_never_exceed_the_destination_limit() {
    let (manager, bus) = path_manager(2);
    let mut rx = bus.subscribe();

    manager.establish_path("dest", vec!["a".into()]).await;
    manager.establish_path("dest", vec!["b".into()]).await;
    manager.establish_path("dest", vec!["c".into()]).await;

    let live = manager
        .all_paths()
        .into_iter()
        .filter(|p| p.destination == "dest" && p.state.is_live())
        .count();
    assert_eq!(live, 2);

    let evicted = drain(&mut rx)
        .into_iter()
        .filter(|e| matches!(e, MeshEvent::PathDied { .. }))
        .count();
    assert_eq!(evicted, 1);
}

#[tokio::test]
async fn idle_path_decays_in_order_and_dies_once() {
    let (manager, bus) = path_manager(3);
    let mut rx = bus.subscribe();
    let path = manager.establish_path("dest", vec![]).await;
    drain(&mut rx);

    let step = chrono::Duration::milliseconds(manager.config().path_timeout_ms as i64 + 1);
    let start = Utc::now();

    manager.run_health_check_at(start + step);
    assert_eq!(manager.get_path(&path.id).unwrap().state, PathState::Dormant);
    manager.run_health_check_at(start + step * 2);
    assert_eq!(manager.get_path(&path.id).unwrap().state, PathState::Dying);
    manager.run_health_check_at(start + step * 3);
    assert!(manager.get_path(&path.id).is_none());

    let events = drain(&mut rx);
    let transitions: Vec<PathState> = events
        .iter()
        .filter_map(|e| match e {
            MeshEvent::PathDegraded { to, .. } => Some(*to),
            _ => None,
        })
        .collect();
    assert_eq!(transitions, vec![PathState::Dormant, PathState::Dying]);

    let deaths = events
        .iter()
        .filter(|e| matches!(e, MeshEvent::PathDied { .. }))
        .count();
    assert_eq!(deaths, 1);
}

// ---------------------------------------------------------------------------
// Signals
// ---------------------------------------------------------------------------

#[tokio::test]
async fn duplicate_signal_is_handled_and_forwarded_once() {
    let (propagator, transport) = unbatched_propagator(100);
    transport.add_connected("peer-a");

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    propagator.on(SignalType::Alert, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    let signal = Signal::new(SignalType::Alert, "remote", b"fire".to_vec(), 4);
    assert!(propagator.handle_incoming(signal.clone()).await);
    assert!(!propagator.handle_incoming(signal).await);

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(transport.sent_to("peer-a"), 1);
}

#[tokio::test]
async fn signal_with_last_hop_is_processed_but_not_relayed() {
    let (propagator, transport) = unbatched_propagator(100);
    transport.add_connected("peer-a");

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    propagator.on(SignalType::Heartbeat, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    let signal = Signal::new(SignalType::Heartbeat, "remote", Vec::new(), 1);
    assert!(propagator.handle_incoming(signal).await);

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(transport.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn rate_limit_caps_sends_until_refill() {
    let (propagator, transport) = unbatched_propagator(5);
    transport.add_connected("peer-a");

    for i in 0..8u8 {
        propagator
            .broadcast(SignalType::Discovery, vec![i], None)
            .await;
    }
    assert_eq!(transport.sent_to("peer-a"), 5);

    tokio::time::advance(Duration::from_secs(1)).await;
    propagator
        .broadcast(SignalType::Discovery, b"later".to_vec(), None)
        .await;
    assert_eq!(transport.sent_to("peer-a"), 6);
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

#[test]
fn cheaper_two_hop_route_beats_direct_edge() {
    let pathfinder = Pathfinder::new(PathfinderConfig {
        cost_metric: CostMetric::Latency,
        ..PathfinderConfig::default()
    });
    pathfinder.add_edge("A", "B", latency_edge(1.0));
    pathfinder.add_edge("B", "C", latency_edge(1.0));
    pathfinder.add_edge("A", "C", latency_edge(5.0));

    let route = pathfinder.find_path("A", "C").unwrap();
    assert_eq!(route.path, vec!["A", "B", "C"]);
    assert!((route.cost - 2.0).abs() < 1e-9);
}

#[test]
fn k_shortest_returns_node_disjoint_routes() {
    let pathfinder = Pathfinder::new(PathfinderConfig {
        cost_metric: CostMetric::Latency,
        ..PathfinderConfig::default()
    });
    pathfinder.add_edge("A", "B", latency_edge(1.0));
    pathfinder.add_edge("B", "C", latency_edge(1.0));
    pathfinder.add_edge("A", "D", latency_edge(1.0));
    pathfinder.add_edge("D", "C", latency_edge(1.0));

    let routes = pathfinder.find_k_shortest_paths("A", "C", 2);
    assert_eq!(routes.len(), 2);
    assert_ne!(routes[0].path, routes[1].path);

    let middle_a = &routes[0].path[1..routes[0].path.len() - 1];
    let middle_b = &routes[1].path[1..routes[1].path.len() - 1];
    assert!(middle_a.iter().all(|n| !middle_b.contains(n)));
}

#[test]
fn unknown_source_yields_no_route() {
    let pathfinder = Pathfinder::new(PathfinderConfig::default());
    pathfinder.add_edge("A", "B", latency_edge(1.0));
    assert!(pathfinder.find_path("Z", "B").is_none());
    assert!(pathfinder.find_k_shortest_paths("Z", "B", 3).is_empty());
}

// ---------------------------------------------------------------------------
// Growth
// ---------------------------------------------------------------------------

#[test]
fn pattern_selection_follows_health_then_size() {
    let engine = GrowthEngine::new(
        "local",
        GrowthConfig::default(),
        Arc::new(MemoryTransport::new()),
        EventBus::new(16),
    );

    assert_eq!(engine.recommend_pattern(30.0, 50), GrowthPattern::Defensive);
    assert_eq!(engine.recommend_pattern(80.0, 5), GrowthPattern::Exploratory);
    assert_eq!(engine.recommend_pattern(80.0, 50), GrowthPattern::Organic);
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

#[tokio::test]
async fn coordinator_keeps_topology_in_step_with_paths() {
    let mut config = MeshConfig::default();
    config.coordinator.auto_growth = false;
    config.signals.batching = false;

    let transport = Arc::new(MemoryTransport::new());
    let coordinator = MeshCoordinator::with_prober(
        "local",
        config,
        transport.clone(),
        Arc::new(StaticProber::healthy()),
    )
    .unwrap();
    let mut events = coordinator.subscribe();
    coordinator.start();

    assert!(coordinator.connect_peer("peer-a").await.unwrap());
    let path = coordinator.establish_path("peer-a", vec![]).await;

    let mut seen_established = false;
    while !seen_established {
        let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .unwrap()
            .unwrap();
        seen_established = matches!(event, MeshEvent::PathEstablished { .. });
    }

    for _ in 0..100 {
        if coordinator.topology().path_count() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(coordinator.topology().path_count(), 1);

    let snapshot = coordinator.refresh_topology();
    assert!(snapshot.paths.iter().any(|p| p.id == path.id));
    assert!(coordinator.find_route("local", "peer-a").is_some());

    coordinator.broadcast(SignalType::Topology, Vec::new(), None).await;
    assert_eq!(transport.sent_to("peer-a"), 1);

    coordinator.stop().await;
}

#[tokio::test]
async fn consolidation_removes_pruned_peers_from_topology() {
    let (coordinator, transport) = quiet_coordinator(StaticProber::new(PathMetrics {
        latency_ms: 200.0,
        bandwidth_bps: 10_000,
        packet_loss_pct: 40.0,
        reliability: 0.1,
        hop_count: 1,
    }));
    coordinator.start();

    assert!(coordinator.connect_peer("weak").await.unwrap());
    coordinator.establish_path("weak", vec![]).await;
    assert!(eventually(|| coordinator.topology().path_count() == 1).await);
    coordinator.refresh_topology();

    let result = coordinator
        .growth()
        .initiate_growth(GrowthDirective::new(GrowthPattern::Consolidation, 5))
        .await;

    assert_eq!(result.pruned, vec!["weak".to_string()]);
    assert!(!transport.is_connected("weak"));
    assert!(eventually(|| coordinator.topology().get_node("weak").is_none()).await);

    coordinator.stop().await;
}

#[tokio::test]
async fn explored_peers_are_not_counted_again_by_auto_growth() {
    let (coordinator, transport) = quiet_coordinator(StaticProber::healthy());
    for id in ["x", "y"] {
        transport.add_discoverable(NodeInfo::new(id, format!("mem://{id}")));
    }
    coordinator.start();

    let explored = coordinator
        .growth()
        .initiate_growth(GrowthDirective::new(GrowthPattern::Exploratory, 5))
        .await;
    assert_eq!(explored.new_connections, 2);
    let counted = |id: &str| {
        coordinator
            .topology()
            .get_node(id)
            .map(|n| n.connection_count)
    };
    assert!(eventually(|| counted("x") == Some(1) && counted("y") == Some(1)).await);

    let result = coordinator.growth().auto_grow(80.0, 50).await.unwrap();
    assert_eq!(result.pattern, GrowthPattern::Organic);
    assert_eq!(result.new_connections, 0);
    assert!(result.connected.is_empty());

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(counted("x"), Some(1));
    assert_eq!(counted("y"), Some(1));

    coordinator.stop().await;
}

#[tokio::test]
async fn graph_stats_cover_isolated_nodes() {
    let (coordinator, _transport) = quiet_coordinator(StaticProber::healthy());
    coordinator.start();

    coordinator.establish_path("peer", vec![]).await;
    assert!(eventually(|| coordinator.topology().path_count() == 1).await);
    coordinator
        .topology()
        .register_node(NodeInfo::new("lonely", "mem://lonely"));
    coordinator.refresh_topology();

    let stats = coordinator.pathfinder().graph_stats();
    assert!(stats.connected_components >= 2);
    assert_eq!(stats.diameter, 1);
    assert!(coordinator.find_route("local", "peer").is_some());
    assert!(coordinator
        .pathfinder()
        .find_path_astar("local", "lonely")
        .is_none());

    coordinator.stop().await;
}
