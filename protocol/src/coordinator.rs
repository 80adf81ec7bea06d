//! # Mesh Coordinator
//!
//! Composes the five components into one running node. Components never
//! reference each other; the coordinator is the only place where they meet.
//!
//! Each component publishes on its own [`EventBus`]. For every bus the
//! coordinator runs a forwarding task that applies the cross-component
//! reactions (path lifecycle events keep the topology's path map current)
//! and re-publishes the event on the unified bus that external subscribers
//! listen to. Every topology snapshot is handed to the growth engine and the
//! pathfinder.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::MeshConfig;
use crate::error::{ConfigError, TransportError};
use crate::events::{EventBus, MeshEvent};
use crate::growth::GrowthEngine;
use crate::path::{HyphalPathManager, Path, PathProber, SimulatedProber};
use crate::routing::{Pathfinder, Route};
use crate::signal::{PropagatorStats, Signal, SignalPropagator, SignalType};
use crate::topology::{HealthReport, TopologyManager, TopologyShape, TopologySnapshot};
use crate::transport::PeerTransport;
use crate::types::{NodeId, NodeInfo};

/// Point-in-time summary of a running node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshStatus {
    pub local_id: NodeId,
    pub running: bool,
    pub path_count: usize,
    pub node_count: usize,
    /// Health of the latest snapshot, if one was taken.
    pub health: Option<HealthReport>,
    pub shape: Option<TopologyShape>,
    pub signals: PropagatorStats,
    pub growth_success_rate: f64,
    pub routing_nodes: usize,
    pub routing_edges: usize,
}

/// Reactions applied while forwarding component events.
#[derive(Clone)]
struct Wiring {
    paths: Arc<HyphalPathManager>,
    topology: Arc<TopologyManager>,
}

impl Wiring {
    fn react(&self, event: &MeshEvent) {
        match event {
            MeshEvent::PathEstablished { path } => self.topology.register_path(path.clone()),
            MeshEvent::PathDegraded { path_id, .. } | MeshEvent::PathHealed { path_id, .. } => {
                if let Some(path) = self.paths.get_path(path_id) {
                    self.topology.register_path(path);
                }
            }
            MeshEvent::PathDied { path_id, .. } => {
                self.topology.unregister_path(path_id);
            }
            MeshEvent::GrowthCompleted { result } => {
                for peer in &result.connected {
                    self.topology.register_node(NodeInfo::new(peer.clone(), peer.clone()));
                    self.topology.update_node(peer, |n| {
                        n.connection_count += 1;
                        n.last_seen = chrono::Utc::now();
                    });
                }
                for peer in &result.pruned {
                    release_peer(&self.topology, peer);
                }
            }
            _ => {}
        }
    }
}

/// Drops one connection from a peer's count and forgets the peer once none
/// are left.
fn release_peer(topology: &TopologyManager, node_id: &str) {
    let mut orphaned = false;
    topology.update_node(node_id, |n| {
        n.connection_count = n.connection_count.saturating_sub(1);
        orphaned = n.connection_count == 0;
    });
    if orphaned {
        topology.unregister_node(node_id);
    }
}

/// One mesh node: the five components, their loops and the unified bus.
pub struct MeshCoordinator {
    local_id: NodeId,
    config: MeshConfig,
    transport: Arc<dyn PeerTransport>,
    paths: Arc<HyphalPathManager>,
    signals: Arc<SignalPropagator>,
    topology: Arc<TopologyManager>,
    growth: Arc<GrowthEngine>,
    pathfinder: Arc<Pathfinder>,
    component_buses: Vec<(&'static str, EventBus)>,
    events: EventBus,
    shutdown: watch::Sender<bool>,
    running: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl MeshCoordinator {
    /// Builds a node that measures paths with the [`SimulatedProber`].
    pub fn new(
        local_id: impl Into<NodeId>,
        config: MeshConfig,
        transport: Arc<dyn PeerTransport>,
    ) -> Result<Self, ConfigError> {
        Self::with_prober(local_id, config, transport, Arc::new(SimulatedProber::default()))
    }

    /// Builds a node with an explicit path measurement strategy.
    pub fn with_prober(
        local_id: impl Into<NodeId>,
        config: MeshConfig,
        transport: Arc<dyn PeerTransport>,
        prober: Arc<dyn PathProber>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let local_id = local_id.into();
        let capacity = config.coordinator.event_capacity;

        let path_bus = EventBus::new(capacity);
        let signal_bus = EventBus::new(capacity);
        let topology_bus = EventBus::new(capacity);
        let growth_bus = EventBus::new(capacity);

        let paths = Arc::new(HyphalPathManager::new(
            local_id.clone(),
            config.paths.clone(),
            prober,
            path_bus.clone(),
        ));
        let signals = Arc::new(SignalPropagator::new(
            local_id.clone(),
            config.signals.clone(),
            transport.clone(),
            signal_bus.clone(),
        ));
        let topology = Arc::new(TopologyManager::new(config.topology.clone(), topology_bus.clone()));
        let growth = Arc::new(GrowthEngine::new(
            local_id.clone(),
            config.growth.clone(),
            transport.clone(),
            growth_bus.clone(),
        ));
        let pathfinder = Arc::new(Pathfinder::new(config.routing.clone()));

        topology.register_node(NodeInfo::new(local_id.clone(), "local"));

        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            local_id,
            events: EventBus::new(capacity),
            config,
            transport,
            paths,
            signals,
            topology,
            growth,
            pathfinder,
            component_buses: vec![
                ("paths", path_bus),
                ("signals", signal_bus),
                ("topology", topology_bus),
                ("growth", growth_bus),
            ],
            shutdown,
            running: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        })
    }

    // ---- Lifecycle ----

    /// Spawns the component loops and the event forwarders.
    ///
    /// Calling `start` on a running node does nothing.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!(local_id = %self.local_id, "coordinator already running");
            return;
        }
        self.shutdown.send_replace(false);

        let mut tasks = Vec::new();

        let wiring = Wiring {
            paths: self.paths.clone(),
            topology: self.topology.clone(),
        };
        for (name, bus) in &self.component_buses {
            tasks.push(tokio::spawn(forward(
                *name,
                bus.subscribe(),
                self.events.clone(),
                wiring.clone(),
                self.shutdown.subscribe(),
            )));
        }

        tasks.push(tokio::spawn(
            self.paths.clone().run(self.shutdown.subscribe()),
        ));
        tasks.push(tokio::spawn(
            self.signals.clone().run(self.shutdown.subscribe()),
        ));

        let growth = self.growth.clone();
        let pathfinder = self.pathfinder.clone();
        tasks.push(tokio::spawn(self.topology.clone().run(
            self.shutdown.subscribe(),
            move |snapshot| {
                pathfinder.build_graph(&snapshot);
                growth.update_topology(snapshot);
            },
        )));

        if self.config.coordinator.auto_growth {
            tasks.push(tokio::spawn(self.growth.clone().run(
                self.config.coordinator.growth_interval_ms,
                self.shutdown.subscribe(),
            )));
        }

        info!(local_id = %self.local_id, tasks = tasks.len(), "mesh coordinator started");
        self.tasks.lock().extend(tasks);
    }

    /// Stops every loop and waits for them. Pending signal batches are
    /// flushed before the propagator exits.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.shutdown.send_replace(true);

        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "coordinator task ended abnormally");
            }
        }
        info!(local_id = %self.local_id, "mesh coordinator stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    // ---- Peers ----

    /// Dials a peer and records it in the topology.
    ///
    /// Returns `Ok(false)` if the peer declined.
    pub async fn connect_peer(&self, node_id: &str) -> Result<bool, TransportError> {
        if !self.transport.connect(node_id).await? {
            debug!(peer = node_id, "peer declined connection");
            return Ok(false);
        }

        self.topology
            .register_node(NodeInfo::new(node_id, node_id));
        self.topology.update_node(node_id, |n| {
            n.connection_count += 1;
            n.last_seen = chrono::Utc::now();
        });
        info!(peer = node_id, "peer connected");
        Ok(true)
    }

    /// Hangs up on a peer. The node leaves the topology once it has no
    /// connections left.
    pub async fn disconnect_peer(&self, node_id: &str) -> Result<(), TransportError> {
        self.transport.disconnect(node_id).await?;
        release_peer(&self.topology, node_id);
        info!(peer = node_id, "peer disconnected");
        Ok(())
    }

    // ---- Pass-through operations ----

    pub async fn establish_path(&self, destination: &str, hops: Vec<NodeId>) -> Path {
        self.paths.establish_path(destination, hops).await
    }

    pub async fn broadcast(
        &self,
        signal_type: SignalType,
        payload: Vec<u8>,
        ttl: Option<u32>,
    ) -> Signal {
        self.signals.broadcast(signal_type, payload, ttl).await
    }

    pub async fn handle_incoming(&self, signal: Signal) -> bool {
        self.signals.handle_incoming(signal).await
    }

    pub fn find_route(&self, source: &str, destination: &str) -> Option<Route> {
        self.pathfinder.find_path(source, destination)
    }

    /// Up to `k` diverse routes; `None` uses the configured default.
    pub fn find_alternate_routes(
        &self,
        source: &str,
        destination: &str,
        k: Option<usize>,
    ) -> Vec<Route> {
        match k {
            Some(k) => self.pathfinder.find_k_shortest_paths(source, destination, k),
            None => self.pathfinder.find_alternate_paths(source, destination),
        }
    }

    /// Takes a snapshot immediately and hands it to the growth engine and
    /// the pathfinder, outside the regular interval.
    pub fn refresh_topology(&self) -> Arc<TopologySnapshot> {
        let snapshot = self.topology.take_snapshot();
        self.pathfinder.build_graph(&snapshot);
        self.growth.update_topology(snapshot.clone());
        snapshot
    }

    pub fn status(&self) -> MeshStatus {
        let latest = self.topology.latest_snapshot();
        MeshStatus {
            local_id: self.local_id.clone(),
            running: self.is_running(),
            path_count: self.paths.path_count(),
            node_count: self.topology.node_count(),
            health: latest.as_ref().map(|s| s.health),
            shape: latest.as_ref().map(|s| s.shape),
            signals: self.signals.stats(),
            growth_success_rate: self.growth.success_rate(),
            routing_nodes: self.pathfinder.node_count(),
            routing_edges: self.pathfinder.edge_count(),
        }
    }

    // ---- Accessors ----

    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    pub fn config(&self) -> &MeshConfig {
        &self.config
    }

    /// The unified bus carrying every component event.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MeshEvent> {
        self.events.subscribe()
    }

    pub fn paths(&self) -> &Arc<HyphalPathManager> {
        &self.paths
    }

    pub fn signals(&self) -> &Arc<SignalPropagator> {
        &self.signals
    }

    pub fn topology(&self) -> &Arc<TopologyManager> {
        &self.topology
    }

    pub fn growth(&self) -> &Arc<GrowthEngine> {
        &self.growth
    }

    pub fn pathfinder(&self) -> &Arc<Pathfinder> {
        &self.pathfinder
    }
}

/// Re-publishes one component bus on the unified bus until shutdown, then
/// drains whatever is still buffered.
async fn forward(
    source: &'static str,
    mut rx: broadcast::Receiver<MeshEvent>,
    unified: EventBus,
    wiring: Wiring,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Ok(event) => {
                    wiring.react(&event);
                    unified.emit(event);
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(source, missed, "event forwarder lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            res = shutdown.changed() => {
                if res.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    while let Ok(event) = rx.try_recv() {
        wiring.react(&event);
        unified.emit(event);
    }
    debug!(source, "event forwarder stopped");
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::path::StaticProber;
    use crate::transport::MemoryTransport;

    fn coordinator(config: MeshConfig) -> (MeshCoordinator, Arc<MemoryTransport>) {
        let transport = Arc::new(MemoryTransport::new());
        let coordinator = MeshCoordinator::with_prober(
            "local",
            config,
            transport.clone(),
            Arc::new(StaticProber::healthy()),
        )
        .unwrap();
        (coordinator, transport)
    }

    fn quiet_config() -> MeshConfig {
        let mut config = MeshConfig::default();
        config.coordinator.auto_growth = false;
        config.signals.batching = false;
        config
    }

    async fn wait_for<F: Fn() -> bool>(condition: F) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = MeshConfig::default();
        config.paths.max_paths_per_destination = 0;
        let result = MeshCoordinator::new("n", config, Arc::new(MemoryTransport::new()));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn established_paths_reach_topology_and_unified_bus() {
        let (coord, _transport) = coordinator(quiet_config());
        let mut rx = coord.subscribe();
        coord.start();

        let path = coord.establish_path("peer", vec![]).await;
        wait_for(|| coord.topology().path_count() == 1).await;

        let established = tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                if rx.recv().await.unwrap().name() == "path:established" {
                    break;
                }
            }
        })
        .await;
        assert!(established.is_ok());

        coord.paths().remove_path(&path.id);
        wait_for(|| coord.topology().path_count() == 0).await;

        coord.stop().await;
        assert!(!coord.is_running());
    }

    #[tokio::test]
    async fn connect_and_disconnect_update_topology() {
        let (coord, transport) = coordinator(quiet_config());
        transport.refuse("shy");

        assert!(coord.connect_peer("peer").await.unwrap());
        assert!(!coord.connect_peer("shy").await.unwrap());
        assert_eq!(coord.topology().get_node("peer").unwrap().connection_count, 1);
        assert!(coord.topology().get_node("shy").is_none());

        coord.disconnect_peer("peer").await.unwrap();
        assert!(coord.topology().get_node("peer").is_none());
        assert!(!transport.is_connected("peer"));
    }

    #[tokio::test]
    async fn refresh_feeds_pathfinder() {
        let (coord, _transport) = coordinator(quiet_config());
        coord.start();

        coord.establish_path("far", vec!["relay".into()]).await;
        wait_for(|| coord.topology().path_count() == 1).await;
        coord.refresh_topology();

        let route = coord.find_route("local", "far").unwrap();
        assert_eq!(route.source, "local");
        assert!(coord.status().health.is_some());
        assert!(coord.status().routing_edges >= 3);

        coord.stop().await;
    }

    #[tokio::test]
    async fn stop_flushes_pending_signals() {
        let mut config = quiet_config();
        config.signals.batching = true;
        config.signals.batch_interval_ms = 60_000;
        let (coord, transport) = coordinator(config);
        transport.add_connected("peer");

        coord.start();
        coord.broadcast(SignalType::Alert, b"bye".to_vec(), None).await;
        assert_eq!(transport.sent_to("peer"), 0);

        coord.stop().await;
        assert_eq!(transport.sent_to("peer"), 1);
    }

    #[tokio::test]
    async fn start_twice_is_harmless() {
        let (coord, _transport) = coordinator(quiet_config());
        coord.start();
        coord.start();
        assert!(coord.is_running());
        coord.stop().await;
        coord.stop().await;
        assert!(!coord.is_running());
    }
}
