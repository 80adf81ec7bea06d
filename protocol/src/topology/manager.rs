//! # Topology Manager
//!
//! Authoritative view of which nodes exist and which paths connect them.
//! From that view it derives a health score, a shape label, per-node roles
//! and a ranked list of structural fixes.
//!
//! On every snapshot interval the manager freezes its state into an
//! immutable [`TopologySnapshot`] that the growth engine and the pathfinder
//! consume. Snapshots are shared as `Arc`s and never mutated.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::events::{EventBus, MeshEvent};
use crate::path::Path;
use crate::types::{NodeId, NodeInfo, NodeRole, PathId};

use super::analysis::{self, Adjacency};
use super::types::{
    HealthReport, Optimization, OptimizationKind, OptimizationPriority, TopologyShape,
    TopologySnapshot,
};

/// Partition risk above which a bridge is proposed.
const BRIDGE_RISK: f64 = 0.5;

/// Scores closer than this count as unchanged.
const SCORE_EPSILON: f64 = 1e-9;

/// Configuration for topology analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyConfig {
    /// Interval between snapshots, in milliseconds.
    pub snapshot_interval_ms: u64,
    /// Degree the optimizer steers nodes towards.
    pub target_degree: usize,
    /// Below this a node is under-connected.
    pub min_degree: usize,
    /// Above this a node is over-connected.
    pub max_degree: usize,
    /// Score under which `health:warning` fires.
    pub warning_threshold: f64,
    /// Score under which `health:critical` fires.
    pub critical_threshold: f64,
    /// Number of snapshots kept in the history.
    pub snapshot_history: usize,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            snapshot_interval_ms: crate::config::DEFAULT_SNAPSHOT_INTERVAL_MS,
            target_degree: crate::config::DEFAULT_TARGET_DEGREE,
            min_degree: crate::config::DEFAULT_MIN_DEGREE,
            max_degree: crate::config::DEFAULT_MAX_DEGREE,
            warning_threshold: crate::config::DEFAULT_WARNING_THRESHOLD,
            critical_threshold: crate::config::DEFAULT_CRITICAL_THRESHOLD,
            snapshot_history: crate::config::DEFAULT_SNAPSHOT_HISTORY,
        }
    }
}

/// Owner of the node and path maps.
pub struct TopologyManager {
    config: TopologyConfig,
    nodes: RwLock<BTreeMap<NodeId, NodeInfo>>,
    paths: RwLock<BTreeMap<PathId, Path>>,
    history: RwLock<VecDeque<Arc<TopologySnapshot>>>,
    events: EventBus,
}

impl TopologyManager {
    pub fn new(config: TopologyConfig, events: EventBus) -> Self {
        Self {
            config,
            nodes: RwLock::new(BTreeMap::new()),
            paths: RwLock::new(BTreeMap::new()),
            history: RwLock::new(VecDeque::new()),
            events,
        }
    }

    // ---- Registration ----

    /// Adds or refreshes a node. Returns `true` if the node was new.
    pub fn register_node(&self, node: NodeInfo) -> bool {
        let node_id = node.id.clone();
        let is_new = self.nodes.write().insert(node_id.clone(), node).is_none();
        if is_new {
            debug!(node_id = %node_id, "node discovered");
            self.events.emit(MeshEvent::NodeDiscovered { node_id });
        }
        is_new
    }

    /// Removes a node together with every path that runs through it.
    pub fn unregister_node(&self, node_id: &str) -> Option<NodeInfo> {
        let removed = self.nodes.write().remove(node_id)?;
        self.paths
            .write()
            .retain(|_, p| !p.node_sequence().iter().any(|n| n == node_id));

        debug!(node_id, "node lost");
        self.events.emit(MeshEvent::NodeLost {
            node_id: removed.id.clone(),
        });
        Some(removed)
    }

    /// Applies `update` to a known node. Returns `false` for unknown ids.
    pub fn update_node<F>(&self, node_id: &str, update: F) -> bool
    where
        F: FnOnce(&mut NodeInfo),
    {
        match self.nodes.write().get_mut(node_id) {
            Some(node) => {
                update(node);
                true
            }
            None => false,
        }
    }

    /// Adds a path or replaces the stored copy with the same id.
    pub fn register_path(&self, path: Path) {
        self.paths.write().insert(path.id.clone(), path);
    }

    pub fn unregister_path(&self, path_id: &str) -> Option<Path> {
        self.paths.write().remove(path_id)
    }

    // ---- Analysis ----

    pub fn calculate_health(&self) -> HealthReport {
        let nodes = self.nodes.read();
        let paths: Vec<Path> = self.paths.read().values().cloned().collect();
        analysis::health(&nodes, &paths)
    }

    pub fn classify_shape(&self) -> TopologyShape {
        analysis::classify(&self.adjacency())
    }

    /// Role inferred from degree. `None` for unknown nodes.
    pub fn determine_node_role(&self, node_id: &str) -> Option<NodeRole> {
        analysis::role(&self.adjacency(), node_id)
    }

    /// Number of distinct neighbours of a node.
    pub fn degree(&self, node_id: &str) -> usize {
        self.adjacency().get(node_id).map_or(0, BTreeSet::len)
    }

    pub fn neighbors(&self, node_id: &str) -> Vec<NodeId> {
        self.adjacency()
            .get(node_id)
            .map(|n| n.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Proposed fixes, most urgent first.
    ///
    /// Under-connected nodes get `add_connection` (high), over-connected
    /// nodes `remove_connection` (medium), and a partition risk above 0.5
    /// adds a network-wide `add_bridge` (critical).
    pub fn suggest_optimizations(&self) -> Vec<Optimization> {
        let adj = self.adjacency();
        let registered: Vec<NodeId> = self.nodes.read().keys().cloned().collect();
        let mut suggestions = Vec::new();

        for node_id in &registered {
            let degree = adj.get(node_id).map_or(0, BTreeSet::len);
            if degree < self.config.min_degree {
                suggestions.push(Optimization {
                    kind: OptimizationKind::AddConnection,
                    priority: OptimizationPriority::High,
                    node: Some(node_id.clone()),
                    suggested_connections: self.config.target_degree.saturating_sub(degree),
                    reason: format!(
                        "degree {degree} below minimum {}",
                        self.config.min_degree
                    ),
                });
            } else if degree > self.config.max_degree {
                suggestions.push(Optimization {
                    kind: OptimizationKind::RemoveConnection,
                    priority: OptimizationPriority::Medium,
                    node: Some(node_id.clone()),
                    suggested_connections: degree - self.config.max_degree,
                    reason: format!(
                        "degree {degree} above maximum {}",
                        self.config.max_degree
                    ),
                });
            }
        }

        let health = self.calculate_health();
        if health.partition_risk > BRIDGE_RISK {
            suggestions.push(Optimization {
                kind: OptimizationKind::AddBridge,
                priority: OptimizationPriority::Critical,
                node: None,
                suggested_connections: health
                    .node_count
                    .saturating_sub(1)
                    .saturating_sub(health.path_count)
                    .max(1),
                reason: format!("partition risk {:.2}", health.partition_risk),
            });
        }

        suggestions.sort_by_key(|s| s.priority);
        suggestions
    }

    // ---- Snapshots ----

    /// Freezes the current state and publishes the resulting events.
    ///
    /// Node roles and connection counts are refreshed first. Emits
    /// `topology:changed` when the score differs from the previous
    /// snapshot, and `health:warning` / `health:critical` when the score
    /// falls through a threshold. A first snapshot counts as falling from
    /// a perfect score.
    pub fn take_snapshot(&self) -> Arc<TopologySnapshot> {
        let paths: Vec<Path> = self.paths.read().values().cloned().collect();

        let nodes = {
            let mut nodes = self.nodes.write();
            let adj = analysis::adjacency(nodes.keys(), &paths);
            for (id, node) in nodes.iter_mut() {
                node.connection_count = adj.get(id).map_or(0, BTreeSet::len);
                if matches!(node.role, NodeRole::Hub | NodeRole::Relay | NodeRole::Leaf) {
                    if let Some(role) = analysis::role(&adj, id) {
                        node.role = role;
                    }
                }
            }
            nodes.clone()
        };

        let adj = analysis::adjacency(nodes.keys(), &paths);
        let health = analysis::health(&nodes, &paths);
        let shape = analysis::classify(&adj);

        let snapshot = Arc::new(TopologySnapshot {
            timestamp: Utc::now(),
            nodes,
            paths,
            health,
            shape,
        });

        let previous = {
            let mut history = self.history.write();
            let previous = history.back().map(|s| s.health.score);
            history.push_back(snapshot.clone());
            while history.len() > self.config.snapshot_history.max(1) {
                history.pop_front();
            }
            previous
        };

        self.announce(previous, &snapshot);
        snapshot
    }

    pub fn latest_snapshot(&self) -> Option<Arc<TopologySnapshot>> {
        self.history.read().back().cloned()
    }

    /// Stored snapshots, oldest first.
    pub fn history(&self) -> Vec<Arc<TopologySnapshot>> {
        self.history.read().iter().cloned().collect()
    }

    /// Takes a snapshot every `snapshot_interval_ms` until shutdown, handing
    /// each one to `sink`.
    pub async fn run<F>(self: Arc<Self>, mut shutdown: watch::Receiver<bool>, sink: F)
    where
        F: Fn(Arc<TopologySnapshot>) + Send + Sync + 'static,
    {
        let period = std::time::Duration::from_millis(self.config.snapshot_interval_ms);
        let mut interval = tokio::time::interval(period);

        info!(interval_ms = self.config.snapshot_interval_ms, "topology snapshot loop starting");
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let snapshot = self.take_snapshot();
                    sink(snapshot);
                }
                res = shutdown.changed() => {
                    if res.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("topology snapshot loop stopped");
    }

    pub fn get_node(&self, node_id: &str) -> Option<NodeInfo> {
        self.nodes.read().get(node_id).cloned()
    }

    pub fn nodes(&self) -> Vec<NodeInfo> {
        self.nodes.read().values().cloned().collect()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn path_count(&self) -> usize {
        self.paths.read().len()
    }

    pub fn config(&self) -> &TopologyConfig {
        &self.config
    }

    // ---- Internal helpers ----

    fn adjacency(&self) -> Adjacency {
        let nodes = self.nodes.read();
        let paths: Vec<Path> = self.paths.read().values().cloned().collect();
        analysis::adjacency(nodes.keys(), &paths)
    }

    fn announce(&self, previous: Option<f64>, snapshot: &TopologySnapshot) {
        let score = snapshot.health.score;

        let changed = previous.map_or(true, |p| (p - score).abs() > SCORE_EPSILON);
        if changed {
            debug!(score, shape = ?snapshot.shape, "topology changed");
            self.events.emit(MeshEvent::TopologyChanged {
                previous_score: previous,
                score,
                shape: snapshot.shape,
            });
        }

        let before = previous.unwrap_or(100.0);
        let warning = self.config.warning_threshold;
        let critical = self.config.critical_threshold;

        if before >= warning && score < warning {
            warn!(score, threshold = warning, "topology health below warning threshold");
            self.events.emit(MeshEvent::HealthWarning {
                score,
                threshold: warning,
            });
        }
        if before >= critical && score < critical {
            warn!(score, threshold = critical, "topology health critical");
            self.events.emit(MeshEvent::HealthCritical {
                score,
                threshold: critical,
            });
        }
    }
}
