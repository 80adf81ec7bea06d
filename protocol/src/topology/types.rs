//! Topology reports, optimization proposals and snapshots.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::path::Path;
use crate::types::{NodeId, NodeInfo};

/// Coarse label for the overall shape of the connection graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TopologyShape {
    /// One dominant hub, everyone else hangs off it.
    Star,
    /// Near-uniform degree of about two.
    Ring,
    /// Near-uniform degree of four or more.
    Mesh,
    /// Clustered neighbourhoods plus long-range shortcuts.
    SmallWorld,
    /// Roughly a spanning tree's worth of edges.
    Tree,
    /// None of the above.
    Random,
}

/// Breakdown of the topology health score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    /// Overall score in `0..=100`.
    pub score: f64,
    /// Mean reliability of the known paths.
    pub avg_reliability: f64,
    /// Estimated likelihood of a partition, `0..=1`.
    pub partition_risk: f64,
    /// Contribution of network size, `0..=1`.
    pub size_score: f64,
    pub node_count: usize,
    pub path_count: usize,
}

/// What an [`Optimization`] proposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationKind {
    AddConnection,
    RemoveConnection,
    AddBridge,
}

/// Urgency of an optimization. Orders most urgent first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationPriority {
    Critical,
    High,
    Medium,
    Low,
}

/// A structural fix proposed by the topology manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Optimization {
    pub kind: OptimizationKind,
    pub priority: OptimizationPriority,
    /// Node the fix applies to; `None` for network-wide fixes.
    pub node: Option<NodeId>,
    /// How many connections to add or remove.
    pub suggested_connections: usize,
    pub reason: String,
}

/// Immutable point-in-time copy of the topology.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologySnapshot {
    pub timestamp: DateTime<Utc>,
    pub nodes: BTreeMap<NodeId, NodeInfo>,
    pub paths: Vec<Path>,
    pub health: HealthReport,
    pub shape: TopologyShape,
}

impl TopologySnapshot {
    /// An empty snapshot, as seen before any node is known.
    pub fn empty() -> Self {
        Self {
            timestamp: Utc::now(),
            nodes: BTreeMap::new(),
            paths: Vec::new(),
            health: super::analysis::health(&BTreeMap::new(), &[]),
            shape: TopologyShape::Random,
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Every node that appears on some path of the snapshot.
    pub fn reachable_nodes(&self) -> BTreeSet<NodeId> {
        self.paths
            .iter()
            .flat_map(|p| p.node_sequence())
            .collect()
    }

    /// Highest reliability among the paths ending at `node_id`.
    pub fn best_reliability_to(&self, node_id: &str) -> Option<f64> {
        self.paths
            .iter()
            .filter(|p| p.destination == node_id)
            .map(|p| p.metrics.reliability)
            .max_by(f64::total_cmp)
    }
}
