//! Weighted routing graph derived from topology snapshots.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::path::PathState;
use crate::topology::TopologySnapshot;
use crate::types::NodeId;

/// How edge cost is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostMetric {
    /// Latency in milliseconds.
    Latency,
    /// Every edge costs 1.
    Hops,
    /// `1 - reliability`.
    Reliability,
    /// `latency/100 + (1 - reliability)*5 + 1`.
    #[default]
    Balanced,
}

impl CostMetric {
    pub fn cost(self, edge: &Edge) -> f64 {
        match self {
            Self::Latency => edge.latency_ms,
            Self::Hops => 1.0,
            Self::Reliability => 1.0 - edge.reliability,
            Self::Balanced => edge.latency_ms / 100.0 + (1.0 - edge.reliability) * 5.0 + 1.0,
        }
    }
}

/// Link properties between two adjacent nodes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub latency_ms: f64,
    pub bandwidth_bps: u64,
    pub reliability: f64,
}

/// Undirected graph with at most one edge per node pair.
///
/// When an edge is added between nodes that are already linked, the cheaper
/// of the two (under the graph's [`CostMetric`]) is kept.
#[derive(Debug, Clone)]
pub struct RoutingGraph {
    metric: CostMetric,
    adjacency: BTreeMap<NodeId, BTreeMap<NodeId, Edge>>,
    positions: HashMap<NodeId, (f64, f64)>,
}

impl RoutingGraph {
    pub fn new(metric: CostMetric) -> Self {
        Self {
            metric,
            adjacency: BTreeMap::new(),
            positions: HashMap::new(),
        }
    }

    /// Builds the graph from every `active` or `growing` path.
    ///
    /// Each path contributes a direct `source↔destination` edge carrying the
    /// path's full metrics, plus one edge per consecutive pair of its node
    /// sequence with the latency split evenly across segments.
    pub fn from_snapshot(snapshot: &TopologySnapshot, metric: CostMetric) -> Self {
        let mut graph = Self::new(metric);
        for node_id in snapshot.nodes.keys() {
            graph.add_node(node_id.clone());
        }

        for path in snapshot
            .paths
            .iter()
            .filter(|p| matches!(p.state, PathState::Active | PathState::Growing))
        {
            let m = &path.metrics;
            graph.add_edge(
                &path.source,
                &path.destination,
                Edge {
                    latency_ms: m.latency_ms,
                    bandwidth_bps: m.bandwidth_bps,
                    reliability: m.reliability,
                },
            );

            let sequence = path.node_sequence();
            let segments = (sequence.len() - 1).max(1);
            let per_hop = Edge {
                latency_ms: m.latency_ms / segments as f64,
                bandwidth_bps: m.bandwidth_bps,
                reliability: m.reliability,
            };
            for pair in sequence.windows(2) {
                graph.add_edge(&pair[0], &pair[1], per_hop);
            }
        }

        graph
    }

    pub fn metric(&self) -> CostMetric {
        self.metric
    }

    pub fn add_node(&mut self, node_id: NodeId) {
        self.adjacency.entry(node_id).or_default();
    }

    /// Links `a` and `b`, keeping the cheaper edge if they are already linked.
    pub fn add_edge(&mut self, a: &str, b: &str, edge: Edge) {
        if a == b {
            return;
        }
        if let Some(existing) = self.edge(a, b) {
            if self.metric.cost(&existing) <= self.metric.cost(&edge) {
                return;
            }
        }
        self.adjacency
            .entry(a.to_string())
            .or_default()
            .insert(b.to_string(), edge);
        self.adjacency
            .entry(b.to_string())
            .or_default()
            .insert(a.to_string(), edge);
    }

    pub fn edge(&self, a: &str, b: &str) -> Option<Edge> {
        self.adjacency.get(a)?.get(b).copied()
    }

    /// Cost of the edge between `a` and `b` under the graph's metric.
    pub fn cost(&self, a: &str, b: &str) -> Option<f64> {
        self.edge(a, b).map(|e| self.metric.cost(&e))
    }

    pub fn neighbors<'a>(&'a self, node_id: &str) -> impl Iterator<Item = (&'a NodeId, &'a Edge)> {
        self.adjacency.get(node_id).into_iter().flat_map(|n| n.iter())
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.adjacency.contains_key(node_id)
    }

    /// Node ids in sorted order.
    pub fn nodes(&self) -> impl Iterator<Item = &NodeId> {
        self.adjacency.keys()
    }

    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    pub fn edge_count(&self) -> usize {
        self.adjacency.values().map(BTreeMap::len).sum::<usize>() / 2
    }

    pub fn set_position(&mut self, node_id: impl Into<NodeId>, x: f64, y: f64) {
        self.positions.insert(node_id.into(), (x, y));
    }

    pub fn position(&self, node_id: &str) -> Option<(f64, f64)> {
        self.positions.get(node_id).copied()
    }

    /// Carries coordinates over from a previous graph.
    pub(crate) fn inherit_positions(&mut self, other: &RoutingGraph) {
        for (id, pos) in &other.positions {
            self.positions.entry(id.clone()).or_insert(*pos);
        }
    }
}
