//! Graph measures behind the topology manager: health score, shape
//! classification and node roles.
//!
//! Everything here is a pure function over the node map and the path list,
//! so the same code scores live state and stored snapshots.

use std::collections::{BTreeMap, BTreeSet};

use crate::path::Path;
use crate::types::{NodeId, NodeInfo, NodeRole};

use super::types::{HealthReport, TopologyShape};

/// Undirected neighbour sets.
pub(crate) type Adjacency = BTreeMap<NodeId, BTreeSet<NodeId>>;

/// Coefficient of variation below which degrees count as uniform.
const UNIFORM_DEGREE_CV: f64 = 0.2;
/// Share of `n-1` the hub must reach to call the graph a star.
const STAR_HUB_SHARE: f64 = 0.8;
/// Average clustering required for a small-world label.
const SMALL_WORLD_CLUSTERING: f64 = 0.25;
/// Relative slack on `m = n-1` for the tree label.
const TREE_EDGE_SLACK: f64 = 0.05;

/// Builds neighbour sets from registered nodes and every path segment.
///
/// Nodes only mentioned by a path are included too.
pub(crate) fn adjacency<'a>(nodes: impl IntoIterator<Item = &'a NodeId>, paths: &[Path]) -> Adjacency {
    let mut adj: Adjacency = nodes.into_iter().map(|id| (id.clone(), BTreeSet::new())).collect();

    for path in paths {
        let sequence = path.node_sequence();
        for pair in sequence.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            if a == b {
                continue;
            }
            adj.entry(a.clone()).or_default().insert(b.clone());
            adj.entry(b.clone()).or_default().insert(a.clone());
        }
    }
    adj
}

/// Partition risk from path redundancy relative to a spanning tree.
///
/// Fewer paths than `n-1` means the graph cannot be connected: risk 1.
/// Each extra spanning tree's worth of paths halves the remaining risk
/// linearly until it bottoms out at 0.
pub(crate) fn partition_risk(node_count: usize, path_count: usize) -> f64 {
    if node_count <= 1 {
        return 0.0;
    }
    let ratio = path_count as f64 / (node_count - 1) as f64;
    if ratio < 1.0 {
        1.0
    } else {
        (1.0 - (ratio - 1.0) / 2.0).max(0.0)
    }
}

/// `avg_reliability*40 + (1-partition_risk)*40 + size_score*20`.
pub(crate) fn health(nodes: &BTreeMap<NodeId, NodeInfo>, paths: &[Path]) -> HealthReport {
    let node_count = nodes.len();
    let path_count = paths.len();

    let avg_reliability = if paths.is_empty() {
        0.0
    } else {
        paths.iter().map(|p| p.metrics.reliability).sum::<f64>() / path_count as f64
    };
    let partition_risk = partition_risk(node_count, path_count);
    let size_score = (((node_count + 1) as f64).log10() / 2.0).min(1.0);

    let score = avg_reliability * 40.0 + (1.0 - partition_risk) * 40.0 + size_score * 20.0;

    HealthReport {
        score: score.clamp(0.0, 100.0),
        avg_reliability,
        partition_risk,
        size_score,
        node_count,
        path_count,
    }
}

fn degrees(adj: &Adjacency) -> Vec<usize> {
    adj.values().map(BTreeSet::len).collect()
}

fn edge_count(adj: &Adjacency) -> usize {
    adj.values().map(BTreeSet::len).sum::<usize>() / 2
}

pub(crate) fn average_degree(adj: &Adjacency) -> f64 {
    if adj.is_empty() {
        return 0.0;
    }
    degrees(adj).iter().sum::<usize>() as f64 / adj.len() as f64
}

/// Mean local clustering coefficient over nodes with degree ≥ 2.
pub(crate) fn clustering_coefficient(adj: &Adjacency) -> f64 {
    let mut total = 0.0;
    let mut counted = 0usize;

    for neighbours in adj.values() {
        let k = neighbours.len();
        if k < 2 {
            continue;
        }
        let list: Vec<&NodeId> = neighbours.iter().collect();
        let mut links = 0usize;
        for (i, a) in list.iter().enumerate() {
            for b in &list[i + 1..] {
                if adj.get(*a).is_some_and(|n| n.contains(*b)) {
                    links += 1;
                }
            }
        }
        total += links as f64 / (k * (k - 1) / 2) as f64;
        counted += 1;
    }

    if counted == 0 {
        0.0
    } else {
        total / counted as f64
    }
}

/// An edge whose endpoints have no neighbour in common.
fn has_shortcut(adj: &Adjacency) -> bool {
    adj.iter().any(|(a, neighbours)| {
        neighbours.iter().any(|b| {
            a < b
                && adj
                    .get(b)
                    .is_some_and(|nb| neighbours.intersection(nb).next().is_none())
        })
    })
}

/// Labels the graph with the first matching shape.
pub(crate) fn classify(adj: &Adjacency) -> TopologyShape {
    let n = adj.len();
    if n < 2 {
        return TopologyShape::Random;
    }

    let mut degrees = degrees(adj);
    degrees.sort_unstable_by(|a, b| b.cmp(a));

    if n >= 4
        && degrees[0] as f64 >= STAR_HUB_SHARE * (n - 1) as f64
        && degrees[1] <= 2
    {
        return TopologyShape::Star;
    }

    let mean = degrees.iter().sum::<usize>() as f64 / n as f64;
    if mean > 0.0 {
        let variance = degrees
            .iter()
            .map(|d| (*d as f64 - mean).powi(2))
            .sum::<f64>()
            / n as f64;
        let cv = variance.sqrt() / mean;
        if cv < UNIFORM_DEGREE_CV {
            if (mean - 2.0).abs() < 0.5 {
                return TopologyShape::Ring;
            }
            if mean >= 4.0 {
                return TopologyShape::Mesh;
            }
        }
    }

    if clustering_coefficient(adj) >= SMALL_WORLD_CLUSTERING && has_shortcut(adj) {
        return TopologyShape::SmallWorld;
    }

    let m = edge_count(adj) as f64;
    if (m - (n - 1) as f64).abs() <= TREE_EDGE_SLACK * n as f64 {
        return TopologyShape::Tree;
    }

    TopologyShape::Random
}

/// Hub when the degree exceeds twice the average, leaf at degree ≤ 2,
/// relay otherwise. `None` for nodes not in the graph.
pub(crate) fn role(adj: &Adjacency, node_id: &str) -> Option<NodeRole> {
    let degree = adj.get(node_id)?.len();
    let average = average_degree(adj);

    Some(if degree as f64 > 2.0 * average {
        NodeRole::Hub
    } else if degree <= 2 {
        NodeRole::Leaf
    } else {
        NodeRole::Relay
    })
}
