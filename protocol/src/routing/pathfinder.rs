//! # Pathfinder
//!
//! Route queries over a [`RoutingGraph`] built from topology snapshots:
//!
//! - `find_path`: Dijkstra, the default query, cached per node pair.
//! - `find_path_astar`: same cost model plus a Euclidean heuristic over
//!   node coordinates, when both endpoints have one.
//! - `find_k_shortest_paths`: Yen's algorithm, accepting only candidates
//!   that are diverse enough relative to the routes already chosen.
//! - `calculate_all_pairs_shortest_paths`: Floyd-Warshall. Cubic in the
//!   node count, so only meant for small and medium graphs.
//!
//! Edges below `min_reliability` or `min_bandwidth_bps` are never relaxed,
//! and searches stop expanding a branch once it reaches `max_hops`.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::topology::TopologySnapshot;
use crate::types::NodeId;

use super::graph::{CostMetric, Edge, RoutingGraph};

/// Configuration for route computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathfinderConfig {
    pub cost_metric: CostMetric,
    /// Longest route, in edges, a search will expand.
    pub max_hops: usize,
    /// Edges less reliable than this are ignored.
    pub min_reliability: f64,
    /// Edges slower than this are ignored.
    pub min_bandwidth_bps: u64,
    /// Default `k` for alternate-route queries.
    pub alternative_paths: usize,
    /// `0..=1`; higher demands less overlap between alternate routes.
    pub diversity_preference: f64,
}

impl Default for PathfinderConfig {
    fn default() -> Self {
        Self {
            cost_metric: CostMetric::Balanced,
            max_hops: crate::config::DEFAULT_MAX_HOPS,
            min_reliability: 0.0,
            min_bandwidth_bps: 0,
            alternative_paths: crate::config::DEFAULT_ALTERNATIVE_PATHS,
            diversity_preference: crate::config::DEFAULT_DIVERSITY_PREFERENCE,
        }
    }
}

/// A computed route. Disposable; recomputed per query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub id: String,
    pub source: NodeId,
    pub destination: NodeId,
    /// Full node sequence including both endpoints.
    pub path: Vec<NodeId>,
    pub cost: f64,
    pub estimated_latency_ms: f64,
    /// Bottleneck bandwidth along the route.
    pub min_bandwidth_bps: u64,
    pub hop_count: usize,
    /// Product of edge reliabilities.
    pub reliability: f64,
    pub calculated_at: DateTime<Utc>,
}

/// Summary figures of the routing graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphStats {
    pub node_count: usize,
    pub edge_count: usize,
    pub average_degree: f64,
    /// `edges / (n*(n-1)/2)`.
    pub density: f64,
    pub connected_components: usize,
    /// Longest shortest route, in hops, among the sampled pairs.
    pub diameter: usize,
}

/// Result of a Floyd-Warshall run.
#[derive(Debug, Clone)]
pub struct AllPairsShortestPaths {
    nodes: Vec<NodeId>,
    index: HashMap<NodeId, usize>,
    dist: Vec<Vec<f64>>,
    next: Vec<Vec<Option<usize>>>,
}

impl AllPairsShortestPaths {
    /// Cheapest cost from `a` to `b`, `None` if unreachable or unknown.
    pub fn distance(&self, a: &str, b: &str) -> Option<f64> {
        let (i, j) = (*self.index.get(a)?, *self.index.get(b)?);
        let d = self.dist[i][j];
        d.is_finite().then_some(d)
    }

    /// Node sequence of the cheapest route from `a` to `b`.
    pub fn path(&self, a: &str, b: &str) -> Option<Vec<NodeId>> {
        let (mut i, j) = (*self.index.get(a)?, *self.index.get(b)?);
        if !self.dist[i][j].is_finite() {
            return None;
        }
        let mut path = vec![self.nodes[i].clone()];
        while i != j {
            i = self.next[i][j]?;
            path.push(self.nodes[i].clone());
        }
        Some(path)
    }

    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }
}

/// Frontier entry ordered so the `BinaryHeap` pops the cheapest first.
struct Frontier {
    priority: f64,
    cost: f64,
    hops: usize,
    node: NodeId,
}

impl PartialEq for Frontier {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Frontier {}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .total_cmp(&self.priority)
            .then_with(|| other.hops.cmp(&self.hops))
            .then_with(|| other.node.cmp(&self.node))
    }
}

/// Constraints applied to one search.
#[derive(Default)]
struct Exclusions {
    nodes: HashSet<NodeId>,
    edges: HashSet<(NodeId, NodeId)>,
}

impl Exclusions {
    fn block_edge(&mut self, a: &str, b: &str) {
        self.edges.insert(edge_key(a, b));
    }

    fn allows(&self, a: &str, b: &str) -> bool {
        !self.nodes.contains(b) && !self.edges.contains(&edge_key(a, b))
    }
}

fn edge_key(a: &str, b: &str) -> (NodeId, NodeId) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

/// Route computation over the latest routing graph.
pub struct Pathfinder {
    config: PathfinderConfig,
    graph: RwLock<RoutingGraph>,
    cache: RwLock<HashMap<(NodeId, NodeId), Route>>,
}

impl Pathfinder {
    pub fn new(config: PathfinderConfig) -> Self {
        let graph = RoutingGraph::new(config.cost_metric);
        Self {
            config,
            graph: RwLock::new(graph),
            cache: RwLock::new(HashMap::new()),
        }
    }

    // ---- Graph maintenance ----

    /// Rebuilds the graph from a snapshot. Coordinates survive the rebuild;
    /// cached routes do not.
    pub fn build_graph(&self, snapshot: &TopologySnapshot) {
        let mut rebuilt = RoutingGraph::from_snapshot(snapshot, self.config.cost_metric);
        {
            let mut graph = self.graph.write();
            rebuilt.inherit_positions(&graph);
            *graph = rebuilt;
        }
        self.cache.write().clear();

        let graph = self.graph.read();
        debug!(nodes = graph.node_count(), edges = graph.edge_count(), "routing graph rebuilt");
    }

    pub fn add_edge(&self, a: &str, b: &str, edge: Edge) {
        self.graph.write().add_edge(a, b, edge);
        self.cache.write().clear();
    }

    /// Gives a node coordinates for the A* heuristic.
    pub fn set_position(&self, node_id: impl Into<NodeId>, x: f64, y: f64) {
        self.graph.write().set_position(node_id, x, y);
    }

    // ---- Queries ----

    /// Cheapest route by Dijkstra. `None` when unreachable.
    pub fn find_path(&self, source: &str, destination: &str) -> Option<Route> {
        let key = (source.to_string(), destination.to_string());
        if let Some(hit) = self.cache.read().get(&key) {
            return Some(hit.clone());
        }

        let graph = self.graph.read();
        let (path, _) = self.search(
            &graph,
            source,
            destination,
            &Exclusions::default(),
            self.config.max_hops,
            |_| 0.0,
        )?;
        let route = self.route(&graph, path);
        drop(graph);

        self.cache.write().insert(key, route.clone());
        Some(route)
    }

    /// Cheapest route by A*, guided by straight-line distance between node
    /// coordinates. Without coordinates this is plain Dijkstra.
    pub fn find_path_astar(&self, source: &str, destination: &str) -> Option<Route> {
        let graph = self.graph.read();
        let goal = graph.position(destination);

        let heuristic = |node: &str| match (graph.position(node), goal) {
            (Some((x1, y1)), Some((x2, y2))) => ((x1 - x2).powi(2) + (y1 - y2).powi(2)).sqrt(),
            _ => 0.0,
        };

        let (path, _) = self.search(
            &graph,
            source,
            destination,
            &Exclusions::default(),
            self.config.max_hops,
            heuristic,
        )?;
        Some(self.route(&graph, path))
    }

    /// Up to `k` cheapest, mutually diverse routes (Yen's algorithm).
    ///
    /// Candidates whose node overlap with an accepted route reaches
    /// `1 - diversity_preference` are skipped. The search stops early when
    /// no diverse candidate is left.
    pub fn find_k_shortest_paths(&self, source: &str, destination: &str, k: usize) -> Vec<Route> {
        if k == 0 {
            return Vec::new();
        }
        let graph = self.graph.read();

        let Some((first, first_cost)) = self.search(
            &graph,
            source,
            destination,
            &Exclusions::default(),
            self.config.max_hops,
            |_| 0.0,
        ) else {
            return Vec::new();
        };

        let mut accepted: Vec<(Vec<NodeId>, f64)> = vec![(first, first_cost)];
        let mut candidates: Vec<(Vec<NodeId>, f64)> = Vec::new();

        while accepted.len() < k {
            let (last, _) = accepted[accepted.len() - 1].clone();

            for i in 0..last.len().saturating_sub(1) {
                let spur = &last[i];
                let root = &last[..=i];

                let mut exclusions = Exclusions::default();
                for (path, _) in &accepted {
                    if path.len() > i + 1 && path[..=i] == *root {
                        exclusions.block_edge(&path[i], &path[i + 1]);
                    }
                }
                for node in &root[..i] {
                    exclusions.nodes.insert(node.clone());
                }

                let budget = self.config.max_hops.saturating_sub(i);
                let Some((spur_path, spur_cost)) =
                    self.search(&graph, spur, destination, &exclusions, budget, |_| 0.0)
                else {
                    continue;
                };

                let root_cost = path_cost(&graph, root);
                let mut full: Vec<NodeId> = root[..i].to_vec();
                full.extend(spur_path);

                let known = accepted.iter().chain(candidates.iter()).any(|(p, _)| *p == full);
                if !known {
                    candidates.push((full, root_cost + spur_cost));
                }
            }

            candidates.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));

            let pick = candidates.iter().position(|(candidate, _)| {
                accepted
                    .iter()
                    .all(|(chosen, _)| self.is_diverse(candidate, chosen))
            });
            match pick {
                Some(idx) => accepted.push(candidates.remove(idx)),
                None => {
                    debug!(found = accepted.len(), k, "no diverse alternative left");
                    break;
                }
            }
        }

        accepted
            .into_iter()
            .map(|(path, _)| self.route(&graph, path))
            .collect()
    }

    /// `find_k_shortest_paths` with the configured `alternative_paths`.
    pub fn find_alternate_paths(&self, source: &str, destination: &str) -> Vec<Route> {
        self.find_k_shortest_paths(source, destination, self.config.alternative_paths)
    }

    /// Floyd-Warshall over every node of the graph.
    pub fn calculate_all_pairs_shortest_paths(&self) -> AllPairsShortestPaths {
        let graph = self.graph.read();
        let nodes: Vec<NodeId> = graph.nodes().cloned().collect();
        let index: HashMap<NodeId, usize> =
            nodes.iter().enumerate().map(|(i, n)| (n.clone(), i)).collect();
        let n = nodes.len();

        let mut dist = vec![vec![f64::INFINITY; n]; n];
        let mut next = vec![vec![None; n]; n];
        for i in 0..n {
            dist[i][i] = 0.0;
            next[i][i] = Some(i);
            for (neighbor, edge) in graph.neighbors(&nodes[i]) {
                if !self.usable(edge) {
                    continue;
                }
                let j = index[neighbor];
                let cost = graph.metric().cost(edge);
                if cost < dist[i][j] {
                    dist[i][j] = cost;
                    next[i][j] = Some(j);
                }
            }
        }

        for k in 0..n {
            for i in 0..n {
                if !dist[i][k].is_finite() {
                    continue;
                }
                for j in 0..n {
                    let through = dist[i][k] + dist[k][j];
                    if through < dist[i][j] {
                        dist[i][j] = through;
                        next[i][j] = next[i][k];
                    }
                }
            }
        }

        AllPairsShortestPaths {
            nodes,
            index,
            dist,
            next,
        }
    }

    /// Size, density, components and a sampled diameter.
    ///
    /// The diameter is the largest hop count among shortest routes between
    /// at most [`DIAMETER_SAMPLE_PAIRS`](crate::config::DIAMETER_SAMPLE_PAIRS)
    /// node pairs. Small graphs are measured exhaustively.
    pub fn graph_stats(&self) -> GraphStats {
        let graph = self.graph.read();
        let nodes: Vec<NodeId> = graph.nodes().cloned().collect();
        let n = nodes.len();
        let edge_count = graph.edge_count();

        let average_degree = if n == 0 { 0.0 } else { 2.0 * edge_count as f64 / n as f64 };
        let density = if n < 2 {
            0.0
        } else {
            edge_count as f64 / (n * (n - 1) / 2) as f64
        };

        let mut pairs: Vec<(&NodeId, &NodeId)> = Vec::new();
        for a in &nodes {
            for b in &nodes {
                if a < b {
                    pairs.push((a, b));
                }
            }
        }
        if pairs.len() > crate::config::DIAMETER_SAMPLE_PAIRS {
            let mut rng = rand::thread_rng();
            pairs.shuffle(&mut rng);
            pairs.truncate(crate::config::DIAMETER_SAMPLE_PAIRS);
        }

        let diameter = pairs
            .into_iter()
            .filter_map(|(a, b)| {
                self.search(&graph, a, b, &Exclusions::default(), n, |_| 0.0)
                    .map(|(path, _)| path.len() - 1)
            })
            .max()
            .unwrap_or(0);

        GraphStats {
            node_count: n,
            edge_count,
            average_degree,
            density,
            connected_components: components(&graph),
            diameter,
        }
    }

    pub fn node_count(&self) -> usize {
        self.graph.read().node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.read().edge_count()
    }

    pub fn cached_routes(&self) -> usize {
        self.cache.read().len()
    }

    pub fn config(&self) -> &PathfinderConfig {
        &self.config
    }

    // ---- Internal helpers ----

    fn usable(&self, edge: &Edge) -> bool {
        edge.reliability >= self.config.min_reliability
            && edge.bandwidth_bps >= self.config.min_bandwidth_bps
    }

    /// Best-first search over `(node, hops)` states.
    ///
    /// With a zero heuristic this is Dijkstra. Returns the node sequence and
    /// its cost. A node is expanded again only when reached in strictly
    /// fewer hops than any earlier expansion, so the search ends even on
    /// disconnected graphs.
    fn search<H>(
        &self,
        graph: &RoutingGraph,
        source: &str,
        destination: &str,
        exclusions: &Exclusions,
        max_hops: usize,
        heuristic: H,
    ) -> Option<(Vec<NodeId>, f64)>
    where
        H: Fn(&str) -> f64,
    {
        if !graph.contains(source) || !graph.contains(destination) {
            return None;
        }
        if source == destination {
            return Some((vec![source.to_string()], 0.0));
        }

        // A loop-free route never needs more hops than there are nodes.
        let max_hops = max_hops.min(graph.node_count().saturating_sub(1));
        let mut best: HashMap<(NodeId, usize), f64> = HashMap::new();
        let mut prev: HashMap<(NodeId, usize), NodeId> = HashMap::new();
        let mut settled: HashMap<NodeId, usize> = HashMap::new();
        let mut heap = BinaryHeap::new();

        best.insert((source.to_string(), 0), 0.0);
        heap.push(Frontier {
            priority: heuristic(source),
            cost: 0.0,
            hops: 0,
            node: source.to_string(),
        });

        while let Some(Frontier { cost, hops, node, .. }) = heap.pop() {
            if node == destination {
                return Some((unwind(&prev, node, hops), cost));
            }
            if best
                .get(&(node.clone(), hops))
                .is_some_and(|known| cost > *known)
            {
                continue;
            }
            if hops >= max_hops {
                continue;
            }
            // Pops of one node come out in cost order, so an earlier
            // expansion with no more hops dominates this one.
            if settled.get(&node).is_some_and(|fewest| *fewest <= hops) {
                continue;
            }
            settled.insert(node.clone(), hops);

            for (neighbor, edge) in graph.neighbors(&node) {
                if !self.usable(edge) || !exclusions.allows(&node, neighbor) {
                    continue;
                }
                let next_cost = cost + graph.metric().cost(edge);
                let state = (neighbor.clone(), hops + 1);
                if best.get(&state).is_some_and(|known| *known <= next_cost) {
                    continue;
                }
                best.insert(state.clone(), next_cost);
                prev.insert(state, node.clone());
                heap.push(Frontier {
                    priority: next_cost + heuristic(neighbor),
                    cost: next_cost,
                    hops: hops + 1,
                    node: neighbor.clone(),
                });
            }
        }

        None
    }

    fn route(&self, graph: &RoutingGraph, path: Vec<NodeId>) -> Route {
        let mut cost = 0.0;
        let mut latency = 0.0;
        let mut min_bandwidth = u64::MAX;
        let mut reliability = 1.0;

        for pair in path.windows(2) {
            if let Some(edge) = graph.edge(&pair[0], &pair[1]) {
                cost += graph.metric().cost(&edge);
                latency += edge.latency_ms;
                min_bandwidth = min_bandwidth.min(edge.bandwidth_bps);
                reliability *= edge.reliability;
            }
        }
        if path.len() < 2 {
            min_bandwidth = 0;
        }

        Route {
            id: uuid::Uuid::new_v4().to_string(),
            source: path[0].clone(),
            destination: path[path.len() - 1].clone(),
            hop_count: path.len() - 1,
            path,
            cost,
            estimated_latency_ms: latency,
            min_bandwidth_bps: min_bandwidth,
            reliability,
            calculated_at: Utc::now(),
        }
    }

    /// Overlap is the share of intermediate nodes the two routes have in
    /// common, relative to the longer of the two.
    fn is_diverse(&self, candidate: &[NodeId], chosen: &[NodeId]) -> bool {
        let inner = |p: &[NodeId]| -> HashSet<NodeId> {
            if p.len() <= 2 {
                HashSet::new()
            } else {
                p[1..p.len() - 1].iter().cloned().collect()
            }
        };
        let (a, b) = (inner(candidate), inner(chosen));
        let longest = a.len().max(b.len());
        let overlap = if longest == 0 {
            0.0
        } else {
            a.intersection(&b).count() as f64 / longest as f64
        };
        overlap < 1.0 - self.config.diversity_preference
    }
}

fn unwind(prev: &HashMap<(NodeId, usize), NodeId>, end: NodeId, hops: usize) -> Vec<NodeId> {
    let mut path = vec![end];
    let mut hops = hops;
    while hops > 0 {
        let Some(before) = prev.get(&(path[path.len() - 1].clone(), hops)) else {
            break;
        };
        path.push(before.clone());
        hops -= 1;
    }
    path.reverse();
    path
}

fn path_cost(graph: &RoutingGraph, path: &[NodeId]) -> f64 {
    path.windows(2)
        .filter_map(|pair| graph.cost(&pair[0], &pair[1]))
        .sum()
}

fn components(graph: &RoutingGraph) -> usize {
    let mut seen: HashSet<&NodeId> = HashSet::new();
    let mut count = 0;
    for start in graph.nodes() {
        if !seen.insert(start) {
            continue;
        }
        count += 1;
        let mut stack = vec![start];
        while let Some(node) = stack.pop() {
            for (neighbor, _) in graph.neighbors(node) {
                if seen.insert(neighbor) {
                    stack.push(neighbor);
                }
            }
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(latency_ms: f64) -> Edge {
        Edge {
            latency_ms,
            bandwidth_bps: 10_000_000,
            reliability: 0.99,
        }
    }

    fn finder(metric: CostMetric) -> Pathfinder {
        Pathfinder::new(PathfinderConfig {
            cost_metric: metric,
            ..PathfinderConfig::default()
        })
    }

    fn triangle() -> Pathfinder {
        let pf = finder(CostMetric::Latency);
        pf.add_edge("A", "B", edge(1.0));
        pf.add_edge("B", "C", edge(1.0));
        pf.add_edge("A", "C", edge(5.0));
        pf
    }

    #[test]
    fn dijkstra_prefers_cheaper_detour() {
        let route = triangle().find_path("A", "C").unwrap();
        assert_eq!(route.path, vec!["A", "B", "C"]);
        assert!((route.cost - 2.0).abs() < 1e-9);
        assert_eq!(route.hop_count, 2);
        assert!((route.reliability - 0.99 * 0.99).abs() < 1e-9);
    }

    #[test]
    fn unknown_or_unreachable_gives_none() {
        let pf = triangle();
        pf.add_edge("X", "Y", edge(1.0));
        assert!(pf.find_path("A", "nowhere").is_none());
        assert!(pf.find_path("A", "X").is_none());
    }

    #[test]
    fn hop_limit_prunes_during_expansion() {
        let pf = Pathfinder::new(PathfinderConfig {
            cost_metric: CostMetric::Latency,
            max_hops: 1,
            ..PathfinderConfig::default()
        });
        pf.add_edge("A", "B", edge(1.0));
        pf.add_edge("B", "C", edge(1.0));
        pf.add_edge("A", "C", edge(5.0));

        assert_eq!(pf.find_path("A", "C").unwrap().path, vec!["A", "C"]);

        pf.add_edge("C", "D", edge(1.0));
        assert!(pf.find_path("A", "D").is_none());
    }

    #[test]
    fn weak_edges_are_never_relaxed() {
        let pf = Pathfinder::new(PathfinderConfig {
            cost_metric: CostMetric::Latency,
            min_reliability: 0.9,
            min_bandwidth_bps: 1_000,
            ..PathfinderConfig::default()
        });
        pf.add_edge("A", "B", Edge { reliability: 0.5, ..edge(1.0) });
        pf.add_edge("B", "C", edge(1.0));
        pf.add_edge("A", "C", edge(5.0));
        pf.add_edge("C", "D", Edge { bandwidth_bps: 10, ..edge(1.0) });

        assert_eq!(pf.find_path("A", "C").unwrap().path, vec!["A", "C"]);
        assert!(pf.find_path("A", "D").is_none());
    }

    #[test]
    fn hop_metric_counts_edges() {
        let pf = finder(CostMetric::Hops);
        pf.add_edge("A", "B", edge(1.0));
        pf.add_edge("B", "C", edge(1.0));
        pf.add_edge("A", "C", edge(500.0));
        let route = pf.find_path("A", "C").unwrap();
        assert_eq!(route.path, vec!["A", "C"]);
        assert_eq!(route.cost, 1.0);
    }

    #[test]
    fn astar_matches_dijkstra() {
        let pf = triangle();
        pf.set_position("A", 0.0, 0.0);
        pf.set_position("B", 1.0, 0.0);
        pf.set_position("C", 1.0, 1.0);
        let astar = pf.find_path_astar("A", "C").unwrap();
        let dijkstra = pf.find_path("A", "C").unwrap();
        assert_eq!(astar.path, dijkstra.path);
        assert_eq!(astar.cost, dijkstra.cost);
    }

    #[test]
    fn astar_without_coordinates_still_routes() {
        let route = triangle().find_path_astar("A", "C").unwrap();
        assert_eq!(route.path, vec!["A", "B", "C"]);
    }

    #[test]
    fn k_shortest_returns_disjoint_routes() {
        let pf = finder(CostMetric::Latency);
        pf.add_edge("A", "B", edge(1.0));
        pf.add_edge("B", "C", edge(1.0));
        pf.add_edge("A", "D", edge(1.0));
        pf.add_edge("D", "C", edge(1.0));

        let routes = pf.find_k_shortest_paths("A", "C", 2);
        assert_eq!(routes.len(), 2);
        assert_ne!(routes[0].path, routes[1].path);
        assert_eq!(routes[0].cost, routes[1].cost);
        let inner0: HashSet<_> = routes[0].path[1..routes[0].path.len() - 1].iter().collect();
        let inner1: HashSet<_> = routes[1].path[1..routes[1].path.len() - 1].iter().collect();
        assert!(inner0.is_disjoint(&inner1));
    }

    #[test]
    fn k_shortest_orders_by_cost() {
        let pf = triangle();
        let routes = pf.find_k_shortest_paths("A", "C", 3);
        assert_eq!(routes.len(), 2);
        assert_eq!(routes[0].path, vec!["A", "B", "C"]);
        assert_eq!(routes[1].path, vec!["A", "C"]);
    }

    #[test]
    fn k_shortest_skips_overlapping_candidates() {
        // Both alternatives to A-B-E-C reuse B; with a strict preference
        // only the fully disjoint one is accepted.
        let pf = Pathfinder::new(PathfinderConfig {
            cost_metric: CostMetric::Latency,
            diversity_preference: 0.5,
            ..PathfinderConfig::default()
        });
        pf.add_edge("A", "B", edge(1.0));
        pf.add_edge("B", "E", edge(1.0));
        pf.add_edge("E", "C", edge(1.0));
        pf.add_edge("B", "F", edge(1.0));
        pf.add_edge("F", "C", edge(1.5));
        pf.add_edge("A", "G", edge(2.0));
        pf.add_edge("G", "H", edge(2.0));
        pf.add_edge("H", "C", edge(2.0));

        let routes = pf.find_k_shortest_paths("A", "C", 2);
        assert_eq!(routes.len(), 2);
        assert_eq!(routes[1].path, vec!["A", "G", "H", "C"]);
    }

    #[test]
    fn floyd_warshall_agrees_with_dijkstra() {
        let pf = triangle();
        pf.add_edge("C", "D", edge(2.0));
        let all = pf.calculate_all_pairs_shortest_paths();

        assert_eq!(all.distance("A", "D"), Some(4.0));
        assert_eq!(all.path("A", "D").unwrap(), vec!["A", "B", "C", "D"]);
        assert_eq!(all.distance("D", "A"), Some(4.0));
        assert_eq!(all.distance("A", "A"), Some(0.0));
        assert_eq!(all.distance("A", "ghost"), None);
    }

    #[test]
    fn stats_report_components_and_diameter() {
        let pf = triangle();
        pf.add_edge("C", "D", edge(1.0));
        pf.add_edge("X", "Y", edge(1.0));

        let stats = pf.graph_stats();
        assert_eq!(stats.node_count, 6);
        assert_eq!(stats.edge_count, 5);
        assert_eq!(stats.connected_components, 2);
        assert_eq!(stats.diameter, 3);
        assert!((stats.density - 5.0 / 15.0).abs() < 1e-9);
    }

    #[test]
    fn stats_finish_on_disjoint_pairs() {
        let pf = finder(CostMetric::Latency);
        pf.add_edge("A", "B", edge(1.0));
        pf.add_edge("X", "Y", edge(1.0));

        let stats = pf.graph_stats();
        assert_eq!(stats.node_count, 4);
        assert_eq!(stats.connected_components, 2);
        assert_eq!(stats.diameter, 1);
    }

    #[test]
    fn search_ends_when_destination_is_in_other_component() {
        let pf = triangle();
        pf.add_edge("C", "D", edge(1.0));
        pf.add_edge("X", "Y", edge(1.0));

        assert!(pf.find_path("A", "X").is_none());
        assert!(pf.find_path_astar("D", "Y").is_none());
        assert!(pf.find_k_shortest_paths("A", "Y", 3).is_empty());
    }

    #[test]
    fn cache_is_cleared_on_graph_change() {
        let pf = triangle();
        pf.find_path("A", "C");
        assert_eq!(pf.cached_routes(), 1);

        pf.add_edge("A", "C", edge(0.5));
        assert_eq!(pf.cached_routes(), 0);
        assert_eq!(pf.find_path("A", "C").unwrap().path, vec!["A", "C"]);
    }
}
