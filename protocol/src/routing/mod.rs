//! Route computation over topology snapshots.

mod graph;
mod pathfinder;

pub use graph::{CostMetric, Edge, RoutingGraph};
pub use pathfinder::{AllPairsShortestPaths, GraphStats, Pathfinder, PathfinderConfig, Route};
