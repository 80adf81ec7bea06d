//! Topology analysis: health, shape, roles and snapshots.

mod analysis;
mod manager;
mod types;

pub use manager::{TopologyConfig, TopologyManager};
pub use types::{
    HealthReport, Optimization, OptimizationKind, OptimizationPriority, TopologyShape,
    TopologySnapshot,
};
