// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Hypha Protocol Core Library
//!
//! A self-organizing peer-to-peer mesh substrate. Nodes keep several
//! redundant paths to every destination, gossip signals with bounded
//! fan-out, watch the shape and health of the network they can see, grow
//! new connections according to a handful of named patterns, and compute
//! routes over the resulting graph.
//!
//! ## Architecture
//!
//! - **path**: Redundant paths per destination with a health lifecycle.
//! - **signal**: TTL-bounded gossip with deduplication, rate limiting and batching.
//! - **topology**: Node registry, health scoring, shape classification and snapshots.
//! - **growth**: Pattern-driven expansion and pruning with cooldown and history.
//! - **routing**: Dijkstra, A*, diverse k-shortest paths and graph statistics.
//! - **coordinator**: Wires the components together and owns their loops.
//! - **transport**: The seam to whatever actually moves bytes between peers.
//! - **events**: The event vocabulary and broadcast bus.
//! - **config**: Defaults and the aggregate node configuration.
//!
//! Components never call each other. They publish [`events::MeshEvent`]s,
//! and the [`coordinator::MeshCoordinator`] is the only place that reacts
//! to one component's events by driving another.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod growth;
pub mod path;
pub mod routing;
pub mod signal;
pub mod topology;
pub mod transport;
pub mod types;

pub use config::MeshConfig;
pub use coordinator::{MeshCoordinator, MeshStatus};
pub use error::{CodecError, ConfigError, TransportError};
pub use events::{EventBus, MeshEvent};
pub use growth::{GrowthDirective, GrowthEngine, GrowthPattern, GrowthResult, GrowthTarget};
pub use path::{HyphalPathManager, Path, PathMetrics, PathState};
pub use routing::{Pathfinder, Route};
pub use signal::{Signal, SignalPropagator, SignalType};
pub use topology::{HealthReport, TopologyManager, TopologyShape, TopologySnapshot};
pub use transport::{MemoryTransport, PeerTransport};
pub use types::{NodeId, NodeInfo, NodeRole, PathId};
