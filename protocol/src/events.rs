//! # Mesh Events
//!
//! Every component publishes what it does on its own [`EventBus`]. The
//! coordinator subscribes to all of them, reacts where components need to
//! cooperate, and re-publishes everything on a unified bus for governance,
//! monitoring and UI consumers.
//!
//! Event names are part of the external contract. The serde tag of each
//! variant is the name subscribers match on (`path:established`,
//! `signal:received`, ...), so the JSON form of an event is stable.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

use crate::growth::{GrowthPattern, GrowthResult};
use crate::path::{Path, PathMetrics, PathRemovalReason, PathState};
use crate::signal::SignalType;
use crate::topology::TopologyShape;
use crate::types::{NodeId, PathId};

/// Everything a mesh node can announce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum MeshEvent {
    /// A new path reached the `active` state.
    #[serde(rename = "path:established")]
    PathEstablished { path: Path },

    /// A path moved into `stressed`, `dormant` or `dying`.
    #[serde(rename = "path:degraded")]
    PathDegraded {
        path_id: PathId,
        destination: NodeId,
        from: PathState,
        to: PathState,
        metrics: PathMetrics,
    },

    /// A previously degraded path is `active` again.
    #[serde(rename = "path:healed")]
    PathHealed {
        path_id: PathId,
        destination: NodeId,
        metrics: PathMetrics,
    },

    /// A path was removed from the path set.
    #[serde(rename = "path:died")]
    PathDied {
        path_id: PathId,
        destination: NodeId,
        reason: PathRemovalReason,
    },

    /// A signal was accepted (first sighting) by this node.
    #[serde(rename = "signal:received")]
    SignalReceived {
        signal_id: String,
        signal_type: SignalType,
        origin: NodeId,
        ttl: u32,
    },

    /// A fan-out pass delivered a signal to peers.
    #[serde(rename = "signal:propagated")]
    SignalPropagated {
        signal_id: String,
        signal_type: SignalType,
        peers: usize,
        failures: usize,
    },

    /// The health score differs from the previous snapshot.
    #[serde(rename = "topology:changed")]
    TopologyChanged {
        previous_score: Option<f64>,
        score: f64,
        shape: TopologyShape,
    },

    /// A node was registered with the topology manager for the first time.
    #[serde(rename = "node:discovered")]
    NodeDiscovered { node_id: NodeId },

    /// A node was removed from the topology manager.
    #[serde(rename = "node:lost")]
    NodeLost { node_id: NodeId },

    /// A growth attempt is about to run.
    #[serde(rename = "growth:started")]
    GrowthStarted {
        directive_id: String,
        pattern: GrowthPattern,
    },

    /// A growth attempt finished (successfully or not).
    #[serde(rename = "growth:completed")]
    GrowthCompleted { result: GrowthResult },

    /// The health score dropped below the warning threshold.
    #[serde(rename = "health:warning")]
    HealthWarning { score: f64, threshold: f64 },

    /// The health score dropped below the critical threshold.
    #[serde(rename = "health:critical")]
    HealthCritical { score: f64, threshold: f64 },
}

impl MeshEvent {
    /// The wire name of the event, identical to its serde tag.
    pub fn name(&self) -> &'static str {
        match self {
            Self::PathEstablished { .. } => "path:established",
            Self::PathDegraded { .. } => "path:degraded",
            Self::PathHealed { .. } => "path:healed",
            Self::PathDied { .. } => "path:died",
            Self::SignalReceived { .. } => "signal:received",
            Self::SignalPropagated { .. } => "signal:propagated",
            Self::TopologyChanged { .. } => "topology:changed",
            Self::NodeDiscovered { .. } => "node:discovered",
            Self::NodeLost { .. } => "node:lost",
            Self::GrowthStarted { .. } => "growth:started",
            Self::GrowthCompleted { .. } => "growth:completed",
            Self::HealthWarning { .. } => "health:warning",
            Self::HealthCritical { .. } => "health:critical",
        }
    }
}

/// Publish/subscribe channel for [`MeshEvent`]s.
///
/// Thin wrapper over `tokio::sync::broadcast`. Publishing never blocks and
/// never fails: with no subscribers the event is simply dropped, and slow
/// subscribers observe `RecvError::Lagged` instead of stalling publishers.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<MeshEvent>,
}

impl EventBus {
    /// Creates a bus whose subscribers buffer up to `capacity` events.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event to every current subscriber.
    pub fn emit(&self, event: MeshEvent) {
        let name = event.name();
        if self.tx.send(event).is_err() {
            trace!(event = name, "no subscribers, event dropped");
        }
    }

    /// Returns a receiver that observes every event emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<MeshEvent> {
        self.tx.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_EVENT_CAPACITY)
    }
}
