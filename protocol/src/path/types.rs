//! Path records, metrics and the health state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{NodeId, PathId};

/// Lifecycle state of a hyphal path.
///
/// ```text
/// growing ──> active <──> stressed
///               │  \         │
///               │   └──> dying <┘      (severe degradation)
///               └──> dormant ──> dying ──> dead   (inactivity)
/// ```
///
/// `dead` is terminal: the path is removed as soon as it gets there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathState {
    Growing,
    Active,
    Stressed,
    Dormant,
    Dying,
    Dead,
}

impl PathState {
    /// Paths that count against the per-destination limit.
    pub fn is_live(self) -> bool {
        matches!(self, Self::Growing | Self::Active)
    }

    /// The next state on the inactivity decay ladder.
    pub fn decayed(self) -> Self {
        match self {
            Self::Growing | Self::Active | Self::Stressed => Self::Dormant,
            Self::Dormant => Self::Dying,
            Self::Dying | Self::Dead => Self::Dead,
        }
    }
}

/// Why a path left the path set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathRemovalReason {
    /// Decayed to `dead` through inactivity.
    Decayed,
    /// Pushed out by a better path when the destination was at its limit.
    Evicted,
    /// Torn down explicitly by the owner.
    Closed,
}

/// Measured quality of a path.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PathMetrics {
    /// Round-trip latency in milliseconds.
    pub latency_ms: f64,
    /// Available bandwidth in bits per second.
    pub bandwidth_bps: u64,
    /// Packet loss, 0..=100.
    pub packet_loss_pct: f64,
    /// Delivery reliability, 0..=1.
    pub reliability: f64,
    /// Number of segments between source and destination.
    pub hop_count: usize,
}

impl PathMetrics {
    /// Weighted quality score in `0..=1`.
    ///
    /// `reliability*0.4 + latency*0.3 + bandwidth*0.2 + loss*0.1`, where
    /// latency saturates at 500ms, bandwidth at 100Mbps and loss at 100%.
    pub fn score(&self) -> f64 {
        let latency_score = (1.0 - self.latency_ms / 500.0).max(0.0);
        let bandwidth_score = (self.bandwidth_bps as f64 / 1e8).min(1.0);
        let loss_score = (1.0 - self.packet_loss_pct / 100.0).max(0.0);

        self.reliability * 0.4 + latency_score * 0.3 + bandwidth_score * 0.2 + loss_score * 0.1
    }

    /// Overwrites the fields present in `update`.
    pub fn merge(&mut self, update: &MetricsUpdate) {
        if let Some(v) = update.latency_ms {
            self.latency_ms = v;
        }
        if let Some(v) = update.bandwidth_bps {
            self.bandwidth_bps = v;
        }
        if let Some(v) = update.packet_loss_pct {
            self.packet_loss_pct = v;
        }
        if let Some(v) = update.reliability {
            self.reliability = v.clamp(0.0, 1.0);
        }
    }

    fn unmeasured(hop_count: usize) -> Self {
        Self {
            latency_ms: 0.0,
            bandwidth_bps: 0,
            packet_loss_pct: 0.0,
            reliability: 0.0,
            hop_count,
        }
    }
}

/// A partial metrics report; absent fields keep their current value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsUpdate {
    pub latency_ms: Option<f64>,
    pub bandwidth_bps: Option<u64>,
    pub packet_loss_pct: Option<f64>,
    pub reliability: Option<f64>,
}

impl MetricsUpdate {
    pub fn reliability(value: f64) -> Self {
        Self {
            reliability: Some(value),
            ..Self::default()
        }
    }

    pub fn packet_loss(value: f64) -> Self {
        Self {
            packet_loss_pct: Some(value),
            ..Self::default()
        }
    }
}

/// A logical multi-hop route from this node to a destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Path {
    pub id: PathId,
    pub source: NodeId,
    pub destination: NodeId,
    /// Intermediate nodes, in traversal order.
    pub hops: Vec<NodeId>,
    pub metrics: PathMetrics,
    pub state: PathState,
    pub established_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Path {
    pub(crate) fn growing(source: NodeId, destination: NodeId, hops: Vec<NodeId>) -> Self {
        let now = Utc::now();
        let hop_count = hops.len() + 1;
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            source,
            destination,
            hops,
            metrics: PathMetrics::unmeasured(hop_count),
            state: PathState::Growing,
            established_at: now,
            last_activity: now,
        }
    }

    /// Quality score of the path's current metrics.
    pub fn score(&self) -> f64 {
        self.metrics.score()
    }

    /// Whether this path has the identity `(source, hops, destination)`.
    pub fn same_route(&self, source: &str, hops: &[NodeId], destination: &str) -> bool {
        self.source == source && self.destination == destination && self.hops == hops
    }

    /// Full node sequence `[source, ..hops, destination]`.
    pub fn node_sequence(&self) -> Vec<NodeId> {
        let mut nodes = Vec::with_capacity(self.hops.len() + 2);
        nodes.push(self.source.clone());
        nodes.extend(self.hops.iter().cloned());
        nodes.push(self.destination.clone());
        nodes
    }
}
