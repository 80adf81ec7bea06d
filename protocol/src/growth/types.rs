//! Growth patterns, targets, directives and results.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::NodeId;

/// Named expansion strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrowthPattern {
    /// Connect to discovered peers in discovery order.
    Organic,
    /// Connect to specific targets from the target pool.
    Directed,
    /// Prefer peers that add a non-redundant path.
    Defensive,
    /// Connect broadly and remember new peers as gateway targets.
    Exploratory,
    /// No new connections; prune weak ones.
    Consolidation,
}

impl fmt::Display for GrowthPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Organic => "organic",
            Self::Directed => "directed",
            Self::Defensive => "defensive",
            Self::Exploratory => "exploratory",
            Self::Consolidation => "consolidation",
        };
        f.write_str(name)
    }
}

/// Kind of expansion point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrowthTargetType {
    /// An ordinary peer.
    Node,
    /// A peer reached through exploration that leads somewhere new.
    Gateway,
    /// A resource offered by the network rather than a peer.
    Resource,
}

impl GrowthTargetType {
    /// Whether directed growth dials targets of this type.
    ///
    /// Gateways are peers exploration already connected to, so only plain
    /// nodes qualify.
    pub fn is_dialable(self) -> bool {
        matches!(self, Self::Node)
    }
}

/// Candidate expansion point in the target pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrowthTarget {
    pub id: NodeId,
    pub target_type: GrowthTargetType,
    /// Higher is more urgent.
    pub priority: u32,
    pub cost: f64,
    pub benefit: f64,
    pub discovered_at: DateTime<Utc>,
}

impl GrowthTarget {
    pub fn new(id: impl Into<NodeId>, target_type: GrowthTargetType) -> Self {
        Self {
            id: id.into(),
            target_type,
            priority: 0,
            cost: 1.0,
            benefit: 1.0,
            discovered_at: Utc::now(),
        }
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }
}

/// One-shot growth instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrowthDirective {
    pub id: String,
    pub pattern: GrowthPattern,
    /// Target ids for the directed pattern; ignored by the others.
    pub targets: Vec<NodeId>,
    pub priority: u32,
    /// Upper bound on new connections for this attempt.
    pub max_connections: usize,
    /// No connection attempt starts after this instant.
    pub deadline: Option<DateTime<Utc>>,
}

impl GrowthDirective {
    pub fn new(pattern: GrowthPattern, max_connections: usize) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            pattern,
            targets: Vec::new(),
            priority: 0,
            max_connections,
            deadline: None,
        }
    }

    pub fn with_targets(mut self, targets: Vec<NodeId>) -> Self {
        self.targets = targets;
        self
    }

    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Outcome of one growth attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrowthResult {
    pub directive_id: String,
    pub pattern: GrowthPattern,
    /// `new_connections > 0` and no errors.
    pub success: bool,
    pub new_connections: usize,
    /// Peers connected by this attempt, in connection order.
    pub connected: Vec<NodeId>,
    /// Connections dropped by consolidation.
    pub pruned_connections: usize,
    /// Peers disconnected by consolidation, in pruning order.
    #[serde(default)]
    pub pruned: Vec<NodeId>,
    pub duration_ms: u64,
    pub errors: Vec<String>,
    pub completed_at: DateTime<Utc>,
}
