//! Identifiers and peer records shared by every component.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a mesh node (typically a hex-encoded public key).
pub type NodeId = String;

/// Identifier of a hyphal path.
pub type PathId = String;

/// Structural role a node plays in the topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    /// Degree well above the network average.
    Hub,
    /// Ordinary forwarding node.
    Relay,
    /// Degree of two or less.
    Leaf,
    /// Sits on a cut between two parts of the graph. Never inferred by the
    /// topology manager; callers assign it through `update_node`.
    Bridge,
    /// Entry point to another network or region. Assigned by callers only.
    Gateway,
}

/// Local cache entry describing a known peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInfo {
    /// Node identifier.
    pub id: NodeId,
    /// Transport-level reference (multiaddr, socket address, ...).
    pub peer_ref: String,
    /// Number of live connections the node reports.
    pub connection_count: usize,
    /// Last role assigned to the node.
    pub role: NodeRole,
    /// Free-form resource figures (cpu, memory_mb, storage_gb, ...).
    pub resources: BTreeMap<String, f64>,
    /// When we last heard from the node.
    pub last_seen: DateTime<Utc>,
}

impl NodeInfo {
    /// A freshly discovered peer with no connections and a `Leaf` role.
    pub fn new(id: impl Into<NodeId>, peer_ref: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            peer_ref: peer_ref.into(),
            connection_count: 0,
            role: NodeRole::Leaf,
            resources: BTreeMap::new(),
            last_seen: Utc::now(),
        }
    }
}
