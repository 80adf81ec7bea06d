//! # Peer Transport Boundary
//!
//! The mesh core never opens a socket. Everything that touches the outside
//! world (discovering peers, dialing them, pushing signal bytes) goes
//! through the [`PeerTransport`] trait, supplied at construction time by
//! whatever networking stack hosts the node.
//!
//! [`MemoryTransport`] is an in-process implementation with scriptable
//! failures. Tests use it as a double, and the node binary uses it to run a
//! simulated peer set without any real networking.

use std::collections::{BTreeSet, HashSet};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};

use crate::error::TransportError;
use crate::signal::Signal;
use crate::types::{NodeId, NodeInfo};

/// Collaborator interface injected by the transport/discovery layer.
///
/// Implementations must be cheap to call concurrently: the signal
/// propagator sends to many peers in parallel during a fan-out pass.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Returns peers that could be connected to.
    async fn discover_peers(&self) -> Result<Vec<NodeInfo>, TransportError>;

    /// Dials a peer. `Ok(false)` means the peer declined without a fault.
    async fn connect(&self, node_id: &str) -> Result<bool, TransportError>;

    /// Tears down the connection to a peer.
    async fn disconnect(&self, node_id: &str) -> Result<(), TransportError>;

    /// Delivers a signal to a connected peer.
    async fn send_to_peer(&self, node_id: &str, signal: &Signal) -> Result<(), TransportError>;

    /// Returns the peers currently connected.
    async fn list_peers(&self) -> Result<Vec<NodeId>, TransportError>;
}

/// In-memory [`PeerTransport`] with scriptable behaviour.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    discoverable: RwLock<Vec<NodeInfo>>,
    connected: RwLock<BTreeSet<NodeId>>,
    refused: RwLock<HashSet<NodeId>>,
    unreachable: RwLock<HashSet<NodeId>>,
    discovery_failure: RwLock<Option<String>>,
    sent: Mutex<Vec<(NodeId, Signal)>>,
}

impl MemoryTransport {
    /// An empty transport: nothing discoverable, nothing connected.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes a peer visible to `discover_peers`.
    pub fn add_discoverable(&self, node: NodeInfo) {
        let mut discoverable = self.discoverable.write();
        if !discoverable.iter().any(|n| n.id == node.id) {
            discoverable.push(node);
        }
    }

    /// Marks a peer as already connected.
    pub fn add_connected(&self, node_id: impl Into<NodeId>) {
        self.connected.write().insert(node_id.into());
    }

    /// `connect` to this peer will return `Ok(false)`.
    pub fn refuse(&self, node_id: impl Into<NodeId>) {
        self.refused.write().insert(node_id.into());
    }

    /// `connect` and `send_to_peer` for this peer will fail.
    pub fn make_unreachable(&self, node_id: impl Into<NodeId>) {
        self.unreachable.write().insert(node_id.into());
    }

    /// Every subsequent `discover_peers` call fails with `reason`.
    pub fn fail_discovery(&self, reason: impl Into<String>) {
        *self.discovery_failure.write() = Some(reason.into());
    }

    /// Whether the peer is currently connected.
    pub fn is_connected(&self, node_id: &str) -> bool {
        self.connected.read().contains(node_id)
    }

    /// Currently connected peers, sorted.
    pub fn connected_peers(&self) -> Vec<NodeId> {
        self.connected.read().iter().cloned().collect()
    }

    /// Every `(peer, signal)` pair delivered so far, in delivery order.
    pub fn sent(&self) -> Vec<(NodeId, Signal)> {
        self.sent.lock().clone()
    }

    /// Number of signals delivered to one peer.
    pub fn sent_to(&self, node_id: &str) -> usize {
        self.sent.lock().iter().filter(|(peer, _)| peer == node_id).count()
    }

    /// Forgets the delivery log.
    pub fn clear_sent(&self) {
        self.sent.lock().clear();
    }
}

#[async_trait]
impl PeerTransport for MemoryTransport {
    async fn discover_peers(&self) -> Result<Vec<NodeInfo>, TransportError> {
        if let Some(reason) = self.discovery_failure.read().clone() {
            return Err(TransportError::DiscoveryFailed(reason));
        }
        Ok(self.discoverable.read().clone())
    }

    async fn connect(&self, node_id: &str) -> Result<bool, TransportError> {
        if self.unreachable.read().contains(node_id) {
            return Err(TransportError::ConnectionFailed {
                peer: node_id.to_string(),
                reason: "peer unreachable".into(),
            });
        }
        if self.refused.read().contains(node_id) {
            return Ok(false);
        }
        self.connected.write().insert(node_id.to_string());
        Ok(true)
    }

    async fn disconnect(&self, node_id: &str) -> Result<(), TransportError> {
        self.connected.write().remove(node_id);
        Ok(())
    }

    async fn send_to_peer(&self, node_id: &str, signal: &Signal) -> Result<(), TransportError> {
        if self.unreachable.read().contains(node_id) {
            return Err(TransportError::SendFailed {
                peer: node_id.to_string(),
                reason: "peer unreachable".into(),
            });
        }
        if !self.connected.read().contains(node_id) {
            return Err(TransportError::UnknownPeer(node_id.to_string()));
        }
        self.sent.lock().push((node_id.to_string(), signal.clone()));
        Ok(())
    }

    async fn list_peers(&self) -> Result<Vec<NodeId>, TransportError> {
        Ok(self.connected_peers())
    }
}
