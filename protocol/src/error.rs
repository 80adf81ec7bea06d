//! Error types shared across the mesh components.
//!
//! Very little in Hypha is an error in the `Result` sense. Policy decisions
//! (evicting a path, skipping an unreliable edge) are plain branches, and
//! terminal-state violations (healing a dead path, routing from an unknown
//! node) come back as `None`/`false`. What remains are the two boundaries
//! where something outside our control can fail: the injected transport and
//! user-supplied configuration.

use thiserror::Error;

use crate::types::NodeId;

/// Failures reported by a [`PeerTransport`](crate::transport::PeerTransport)
/// implementation.
///
/// Always transient from the core's point of view. The caller logs the
/// failure and carries on with the remaining peers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The peer refused or dropped the connection attempt.
    #[error("connection to {peer} failed: {reason}")]
    ConnectionFailed {
        /// Peer we tried to reach.
        peer: NodeId,
        /// Transport-specific detail.
        reason: String,
    },

    /// A signal could not be delivered to the peer.
    #[error("send to {peer} failed: {reason}")]
    SendFailed {
        /// Peer we tried to send to.
        peer: NodeId,
        /// Transport-specific detail.
        reason: String,
    },

    /// The peer is not known to the transport.
    #[error("unknown peer: {0}")]
    UnknownPeer(NodeId),

    /// Peer discovery could not complete.
    #[error("peer discovery failed: {0}")]
    DiscoveryFailed(String),

    /// The transport has been shut down.
    #[error("transport is closed")]
    Closed,
}

/// A configuration value the components cannot run with.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A field is out of its accepted range.
    #[error("invalid value for {field}: {reason}")]
    Invalid {
        /// Dotted path of the offending field, e.g. `paths.min_reliability`.
        field: &'static str,
        /// What the field must satisfy.
        reason: &'static str,
    },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: &'static str) -> Self {
        Self::Invalid { field, reason }
    }
}

/// A signal could not be encoded for, or decoded from, the wire.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("signal encoding failed: {0}")]
    Encode(String),

    #[error("signal decoding failed: {0}")]
    Decode(String),
}
