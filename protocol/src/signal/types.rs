//! Signal values and their wire encoding.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CodecError;
use crate::types::NodeId;

/// Per-process counter mixed into signal ids so two broadcasts with the
/// same content in the same millisecond still get distinct ids.
static SIGNAL_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Category of a gossip signal. Handlers are registered per type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalType {
    /// Peer announcements.
    Discovery,
    /// Liveness pings.
    Heartbeat,
    /// Topology summaries shared between nodes.
    Topology,
    /// Growth coordination.
    Growth,
    /// Governance traffic, opaque to the mesh.
    Governance,
    /// Operator or health alerts.
    Alert,
    /// Application-defined type.
    Custom(String),
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Discovery => f.write_str("discovery"),
            Self::Heartbeat => f.write_str("heartbeat"),
            Self::Topology => f.write_str("topology"),
            Self::Growth => f.write_str("growth"),
            Self::Governance => f.write_str("governance"),
            Self::Alert => f.write_str("alert"),
            Self::Custom(name) => write!(f, "custom:{name}"),
        }
    }
}

/// A broadcast message travelling through the mesh.
///
/// Signals are immutable. Forwarding produces a new value with a lower
/// `ttl` but the same `id`, so every copy deduplicates against the first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    /// Hex-encoded BLAKE3 digest; the deduplication key.
    pub id: String,
    pub signal_type: SignalType,
    /// Node that originated the broadcast.
    pub origin: NodeId,
    /// Opaque application bytes.
    pub payload: Vec<u8>,
    /// Remaining hop budget.
    pub ttl: u32,
    pub timestamp: DateTime<Utc>,
    /// Signature supplied by an external signing layer, if any.
    pub signature: Option<Vec<u8>>,
}

impl Signal {
    /// Creates a fresh signal with a unique id.
    pub fn new(
        signal_type: SignalType,
        origin: impl Into<NodeId>,
        payload: Vec<u8>,
        ttl: u32,
    ) -> Self {
        let origin = origin.into();
        let timestamp = Utc::now();
        let sequence = SIGNAL_SEQUENCE.fetch_add(1, Ordering::Relaxed);

        let mut hasher = blake3::Hasher::new();
        hasher.update(origin.as_bytes());
        hasher.update(signal_type.to_string().as_bytes());
        hasher.update(&timestamp.timestamp_millis().to_le_bytes());
        hasher.update(&sequence.to_le_bytes());
        hasher.update(&payload);
        let id = hex::encode(hasher.finalize().as_bytes());

        Self {
            id,
            signal_type,
            origin,
            payload,
            ttl,
            timestamp,
            signature: None,
        }
    }

    /// Attaches an externally produced signature.
    pub fn with_signature(mut self, signature: Vec<u8>) -> Self {
        self.signature = Some(signature);
        self
    }

    /// The copy to relay onwards, or `None` once the hop budget is spent.
    ///
    /// A signal arriving with `ttl <= 1` is processed locally but not
    /// forwarded.
    pub fn forwarded(&self) -> Option<Signal> {
        if self.ttl > 1 {
            Some(Signal {
                ttl: self.ttl - 1,
                ..self.clone()
            })
        } else {
            None
        }
    }

    /// Serializes the signal for the transport.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        bincode::serialize(self).map_err(|e| CodecError::Encode(e.to_string()))
    }

    /// Parses a signal received from the transport.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        bincode::deserialize(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }
}
