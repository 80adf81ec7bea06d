//! Path measurement strategies.
//!
//! The path manager never measures anything itself. It asks a
//! [`PathProber`] for fresh metrics whenever a path is established or
//! healed, which keeps the state machine independent of how probing
//! actually happens (ICMP, application-level pings, a simulator...).

use async_trait::async_trait;
use rand::Rng;

use super::types::{Path, PathMetrics};

/// Source of path measurements.
#[async_trait]
pub trait PathProber: Send + Sync {
    /// Measures the path as it currently stands.
    async fn probe(&self, path: &Path) -> PathMetrics;
}

/// Synthetic measurements: a per-segment latency/reliability model with
/// random jitter. Used when no real probing layer is wired in.
#[derive(Debug, Clone)]
pub struct SimulatedProber {
    /// Fixed latency added to every path.
    pub base_latency_ms: f64,
    /// Latency added per segment.
    pub per_segment_latency_ms: f64,
    /// Upper bound of the uniform latency jitter.
    pub jitter_ms: f64,
    /// Reliability of a direct (single-segment) path.
    pub base_reliability: f64,
    /// Reliability lost per intermediate hop.
    pub per_hop_reliability_loss: f64,
    /// Bandwidth of a direct path; divided across segments.
    pub bandwidth_bps: u64,
}

impl Default for SimulatedProber {
    fn default() -> Self {
        Self {
            base_latency_ms: 10.0,
            per_segment_latency_ms: 20.0,
            jitter_ms: 15.0,
            base_reliability: 0.97,
            per_hop_reliability_loss: 0.04,
            bandwidth_bps: 50_000_000,
        }
    }
}

#[async_trait]
impl PathProber for SimulatedProber {
    async fn probe(&self, path: &Path) -> PathMetrics {
        let mut rng = rand::thread_rng();
        let segments = path.hops.len() + 1;

        let jitter = if self.jitter_ms > 0.0 {
            rng.gen_range(0.0..self.jitter_ms)
        } else {
            0.0
        };
        let latency_ms =
            self.base_latency_ms + self.per_segment_latency_ms * segments as f64 + jitter;

        let noise: f64 = rng.gen_range(-0.02..0.02);
        let reliability = (self.base_reliability
            - self.per_hop_reliability_loss * path.hops.len() as f64
            + noise)
            .clamp(0.0, 1.0);

        let packet_loss_pct = rng.gen_range(0.0..1.0) * segments as f64;

        PathMetrics {
            latency_ms,
            bandwidth_bps: self.bandwidth_bps / segments as u64,
            packet_loss_pct,
            reliability,
            hop_count: segments,
        }
    }
}

/// Always reports the same metrics (with the hop count of the probed path).
#[derive(Debug, Clone)]
pub struct StaticProber {
    metrics: PathMetrics,
}

impl StaticProber {
    pub fn new(metrics: PathMetrics) -> Self {
        Self { metrics }
    }

    /// A prober reporting a healthy 20ms, 10Mbps, lossless path.
    pub fn healthy() -> Self {
        Self::new(PathMetrics {
            latency_ms: 20.0,
            bandwidth_bps: 10_000_000,
            packet_loss_pct: 0.0,
            reliability: 0.95,
            hop_count: 1,
        })
    }
}

#[async_trait]
impl PathProber for StaticProber {
    async fn probe(&self, path: &Path) -> PathMetrics {
        PathMetrics {
            hop_count: path.hops.len() + 1,
            ..self.metrics
        }
    }
}
