//! # Simulated Peer Set
//!
//! The node binary has no wire transport of its own. It runs over a
//! [`MemoryTransport`] seeded with synthetic peers, which is enough to
//! exercise paths, gossip, topology analysis, growth and routing end to end.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use rand::seq::SliceRandom;
use rand::Rng;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use hypha_protocol::coordinator::MeshCoordinator;
use hypha_protocol::signal::SignalType;
use hypha_protocol::transport::MemoryTransport;
use hypha_protocol::types::{NodeId, NodeInfo};

/// Share of simulated peers dialed at startup; the growth engine picks up
/// the rest over time.
const BOOTSTRAP_SHARE: f64 = 0.25;

/// Interval between heartbeat broadcasts.
pub const HEARTBEAT_INTERVAL_MS: u64 = 5_000;

pub fn peer_id(index: usize) -> NodeId {
    format!("sim-peer-{index:03}")
}

/// A transport where `peers` synthetic peers are discoverable.
pub fn transport(peers: usize) -> Arc<MemoryTransport> {
    let transport = Arc::new(MemoryTransport::new());
    for i in 0..peers {
        let mut node = NodeInfo::new(peer_id(i), format!("mem://{}", peer_id(i)));
        node.resources.insert("cpu".into(), 1.0 + (i % 4) as f64);
        node.resources.insert("memory_mb".into(), 512.0 * (1 + i % 8) as f64);
        transport.add_discoverable(node);
    }
    transport
}

/// Dials the first quarter of the peer set and grows a path to each of
/// them, some routed through another bootstrap peer. Returns the number
/// of peers connected.
pub async fn bootstrap(coordinator: &MeshCoordinator, peers: usize) -> Result<usize> {
    let count = ((peers as f64 * BOOTSTRAP_SHARE).ceil() as usize).min(peers);
    let seeds: Vec<NodeId> = (0..count).map(peer_id).collect();

    let mut connected = Vec::new();
    for peer in &seeds {
        match coordinator.connect_peer(peer).await {
            Ok(true) => connected.push(peer.clone()),
            Ok(false) => debug!(peer = %peer, "bootstrap peer declined"),
            Err(e) => warn!(peer = %peer, error = %e, "bootstrap connect failed"),
        }
    }

    for (i, peer) in connected.iter().enumerate() {
        coordinator.establish_path(peer, Vec::new()).await;
        if connected.len() > 1 {
            let relay = connected[(i + 1) % connected.len()].clone();
            coordinator.establish_path(peer, vec![relay]).await;
        }
    }

    coordinator.refresh_topology();
    info!(connected = connected.len(), "simulated mesh bootstrapped");
    Ok(connected.len())
}

/// Broadcasts a heartbeat and replays a random relayed signal until
/// shutdown, so the propagator and its events stay busy.
pub async fn run_traffic(coordinator: Arc<MeshCoordinator>, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(Duration::from_millis(HEARTBEAT_INTERVAL_MS));
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let heartbeat = coordinator
                    .broadcast(SignalType::Heartbeat, coordinator.local_id().as_bytes().to_vec(), Some(2))
                    .await;
                debug!(signal_id = %heartbeat.id, "heartbeat broadcast");

                let origin = {
                    let mut rng = rand::thread_rng();
                    let peers: Vec<NodeId> = coordinator
                        .topology()
                        .nodes()
                        .into_iter()
                        .map(|n| n.id)
                        .filter(|id| id != coordinator.local_id())
                        .collect();
                    peers.choose(&mut rng).cloned().map(|p| (p, rng.gen_range(1..=4u32)))
                };
                if let Some((origin, ttl)) = origin {
                    let signal = hypha_protocol::signal::Signal::new(
                        SignalType::Discovery,
                        origin,
                        Vec::new(),
                        ttl,
                    );
                    coordinator.handle_incoming(signal).await;
                }
            }
            res = shutdown.changed() => {
                if res.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    debug!("simulated traffic stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use hypha_protocol::config::MeshConfig;
    use hypha_protocol::path::StaticProber;
    use hypha_protocol::transport::PeerTransport;

    #[tokio::test]
    async fn transport_exposes_every_peer() {
        let transport = transport(6);
        let peers = transport.discover_peers().await.unwrap();
        assert_eq!(peers.len(), 6);
        assert_eq!(peers[0].id, "sim-peer-000");
        assert!(peers[0].resources.contains_key("cpu"));
    }

    #[tokio::test]
    async fn bootstrap_connects_a_quarter_and_builds_paths() {
        let transport = transport(8);
        let mut config = MeshConfig::default();
        config.coordinator.auto_growth = false;
        let coordinator = MeshCoordinator::with_prober(
            "local",
            config,
            transport.clone(),
            Arc::new(StaticProber::healthy()),
        )
        .unwrap();

        let connected = bootstrap(&coordinator, 8).await.unwrap();

        assert_eq!(connected, 2);
        assert_eq!(transport.connected_peers().len(), 2);
        assert_eq!(coordinator.paths().path_count(), 4);
        assert!(coordinator.topology().get_node("sim-peer-001").is_some());
    }
}
