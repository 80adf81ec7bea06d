//! # Growth Engine
//!
//! Expands (or tidies) the local node's connection set. Every attempt runs
//! exactly one [`GrowthPattern`]; peer I/O goes through the injected
//! [`PeerTransport`] and any discovery or connection failure is recorded in
//! the attempt's error list rather than propagated.
//!
//! Attempts are rate limited by a cooldown. The last
//! [`GROWTH_HISTORY_LIMIT`](crate::config::GROWTH_HISTORY_LIMIT) results are
//! kept for success-rate reporting.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::events::{EventBus, MeshEvent};
use crate::topology::TopologySnapshot;
use crate::transport::PeerTransport;
use crate::types::NodeId;

use super::types::{GrowthDirective, GrowthPattern, GrowthResult, GrowthTarget, GrowthTargetType};

/// Health score under which the engine turns defensive.
const DEFENSIVE_HEALTH: f64 = 40.0;
/// Share of `target_size` at which the engine stops expanding.
const NEAR_TARGET_SHARE: f64 = 0.9;
/// Networks smaller than this are explored.
const SMALL_NETWORK: usize = 10;

/// Error recorded when a directive's deadline passes mid-attempt.
pub const DEADLINE_EXCEEDED: &str = "deadline exceeded";

/// Configuration for the growth engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrowthConfig {
    /// Hard cap on new connections per attempt.
    pub max_growth_rate: usize,
    /// Minimum time between attempts, in milliseconds.
    pub growth_cooldown_ms: u64,
    /// Desired network size; 0 disables the consolidation trigger.
    pub target_size: usize,
    /// Peers whose best path reliability is below this are pruned by
    /// consolidation.
    pub prune_threshold: f64,
}

impl Default for GrowthConfig {
    fn default() -> Self {
        Self {
            max_growth_rate: crate::config::DEFAULT_MAX_GROWTH_RATE,
            growth_cooldown_ms: crate::config::DEFAULT_GROWTH_COOLDOWN_MS,
            target_size: 0,
            prune_threshold: crate::config::DEFAULT_PRUNE_THRESHOLD,
        }
    }
}

/// Mutable bookkeeping of a single attempt.
#[derive(Default)]
struct Attempt {
    connected: Vec<NodeId>,
    pruned: Vec<NodeId>,
    errors: Vec<String>,
    deadline: Option<DateTime<Utc>>,
    expired: bool,
}

impl Attempt {
    fn new(deadline: Option<DateTime<Utc>>) -> Self {
        Self {
            deadline,
            ..Self::default()
        }
    }

    /// Checked before each connection attempt. Records the expiry once.
    fn past_deadline(&mut self) -> bool {
        if self.expired {
            return true;
        }
        if self.deadline.is_some_and(|d| Utc::now() > d) {
            self.expired = true;
            self.errors.push(DEADLINE_EXCEEDED.to_string());
        }
        self.expired
    }
}

/// Autonomous expansion of the connection graph.
pub struct GrowthEngine {
    local_id: NodeId,
    config: GrowthConfig,
    transport: Arc<dyn PeerTransport>,
    targets: RwLock<BTreeMap<NodeId, GrowthTarget>>,
    snapshot: RwLock<Option<Arc<TopologySnapshot>>>,
    history: RwLock<VecDeque<GrowthResult>>,
    last_attempt: Mutex<Option<DateTime<Utc>>>,
    events: EventBus,
}

impl GrowthEngine {
    pub fn new(
        local_id: impl Into<NodeId>,
        config: GrowthConfig,
        transport: Arc<dyn PeerTransport>,
        events: EventBus,
    ) -> Self {
        Self {
            local_id: local_id.into(),
            config,
            transport,
            targets: RwLock::new(BTreeMap::new()),
            snapshot: RwLock::new(None),
            history: RwLock::new(VecDeque::new()),
            last_attempt: Mutex::new(None),
            events,
        }
    }

    // ---- Target pool ----

    /// Adds a target, replacing any existing one with the same id.
    pub fn add_target(&self, target: GrowthTarget) {
        self.targets.write().insert(target.id.clone(), target);
    }

    pub fn remove_target(&self, target_id: &str) -> Option<GrowthTarget> {
        self.targets.write().remove(target_id)
    }

    /// Targets still waiting, highest priority first, then best
    /// benefit-to-cost margin, then id.
    pub fn pending_targets(&self) -> Vec<GrowthTarget> {
        let mut targets: Vec<GrowthTarget> = self.targets.read().values().cloned().collect();
        targets.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| (b.benefit - b.cost).total_cmp(&(a.benefit - a.cost)))
                .then_with(|| a.id.cmp(&b.id))
        });
        targets
    }

    /// Hands the engine the latest topology snapshot.
    pub fn update_topology(&self, snapshot: Arc<TopologySnapshot>) {
        *self.snapshot.write() = Some(snapshot);
    }

    // ---- Policy ----

    /// Picks a pattern for the given network state.
    ///
    /// In order: low health is defensive, a network near its target size
    /// consolidates, a small network explores, pending targets are pursued
    /// directly, and everything else grows organically.
    pub fn recommend_pattern(&self, health: f64, node_count: usize) -> GrowthPattern {
        if health < DEFENSIVE_HEALTH {
            GrowthPattern::Defensive
        } else if self.config.target_size > 0
            && node_count as f64 > NEAR_TARGET_SHARE * self.config.target_size as f64
        {
            GrowthPattern::Consolidation
        } else if node_count < SMALL_NETWORK {
            GrowthPattern::Exploratory
        } else if self
            .targets
            .read()
            .values()
            .any(|t| t.target_type.is_dialable())
        {
            GrowthPattern::Directed
        } else {
            GrowthPattern::Organic
        }
    }

    pub fn can_grow(&self) -> bool {
        self.can_grow_at(Utc::now())
    }

    /// Whether the cooldown since the last attempt has elapsed at `now`.
    pub fn can_grow_at(&self, now: DateTime<Utc>) -> bool {
        match *self.last_attempt.lock() {
            None => true,
            Some(last) => {
                now - last >= chrono::Duration::milliseconds(self.config.growth_cooldown_ms as i64)
            }
        }
    }

    /// Runs the recommended pattern if the cooldown allows it.
    pub async fn auto_grow(&self, health: f64, node_count: usize) -> Option<GrowthResult> {
        if !self.can_grow() {
            debug!("growth cooldown active, skipping");
            return None;
        }

        let pattern = self.recommend_pattern(health, node_count);
        let mut directive = GrowthDirective::new(pattern, self.config.max_growth_rate);
        if pattern == GrowthPattern::Directed {
            directive.targets = self
                .pending_targets()
                .into_iter()
                .filter(|t| t.target_type.is_dialable())
                .map(|t| t.id)
                .collect();
        }

        Some(self.initiate_growth(directive).await)
    }

    // ---- Execution ----

    /// Executes one directive and records the outcome.
    pub async fn initiate_growth(&self, directive: GrowthDirective) -> GrowthResult {
        *self.last_attempt.lock() = Some(Utc::now());
        let started = std::time::Instant::now();

        info!(directive_id = %directive.id, pattern = %directive.pattern, "growth started");
        self.events.emit(MeshEvent::GrowthStarted {
            directive_id: directive.id.clone(),
            pattern: directive.pattern,
        });

        let limit = directive.max_connections.min(self.config.max_growth_rate);
        let mut attempt = Attempt::new(directive.deadline);

        match directive.pattern {
            GrowthPattern::Organic => self.grow_organic(limit, &mut attempt).await,
            GrowthPattern::Directed => {
                self.grow_directed(&directive.targets, limit, &mut attempt)
                    .await
            }
            GrowthPattern::Defensive => self.grow_defensive(limit, &mut attempt).await,
            GrowthPattern::Exploratory => self.grow_exploratory(limit, &mut attempt).await,
            GrowthPattern::Consolidation => self.consolidate(&mut attempt).await,
        }

        let new_connections = attempt.connected.len();
        let result = GrowthResult {
            directive_id: directive.id,
            pattern: directive.pattern,
            success: new_connections > 0 && attempt.errors.is_empty(),
            new_connections,
            connected: attempt.connected,
            pruned_connections: attempt.pruned.len(),
            pruned: attempt.pruned,
            duration_ms: started.elapsed().as_millis() as u64,
            errors: attempt.errors,
            completed_at: Utc::now(),
        };

        {
            let mut history = self.history.write();
            history.push_back(result.clone());
            while history.len() > crate::config::GROWTH_HISTORY_LIMIT {
                history.pop_front();
            }
        }

        info!(
            pattern = %result.pattern,
            success = result.success,
            new_connections = result.new_connections,
            pruned = result.pruned_connections,
            errors = result.errors.len(),
            "growth completed"
        );
        self.events.emit(MeshEvent::GrowthCompleted {
            result: result.clone(),
        });

        result
    }

    /// Fraction of recorded attempts that succeeded; 0 with no history.
    pub fn success_rate(&self) -> f64 {
        let history = self.history.read();
        if history.is_empty() {
            return 0.0;
        }
        history.iter().filter(|r| r.success).count() as f64 / history.len() as f64
    }

    /// Recorded attempts, oldest first.
    pub fn history(&self) -> Vec<GrowthResult> {
        self.history.read().iter().cloned().collect()
    }

    /// Runs `auto_grow` against the latest snapshot every `interval_ms`.
    pub async fn run(self: Arc<Self>, interval_ms: u64, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(std::time::Duration::from_millis(interval_ms));
        interval.tick().await;

        info!(interval_ms, "growth loop starting");
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let snapshot = self.snapshot.read().clone();
                    match snapshot {
                        Some(s) => {
                            self.auto_grow(s.health.score, s.node_count()).await;
                        }
                        None => debug!("no topology snapshot yet, skipping growth"),
                    }
                }
                res = shutdown.changed() => {
                    if res.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("growth loop stopped");
    }

    pub fn config(&self) -> &GrowthConfig {
        &self.config
    }

    // ---- Strategies ----

    async fn grow_organic(&self, limit: usize, attempt: &mut Attempt) {
        let candidates = self.candidates(attempt).await;
        self.connect_all(candidates, limit, attempt).await;
    }

    async fn grow_directed(&self, wanted: &[NodeId], limit: usize, attempt: &mut Attempt) {
        let eligible: Vec<NodeId> = {
            let targets = self.targets.read();
            wanted
                .iter()
                .filter(|id| {
                    targets
                        .get(*id)
                        .is_some_and(|t| t.target_type.is_dialable())
                })
                .cloned()
                .collect()
        };
        if eligible.len() < wanted.len() {
            debug!(
                skipped = wanted.len() - eligible.len(),
                "directive names targets missing from the pool"
            );
        }

        let connected: BTreeSet<NodeId> = match self.transport.list_peers().await {
            Ok(peers) => peers.into_iter().collect(),
            Err(e) => {
                attempt.errors.push(e.to_string());
                BTreeSet::new()
            }
        };

        for target_id in eligible {
            if connected.contains(&target_id) {
                debug!(peer = %target_id, "target already connected");
                self.targets.write().remove(&target_id);
                continue;
            }
            if attempt.connected.len() >= limit || attempt.past_deadline() {
                break;
            }
            if self.connect_one(&target_id, attempt).await {
                self.targets.write().remove(&target_id);
            }
        }
    }

    async fn grow_defensive(&self, limit: usize, attempt: &mut Attempt) {
        let reachable: BTreeSet<NodeId> = self
            .snapshot
            .read()
            .as_ref()
            .map(|s| s.reachable_nodes())
            .unwrap_or_default();

        let (fresh, redundant): (Vec<NodeId>, Vec<NodeId>) = self
            .candidates(attempt)
            .await
            .into_iter()
            .partition(|id| !reachable.contains(id));
        debug!(fresh = fresh.len(), redundant = redundant.len(), "defensive candidates");

        let ordered = fresh.into_iter().chain(redundant).collect();
        self.connect_all(ordered, limit, attempt).await;
    }

    async fn grow_exploratory(&self, limit: usize, attempt: &mut Attempt) {
        let candidates = self.candidates(attempt).await;
        let before = attempt.connected.len();
        self.connect_all(candidates, limit, attempt).await;

        let mut targets = self.targets.write();
        for node_id in &attempt.connected[before..] {
            targets
                .entry(node_id.clone())
                .or_insert_with(|| GrowthTarget::new(node_id.clone(), GrowthTargetType::Gateway));
        }
    }

    /// Drops connections whose best known path is too unreliable.
    async fn consolidate(&self, attempt: &mut Attempt) {
        let Some(snapshot) = self.snapshot.read().clone() else {
            debug!("no topology snapshot, nothing to consolidate");
            return;
        };

        let peers = match self.transport.list_peers().await {
            Ok(peers) => peers,
            Err(e) => {
                attempt.errors.push(e.to_string());
                return;
            }
        };

        for peer in peers {
            let weak = snapshot
                .best_reliability_to(&peer)
                .is_some_and(|r| r < self.config.prune_threshold);
            if !weak {
                continue;
            }
            match self.transport.disconnect(&peer).await {
                Ok(()) => {
                    debug!(peer = %peer, "pruned weak connection");
                    attempt.pruned.push(peer);
                }
                Err(e) => attempt.errors.push(e.to_string()),
            }
        }
    }

    // ---- Helpers ----

    /// Discovered peers minus ourselves and current connections, in
    /// discovery order.
    async fn candidates(&self, attempt: &mut Attempt) -> Vec<NodeId> {
        let discovered = match self.transport.discover_peers().await {
            Ok(nodes) => nodes,
            Err(e) => {
                warn!(error = %e, "peer discovery failed");
                attempt.errors.push(e.to_string());
                return Vec::new();
            }
        };

        let connected: BTreeSet<NodeId> = match self.transport.list_peers().await {
            Ok(peers) => peers.into_iter().collect(),
            Err(e) => {
                attempt.errors.push(e.to_string());
                BTreeSet::new()
            }
        };

        discovered
            .into_iter()
            .map(|n| n.id)
            .filter(|id| *id != self.local_id && !connected.contains(id))
            .collect()
    }

    async fn connect_all(&self, candidates: Vec<NodeId>, limit: usize, attempt: &mut Attempt) {
        for node_id in candidates {
            if attempt.connected.len() >= limit || attempt.past_deadline() {
                break;
            }
            self.connect_one(&node_id, attempt).await;
        }
    }

    async fn connect_one(&self, node_id: &str, attempt: &mut Attempt) -> bool {
        match self.transport.connect(node_id).await {
            Ok(true) => {
                attempt.connected.push(node_id.to_string());
                true
            }
            Ok(false) => {
                debug!(peer = node_id, "peer declined connection");
                false
            }
            Err(e) => {
                warn!(peer = node_id, error = %e, "connection attempt failed");
                attempt.errors.push(e.to_string());
                false
            }
        }
    }
}
