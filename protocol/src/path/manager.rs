//! # Hyphal Path Manager
//!
//! Owns every path this node maintains towards other nodes. Several paths
//! per destination can be alive at once (multi-path), bounded by
//! `max_paths_per_destination`; when a new one arrives at the limit the
//! weakest existing path is evicted.
//!
//! Path health moves through a small state machine (see
//! [`PathState`](super::PathState)). Metric reports move paths between
//! `active`, `stressed` and `dying`; the periodic health check walks
//! inactive paths down `active → dormant → dying → dead` one step per
//! check, removing them once they are dead.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::events::{EventBus, MeshEvent};
use crate::types::{NodeId, PathId};

use super::probe::PathProber;
use super::types::{MetricsUpdate, Path, PathRemovalReason, PathState};

/// Reliability below which a path is considered dying.
const DYING_RELIABILITY: f64 = 0.3;
/// Packet loss above which a path is considered dying.
const DYING_LOSS_PCT: f64 = 50.0;
/// Reliability below which a path is considered stressed.
const STRESSED_RELIABILITY: f64 = 0.5;
/// Packet loss above which a path is considered stressed.
const STRESSED_LOSS_PCT: f64 = 20.0;

/// Tunable parameters of the path manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    /// Maximum simultaneously active/growing paths per destination.
    pub max_paths_per_destination: usize,
    /// Inactivity after which a path starts decaying, in milliseconds.
    pub path_timeout_ms: u64,
    /// Interval of the periodic health check, in milliseconds.
    pub health_check_interval_ms: u64,
    /// Reliability required to (re)enter the `active` state.
    pub min_reliability: f64,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            max_paths_per_destination: crate::config::DEFAULT_MAX_PATHS_PER_DESTINATION,
            path_timeout_ms: crate::config::DEFAULT_PATH_TIMEOUT_MS,
            health_check_interval_ms: crate::config::DEFAULT_HEALTH_CHECK_INTERVAL_MS,
            min_reliability: crate::config::DEFAULT_MIN_PATH_RELIABILITY,
        }
    }
}

/// Outcome of one health-check sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthCheckReport {
    /// Paths that moved one step down the decay ladder but are still alive.
    pub decayed: Vec<PathId>,
    /// Paths that reached `dead` and were removed.
    pub removed: Vec<PathId>,
}

/// Multi-path connection state for one local node.
pub struct HyphalPathManager {
    local_id: NodeId,
    config: PathConfig,
    prober: Arc<dyn PathProber>,
    paths: RwLock<HashMap<PathId, Path>>,
    events: EventBus,
}

impl HyphalPathManager {
    /// Creates a manager for paths originating at `local_id`.
    pub fn new(
        local_id: impl Into<NodeId>,
        config: PathConfig,
        prober: Arc<dyn PathProber>,
        events: EventBus,
    ) -> Self {
        Self {
            local_id: local_id.into(),
            config,
            prober,
            paths: RwLock::new(HashMap::new()),
            events,
        }
    }

    /// Establishes a path to `destination` through `hops`.
    ///
    /// Identical requests are idempotent: if a path with the same
    /// `(source, hops, destination)` already exists it is returned as-is.
    /// When the destination already has `max_paths_per_destination`
    /// active/growing paths, the lowest-scoring one is evicted first.
    pub async fn establish_path(&self, destination: &str, hops: Vec<NodeId>) -> Path {
        let (path, evicted) = {
            let mut paths = self.paths.write();

            if let Some(existing) = paths
                .values()
                .find(|p| p.same_route(&self.local_id, &hops, destination))
            {
                debug!(path_id = %existing.id, destination, "path already established");
                return existing.clone();
            }

            let evicted = self.evict_if_full(&mut paths, destination);

            let path = Path::growing(self.local_id.clone(), destination.to_string(), hops);
            paths.insert(path.id.clone(), path.clone());
            (path, evicted)
        };

        if let Some(evicted) = evicted {
            info!(path_id = %evicted.id, destination, "evicted weakest path to make room");
            self.events.emit(MeshEvent::PathDied {
                path_id: evicted.id,
                destination: evicted.destination,
                reason: PathRemovalReason::Evicted,
            });
        }

        let metrics = self.prober.probe(&path).await;

        let established = {
            let mut paths = self.paths.write();
            match paths.get_mut(&path.id) {
                Some(entry) => {
                    entry.metrics = metrics;
                    entry.state = PathState::Active;
                    entry.last_activity = Utc::now();
                    entry.clone()
                }
                // Removed while we were probing; report it as measured.
                None => Path {
                    metrics,
                    ..path
                },
            }
        };

        info!(
            path_id = %established.id,
            destination,
            hops = established.hops.len(),
            reliability = established.metrics.reliability,
            "path established"
        );
        self.events.emit(MeshEvent::PathEstablished {
            path: established.clone(),
        });

        established
    }

    /// The highest-scoring `active` path to `destination`.
    ///
    /// Ties go to the lowest path id so the answer is stable.
    pub fn get_best_path(&self, destination: &str) -> Option<Path> {
        let paths = self.paths.read();
        paths
            .values()
            .filter(|p| p.destination == destination && p.state == PathState::Active)
            .max_by(|a, b| a.score().total_cmp(&b.score()).then_with(|| b.id.cmp(&a.id)))
            .cloned()
    }

    /// Every `active` path to `destination`, best first.
    pub fn get_all_paths(&self, destination: &str) -> Vec<Path> {
        let paths = self.paths.read();
        let mut active: Vec<Path> = paths
            .values()
            .filter(|p| p.destination == destination && p.state == PathState::Active)
            .cloned()
            .collect();
        active.sort_by(|a, b| b.score().total_cmp(&a.score()).then_with(|| a.id.cmp(&b.id)));
        active
    }

    /// Merges a metrics report into a path and re-evaluates its state.
    ///
    /// Returns the updated path, or `None` if the id is unknown.
    pub fn update_metrics(&self, path_id: &str, update: MetricsUpdate) -> Option<Path> {
        let (before, after) = {
            let mut paths = self.paths.write();
            let path = paths.get_mut(path_id)?;
            let before = path.state;

            path.metrics.merge(&update);
            path.last_activity = Utc::now();
            path.state = self.evaluate(path);
            (before, path.clone())
        };

        self.announce_transition(before, &after);
        Some(after)
    }

    /// Re-measures a path and restores it to `active` if it is good enough.
    ///
    /// Dead paths cannot be healed; the caller has to establish a new one.
    /// Returns whether the path is `active` afterwards.
    pub async fn heal_path(&self, path_id: &str) -> bool {
        let snapshot = {
            let paths = self.paths.read();
            match paths.get(path_id) {
                Some(p) if p.state != PathState::Dead => p.clone(),
                _ => return false,
            }
        };

        let metrics = self.prober.probe(&snapshot).await;

        let (before, after) = {
            let mut paths = self.paths.write();
            let Some(path) = paths.get_mut(path_id) else {
                return false;
            };
            if path.state == PathState::Dead {
                return false;
            }

            let before = path.state;
            path.metrics = metrics;
            path.last_activity = Utc::now();
            if path.metrics.reliability >= self.config.min_reliability {
                path.state = PathState::Active;
            }
            (before, path.clone())
        };

        if after.state == PathState::Active && before != PathState::Active {
            info!(path_id, "path healed");
            self.events.emit(MeshEvent::PathHealed {
                path_id: after.id.clone(),
                destination: after.destination.clone(),
                metrics: after.metrics,
            });
        }

        after.state == PathState::Active
    }

    /// Marks traffic on a path without changing its metrics.
    pub fn record_activity(&self, path_id: &str) -> bool {
        match self.paths.write().get_mut(path_id) {
            Some(path) => {
                path.last_activity = Utc::now();
                true
            }
            None => false,
        }
    }

    /// Tears a path down explicitly.
    pub fn remove_path(&self, path_id: &str) -> Option<Path> {
        let removed = self.paths.write().remove(path_id)?;
        self.events.emit(MeshEvent::PathDied {
            path_id: removed.id.clone(),
            destination: removed.destination.clone(),
            reason: PathRemovalReason::Closed,
        });
        Some(removed)
    }

    /// Runs one health check using the current time.
    pub fn run_health_check(&self) -> HealthCheckReport {
        self.run_health_check_at(Utc::now())
    }

    /// Runs one health check as of `now`.
    ///
    /// Every path idle for longer than `path_timeout_ms` moves one step down
    /// the decay ladder. Paths reaching `dead` are removed.
    pub fn run_health_check_at(&self, now: DateTime<Utc>) -> HealthCheckReport {
        let timeout = chrono::Duration::milliseconds(self.config.path_timeout_ms as i64);
        let mut report = HealthCheckReport::default();
        let mut transitions = Vec::new();

        {
            let mut paths = self.paths.write();
            for path in paths.values_mut() {
                if now - path.last_activity <= timeout {
                    continue;
                }
                let before = path.state;
                path.state = before.decayed();
                transitions.push((before, path.clone()));
            }
            for (_, path) in &transitions {
                if path.state == PathState::Dead {
                    paths.remove(&path.id);
                }
            }
        }

        for (before, path) in transitions {
            if path.state == PathState::Dead {
                info!(path_id = %path.id, destination = %path.destination, "path died");
                self.events.emit(MeshEvent::PathDied {
                    path_id: path.id.clone(),
                    destination: path.destination.clone(),
                    reason: PathRemovalReason::Decayed,
                });
                report.removed.push(path.id);
            } else {
                debug!(path_id = %path.id, from = ?before, to = ?path.state, "path decayed");
                self.events.emit(MeshEvent::PathDegraded {
                    path_id: path.id.clone(),
                    destination: path.destination.clone(),
                    from: before,
                    to: path.state,
                    metrics: path.metrics,
                });
                report.decayed.push(path.id);
            }
        }

        report
    }

    /// Drives the periodic health check until `shutdown` flips to `true`.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let period = std::time::Duration::from_millis(self.config.health_check_interval_ms);
        let mut interval = tokio::time::interval(period);
        interval.tick().await;

        info!(local_id = %self.local_id, "path health loop starting");
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let report = self.run_health_check();
                    if !report.decayed.is_empty() || !report.removed.is_empty() {
                        debug!(
                            decayed = report.decayed.len(),
                            removed = report.removed.len(),
                            "health check completed"
                        );
                    }
                }
                res = shutdown.changed() => {
                    if res.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!(local_id = %self.local_id, "path health loop stopped");
    }

    /// A copy of the path with this id, in whatever state it is in.
    ///
    /// Returns `None` once the path has been removed, either explicitly or
    /// by the health loop after it died.
    pub fn get_path(&self, path_id: &str) -> Option<Path> {
        self.paths.read().get(path_id).cloned()
    }

    /// Every path regardless of state.
    pub fn all_paths(&self) -> Vec<Path> {
        self.paths.read().values().cloned().collect()
    }

    /// Number of tracked paths, dying ones included.
    pub fn path_count(&self) -> usize {
        self.paths.read().len()
    }

    /// Id of the node every managed path starts from.
    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    /// Limits and timings this manager was built with.
    pub fn config(&self) -> &PathConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    /// Picks the state implied by a path's metrics.
    fn evaluate(&self, path: &Path) -> PathState {
        let m = &path.metrics;
        if path.state == PathState::Dead {
            PathState::Dead
        } else if m.reliability < DYING_RELIABILITY || m.packet_loss_pct > DYING_LOSS_PCT {
            PathState::Dying
        } else if m.reliability < STRESSED_RELIABILITY || m.packet_loss_pct > STRESSED_LOSS_PCT {
            PathState::Stressed
        } else if m.reliability >= self.config.min_reliability {
            PathState::Active
        } else {
            path.state
        }
    }

    fn announce_transition(&self, before: PathState, path: &Path) {
        if before == path.state {
            return;
        }
        match path.state {
            PathState::Stressed | PathState::Dying => {
                info!(path_id = %path.id, from = ?before, to = ?path.state, "path degraded");
                self.events.emit(MeshEvent::PathDegraded {
                    path_id: path.id.clone(),
                    destination: path.destination.clone(),
                    from: before,
                    to: path.state,
                    metrics: path.metrics,
                });
            }
            PathState::Active if before != PathState::Growing => {
                info!(path_id = %path.id, from = ?before, "path healed");
                self.events.emit(MeshEvent::PathHealed {
                    path_id: path.id.clone(),
                    destination: path.destination.clone(),
                    metrics: path.metrics,
                });
            }
            _ => {}
        }
    }

    /// Removes the weakest live path to `destination` when it is at the limit.
    ///
    /// Ties are broken by age: the oldest of the equally weak paths goes.
    fn evict_if_full(&self, paths: &mut HashMap<PathId, Path>, destination: &str) -> Option<Path> {
        let live: Vec<&Path> = paths
            .values()
            .filter(|p| p.destination == destination && p.state.is_live())
            .collect();

        if live.len() < self.config.max_paths_per_destination {
            return None;
        }

        let weakest = live
            .into_iter()
            .min_by(|a, b| {
                a.score()
                    .total_cmp(&b.score())
                    .then_with(|| a.established_at.cmp(&b.established_at))
                    .then_with(|| a.id.cmp(&b.id))
            })?
            .id
            .clone();

        paths.remove(&weakest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::StaticProber;
    use crate::path::PathMetrics;

    fn manager_with(config: PathConfig) -> (HyphalPathManager, EventBus) {
        let events = EventBus::new(64);
        let manager = HyphalPathManager::new(
            "local",
            config,
            Arc::new(StaticProber::healthy()),
            events.clone(),
        );
        (manager, events)
    }

    fn manager() -> (HyphalPathManager, EventBus) {
        manager_with(PathConfig::default())
    }

    fn drain(rx: &mut tokio::sync::broadcast::Receiver<MeshEvent>) -> Vec<MeshEvent> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev);
        }
        out
    }

    #[tokio::test]
    async fn establish_is_idempotent() {
        let (mgr, _events) = manager();

        let first = mgr.establish_path("dest", vec!["relay".into()]).await;
        let second = mgr.establish_path("dest", vec!["relay".into()]).await;

        assert_eq!(first.id, second.id);
        assert_eq!(mgr.path_count(), 1);
        assert_eq!(first.state, PathState::Active);
    }

    #[tokio::test]
    async fn different_hops_make_different_paths() {
        let (mgr, _events) = manager();
        let a = mgr.establish_path("dest", vec![]).await;
        let b = mgr.establish_path("dest", vec!["relay".into()]).await;
        assert_ne!(a.id, b.id);
        assert_eq!(mgr.get_all_paths("dest").len(), 2);
    }

    #[tokio::test]
    async fn establish_emits_event() {
        let (mgr, events) = manager();
        let mut rx = events.subscribe();

        let path = mgr.establish_path("dest", vec![]).await;

        match rx.recv().await.unwrap() {
            MeshEvent::PathEstablished { path: announced } => assert_eq!(announced.id, path.id),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn limit_evicts_lowest_scoring_path() {
        let (mgr, events) = manager_with(PathConfig {
            max_paths_per_destination: 3,
            ..PathConfig::default()
        });

        let p1 = mgr.establish_path("dest", vec!["a".into()]).await;
        let p2 = mgr.establish_path("dest", vec!["b".into()]).await;
        let p3 = mgr.establish_path("dest", vec!["c".into()]).await;

        // Make p2 clearly the weakest while keeping it active.
        mgr.update_metrics(&p2.id, MetricsUpdate {
            latency_ms: Some(450.0),
            ..MetricsUpdate::default()
        });

        let mut rx = events.subscribe();
        let p4 = mgr.establish_path("dest", vec!["d".into()]).await;

        let live = mgr.get_all_paths("dest");
        assert_eq!(live.len(), 3);
        assert!(mgr.get_path(&p2.id).is_none());
        for kept in [&p1, &p3, &p4] {
            assert!(mgr.get_path(&kept.id).is_some());
        }

        let died: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter(|e| matches!(e, MeshEvent::PathDied { reason: PathRemovalReason::Evicted, .. }))
            .collect();
        assert_eq!(died.len(), 1);
    }

    #[tokio::test]
    async fn best_path_prefers_higher_score() {
        let (mgr, _events) = manager();
        let slow = mgr.establish_path("dest", vec!["x".into()]).await;
        let fast = mgr.establish_path("dest", vec!["y".into()]).await;

        mgr.update_metrics(&slow.id, MetricsUpdate {
            latency_ms: Some(300.0),
            ..MetricsUpdate::default()
        });

        assert_eq!(mgr.get_best_path("dest").unwrap().id, fast.id);
        assert!(mgr.get_best_path("elsewhere").is_none());
    }

    #[tokio::test]
    async fn best_path_tie_goes_to_lowest_id() {
        let (mgr, _events) = manager();
        let a = mgr.establish_path("dest", vec!["x".into()]).await;
        let b = mgr.establish_path("dest", vec!["y".into()]).await;

        let expected = if a.id < b.id { a.id } else { b.id };
        assert_eq!(mgr.get_best_path("dest").unwrap().id, expected);
    }

    #[tokio::test]
    async fn metric_reports_drive_state_machine() {
        let (mgr, events) = manager();
        let path = mgr.establish_path("dest", vec![]).await;
        let mut rx = events.subscribe();

        let stressed = mgr
            .update_metrics(&path.id, MetricsUpdate::reliability(0.45))
            .unwrap();
        assert_eq!(stressed.state, PathState::Stressed);

        let dying = mgr
            .update_metrics(&path.id, MetricsUpdate::packet_loss(60.0))
            .unwrap();
        assert_eq!(dying.state, PathState::Dying);

        let healed = mgr
            .update_metrics(&path.id, MetricsUpdate {
                reliability: Some(0.9),
                packet_loss_pct: Some(1.0),
                ..MetricsUpdate::default()
            })
            .unwrap();
        assert_eq!(healed.state, PathState::Active);

        let names: Vec<_> = drain(&mut rx).iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["path:degraded", "path:degraded", "path:healed"]);
    }

    #[tokio::test]
    async fn severe_degradation_skips_stressed() {
        let (mgr, _events) = manager();
        let path = mgr.establish_path("dest", vec![]).await;
        let updated = mgr
            .update_metrics(&path.id, MetricsUpdate::reliability(0.1))
            .unwrap();
        assert_eq!(updated.state, PathState::Dying);
    }

    #[tokio::test]
    async fn mediocre_reliability_keeps_state() {
        // 0.6 is neither stressed nor good enough for the 0.7 minimum.
        let (mgr, _events) = manager();
        let path = mgr.establish_path("dest", vec![]).await;
        mgr.update_metrics(&path.id, MetricsUpdate::reliability(0.45));
        let updated = mgr
            .update_metrics(&path.id, MetricsUpdate::reliability(0.6))
            .unwrap();
        assert_eq!(updated.state, PathState::Stressed);
    }

    #[test]
    fn unknown_path_update_returns_none() {
        let (mgr, _events) = manager();
        assert!(mgr.update_metrics("nope", MetricsUpdate::reliability(1.0)).is_none());
    }

    #[tokio::test]
    async fn heal_restores_active_state() {
        let (mgr, events) = manager();
        let path = mgr.establish_path("dest", vec![]).await;
        mgr.update_metrics(&path.id, MetricsUpdate::reliability(0.4));

        let mut rx = events.subscribe();
        assert!(mgr.heal_path(&path.id).await);
        assert_eq!(mgr.get_path(&path.id).unwrap().state, PathState::Active);
        assert_eq!(rx.recv().await.unwrap().name(), "path:healed");
    }

    #[tokio::test]
    async fn heal_fails_when_probe_is_poor() {
        let events = EventBus::new(16);
        let mgr = HyphalPathManager::new(
            "local",
            PathConfig::default(),
            Arc::new(StaticProber::new(PathMetrics {
                latency_ms: 100.0,
                bandwidth_bps: 1_000,
                packet_loss_pct: 5.0,
                reliability: 0.55,
                hop_count: 1,
            })),
            events,
        );
        let path = mgr.establish_path("dest", vec![]).await;
        mgr.update_metrics(&path.id, MetricsUpdate::reliability(0.4));

        assert!(!mgr.heal_path(&path.id).await);
        assert_ne!(mgr.get_path(&path.id).unwrap().state, PathState::Active);
    }

    #[tokio::test]
    async fn heal_unknown_or_dead_path_fails() {
        let (mgr, _events) = manager();
        assert!(!mgr.heal_path("missing").await);

        let path = mgr.establish_path("dest", vec![]).await;
        let later = Utc::now() + chrono::Duration::milliseconds(10 * 60_000);
        for _ in 0..3 {
            mgr.run_health_check_at(later);
        }
        assert!(!mgr.heal_path(&path.id).await);
    }

    #[tokio::test]
    async fn inactivity_decays_path_to_death() {
        let timeout_ms = 1_000;
        let (mgr, events) = manager_with(PathConfig {
            path_timeout_ms: timeout_ms,
            ..PathConfig::default()
        });
        let path = mgr.establish_path("dest", vec![]).await;
        let mut rx = events.subscribe();

        let start = path.last_activity;
        let at = |n: i64| start + chrono::Duration::milliseconds(n * timeout_ms as i64 + 1);

        // Still fresh: nothing happens.
        assert_eq!(mgr.run_health_check_at(start), HealthCheckReport::default());

        mgr.run_health_check_at(at(1));
        assert_eq!(mgr.get_path(&path.id).unwrap().state, PathState::Dormant);

        mgr.run_health_check_at(at(2));
        assert_eq!(mgr.get_path(&path.id).unwrap().state, PathState::Dying);

        let report = mgr.run_health_check_at(at(3));
        assert_eq!(report.removed, vec![path.id.clone()]);
        assert!(mgr.get_path(&path.id).is_none());

        let died = drain(&mut rx)
            .into_iter()
            .filter(|e| e.name() == "path:died")
            .count();
        assert_eq!(died, 1);
    }

    #[tokio::test]
    async fn activity_resets_decay_clock() {
        let (mgr, _events) = manager_with(PathConfig {
            path_timeout_ms: 1_000,
            ..PathConfig::default()
        });
        let path = mgr.establish_path("dest", vec![]).await;
        assert!(mgr.record_activity(&path.id));

        let fresh = mgr.get_path(&path.id).unwrap().last_activity;
        let report = mgr.run_health_check_at(fresh + chrono::Duration::milliseconds(500));
        assert!(report.decayed.is_empty());
    }

    #[tokio::test]
    async fn dormant_path_heals_on_good_report() {
        let (mgr, events) = manager_with(PathConfig {
            path_timeout_ms: 1_000,
            ..PathConfig::default()
        });
        let path = mgr.establish_path("dest", vec![]).await;
        mgr.run_health_check_at(path.last_activity + chrono::Duration::seconds(2));
        assert_eq!(mgr.get_path(&path.id).unwrap().state, PathState::Dormant);

        let mut rx = events.subscribe();
        let updated = mgr
            .update_metrics(&path.id, MetricsUpdate::reliability(0.95))
            .unwrap();
        assert_eq!(updated.state, PathState::Active);
        assert_eq!(rx.recv().await.unwrap().name(), "path:healed");
    }

    #[tokio::test]
    async fn remove_path_announces_closure() {
        let (mgr, events) = manager();
        let path = mgr.establish_path("dest", vec![]).await;
        let mut rx = events.subscribe();

        assert!(mgr.remove_path(&path.id).is_some());
        assert!(mgr.remove_path(&path.id).is_none());
        match rx.recv().await.unwrap() {
            MeshEvent::PathDied { reason, .. } => assert_eq!(reason, PathRemovalReason::Closed),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn lookups_see_paths_in_any_state() {
        let (mgr, _events) = manager();
        let path = mgr.establish_path("dest", vec![]).await;
        mgr.establish_path("other", vec![]).await;
        mgr.update_metrics(&path.id, MetricsUpdate::packet_loss(60.0));

        assert_eq!(mgr.local_id(), "local");
        assert_eq!(mgr.path_count(), 2);
        assert_eq!(mgr.get_path(&path.id).unwrap().state, PathState::Dying);

        mgr.remove_path(&path.id);
        assert!(mgr.get_path(&path.id).is_none());
        assert_eq!(mgr.path_count(), 1);
    }
}
