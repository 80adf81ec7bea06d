//! # Mesh Configuration & Constants
//!
//! Every default knob in Hypha lives here. Component configs (`PathConfig`,
//! `SignalConfig`, ...) are declared next to the component that consumes
//! them, but their `Default` impls pull from these constants so there is a
//! single place to look when tuning a deployment.
//!
//! [`MeshConfig`] aggregates the per-component sections into the one value
//! the coordinator is built from. Every level is `#[serde(default)]`, so a
//! config file only has to mention the fields it overrides.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::growth::GrowthConfig;
use crate::path::PathConfig;
use crate::routing::PathfinderConfig;
use crate::signal::SignalConfig;
use crate::topology::TopologyConfig;

// ---------------------------------------------------------------------------
// Path Manager Defaults
// ---------------------------------------------------------------------------

/// Maximum simultaneously active/growing paths towards one destination.
pub const DEFAULT_MAX_PATHS_PER_DESTINATION: usize = 3;

/// A path with no activity for this long starts decaying.
pub const DEFAULT_PATH_TIMEOUT_MS: u64 = 60_000;

/// How often the path manager sweeps for inactive paths.
pub const DEFAULT_HEALTH_CHECK_INTERVAL_MS: u64 = 10_000;

/// Reliability a path needs to be (re)admitted to the `active` state.
pub const DEFAULT_MIN_PATH_RELIABILITY: f64 = 0.7;

// ---------------------------------------------------------------------------
// Signal Propagator Defaults
// ---------------------------------------------------------------------------

/// Hop budget given to locally originated signals.
pub const DEFAULT_SIGNAL_TTL: u32 = 7;

/// Upper bound on the number of signal ids remembered for deduplication.
pub const DEFAULT_SEEN_CACHE_SIZE: usize = 10_000;

/// Seen-cache entries older than this are purged on the next sweep.
pub const DEFAULT_SEEN_CACHE_EXPIRY_MS: u64 = 300_000;

/// Fan-out passes allowed per second (also the bucket capacity).
pub const DEFAULT_RATE_LIMIT: u32 = 100;

/// Interval between batch flushes when batching is enabled.
pub const DEFAULT_BATCH_INTERVAL_MS: u64 = 100;

/// Interval between seen-cache sweeps.
pub const DEFAULT_CACHE_SWEEP_INTERVAL_MS: u64 = 60_000;

// ---------------------------------------------------------------------------
// Topology Defaults
// ---------------------------------------------------------------------------

/// Interval between topology snapshots.
pub const DEFAULT_SNAPSHOT_INTERVAL_MS: u64 = 30_000;

/// Degree the optimizer steers every node towards.
pub const DEFAULT_TARGET_DEGREE: usize = 6;

/// Nodes below this degree get an `add_connection` suggestion.
pub const DEFAULT_MIN_DEGREE: usize = 3;

/// Nodes above this degree get a `remove_connection` suggestion.
pub const DEFAULT_MAX_DEGREE: usize = 20;

/// Health score below which `health:warning` fires.
pub const DEFAULT_WARNING_THRESHOLD: f64 = 50.0;

/// Health score below which `health:critical` fires.
pub const DEFAULT_CRITICAL_THRESHOLD: f64 = 25.0;

/// Number of past snapshots retained for inspection.
pub const DEFAULT_SNAPSHOT_HISTORY: usize = 60;

// ---------------------------------------------------------------------------
// Growth Defaults
// ---------------------------------------------------------------------------

/// Upper bound on new connections made by a single growth attempt.
pub const DEFAULT_MAX_GROWTH_RATE: usize = 5;

/// Minimum time between two growth attempts.
pub const DEFAULT_GROWTH_COOLDOWN_MS: u64 = 30_000;

/// Peers whose best path reliability is below this are pruned by consolidation.
pub const DEFAULT_PRUNE_THRESHOLD: f64 = 0.2;

/// Number of growth attempts kept for success-rate reporting.
pub const GROWTH_HISTORY_LIMIT: usize = 100;

// ---------------------------------------------------------------------------
// Routing Defaults
// ---------------------------------------------------------------------------

/// Routes longer than this many hops are never produced.
pub const DEFAULT_MAX_HOPS: usize = 10;

/// Number of routes `find_k_shortest_paths` returns by default.
pub const DEFAULT_ALTERNATIVE_PATHS: usize = 3;

/// How strongly alternate routes must differ from each other (0..=1).
pub const DEFAULT_DIVERSITY_PREFERENCE: f64 = 0.5;

/// Maximum number of random pairs sampled when estimating the diameter.
pub const DIAMETER_SAMPLE_PAIRS: usize = 20;

// ---------------------------------------------------------------------------
// Coordinator Defaults
// ---------------------------------------------------------------------------

/// Interval between autonomous growth evaluations.
pub const DEFAULT_GROWTH_INTERVAL_MS: u64 = 15_000;

/// Capacity of every event broadcast channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

// ---------------------------------------------------------------------------
// Aggregate Configuration
// ---------------------------------------------------------------------------

/// Coordinator-level settings that do not belong to a single component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Whether the coordinator runs the autonomous growth loop.
    pub auto_growth: bool,
    /// Interval between growth evaluations, in milliseconds.
    pub growth_interval_ms: u64,
    /// Capacity of the unified and per-component event channels.
    pub event_capacity: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            auto_growth: true,
            growth_interval_ms: DEFAULT_GROWTH_INTERVAL_MS,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

/// Complete configuration surface of a mesh node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
    pub paths: PathConfig,
    pub signals: SignalConfig,
    pub topology: TopologyConfig,
    pub growth: GrowthConfig,
    pub routing: PathfinderConfig,
    pub coordinator: CoordinatorConfig,
}

impl MeshConfig {
    /// Checks every section for values the components cannot work with.
    ///
    /// Returns the first offending field. Components themselves never
    /// re-validate, so anything that passes here is safe to run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let p = &self.paths;
        if p.max_paths_per_destination == 0 {
            return Err(ConfigError::invalid(
                "paths.max_paths_per_destination",
                "must be at least 1",
            ));
        }
        if p.path_timeout_ms == 0 {
            return Err(ConfigError::invalid("paths.path_timeout_ms", "must be positive"));
        }
        if p.health_check_interval_ms == 0 {
            return Err(ConfigError::invalid(
                "paths.health_check_interval_ms",
                "must be positive",
            ));
        }
        check_unit("paths.min_reliability", p.min_reliability)?;

        let s = &self.signals;
        if s.default_ttl == 0 {
            return Err(ConfigError::invalid("signals.default_ttl", "must be at least 1"));
        }
        if s.max_cache_size == 0 {
            return Err(ConfigError::invalid("signals.max_cache_size", "must be at least 1"));
        }
        if s.rate_limit == 0 {
            return Err(ConfigError::invalid("signals.rate_limit", "must be at least 1"));
        }
        if s.batching && s.batch_interval_ms == 0 {
            return Err(ConfigError::invalid(
                "signals.batch_interval_ms",
                "must be positive when batching is enabled",
            ));
        }
        if s.cache_sweep_interval_ms == 0 {
            return Err(ConfigError::invalid(
                "signals.cache_sweep_interval_ms",
                "must be positive",
            ));
        }

        let t = &self.topology;
        if t.snapshot_interval_ms == 0 {
            return Err(ConfigError::invalid(
                "topology.snapshot_interval_ms",
                "must be positive",
            ));
        }
        if t.min_degree > t.max_degree {
            return Err(ConfigError::invalid(
                "topology.min_degree",
                "must not exceed topology.max_degree",
            ));
        }
        if t.target_degree < t.min_degree || t.target_degree > t.max_degree {
            return Err(ConfigError::invalid(
                "topology.target_degree",
                "must lie between min_degree and max_degree",
            ));
        }
        check_score("topology.warning_threshold", t.warning_threshold)?;
        check_score("topology.critical_threshold", t.critical_threshold)?;
        if t.critical_threshold > t.warning_threshold {
            return Err(ConfigError::invalid(
                "topology.critical_threshold",
                "must not exceed topology.warning_threshold",
            ));
        }

        let g = &self.growth;
        if g.max_growth_rate == 0 {
            return Err(ConfigError::invalid("growth.max_growth_rate", "must be at least 1"));
        }
        check_unit("growth.prune_threshold", g.prune_threshold)?;

        let r = &self.routing;
        if r.max_hops == 0 {
            return Err(ConfigError::invalid("routing.max_hops", "must be at least 1"));
        }
        if r.alternative_paths == 0 {
            return Err(ConfigError::invalid("routing.alternative_paths", "must be at least 1"));
        }
        check_unit("routing.min_reliability", r.min_reliability)?;
        check_unit("routing.diversity_preference", r.diversity_preference)?;

        let c = &self.coordinator;
        if c.event_capacity == 0 {
            return Err(ConfigError::invalid(
                "coordinator.event_capacity",
                "must be at least 1",
            ));
        }
        if c.auto_growth && c.growth_interval_ms == 0 {
            return Err(ConfigError::invalid(
                "coordinator.growth_interval_ms",
                "must be positive when auto_growth is enabled",
            ));
        }

        Ok(())
    }
}

fn check_unit(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::invalid(field, "must lie within 0.0..=1.0"));
    }
    Ok(())
}

fn check_score(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if !(0.0..=100.0).contains(&value) {
        return Err(ConfigError::invalid(field, "must lie within 0..=100"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(MeshConfig::default().validate().is_ok());
    }

    #[test]
    fn thresholds_must_be_ordered() {
        let mut config = MeshConfig::default();
        config.topology.critical_threshold = 80.0;
        config.topology.warning_threshold = 40.0;

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("topology.critical_threshold"));
    }

    #[test]
    fn zero_path_limit_is_rejected() {
        let mut config = MeshConfig::default();
        config.paths.max_paths_per_destination = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn reliability_outside_unit_range_is_rejected() {
        let mut config = MeshConfig::default();
        config.routing.diversity_preference = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn batch_interval_only_matters_when_batching() {
        let mut config = MeshConfig::default();
        config.signals.batching = false;
        config.signals.batch_interval_ms = 0;
        assert!(config.validate().is_ok());

        config.signals.batching = true;
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: MeshConfig =
            serde_json::from_str(r#"{ "paths": { "max_paths_per_destination": 5 } }"#).unwrap();

        assert_eq!(config.paths.max_paths_per_destination, 5);
        assert_eq!(config.paths.path_timeout_ms, DEFAULT_PATH_TIMEOUT_MS);
        assert_eq!(config.signals.default_ttl, DEFAULT_SIGNAL_TTL);
    }

    #[test]
    fn timing_constants_sanity() {
        // A health check slower than the timeout would let paths overstay by
        // more than a full timeout before decaying.
        assert!(DEFAULT_HEALTH_CHECK_INTERVAL_MS < DEFAULT_PATH_TIMEOUT_MS);
        assert!(DEFAULT_BATCH_INTERVAL_MS < DEFAULT_SEEN_CACHE_EXPIRY_MS);
        assert!(DEFAULT_CRITICAL_THRESHOLD < DEFAULT_WARNING_THRESHOLD);
    }
}
