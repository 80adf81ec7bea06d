//! Multi-path connection management.

mod manager;
mod probe;
mod types;

pub use manager::{HealthCheckReport, HyphalPathManager, PathConfig};
pub use probe::{PathProber, SimulatedProber, StaticProber};
pub use types::{MetricsUpdate, Path, PathMetrics, PathRemovalReason, PathState};
