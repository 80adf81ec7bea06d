//! Gossip signals: types, rate limiting and the propagator.

mod propagator;
mod rate_limit;
mod types;

pub use propagator::{PropagatorStats, SignalConfig, SignalHandler, SignalPropagator};
pub use rate_limit::TokenBucket;
pub use types::{Signal, SignalType};
