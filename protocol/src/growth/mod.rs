//! Autonomous network expansion.

mod engine;
mod types;

pub use engine::{GrowthConfig, GrowthEngine, DEADLINE_EXCEEDED};
pub use types::{GrowthDirective, GrowthPattern, GrowthResult, GrowthTarget, GrowthTargetType};
