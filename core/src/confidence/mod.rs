//! Confidence scores and their propagation along the dependency chain.

mod propagator;
mod score;

pub use crate::config::AggregationMethod;
pub use propagator::ConfidencePropagator;
pub use score::{clamp_confidence, ConfidenceScore, ConfidenceTier};
