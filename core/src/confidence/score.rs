use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Coarse reliability bucket derived from a confidence value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceTier {
    High,
    Medium,
    Low,
    Uncertain,
}

impl ConfidenceTier {
    pub fn from_value(value: f64) -> Self {
        if value >= 0.9 {
            Self::High
        } else if value >= 0.7 {
            Self::Medium
        } else if value >= 0.5 {
            Self::Low
        } else {
            Self::Uncertain
        }
    }
}

/// Clamp a confidence into [0, 1]. Out-of-range input is accepted with a warning.
pub fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        tracing::warn!("confidence value is NaN, using 0.0");
        return 0.0;
    }
    if !(0.0..=1.0).contains(&value) {
        tracing::warn!(value, "confidence value outside [0, 1], clamping");
    }
    value.clamp(0.0, 1.0)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceScore {
    pub value: f64,
    pub tier: ConfidenceTier,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub factors: Vec<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl ConfidenceScore {
    pub fn new(value: f64) -> Self {
        let value = clamp_confidence(value);
        Self {
            value,
            tier: ConfidenceTier::from_value(value),
            factors: Vec::new(),
            metadata: Map::new(),
        }
    }

    pub fn with_factor(mut self, factor: impl Into<String>) -> Self {
        self.factors.push(factor.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}
