use std::collections::BTreeMap;

use super::score::clamp_confidence;
use crate::config::{AggregationMethod, ConfidenceConfig};
use crate::error::OrchestratorError;

/// Degrades confidence as data flows from step to step.
///
/// Each operation type has a factor in (0, 1]; unknown types use the default factor.
#[derive(Debug, Clone)]
pub struct ConfidencePropagator {
    factors: BTreeMap<String, f64>,
    default_factor: f64,
    method: AggregationMethod,
}

impl Default for ConfidencePropagator {
    fn default() -> Self {
        Self {
            factors: BTreeMap::new(),
            default_factor: 0.9,
            method: AggregationMethod::WeightedMean,
        }
    }
}

impl ConfidencePropagator {
    /// Build from config, rejecting any factor outside (0, 1].
    pub fn new(config: &ConfidenceConfig) -> Result<Self, OrchestratorError> {
        check_factor("default_factor", config.default_factor)?;
        for (op, factor) in &config.degradation_factors {
            check_factor(op, *factor)?;
        }
        Ok(Self {
            factors: config.degradation_factors.clone(),
            default_factor: config.default_factor,
            method: config.aggregation,
        })
    }

    pub fn with_factor(
        mut self,
        operation_type: impl Into<String>,
        factor: f64,
    ) -> Result<Self, OrchestratorError> {
        let operation_type = operation_type.into();
        check_factor(&operation_type, factor)?;
        self.factors.insert(operation_type, factor);
        Ok(self)
    }

    pub fn with_method(mut self, method: AggregationMethod) -> Self {
        self.method = method;
        self
    }

    pub fn method(&self) -> AggregationMethod {
        self.method
    }

    pub fn factor_for(&self, operation_type: &str) -> f64 {
        self.factors
            .get(operation_type)
            .copied()
            .unwrap_or(self.default_factor)
    }

    /// `child = clamp(parent) * factor(operation_type)`
    pub fn propagate(&self, base_confidence: f64, operation_type: &str) -> f64 {
        clamp_confidence(clamp_confidence(base_confidence) * self.factor_for(operation_type))
    }

    /// Fold several confidences with the configured method, equal weights. Empty input yields 0.0.
    pub fn aggregate(&self, values: &[f64]) -> f64 {
        let weighted: Vec<(f64, f64)> = values.iter().map(|v| (*v, 1.0)).collect();
        self.aggregate_weighted(&weighted)
    }

    /// Fold `(confidence, weight)` pairs. Non-positive weights are ignored by the mean;
    /// `Minimum` and `HarmonicMean` ignore weights entirely.
    pub fn aggregate_weighted(&self, values: &[(f64, f64)]) -> f64 {
        if values.is_empty() {
            return 0.0;
        }
        let clamped: Vec<(f64, f64)> = values
            .iter()
            .map(|(v, w)| (clamp_confidence(*v), *w))
            .collect();

        let result = match self.method {
            AggregationMethod::WeightedMean => {
                let (sum, total_weight) = clamped
                    .iter()
                    .filter(|(_, w)| *w > 0.0 && w.is_finite())
                    .fold((0.0, 0.0), |(s, tw), (v, w)| (s + v * w, tw + w));
                if total_weight > 0.0 {
                    sum / total_weight
                } else {
                    0.0
                }
            }
            AggregationMethod::Minimum => clamped
                .iter()
                .map(|(v, _)| *v)
                .fold(f64::INFINITY, f64::min),
            AggregationMethod::HarmonicMean => {
                if clamped.iter().any(|(v, _)| *v <= 0.0) {
                    0.0
                } else {
                    let denom: f64 = clamped.iter().map(|(v, _)| 1.0 / v).sum();
                    clamped.len() as f64 / denom
                }
            }
        };
        clamp_confidence(result)
    }
}

fn check_factor(name: &str, factor: f64) -> Result<(), OrchestratorError> {
    if factor > 0.0 && factor <= 1.0 {
        Ok(())
    } else {
        Err(OrchestratorError::Config(format!(
            "degradation factor for '{name}' must be in (0, 1], got {factor}"
        )))
    }
}
