use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    #[serde(default)]
    pub confidence: ConfidenceConfig,

    #[serde(default)]
    pub monitoring: MonitoringConfig,

    #[serde(default)]
    pub provenance: ProvenanceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_enabled")]
    pub enabled: bool,

    /// If true, log to stderr.
    #[serde(default = "default_logging_console")]
    pub console: bool,

    /// If true, log to a file under `directory` (or OS temp dir if unset).
    #[serde(default)]
    pub file: bool,

    /// EnvFilter string, e.g. "info" or "lineflow_core=debug".
    #[serde(default = "default_logging_level")]
    pub level: String,

    /// Optional directory for log files. If empty or unset, uses OS temp dir.
    #[serde(default)]
    pub directory: Option<String>,
}

fn default_logging_enabled() -> bool {
    true
}

fn default_logging_console() -> bool {
    true
}

fn default_logging_level() -> String {
    "warn".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_logging_enabled(),
            console: default_logging_console(),
            file: false,
            level: default_logging_level(),
            directory: None,
        }
    }
}

/// Engine selection. `standard` runs steps one by one, `optimized` runs each
/// ready batch on a bounded worker pool, `enhanced` uses a bounded task group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OptimizationLevel {
    #[default]
    #[serde(alias = "sequential")]
    Standard,
    #[serde(alias = "parallel")]
    Optimized,
    #[serde(alias = "structured")]
    Enhanced,
}

impl OptimizationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Optimized => "optimized",
            Self::Enhanced => "enhanced",
        }
    }

    pub fn all() -> [OptimizationLevel; 3] {
        [Self::Standard, Self::Optimized, Self::Enhanced]
    }
}

impl fmt::Display for OptimizationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OptimizationLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" | "sequential" => Ok(Self::Standard),
            "optimized" | "parallel" => Ok(Self::Optimized),
            "enhanced" | "structured" => Ok(Self::Enhanced),
            other => Err(format!("unknown optimization level '{other}'")),
        }
    }
}

/// What happens to the rest of a run after a step fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop dispatching new steps; the run reports `failure`.
    Abort,
    /// Skip every transitive dependent of the failed step, keep running the rest.
    #[default]
    #[serde(alias = "skip-dependents")]
    SkipDependents,
    /// Run dependents anyway; the failed output resolves to `null`.
    Continue,
}

impl FailurePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Abort => "abort",
            Self::SkipDependents => "skip_dependents",
            Self::Continue => "continue",
        }
    }
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "abort" => Ok(Self::Abort),
            "skip_dependents" | "skip" => Ok(Self::SkipDependents),
            "continue" => Ok(Self::Continue),
            other => Err(format!("unknown failure policy '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default)]
    pub optimization_level: OptimizationLevel,

    /// Worker pool size for the parallel engine.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Concurrent task ceiling for the structured-concurrency engine.
    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: usize,

    /// Per-step timeout applied when a step does not declare its own.
    #[serde(default = "default_step_timeout_ms")]
    pub step_timeout_ms: u64,

    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

fn default_max_workers() -> usize {
    num_cpus::get().max(1)
}

fn default_max_concurrent_tasks() -> usize {
    16
}

fn default_step_timeout_ms() -> u64 {
    300_000
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            optimization_level: OptimizationLevel::default(),
            max_workers: default_max_workers(),
            max_concurrent_tasks: default_max_concurrent_tasks(),
            step_timeout_ms: default_step_timeout_ms(),
            failure_policy: FailurePolicy::default(),
        }
    }
}

impl OrchestratorConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_workers == 0 {
            return Err("orchestrator.max_workers must be at least 1".to_string());
        }
        if self.max_concurrent_tasks == 0 {
            return Err("orchestrator.max_concurrent_tasks must be at least 1".to_string());
        }
        if self.step_timeout_ms == 0 {
            return Err("orchestrator.step_timeout_ms must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// How several upstream confidences are folded into one before degradation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AggregationMethod {
    #[default]
    WeightedMean,
    Minimum,
    HarmonicMean,
}

impl FromStr for AggregationMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "weighted_mean" | "mean" => Ok(Self::WeightedMean),
            "minimum" | "min" => Ok(Self::Minimum),
            "harmonic_mean" | "harmonic" => Ok(Self::HarmonicMean),
            other => Err(format!("unknown aggregation method '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceConfig {
    #[serde(default)]
    pub aggregation: AggregationMethod,

    /// Factor applied to operation types missing from `degradation_factors`.
    #[serde(default = "default_degradation_factor")]
    pub default_factor: f64,

    /// operation_type -> factor in (0, 1].
    #[serde(default = "default_degradation_factors")]
    pub degradation_factors: BTreeMap<String, f64>,
}

fn default_degradation_factor() -> f64 {
    0.9
}

fn default_degradation_factors() -> BTreeMap<String, f64> {
    [
        ("load_document", 1.0),
        ("chunk_text", 0.98),
        ("extract_entities", 0.9),
        ("extract_relationships", 0.85),
        ("build_graph", 0.95),
        ("embed", 0.97),
        ("query_graph", 0.92),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            aggregation: AggregationMethod::default(),
            default_factor: default_degradation_factor(),
            degradation_factors: default_degradation_factors(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    /// Resource sampling interval for the performance monitor.
    #[serde(default = "default_sample_interval_ms")]
    pub sample_interval_ms: u64,

    /// Number of resource samples retained.
    #[serde(default = "default_window")]
    pub window: usize,

    /// Minimum number of failing steps before a tool is reported as a repeated-error pattern.
    #[serde(default = "default_repeat_threshold")]
    pub repeat_threshold: usize,

    #[serde(default = "default_performance_enabled")]
    pub performance: bool,
}

fn default_sample_interval_ms() -> u64 {
    500
}

fn default_window() -> usize {
    120
}

fn default_repeat_threshold() -> usize {
    2
}

fn default_performance_enabled() -> bool {
    true
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: default_sample_interval_ms(),
            window: default_window(),
            repeat_threshold: default_repeat_threshold(),
            performance: default_performance_enabled(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProvenanceBackend {
    #[default]
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProvenanceConfig {
    #[serde(default)]
    pub backend: ProvenanceBackend,

    /// Database path for the sqlite backend.
    #[serde(default)]
    pub path: Option<String>,
}
