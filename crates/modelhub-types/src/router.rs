//! Routing configuration and decision types.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Scoring strategy: which axes dominate the weighted sum.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoutingStrategy {
    CostOptimized,
    PerformanceFirst,
    QualityFirst,
    Balanced,
    /// Every axis weighted equally.
    #[default]
    Even,
}

impl fmt::Display for RoutingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoutingStrategy::CostOptimized => write!(f, "cost-optimized"),
            RoutingStrategy::PerformanceFirst => write!(f, "performance-first"),
            RoutingStrategy::QualityFirst => write!(f, "quality-first"),
            RoutingStrategy::Balanced => write!(f, "balanced"),
            RoutingStrategy::Even => write!(f, "even"),
        }
    }
}

/// Tie-breaking policy among the score-sorted candidates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoadBalancingStrategy {
    /// Highest combined score wins.
    #[default]
    PerformanceBased,
    /// Least-recently-used provider among the top candidates.
    RoundRobin,
    /// Fewest in-flight calls among the top candidates.
    LeastConnections,
    /// Random draw proportional to score.
    WeightedRandom,
}

/// Router configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    #[serde(default)]
    pub strategy: RoutingStrategy,
    #[serde(default)]
    pub load_balancing: LoadBalancingStrategy,
    /// Estimated request cost (USD) at which the cost score reaches zero.
    #[serde(default = "default_cost_score_threshold")]
    pub cost_score_threshold: f64,
    /// Average latency (ms) at which the performance score reaches zero.
    #[serde(default = "default_latency_ceiling_ms")]
    pub latency_ceiling_ms: u64,
    /// Per-model fallback chain overrides, keyed by model id. When absent
    /// the router falls back to the next-best scored candidates.
    #[serde(default)]
    pub fallback_overrides: HashMap<String, Vec<String>>,
}

fn default_cost_score_threshold() -> f64 {
    0.10
}

fn default_latency_ceiling_ms() -> u64 {
    10_000
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            strategy: RoutingStrategy::default(),
            load_balancing: LoadBalancingStrategy::default(),
            cost_score_threshold: default_cost_score_threshold(),
            latency_ceiling_ms: default_latency_ceiling_ms(),
            fallback_overrides: HashMap::new(),
        }
    }
}

/// The router's answer for one request: the winner plus its fallback chain.
///
/// `reasoning` holds diagnostic strings for observability, not user-facing
/// text. `alternatives` is ordered best-first and never contains the
/// selected model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterDecision {
    pub selected_model: String,
    pub provider_id: String,
    pub reasoning: Vec<String>,
    pub alternatives: Vec<String>,
    pub estimated_cost: f64,
    pub estimated_latency_ms: u64,
    /// Quality score of the winner in [0, 1].
    pub quality_score: f64,
    /// Confidence in the decision in [0, 1].
    pub confidence: f64,
}
