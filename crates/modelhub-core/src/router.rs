//! Intelligent model router.
//!
//! Given a request and the registered model pool, the router filters
//! eligible candidates, scores them on five normalized axes (cost,
//! performance, quality, health, load), and applies the configured
//! load-balancing strategy to pick a winner plus an ordered fallback
//! chain.
//!
//! Health and metrics snapshots are pushed in by the hub's periodic
//! monitor, not refreshed per routing call, so selection stays cheap and
//! synchronous. Quality is deliberately derived from declared metadata
//! only (capability count, context window, feature count) -- it is a
//! crude heuristic, but it is load-bearing for the cost/quality trade-off
//! and must stay stable.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use modelhub_types::chat::{ModelRequest, ModelRequirements};
use modelhub_types::error::HubError;
use modelhub_types::health::{HealthStatus, PerformanceMetrics, ProviderHealth};
use modelhub_types::model::ModelDefinition;
use modelhub_types::router::{LoadBalancingStrategy, RouterConfig, RouterDecision};

/// Capability count at which the quality component saturates.
const QUALITY_CAPABILITY_CEILING: f64 = 5.0;
/// Context window (tokens) at which the quality component saturates.
const QUALITY_CONTEXT_CEILING: f64 = 200_000.0;
/// Feature count at which the quality component saturates.
const QUALITY_FEATURE_CEILING: f64 = 5.0;

/// Maximum alternatives carried in a decision's fallback chain.
const MAX_ALTERNATIVES: usize = 3;
/// How many score-sorted candidates tie-breaking strategies consider.
const TOP_CANDIDATES: usize = 3;
/// Assumed completion tokens when the request does not cap output.
const DEFAULT_COMPLETION_ESTIMATE: u32 = 500;

/// Per-axis weights for the combined score. Each set sums to 1.0.
struct ScoreWeights {
    cost: f64,
    performance: f64,
    quality: f64,
    health: f64,
    load: f64,
}

fn weights_for(strategy: modelhub_types::router::RoutingStrategy) -> ScoreWeights {
    use modelhub_types::router::RoutingStrategy::*;
    match strategy {
        CostOptimized => ScoreWeights {
            cost: 0.45,
            performance: 0.15,
            quality: 0.15,
            health: 0.15,
            load: 0.10,
        },
        PerformanceFirst => ScoreWeights {
            cost: 0.10,
            performance: 0.45,
            quality: 0.15,
            health: 0.20,
            load: 0.10,
        },
        QualityFirst => ScoreWeights {
            cost: 0.10,
            performance: 0.15,
            quality: 0.45,
            health: 0.20,
            load: 0.10,
        },
        Balanced => ScoreWeights {
            cost: 0.25,
            performance: 0.25,
            quality: 0.25,
            health: 0.15,
            load: 0.10,
        },
        Even => ScoreWeights {
            cost: 0.20,
            performance: 0.20,
            quality: 0.20,
            health: 0.20,
            load: 0.20,
        },
    }
}

/// One scored eligible model.
#[derive(Debug, Clone)]
struct Candidate {
    model_id: String,
    provider_id: String,
    score: f64,
    cost_score: f64,
    performance_score: f64,
    quality_score: f64,
    health_score: f64,
    load_score: f64,
    estimated_cost: f64,
    estimated_latency_ms: u64,
}

struct RouterState {
    config: RouterConfig,
    models: HashMap<String, ModelDefinition>,
    health: HashMap<String, ProviderHealth>,
    metrics: HashMap<String, PerformanceMetrics>,
    /// Load-balancer weight per provider, seeded 1.0 at registration.
    weights: HashMap<String, f64>,
    /// In-flight call count per provider.
    inflight: HashMap<String, u32>,
    /// Round-robin recency: tick at which each provider was last picked.
    last_used: HashMap<String, u64>,
    /// Default fallback chain per model (cheapest sibling of the same
    /// provider), used when scoring yields no alternatives.
    default_fallbacks: HashMap<String, Vec<String>>,
    tick: u64,
    rng_state: u64,
}

impl RouterState {
    fn provider_status(&self, provider_id: &str) -> HealthStatus {
        self.health
            .get(provider_id)
            .map(|h| h.status)
            .unwrap_or(HealthStatus::Healthy)
    }

    /// Observed average latency when the provider has served calls,
    /// otherwise the model's declared average.
    fn effective_latency_ms(&self, model: &ModelDefinition) -> u64 {
        match self.metrics.get(&model.provider_id) {
            Some(m) if m.request_count > 0 => m.avg_latency_ms as u64,
            _ => model.avg_latency_ms,
        }
    }

    /// Token/cost estimate used for filtering and the cost axis: chars/4
    /// with a fixed per-message overhead, and the request's max_tokens
    /// (or a fixed assumption) for the completion side.
    fn estimate_request_cost(&self, model: &ModelDefinition, request: &ModelRequest) -> f64 {
        let chars: usize = request.messages.iter().map(|m| m.content.len() + 10).sum();
        let prompt_tokens = (chars as f64 / 4.0).ceil() as u32;
        let completion_tokens = request
            .max_tokens
            .unwrap_or(DEFAULT_COMPLETION_ESTIMATE)
            .min(model.max_output_tokens);
        model.cost_for(prompt_tokens, completion_tokens)
    }

    fn is_eligible(
        &self,
        model: &ModelDefinition,
        requirements: &ModelRequirements,
        request: &ModelRequest,
    ) -> bool {
        if self.provider_status(&model.provider_id) == HealthStatus::Unhealthy {
            return false;
        }
        if requirements
            .excluded_providers
            .iter()
            .any(|p| p == &model.provider_id)
        {
            return false;
        }
        if !requirements.preferred_providers.is_empty()
            && !requirements
                .preferred_providers
                .iter()
                .any(|p| p == &model.provider_id)
        {
            return false;
        }
        if !requirements
            .required_capabilities
            .iter()
            .all(|c| model.has_capability(*c))
        {
            return false;
        }
        if !requirements
            .required_features
            .iter()
            .all(|f| model.has_feature(f))
        {
            return false;
        }
        if let Some(max_cost) = requirements.max_cost {
            if self.estimate_request_cost(model, request) > max_cost {
                return false;
            }
        }
        if let Some(max_latency) = requirements.max_latency_ms {
            if self.effective_latency_ms(model) > max_latency {
                return false;
            }
        }
        true
    }

    fn score(&self, model: &ModelDefinition, request: &ModelRequest) -> Candidate {
        let weights = weights_for(self.config.strategy);

        let estimated_cost = self.estimate_request_cost(model, request);
        let cost_score = 1.0 - (estimated_cost / self.config.cost_score_threshold).min(1.0);

        let estimated_latency_ms = self.effective_latency_ms(model);
        let performance_score =
            1.0 - (estimated_latency_ms as f64 / self.config.latency_ceiling_ms as f64).min(1.0);

        let quality_score = quality_score(model);

        let health_score = match self.provider_status(&model.provider_id) {
            HealthStatus::Healthy => 1.0,
            HealthStatus::Degraded => 0.6,
            HealthStatus::Unhealthy => 0.0,
        };

        let lb_weight = self.weights.get(&model.provider_id).copied().unwrap_or(1.0);
        let inflight = self.inflight.get(&model.provider_id).copied().unwrap_or(0);
        let free_capacity =
            1.0 - (inflight as f64 / model.max_concurrency.max(1) as f64).min(1.0);
        let load_score = (lb_weight * free_capacity).clamp(0.0, 1.0);

        let score = weights.cost * cost_score
            + weights.performance * performance_score
            + weights.quality * quality_score
            + weights.health * health_score
            + weights.load * load_score;

        Candidate {
            model_id: model.id.clone(),
            provider_id: model.provider_id.clone(),
            score,
            cost_score,
            performance_score,
            quality_score,
            health_score,
            load_score,
            estimated_cost,
            estimated_latency_ms,
        }
    }

    /// Pick the winner's index among score-sorted candidates according to
    /// the load-balancing strategy.
    fn apply_load_balancing(&mut self, candidates: &[Candidate]) -> usize {
        let top = candidates.len().min(TOP_CANDIDATES);
        match self.config.load_balancing {
            LoadBalancingStrategy::PerformanceBased => 0,
            LoadBalancingStrategy::RoundRobin => {
                let idx = (0..top)
                    .min_by_key(|&i| {
                        self.last_used
                            .get(&candidates[i].provider_id)
                            .copied()
                            .unwrap_or(0)
                    })
                    .unwrap_or(0);
                self.tick += 1;
                let tick = self.tick;
                self.last_used
                    .insert(candidates[idx].provider_id.clone(), tick);
                idx
            }
            LoadBalancingStrategy::LeastConnections => (0..top)
                .min_by_key(|&i| {
                    self.inflight
                        .get(&candidates[i].provider_id)
                        .copied()
                        .unwrap_or(0)
                })
                .unwrap_or(0),
            LoadBalancingStrategy::WeightedRandom => {
                let total: f64 = candidates.iter().map(|c| c.score.max(0.0)).sum();
                if total <= 0.0 {
                    return 0;
                }
                let mut draw = self.next_rand() * total;
                for (i, candidate) in candidates.iter().enumerate() {
                    draw -= candidate.score.max(0.0);
                    if draw <= 0.0 {
                        return i;
                    }
                }
                candidates.len() - 1
            }
        }
    }

    /// Deterministic xorshift64 draw in [0, 1).
    fn next_rand(&mut self) -> f64 {
        let mut x = self.rng_state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.rng_state = x;
        (x >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Fallback chain for the winner: config override when present,
    /// otherwise the next-best scored candidates, otherwise the default
    /// sibling chain recorded at registration.
    fn fallback_chain(&self, winner: &Candidate, sorted: &[Candidate]) -> Vec<String> {
        if let Some(overridden) = self.config.fallback_overrides.get(&winner.model_id) {
            return overridden
                .iter()
                .filter(|id| *id != &winner.model_id && self.models.contains_key(*id))
                .take(MAX_ALTERNATIVES)
                .cloned()
                .collect();
        }

        let next_best: Vec<String> = sorted
            .iter()
            .filter(|c| c.model_id != winner.model_id)
            .take(MAX_ALTERNATIVES)
            .map(|c| c.model_id.clone())
            .collect();
        if !next_best.is_empty() {
            return next_best;
        }

        self.default_fallbacks
            .get(&winner.model_id)
            .map(|chain| {
                chain
                    .iter()
                    .filter(|id| self.models.contains_key(*id))
                    .take(MAX_ALTERNATIVES)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Quality heuristic from declared metadata only: capability count,
/// context window, and feature count, each normalized against a fixed
/// ceiling and averaged.
fn quality_score(model: &ModelDefinition) -> f64 {
    let capabilities = (model.capabilities.len() as f64 / QUALITY_CAPABILITY_CEILING).min(1.0);
    let context = (model.context_window as f64 / QUALITY_CONTEXT_CEILING).min(1.0);
    let features = (model.features.len() as f64 / QUALITY_FEATURE_CEILING).min(1.0);
    (capabilities + context + features) / 3.0
}

/// The routing component. All state sits behind one mutex; every
/// operation is synchronous in-memory work.
pub struct Router {
    state: Mutex<RouterState>,
}

impl Router {
    pub fn new(config: RouterConfig) -> Self {
        Self {
            state: Mutex::new(RouterState {
                config,
                models: HashMap::new(),
                health: HashMap::new(),
                metrics: HashMap::new(),
                weights: HashMap::new(),
                inflight: HashMap::new(),
                last_used: HashMap::new(),
                default_fallbacks: HashMap::new(),
                tick: 0,
                rng_state: 0x9E37_79B9_7F4A_7C15,
            }),
        }
    }

    /// Register a provider's models, seeding its load-balancer weight at
    /// 1.0 and a healthy snapshot until the first monitor tick.
    pub fn ingest_provider(&self, provider_id: &str, models: Vec<ModelDefinition>) {
        let mut state = self.state.lock().expect("router lock poisoned");

        state
            .health
            .entry(provider_id.to_string())
            .or_insert_with(|| ProviderHealth::healthy(provider_id));
        state.weights.entry(provider_id.to_string()).or_insert(1.0);
        state.inflight.entry(provider_id.to_string()).or_insert(0);

        for model in &models {
            // Default fallback: the cheapest (then fastest) sibling model
            // of the same provider.
            let sibling = models
                .iter()
                .filter(|m| m.id != model.id)
                .min_by(|a, b| {
                    a.output_cost_per_1k
                        .partial_cmp(&b.output_cost_per_1k)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then(a.avg_latency_ms.cmp(&b.avg_latency_ms))
                });
            if let Some(sibling) = sibling {
                state
                    .default_fallbacks
                    .insert(model.id.clone(), vec![sibling.id.clone()]);
            }
        }
        for model in models {
            state.models.insert(model.id.clone(), model);
        }
    }

    /// Remove a provider and every model it exposes.
    pub fn remove_provider(&self, provider_id: &str) {
        let mut state = self.state.lock().expect("router lock poisoned");
        state.models.retain(|_, m| m.provider_id != provider_id);
        let remaining: Vec<String> = state.models.keys().cloned().collect();
        state.default_fallbacks.retain(|model_id, chain| {
            chain.retain(|id| remaining.contains(id));
            remaining.contains(model_id) && !chain.is_empty()
        });
        state.health.remove(provider_id);
        state.metrics.remove(provider_id);
        state.weights.remove(provider_id);
        state.inflight.remove(provider_id);
        state.last_used.remove(provider_id);
    }

    pub fn update_health(&self, health: ProviderHealth) {
        let mut state = self.state.lock().expect("router lock poisoned");
        state.health.insert(health.provider_id.clone(), health);
    }

    pub fn update_metrics(&self, provider_id: &str, metrics: PerformanceMetrics) {
        let mut state = self.state.lock().expect("router lock poisoned");
        state.metrics.insert(provider_id.to_string(), metrics);
    }

    pub fn set_config(&self, config: RouterConfig) {
        let mut state = self.state.lock().expect("router lock poisoned");
        state.config = config;
    }

    pub fn config(&self) -> RouterConfig {
        self.state
            .lock()
            .expect("router lock poisoned")
            .config
            .clone()
    }

    pub fn model_definition(&self, model_id: &str) -> Option<ModelDefinition> {
        self.state
            .lock()
            .expect("router lock poisoned")
            .models
            .get(model_id)
            .cloned()
    }

    pub fn health_snapshot(&self) -> HashMap<String, ProviderHealth> {
        self.state
            .lock()
            .expect("router lock poisoned")
            .health
            .clone()
    }

    pub fn begin_call(&self, provider_id: &str) {
        let mut state = self.state.lock().expect("router lock poisoned");
        *state.inflight.entry(provider_id.to_string()).or_insert(0) += 1;
    }

    pub fn end_call(&self, provider_id: &str) {
        let mut state = self.state.lock().expect("router lock poisoned");
        if let Some(count) = state.inflight.get_mut(provider_id) {
            *count = count.saturating_sub(1);
        }
    }

    /// Select a model for the request.
    ///
    /// An explicit `request.model` resolves directly (confidence 1.0, no
    /// alternatives) and fails when unknown or when its provider is
    /// unhealthy. Otherwise candidates are filtered, scored, and the
    /// load-balancing strategy picks the winner.
    pub fn select_model(&self, request: &ModelRequest) -> Result<RouterDecision, HubError> {
        let mut state = self.state.lock().expect("router lock poisoned");

        if let Some(model_id) = &request.model {
            let model = state
                .models
                .get(model_id)
                .cloned()
                .ok_or_else(|| HubError::ModelNotFound(model_id.clone()))?;
            if state.provider_status(&model.provider_id) == HealthStatus::Unhealthy {
                return Err(HubError::ProviderUnavailable(model.provider_id.clone()));
            }
            return Ok(RouterDecision {
                selected_model: model.id.clone(),
                provider_id: model.provider_id.clone(),
                reasoning: vec![format!("explicit model '{}' requested", model.id)],
                alternatives: Vec::new(),
                estimated_cost: state.estimate_request_cost(&model, request),
                estimated_latency_ms: state.effective_latency_ms(&model),
                quality_score: quality_score(&model),
                confidence: 1.0,
            });
        }

        let requirements = request.requirements.clone().unwrap_or_default();
        let mut candidates: Vec<Candidate> = state
            .models
            .values()
            .filter(|m| state.is_eligible(m, &requirements, request))
            .map(|m| state.score(m, request))
            .collect();
        if candidates.is_empty() {
            return Err(HubError::NoEligibleModels);
        }
        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let winner_idx = state.apply_load_balancing(&candidates);
        let winner = candidates[winner_idx].clone();
        let alternatives = state.fallback_chain(&winner, &candidates);

        let mut reasoning = vec![
            format!(
                "evaluated {} eligible models with strategy '{}'",
                candidates.len(),
                state.config.strategy
            ),
            format!(
                "selected '{}' (score {:.3}: cost {:.2}, performance {:.2}, quality {:.2}, health {:.2}, load {:.2})",
                winner.model_id,
                winner.score,
                winner.cost_score,
                winner.performance_score,
                winner.quality_score,
                winner.health_score,
                winner.load_score,
            ),
        ];
        if !alternatives.is_empty() {
            reasoning.push(format!("fallback chain: {}", alternatives.join(" -> ")));
        }

        tracing::debug!(
            model = %winner.model_id,
            provider = %winner.provider_id,
            score = winner.score,
            "Routing decision"
        );

        Ok(RouterDecision {
            selected_model: winner.model_id,
            provider_id: winner.provider_id,
            reasoning,
            alternatives,
            estimated_cost: winner.estimated_cost,
            estimated_latency_ms: winner.estimated_latency_ms,
            quality_score: winner.quality_score,
            confidence: winner.score.min(1.0),
        })
    }
}

/// RAII guard that tracks one in-flight call against a provider.
///
/// Increments the provider's in-flight count on creation and decrements
/// on drop, so counts stay balanced even when a call future is dropped
/// mid-flight.
pub struct InflightGuard {
    router: Arc<Router>,
    provider_id: String,
}

impl InflightGuard {
    pub fn new(router: Arc<Router>, provider_id: impl Into<String>) -> Self {
        let provider_id = provider_id.into();
        router.begin_call(&provider_id);
        Self {
            router,
            provider_id,
        }
    }
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.router.end_call(&self.provider_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modelhub_types::chat::Message;
    use modelhub_types::model::ModelCapability;
    use modelhub_types::router::RoutingStrategy;

    fn model(
        id: &str,
        provider: &str,
        input_cost: f64,
        output_cost: f64,
        latency_ms: u64,
    ) -> ModelDefinition {
        ModelDefinition {
            id: id.to_string(),
            display_name: id.to_string(),
            provider_id: provider.to_string(),
            max_output_tokens: 4096,
            input_cost_per_1k: input_cost,
            output_cost_per_1k: output_cost,
            capabilities: vec![
                ModelCapability::TextGeneration,
                ModelCapability::FunctionCalling,
            ],
            context_window: 200_000,
            features: vec!["streaming".to_string()],
            avg_latency_ms: latency_ms,
            max_concurrency: 10,
        }
    }

    fn request() -> ModelRequest {
        ModelRequest::new(vec![Message::user("hello")])
    }

    fn unhealthy(provider_id: &str) -> ProviderHealth {
        ProviderHealth {
            status: HealthStatus::Unhealthy,
            error_rate: 1.0,
            availability: 0.0,
            ..ProviderHealth::healthy(provider_id)
        }
    }

    fn router_with(config: RouterConfig) -> Router {
        let router = Router::new(config);
        router.ingest_provider(
            "cheap-co",
            vec![model("cheap-large", "cheap-co", 0.00025, 0.00125, 3000)],
        );
        router.ingest_provider(
            "fast-co",
            vec![model("fast-large", "fast-co", 0.01, 0.03, 400)],
        );
        router
    }

    #[test]
    fn test_explicit_unknown_model_fails() {
        let router = router_with(RouterConfig::default());
        let mut req = request();
        req.model = Some("no-such-model".to_string());
        assert!(matches!(
            router.select_model(&req),
            Err(HubError::ModelNotFound(_))
        ));
    }

    #[test]
    fn test_explicit_model_on_unhealthy_provider_fails() {
        let router = router_with(RouterConfig::default());
        router.update_health(unhealthy("fast-co"));

        let mut req = request();
        req.model = Some("fast-large".to_string());
        match router.select_model(&req) {
            Err(HubError::ProviderUnavailable(provider)) => assert_eq!(provider, "fast-co"),
            other => panic!("expected ProviderUnavailable, got: {other:?}"),
        }
    }

    #[test]
    fn test_explicit_model_has_full_confidence_and_no_alternatives() {
        let router = router_with(RouterConfig::default());
        let mut req = request();
        req.model = Some("cheap-large".to_string());
        let decision = router.select_model(&req).unwrap();
        assert_eq!(decision.selected_model, "cheap-large");
        assert!((decision.confidence - 1.0).abs() < f64::EPSILON);
        assert!(decision.alternatives.is_empty());
    }

    #[test]
    fn test_empty_pool_is_a_hard_failure() {
        let router = Router::new(RouterConfig::default());
        assert!(matches!(
            router.select_model(&request()),
            Err(HubError::NoEligibleModels)
        ));
    }

    #[test]
    fn test_unhealthy_provider_excluded_from_eligible_set() {
        let router = router_with(RouterConfig::default());
        router.update_health(unhealthy("cheap-co"));
        let decision = router.select_model(&request()).unwrap();
        assert_eq!(decision.provider_id, "fast-co");
        assert!(!decision.alternatives.contains(&"cheap-large".to_string()));
    }

    #[test]
    fn test_excluded_provider_requirement() {
        let router = router_with(RouterConfig::default());
        let mut req = request();
        req.requirements = Some(ModelRequirements {
            excluded_providers: vec!["cheap-co".to_string()],
            ..Default::default()
        });
        let decision = router.select_model(&req).unwrap();
        assert_eq!(decision.provider_id, "fast-co");
    }

    #[test]
    fn test_preferred_provider_requirement() {
        let router = router_with(RouterConfig::default());
        let mut req = request();
        req.requirements = Some(ModelRequirements {
            preferred_providers: vec!["cheap-co".to_string()],
            ..Default::default()
        });
        let decision = router.select_model(&req).unwrap();
        assert_eq!(decision.provider_id, "cheap-co");
    }

    #[test]
    fn test_required_capability_filters() {
        let router = router_with(RouterConfig::default());
        let mut req = request();
        req.requirements = Some(ModelRequirements {
            required_capabilities: vec![ModelCapability::Vision],
            ..Default::default()
        });
        assert!(matches!(
            router.select_model(&req),
            Err(HubError::NoEligibleModels)
        ));
    }

    #[test]
    fn test_max_cost_filters() {
        let router = router_with(RouterConfig::default());
        let mut req = request();
        // Only the cheap model's estimate fits under this cap.
        req.requirements = Some(ModelRequirements {
            max_cost: Some(0.01),
            ..Default::default()
        });
        let decision = router.select_model(&req).unwrap();
        assert_eq!(decision.provider_id, "cheap-co");
    }

    #[test]
    fn test_max_latency_filters() {
        let router = router_with(RouterConfig::default());
        let mut req = request();
        req.requirements = Some(ModelRequirements {
            max_latency_ms: Some(1000),
            ..Default::default()
        });
        let decision = router.select_model(&req).unwrap();
        assert_eq!(decision.provider_id, "fast-co");
    }

    #[test]
    fn test_selection_is_member_of_eligible_set_with_bounded_alternatives() {
        let router = Router::new(RouterConfig::default());
        for i in 0..6 {
            router.ingest_provider(
                &format!("p{i}"),
                vec![model(
                    &format!("m{i}"),
                    &format!("p{i}"),
                    0.001 * (i + 1) as f64,
                    0.002 * (i + 1) as f64,
                    500 + 100 * i as u64,
                )],
            );
        }
        let decision = router.select_model(&request()).unwrap();
        assert!(decision.selected_model.starts_with('m'));
        assert!(decision.alternatives.len() <= 3);
        assert!(!decision.alternatives.contains(&decision.selected_model));
        assert!(decision.confidence >= 0.0 && decision.confidence <= 1.0);
        assert!(decision.quality_score >= 0.0 && decision.quality_score <= 1.0);
    }

    #[test]
    fn test_cost_optimized_picks_cheap_performance_first_picks_fast() {
        let cost_router = router_with(RouterConfig {
            strategy: RoutingStrategy::CostOptimized,
            ..Default::default()
        });
        let decision = cost_router.select_model(&request()).unwrap();
        assert_eq!(decision.provider_id, "cheap-co", "{:?}", decision.reasoning);

        let perf_router = router_with(RouterConfig {
            strategy: RoutingStrategy::PerformanceFirst,
            ..Default::default()
        });
        let decision = perf_router.select_model(&request()).unwrap();
        assert_eq!(decision.provider_id, "fast-co", "{:?}", decision.reasoning);
    }

    #[test]
    fn test_degraded_health_lowers_score() {
        let router = router_with(RouterConfig {
            strategy: RoutingStrategy::Even,
            ..Default::default()
        });
        let baseline = router.select_model(&request()).unwrap();
        router.update_health(ProviderHealth {
            status: HealthStatus::Degraded,
            ..ProviderHealth::healthy(baseline.provider_id.clone())
        });
        let after = router.select_model(&request()).unwrap();
        assert_ne!(after.provider_id, baseline.provider_id);
    }

    #[test]
    fn test_round_robin_rotates_among_top_candidates() {
        let router = router_with(RouterConfig {
            load_balancing: LoadBalancingStrategy::RoundRobin,
            ..Default::default()
        });
        let first = router.select_model(&request()).unwrap();
        let second = router.select_model(&request()).unwrap();
        assert_ne!(first.provider_id, second.provider_id);
    }

    #[test]
    fn test_least_connections_avoids_busy_provider() {
        let router = router_with(RouterConfig {
            load_balancing: LoadBalancingStrategy::LeastConnections,
            ..Default::default()
        });
        let busy = router.select_model(&request()).unwrap().provider_id;
        router.begin_call(&busy);
        router.begin_call(&busy);
        let decision = router.select_model(&request()).unwrap();
        assert_ne!(decision.provider_id, busy);
    }

    #[test]
    fn test_weighted_random_stays_within_candidates() {
        let router = router_with(RouterConfig {
            load_balancing: LoadBalancingStrategy::WeightedRandom,
            ..Default::default()
        });
        for _ in 0..20 {
            let decision = router.select_model(&request()).unwrap();
            assert!(["cheap-large", "fast-large"].contains(&decision.selected_model.as_str()));
        }
    }

    #[test]
    fn test_fallback_override_replaces_scored_alternatives() {
        let mut config = RouterConfig::default();
        config
            .fallback_overrides
            .insert("cheap-large".to_string(), vec!["fast-large".to_string()]);
        let router = router_with(RouterConfig {
            strategy: RoutingStrategy::CostOptimized,
            ..config
        });
        let decision = router.select_model(&request()).unwrap();
        assert_eq!(decision.selected_model, "cheap-large");
        assert_eq!(decision.alternatives, vec!["fast-large".to_string()]);
    }

    #[test]
    fn test_sibling_models_fall_back_to_each_other() {
        let router = Router::new(RouterConfig::default());
        router.ingest_provider(
            "solo",
            vec![
                model("solo-large", "solo", 0.01, 0.03, 800),
                model("solo-mini", "solo", 0.001, 0.002, 300),
            ],
        );
        let mut req = request();
        req.requirements = Some(ModelRequirements {
            preferred_providers: vec!["solo".to_string()],
            ..Default::default()
        });
        let decision = router.select_model(&req).unwrap();
        // Two eligible siblings: alternatives come from scoring, and the
        // loser of the pair is the fallback.
        assert_eq!(decision.alternatives.len(), 1);
        assert_ne!(decision.alternatives[0], decision.selected_model);
    }

    #[test]
    fn test_unregister_removes_models() {
        let router = router_with(RouterConfig::default());
        router.remove_provider("cheap-co");
        assert!(router.model_definition("cheap-large").is_none());
        let decision = router.select_model(&request()).unwrap();
        assert_eq!(decision.provider_id, "fast-co");
    }

    #[test]
    fn test_inflight_guard_balances_counts() {
        let router = Arc::new(router_with(RouterConfig {
            load_balancing: LoadBalancingStrategy::LeastConnections,
            ..Default::default()
        }));
        let preferred = router.select_model(&request()).unwrap().provider_id;
        {
            let _a = InflightGuard::new(Arc::clone(&router), preferred.clone());
            let _b = InflightGuard::new(Arc::clone(&router), preferred.clone());
            let decision = router.select_model(&request()).unwrap();
            assert_ne!(decision.provider_id, preferred);
        }
        // Guards dropped: counts back to zero, original ordering restored.
        let decision = router.select_model(&request()).unwrap();
        assert_eq!(decision.provider_id, preferred);
    }
}
