//! The Model Hub orchestrator.
//!
//! Wires the budget tracker, response cache, router, and provider
//! registry together per request: budget check -> cache check -> route ->
//! execute with fallback -> record spend -> cache -> emit events. Owns
//! provider lifecycle and the periodic health/metrics monitor.
//!
//! Callers receive exactly one terminal outcome per `chat` call and
//! exactly one terminal chunk per `stream` call; partial failures during
//! fallback surface only as `fallback_triggered` events.

use std::collections::{HashMap, VecDeque};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures_util::{Stream, StreamExt};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use modelhub_types::budget::{BudgetLimits, BudgetUsage, CostAnalysis};
use modelhub_types::chat::{ModelRequest, ModelResponse};
use modelhub_types::config::HubConfig;
use modelhub_types::error::HubError;
use modelhub_types::event::HubEvent;
use modelhub_types::health::{HealthStatus, PerformanceMetrics, ProviderHealth};
use modelhub_types::model::ProviderConfig;
use modelhub_types::router::{RouterConfig, RouterDecision};
use modelhub_types::stream::{ChunkPayload, StreamChunk};

use crate::budget::BudgetTracker;
use crate::cache::{cache_key, CacheStats, ResponseCache};
use crate::event::EventBus;
use crate::provider::BoxModelProvider;
use crate::router::{InflightGuard, Router};

/// Bound on the in-memory usage log consulted by cost analysis.
const USAGE_LOG_CAP: usize = 10_000;

struct UsageRecord {
    at: DateTime<Utc>,
    provider_id: String,
    model: String,
    cost: f64,
    tokens: u64,
}

enum StreamTerminal {
    Done,
    Error(String),
}

/// The facade of the Model Routing Hub.
///
/// Safe to share behind an `Arc` across concurrent `chat`/`stream`
/// callers; all shared state is lock-guarded or concurrent.
pub struct ModelHub {
    config: HubConfig,
    providers: DashMap<String, Arc<BoxModelProvider>>,
    router: Arc<Router>,
    budget: Arc<BudgetTracker>,
    cache: Arc<ResponseCache>,
    events: EventBus,
    usage_log: Arc<Mutex<VecDeque<UsageRecord>>>,
    cancel: CancellationToken,
    monitor: Mutex<Option<JoinHandle<()>>>,
}

impl ModelHub {
    pub fn new(config: HubConfig) -> Self {
        let router = Arc::new(Router::new(config.router.clone()));
        let budget = Arc::new(BudgetTracker::new(config.budget.clone()));
        let cache = Arc::new(ResponseCache::new(
            Duration::from_secs(config.cache_ttl_secs),
            config.cache_max_entries,
        ));
        let events = EventBus::new(config.event_capacity);
        Self {
            config,
            providers: DashMap::new(),
            router,
            budget,
            cache,
            events,
            usage_log: Arc::new(Mutex::new(VecDeque::new())),
            cancel: CancellationToken::new(),
            monitor: Mutex::new(None),
        }
    }

    /// Subscribe to the hub's observability event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<HubEvent> {
        self.events.subscribe()
    }

    /// Register a provider: initialize the adapter, ingest its models
    /// into the router, and seed its load-balancer weight.
    pub async fn register_provider(
        &self,
        config: ProviderConfig,
        adapter: BoxModelProvider,
    ) -> Result<(), HubError> {
        adapter.initialize(&config).await?;
        let mut models = adapter.list_models();
        // Definitions always point at the provider they were registered
        // under, regardless of what the adapter filled in.
        for model in &mut models {
            model.provider_id = config.id.clone();
        }
        let model_count = models.len();
        // Store the adapter before the router learns about its models, so
        // a concurrent routing decision never resolves to a missing provider.
        self.providers.insert(config.id.clone(), Arc::new(adapter));
        self.router.ingest_provider(&config.id, models);
        tracing::info!(provider = %config.id, model_count, "Provider registered");
        self.events.publish(HubEvent::ProviderRegistered {
            provider_id: config.id,
            model_count,
        });
        Ok(())
    }

    /// Unregister a provider, shutting its adapter down and removing its
    /// models from the router.
    pub async fn unregister_provider(&self, provider_id: &str) -> Result<(), HubError> {
        let Some((_, provider)) = self.providers.remove(provider_id) else {
            return Err(HubError::ProviderNotFound(provider_id.to_string()));
        };
        provider.shutdown().await;
        self.router.remove_provider(provider_id);
        tracing::info!(provider = %provider_id, "Provider unregistered");
        self.events.publish(HubEvent::ProviderUnregistered {
            provider_id: provider_id.to_string(),
        });
        Ok(())
    }

    fn provider(&self, provider_id: &str) -> Option<Arc<BoxModelProvider>> {
        self.providers
            .get(provider_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Execute a non-streaming request.
    pub async fn chat(&self, request: ModelRequest) -> Result<ModelResponse, HubError> {
        let request_id = Uuid::now_v7();
        match self.chat_inner(request_id, &request).await {
            Ok(response) => Ok(response),
            Err(err) => {
                self.events.publish(HubEvent::RequestFailed {
                    request_id,
                    error: err.to_string(),
                });
                Err(err)
            }
        }
    }

    async fn chat_inner(
        &self,
        request_id: Uuid,
        request: &ModelRequest,
    ) -> Result<ModelResponse, HubError> {
        self.budget.check_budget()?;

        let key = cache_key(request);
        if let Some(mut response) = self.cache.get(&key) {
            response.request_id = request_id;
            tracing::debug!(%request_id, "Serving response from cache");
            self.events.publish(HubEvent::CacheHit { request_id, key });
            return Ok(response);
        }

        let decision = self.router.select_model(request)?;
        self.events.publish(HubEvent::ModelSelected {
            request_id,
            model: decision.selected_model.clone(),
            provider_id: decision.provider_id.clone(),
            confidence: decision.confidence,
        });

        let mut chain = vec![decision.selected_model.clone()];
        chain.extend(decision.alternatives.iter().cloned());

        let mut attempts = 0usize;
        let mut last_error: Option<HubError> = None;

        for (idx, model_id) in chain.iter().enumerate() {
            // An alternative may have disappeared if its provider was
            // unregistered since the decision was made.
            let Some(model) = self.router.model_definition(model_id) else {
                continue;
            };
            let Some(provider) = self.provider(&model.provider_id) else {
                last_error = Some(HubError::ProviderNotFound(model.provider_id.clone()));
                continue;
            };

            attempts += 1;
            let mut attempt = request.clone();
            attempt.model = Some(model_id.clone());

            let _guard = InflightGuard::new(Arc::clone(&self.router), model.provider_id.clone());
            match provider.chat(&attempt).await {
                Ok(mut response) => {
                    response.request_id = request_id;
                    self.budget.record_usage(response.cost);
                    self.push_usage(UsageRecord {
                        at: Utc::now(),
                        provider_id: response.provider_id.clone(),
                        model: response.model.clone(),
                        cost: response.cost,
                        tokens: response.usage.total_tokens as u64,
                    });
                    self.cache.put(key.clone(), &response);
                    self.events.publish(HubEvent::RequestCompleted {
                        request_id,
                        model: response.model.clone(),
                        provider_id: response.provider_id.clone(),
                        cost: response.cost,
                        latency_ms: response.latency_ms,
                        cached: false,
                    });
                    return Ok(response);
                }
                Err(err) => {
                    tracing::warn!(
                        model = %model_id,
                        error = %err,
                        "Execution attempt failed"
                    );
                    if let Some(next) = chain.get(idx + 1) {
                        self.events.publish(HubEvent::FallbackTriggered {
                            request_id,
                            from_model: model_id.clone(),
                            to_model: next.clone(),
                            error: err.to_string(),
                        });
                    }
                    last_error = Some(err);
                }
            }
        }

        match last_error {
            Some(err) => Err(HubError::AllFallbacksExhausted {
                attempts,
                last_error: err.to_string(),
            }),
            // The whole chain resolved to nothing executable.
            None => Err(HubError::ModelNotFound(decision.selected_model)),
        }
    }

    /// Execute a streaming request. The returned sequence is lazy, finite,
    /// and terminated by exactly one `Done` or `Error` chunk (or a single
    /// `Err` item when setup fails).
    ///
    /// Streams are never cached. Dropping the returned stream stops chunk
    /// delivery; the upstream call is not actively cancelled.
    pub fn stream(
        &self,
        request: ModelRequest,
    ) -> Pin<Box<dyn Stream<Item = Result<StreamChunk, HubError>> + Send + 'static>> {
        let request_id = Uuid::now_v7();
        match self.stream_inner(request_id, request) {
            Ok(stream) => stream,
            Err(err) => {
                self.events.publish(HubEvent::StreamFailed {
                    request_id,
                    error: err.to_string(),
                });
                Box::pin(futures_util::stream::once(async move { Err(err) }))
            }
        }
    }

    fn stream_inner(
        &self,
        request_id: Uuid,
        request: ModelRequest,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<StreamChunk, HubError>> + Send + 'static>>, HubError>
    {
        self.budget.check_budget()?;

        let decision = self.router.select_model(&request)?;
        let model = self
            .router
            .model_definition(&decision.selected_model)
            .ok_or_else(|| HubError::ModelNotFound(decision.selected_model.clone()))?;
        let provider = self
            .provider(&model.provider_id)
            .ok_or_else(|| HubError::ProviderNotFound(model.provider_id.clone()))?;

        self.events.publish(HubEvent::ModelSelected {
            request_id,
            model: model.id.clone(),
            provider_id: model.provider_id.clone(),
            confidence: decision.confidence,
        });

        let mut attempt = request;
        attempt.model = Some(model.id.clone());

        let guard = InflightGuard::new(Arc::clone(&self.router), model.provider_id.clone());
        let upstream = provider.stream(attempt);

        self.events.publish(HubEvent::StreamStarted {
            request_id,
            model: model.id.clone(),
            provider_id: model.provider_id.clone(),
        });

        let events = self.events.clone();
        let budget = Arc::clone(&self.budget);
        let usage_log = Arc::clone(&self.usage_log);

        let enriched = async_stream::stream! {
            let _guard = guard;
            let started = Instant::now();
            let mut usage_cost: Option<f64> = None;
            let mut usage_tokens: u64 = 0;

            futures_util::pin_mut!(upstream);
            while let Some(item) = upstream.next().await {
                match item {
                    Ok(mut chunk) => {
                        chunk.meta.request_id = request_id;
                        chunk.meta.latency_ms = started.elapsed().as_millis() as u64;
                        match &chunk.payload {
                            ChunkPayload::Usage(usage) => {
                                // Exact cost replaces the adapter's
                                // in-flight estimate from here on.
                                let cost =
                                    model.cost_for(usage.prompt_tokens, usage.completion_tokens);
                                usage_cost = Some(cost);
                                usage_tokens = usage.total_tokens as u64;
                                chunk.meta.cost_so_far = cost;
                            }
                            _ => {
                                if let Some(cost) = usage_cost {
                                    chunk.meta.cost_so_far = cost;
                                }
                            }
                        }

                        let terminal = match &chunk.payload {
                            ChunkPayload::Done { .. } => Some(StreamTerminal::Done),
                            ChunkPayload::Error { message } => {
                                Some(StreamTerminal::Error(message.clone()))
                            }
                            _ => None,
                        };
                        let cost_so_far = chunk.meta.cost_so_far;
                        yield Ok(chunk);

                        match terminal {
                            Some(StreamTerminal::Done) => {
                                let final_cost = usage_cost.unwrap_or(cost_so_far);
                                budget.record_usage(final_cost);
                                {
                                    let mut log =
                                        usage_log.lock().expect("usage log lock poisoned");
                                    if log.len() >= USAGE_LOG_CAP {
                                        log.pop_front();
                                    }
                                    log.push_back(UsageRecord {
                                        at: Utc::now(),
                                        provider_id: model.provider_id.clone(),
                                        model: model.id.clone(),
                                        cost: final_cost,
                                        tokens: usage_tokens,
                                    });
                                }
                                events.publish(HubEvent::StreamCompleted {
                                    request_id,
                                    model: model.id.clone(),
                                    provider_id: model.provider_id.clone(),
                                    cost: final_cost,
                                });
                                break;
                            }
                            Some(StreamTerminal::Error(message)) => {
                                events.publish(HubEvent::StreamError {
                                    request_id,
                                    message,
                                });
                                break;
                            }
                            None => {}
                        }
                    }
                    Err(err) => {
                        events.publish(HubEvent::StreamError {
                            request_id,
                            message: err.to_string(),
                        });
                        yield Err(err);
                        break;
                    }
                }
            }
        };
        Ok(Box::pin(enriched))
    }

    /// Routing-only dry run: no budget, cache, or execution side effects.
    pub fn select_model(&self, request: &ModelRequest) -> Result<RouterDecision, HubError> {
        self.router.select_model(request)
    }

    pub fn list_providers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.providers.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Per-provider rolling performance counters, straight from adapters.
    pub fn get_metrics(&self) -> HashMap<String, PerformanceMetrics> {
        self.providers
            .iter()
            .map(|e| (e.key().clone(), e.value().metrics()))
            .collect()
    }

    /// Latest health snapshots as seen by the router.
    pub fn get_health(&self) -> HashMap<String, ProviderHealth> {
        self.router.health_snapshot()
    }

    /// Aggregate spend from the in-memory usage log over a time range.
    pub fn get_cost_analysis(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> CostAnalysis {
        let log = self.usage_log.lock().expect("usage log lock poisoned");
        let mut analysis = CostAnalysis {
            from,
            to,
            total_cost: 0.0,
            request_count: 0,
            cost_by_provider: HashMap::new(),
            cost_by_model: HashMap::new(),
        };
        for record in log.iter().filter(|r| r.at >= from && r.at <= to) {
            analysis.total_cost += record.cost;
            analysis.request_count += 1;
            *analysis
                .cost_by_provider
                .entry(record.provider_id.clone())
                .or_insert(0.0) += record.cost;
            *analysis
                .cost_by_model
                .entry(record.model.clone())
                .or_insert(0.0) += record.cost;
        }
        analysis
    }

    pub fn update_router_config(&self, config: RouterConfig) {
        self.router.set_config(config);
        self.events.publish(HubEvent::ConfigUpdated);
    }

    pub fn set_budget_limits(&self, limits: BudgetLimits) {
        self.budget.set_limits(limits);
        self.events.publish(HubEvent::BudgetUpdated);
    }

    pub fn budget_usage(&self) -> BudgetUsage {
        self.budget.usage()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Start the periodic monitor: refreshes router health/metrics
    /// snapshots from every adapter and raises budget alerts.
    pub fn spawn_monitor(self: &Arc<Self>) {
        let hub = Arc::clone(self);
        let cancel = self.cancel.clone();
        let interval_secs = self.config.monitor_interval_secs.max(1);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => hub.refresh_monitor().await,
                }
            }
        });
        *self.monitor.lock().expect("monitor lock poisoned") = Some(handle);
    }

    /// One monitor pass: health check and metrics snapshot per provider,
    /// then budget alerts. Public so callers can force a refresh.
    pub async fn refresh_monitor(&self) {
        let providers: Vec<(String, Arc<BoxModelProvider>)> = self
            .providers
            .iter()
            .map(|e| (e.key().clone(), Arc::clone(e.value())))
            .collect();

        for (provider_id, provider) in providers {
            match provider.health_check().await {
                Ok(health) => self.router.update_health(health),
                Err(err) => {
                    tracing::warn!(provider = %provider_id, error = %err, "Health check failed");
                    self.router.update_health(ProviderHealth {
                        status: HealthStatus::Unhealthy,
                        error_rate: 1.0,
                        availability: 0.0,
                        ..ProviderHealth::healthy(provider_id.clone())
                    });
                }
            }
            self.router
                .update_metrics(&provider_id, provider.metrics());
        }

        for alert in self.budget.check_alerts() {
            tracing::warn!(
                window = %alert.window,
                percent_used = alert.percent_used,
                "Budget alert"
            );
            self.events.publish(HubEvent::BudgetAlert(alert));
        }
    }

    /// Stop the monitor, shut down every adapter, and emit `Shutdown`.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handle = self.monitor.lock().expect("monitor lock poisoned").take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }

        for provider_id in self.list_providers() {
            if let Some((_, provider)) = self.providers.remove(&provider_id) {
                provider.shutdown().await;
                self.router.remove_provider(&provider_id);
            }
        }
        tracing::info!("Hub shut down");
        self.events.publish(HubEvent::Shutdown);
    }

    fn push_usage(&self, record: UsageRecord) {
        let mut log = self.usage_log.lock().expect("usage log lock poisoned");
        if log.len() >= USAGE_LOG_CAP {
            log.pop_front();
        }
        log.push_back(record);
    }
}
