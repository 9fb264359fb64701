//! AnthropicProvider -- concrete [`ModelProvider`] implementation for the
//! Anthropic Messages API.
//!
//! Sends requests to `/v1/messages` with `x-api-key` and
//! `anthropic-version` headers. Supports both non-streaming (`chat`) and
//! streaming (`stream`) modes; transient failures are retried with
//! bounded exponential backoff before surfacing.
//!
//! The API key is wrapped in [`secrecy::SecretString`] and is never
//! logged or included in `Debug` output.

use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures_util::Stream;
use secrecy::{ExposeSecret, SecretString};
use tracing::Instrument;

use modelhub_core::provider::{MetricsRecorder, ModelProvider};
use modelhub_observe::genai_attrs;
use modelhub_types::chat::{
    FinishReason, Message, MessageRole, ModelRequest, ModelResponse, ToolCall, Usage,
};
use modelhub_types::error::HubError;
use modelhub_types::health::{HealthStatus, PerformanceMetrics, ProviderHealth};
use modelhub_types::model::{ModelDefinition, ProviderConfig, ProviderType};
use modelhub_types::stream::StreamChunk;

use crate::providers::catalog;
use crate::retry::{retry_with_backoff, RetryPolicy};

use super::streaming::{create_anthropic_stream, StreamContext};
use super::types::{
    AnthropicContentBlock, AnthropicMessage, AnthropicNonStreamResponse, AnthropicRequest,
    AnthropicTool,
};

/// Error rate above which a responsive provider is classified degraded.
const DEGRADED_ERROR_RATE: f64 = 0.25;

/// Assumed completion tokens when estimating the cost of an unsent request.
pub(super) const ESTIMATED_COMPLETION_TOKENS: u32 = 500;

/// Per-message structural overhead in characters for token estimation.
pub(super) const MESSAGE_OVERHEAD_CHARS: usize = 10;

/// Latest rate-limit headers observed from the API.
#[derive(Debug, Default, Clone)]
pub(super) struct RateLimitState {
    pub remaining: Option<u32>,
    pub reset: Option<DateTime<Utc>>,
}

/// Anthropic Claude provider adapter.
///
/// # API Key Security
///
/// Does NOT derive Debug to prevent accidental exposure of internal
/// state. The `SecretString` field ensures the key never prints.
pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: Arc<SecretString>,
    base_url: String,
    provider_id: String,
    timeout_ms: u64,
    models: Vec<ModelDefinition>,
    retry: RetryPolicy,
    metrics: Arc<MetricsRecorder>,
    rate_limit: Mutex<RateLimitState>,
}

impl AnthropicProvider {
    /// The Anthropic API version header value.
    const API_VERSION: &'static str = "2023-06-01";

    /// Create a provider from its registration config.
    ///
    /// Fails with `AuthenticationFailed` when no API key is configured.
    pub fn new(config: &ProviderConfig) -> Result<Self, HubError> {
        let key = config
            .api_key
            .as_deref()
            .ok_or_else(|| HubError::AuthenticationFailed(config.id.clone()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .expect("failed to create reqwest client");

        let models = if config.models.is_empty() {
            catalog::anthropic_default_models(&config.id)
        } else {
            config.models.clone()
        };

        Ok(Self {
            client,
            api_key: Arc::new(SecretString::from(key.to_string())),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| "https://api.anthropic.com".to_string()),
            provider_id: config.id.clone(),
            timeout_ms: config.timeout_ms,
            models,
            retry: RetryPolicy::default(),
            metrics: Arc::new(MetricsRecorder::new()),
            rate_limit: Mutex::new(RateLimitState::default()),
        })
    }

    /// Override the base URL (useful for testing or proxies).
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Resolve the target model: the explicit request model, or this
    /// provider's first (default) model.
    fn resolve_model(&self, request: &ModelRequest) -> Result<ModelDefinition, HubError> {
        match &request.model {
            Some(model_id) => self
                .models
                .iter()
                .find(|m| &m.id == model_id)
                .cloned()
                .ok_or_else(|| HubError::ModelNotFound(model_id.clone())),
            None => self
                .models
                .first()
                .cloned()
                .ok_or_else(|| HubError::ModelNotFound(format!("{} default", self.provider_id))),
        }
    }

    /// Translate a canonical request into Anthropic wire format.
    ///
    /// System-role messages are lifted into the top-level `system` field,
    /// which is how the Messages API expects them.
    fn to_wire_request(
        &self,
        request: &ModelRequest,
        model: &ModelDefinition,
        stream: bool,
    ) -> AnthropicRequest {
        let mut system_parts: Vec<&str> = Vec::new();
        let mut messages = Vec::new();
        for message in &request.messages {
            match message.role {
                MessageRole::System => system_parts.push(&message.content),
                _ => messages.push(AnthropicMessage {
                    role: message.role.to_string(),
                    content: message.content.clone(),
                }),
            }
        }

        let tools = request.tools.as_ref().map(|tools| {
            tools
                .iter()
                .map(|t| AnthropicTool {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    input_schema: t.parameters.clone(),
                })
                .collect()
        });

        AnthropicRequest {
            model: model.id.clone(),
            max_tokens: request
                .max_tokens
                .unwrap_or_else(|| model.max_output_tokens.min(4096)),
            messages,
            system: if system_parts.is_empty() {
                None
            } else {
                Some(system_parts.join("\n\n"))
            },
            stream,
            temperature: request.temperature,
            tools,
        }
    }

    /// POST a request to `/v1/messages` and parse the response. Pure
    /// transport: metrics are recorded by the callers.
    pub(super) async fn send_messages(
        &self,
        body: &AnthropicRequest,
    ) -> Result<AnthropicNonStreamResponse, HubError> {
        let url = self.url("/v1/messages");
        let response = self
            .client
            .post(&url)
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", Self::API_VERSION)
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| map_transport_error(&self.provider_id, self.timeout_ms, e))?;

        self.update_rate_limit(response.headers());

        let status = response.status();
        if !status.is_success() {
            let retry_after_ms = parse_retry_after(response.headers());
            let error_body = response.text().await.unwrap_or_default();
            return Err(map_status_error(
                &self.provider_id,
                status,
                error_body,
                retry_after_ms,
            ));
        }

        response
            .json()
            .await
            .map_err(|e| HubError::Deserialization(format!("failed to parse response: {e}")))
    }

    fn update_rate_limit(&self, headers: &reqwest::header::HeaderMap) {
        let remaining = headers
            .get("anthropic-ratelimit-requests-remaining")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u32>().ok());
        let reset = headers
            .get("anthropic-ratelimit-requests-reset")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
            .map(|t| t.with_timezone(&Utc));

        if remaining.is_some() || reset.is_some() {
            let mut state = self.rate_limit.lock().expect("rate limit lock poisoned");
            if remaining.is_some() {
                state.remaining = remaining;
            }
            if reset.is_some() {
                state.reset = reset;
            }
        }
    }

    /// Translate a wire response into the canonical form, pricing it at
    /// the model's per-1K rates.
    fn to_model_response(
        &self,
        wire: AnthropicNonStreamResponse,
        model: &ModelDefinition,
        latency_ms: u64,
    ) -> ModelResponse {
        let content = wire
            .content
            .iter()
            .filter_map(|block| match block {
                AnthropicContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("");

        let tool_calls: Vec<ToolCall> = wire
            .content
            .into_iter()
            .filter_map(|block| match block {
                AnthropicContentBlock::ToolUse { id, name, input } => Some(ToolCall {
                    id,
                    name,
                    arguments: input,
                }),
                _ => None,
            })
            .collect();

        let usage = Usage::new(wire.usage.input_tokens, wire.usage.output_tokens);
        let cost = model.cost_for(usage.prompt_tokens, usage.completion_tokens);

        ModelResponse {
            id: wire.id,
            model: wire.model,
            provider_id: self.provider_id.clone(),
            content,
            tool_calls,
            finish_reason: map_stop_reason(wire.stop_reason.as_deref()),
            usage,
            cost,
            latency_ms,
            cached: false,
            created_at: Utc::now(),
            request_id: uuid::Uuid::now_v7(),
        }
    }
}

// AnthropicProvider intentionally does NOT derive Debug. The SecretString
// field prevents the key from printing, but omitting Debug entirely keeps
// the whole client state out of logs.

impl ModelProvider for AnthropicProvider {
    fn id(&self) -> &str {
        &self.provider_id
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::Anthropic
    }

    async fn initialize(&self, config: &ProviderConfig) -> Result<(), HubError> {
        if config.api_key.is_none() {
            return Err(HubError::AuthenticationFailed(config.id.clone()));
        }
        Ok(())
    }

    fn list_models(&self) -> Vec<ModelDefinition> {
        self.models.clone()
    }

    async fn chat(&self, request: &ModelRequest) -> Result<ModelResponse, HubError> {
        let model = self.resolve_model(request)?;
        let body = self.to_wire_request(request, &model, false);

        let span = tracing::info_span!(
            "chat",
            gen_ai.operation.name = genai_attrs::OP_CHAT,
            gen_ai.provider.name = %self.provider_id,
            gen_ai.request.model = %model.id,
            gen_ai.usage.input_tokens = tracing::field::Empty,
            gen_ai.usage.output_tokens = tracing::field::Empty,
            gen_ai.response.id = tracing::field::Empty,
        );

        let started = Instant::now();
        let result = retry_with_backoff(&self.retry, || self.send_messages(&body))
            .instrument(span.clone())
            .await;
        let latency_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(wire) => {
                let response = self.to_model_response(wire, &model, latency_ms);
                span.record(
                    genai_attrs::GEN_AI_USAGE_INPUT_TOKENS,
                    response.usage.prompt_tokens as u64,
                );
                span.record(
                    genai_attrs::GEN_AI_USAGE_OUTPUT_TOKENS,
                    response.usage.completion_tokens as u64,
                );
                span.record(genai_attrs::GEN_AI_RESPONSE_ID, response.id.as_str());
                tracing::debug!(
                    model = %response.model,
                    latency_ms,
                    cost = %catalog::format_cost(response.cost),
                    "Anthropic chat completed"
                );
                self.metrics.record_success(
                    latency_ms,
                    response.cost,
                    response.usage.total_tokens as u64,
                );
                Ok(response)
            }
            Err(err) => {
                self.metrics.record_failure(latency_ms);
                Err(err)
            }
        }
    }

    fn stream(
        &self,
        request: ModelRequest,
    ) -> Pin<Box<dyn Stream<Item = Result<StreamChunk, HubError>> + Send + 'static>> {
        let model = match self.resolve_model(&request) {
            Ok(model) => model,
            Err(err) => {
                return Box::pin(futures_util::stream::once(async move { Err(err) }));
            }
        };
        let body = self.to_wire_request(&request, &model, true);

        tracing::debug!(
            gen_ai.operation.name = genai_attrs::OP_CHAT_STREAM,
            gen_ai.provider.name = %self.provider_id,
            gen_ai.request.model = %model.id,
            "Starting Anthropic stream"
        );

        create_anthropic_stream(
            StreamContext {
                client: self.client.clone(),
                url: self.url("/v1/messages"),
                api_key: Arc::clone(&self.api_key),
                api_version: Self::API_VERSION,
                provider_id: self.provider_id.clone(),
                model,
                timeout_ms: self.timeout_ms,
                retry: self.retry.clone(),
                metrics: Arc::clone(&self.metrics),
            },
            body,
        )
    }

    async fn health_check(&self) -> Result<ProviderHealth, HubError> {
        // Probe with the cheapest model and a single token.
        let model = self
            .models
            .iter()
            .min_by(|a, b| {
                a.output_cost_per_1k
                    .partial_cmp(&b.output_cost_per_1k)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .ok_or_else(|| HubError::ModelNotFound(format!("{} default", self.provider_id)))?;

        let body = AnthropicRequest {
            model: model.id.clone(),
            max_tokens: 1,
            messages: vec![AnthropicMessage {
                role: "user".to_string(),
                content: "ping".to_string(),
            }],
            system: None,
            stream: false,
            temperature: Some(0.0),
            tools: None,
        };

        let result = self.send_messages(&body).await;
        let metrics = self.metrics.snapshot();
        let rate_limit = self
            .rate_limit
            .lock()
            .expect("rate limit lock poisoned")
            .clone();

        let status = match &result {
            Ok(_) if metrics.error_rate() > DEGRADED_ERROR_RATE => HealthStatus::Degraded,
            Ok(_) => HealthStatus::Healthy,
            Err(HubError::RateLimited { .. }) => HealthStatus::Degraded,
            Err(_) => HealthStatus::Unhealthy,
        };

        Ok(ProviderHealth {
            provider_id: self.provider_id.clone(),
            status,
            last_check: Utc::now(),
            error_rate: metrics.error_rate(),
            availability: 1.0 - metrics.error_rate(),
            rate_limit_remaining: rate_limit.remaining,
            rate_limit_reset: rate_limit.reset,
        })
    }

    fn metrics(&self) -> PerformanceMetrics {
        self.metrics.snapshot()
    }

    fn estimate_cost(&self, messages: &[Message], model_id: &str) -> Result<f64, HubError> {
        let model = self
            .models
            .iter()
            .find(|m| m.id == model_id)
            .ok_or_else(|| HubError::ModelNotFound(model_id.to_string()))?;
        let prompt_tokens = self.estimate_tokens(messages);
        Ok(model.cost_for(prompt_tokens, ESTIMATED_COMPLETION_TOKENS))
    }

    fn estimate_tokens(&self, messages: &[Message]) -> u32 {
        // ~4 chars per token plus structural overhead per message.
        let total_chars: usize = messages
            .iter()
            .map(|m| m.content.len() + MESSAGE_OVERHEAD_CHARS)
            .sum();
        (total_chars as f64 / 4.0).ceil() as u32
    }

    async fn shutdown(&self) {
        tracing::debug!(provider = %self.provider_id, "Anthropic provider shut down");
    }
}

/// Map reqwest transport failures into the hub taxonomy.
pub(super) fn map_transport_error(
    provider: &str,
    timeout_ms: u64,
    err: reqwest::Error,
) -> HubError {
    if err.is_timeout() {
        HubError::Timeout {
            provider: provider.to_string(),
            timeout_ms,
        }
    } else {
        HubError::UpstreamCallFailed {
            provider: provider.to_string(),
            message: format!("HTTP request failed: {err}"),
        }
    }
}

/// Map a non-success HTTP status into the hub taxonomy.
pub(super) fn map_status_error(
    provider: &str,
    status: reqwest::StatusCode,
    body: String,
    retry_after_ms: Option<u64>,
) -> HubError {
    match status.as_u16() {
        401 | 403 => HubError::AuthenticationFailed(provider.to_string()),
        429 => HubError::RateLimited {
            provider: provider.to_string(),
            retry_after_ms,
        },
        400 => HubError::InvalidRequest(body),
        _ => HubError::UpstreamCallFailed {
            provider: provider.to_string(),
            message: format!("HTTP {status}: {body}"),
        },
    }
}

/// Parse a `retry-after` header (in seconds) into milliseconds.
pub(super) fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .map(|secs| secs * 1000)
}

/// Map an Anthropic stop reason string to the canonical enum.
pub(super) fn map_stop_reason(stop_reason: Option<&str>) -> FinishReason {
    match stop_reason {
        Some("max_tokens") => FinishReason::Length,
        Some("tool_use") => FinishReason::ToolCalls,
        Some("refusal") => FinishReason::ContentFilter,
        _ => FinishReason::Stop,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ProviderConfig {
        ProviderConfig {
            id: "anthropic".to_string(),
            provider_type: ProviderType::Anthropic,
            api_key: Some("test-key-not-real".to_string()),
            base_url: None,
            timeout_ms: 30_000,
            models: vec![],
        }
    }

    fn make_provider() -> AnthropicProvider {
        AnthropicProvider::new(&config()).unwrap()
    }

    #[test]
    fn test_missing_api_key_fails() {
        let mut config = config();
        config.api_key = None;
        assert!(matches!(
            AnthropicProvider::new(&config),
            Err(HubError::AuthenticationFailed(_))
        ));
    }

    #[test]
    fn test_default_catalog_when_config_declares_no_models() {
        let provider = make_provider();
        assert_eq!(provider.models.len(), 3);
        assert!(provider.models.iter().all(|m| m.provider_id == "anthropic"));
    }

    #[test]
    fn test_resolve_model_explicit_and_default() {
        let provider = make_provider();

        let mut request = ModelRequest::new(vec![Message::user("hi")]);
        let resolved = provider.resolve_model(&request).unwrap();
        assert_eq!(resolved.id, provider.models[0].id);

        request.model = Some("claude-opus-4-20250514".to_string());
        let resolved = provider.resolve_model(&request).unwrap();
        assert_eq!(resolved.id, "claude-opus-4-20250514");

        request.model = Some("no-such-model".to_string());
        assert!(matches!(
            provider.resolve_model(&request),
            Err(HubError::ModelNotFound(_))
        ));
    }

    #[test]
    fn test_wire_request_lifts_system_messages() {
        let provider = make_provider();
        let request = ModelRequest {
            messages: vec![
                Message::system("Be helpful."),
                Message::user("Hello"),
                Message::assistant("Hi!"),
                Message::user("How are you?"),
            ],
            model: None,
            max_tokens: Some(256),
            temperature: Some(0.7),
            tools: None,
            requirements: None,
        };
        let model = provider.models[0].clone();

        let wire = provider.to_wire_request(&request, &model, true);
        assert_eq!(wire.system.as_deref(), Some("Be helpful."));
        assert_eq!(wire.messages.len(), 3);
        assert_eq!(wire.messages[0].role, "user");
        assert_eq!(wire.max_tokens, 256);
        assert!(wire.stream);
    }

    #[test]
    fn test_wire_request_maps_tools() {
        let provider = make_provider();
        let request = ModelRequest {
            messages: vec![Message::user("compute")],
            model: None,
            max_tokens: None,
            temperature: None,
            tools: Some(vec![modelhub_types::chat::ToolDefinition {
                name: "calculator".to_string(),
                description: "Evaluate arithmetic".to_string(),
                parameters: serde_json::json!({"type": "object"}),
            }]),
            requirements: None,
        };
        let model = provider.models[0].clone();

        let wire = provider.to_wire_request(&request, &model, false);
        let tools = wire.tools.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "calculator");
    }

    #[test]
    fn test_stop_reason_mapping() {
        assert_eq!(map_stop_reason(Some("end_turn")), FinishReason::Stop);
        assert_eq!(map_stop_reason(Some("stop_sequence")), FinishReason::Stop);
        assert_eq!(map_stop_reason(Some("max_tokens")), FinishReason::Length);
        assert_eq!(map_stop_reason(Some("tool_use")), FinishReason::ToolCalls);
        assert_eq!(map_stop_reason(Some("refusal")), FinishReason::ContentFilter);
        assert_eq!(map_stop_reason(None), FinishReason::Stop);
    }

    #[test]
    fn test_status_error_mapping() {
        let provider = "anthropic";
        assert!(matches!(
            map_status_error(
                provider,
                reqwest::StatusCode::UNAUTHORIZED,
                String::new(),
                None
            ),
            HubError::AuthenticationFailed(_)
        ));
        assert!(matches!(
            map_status_error(
                provider,
                reqwest::StatusCode::TOO_MANY_REQUESTS,
                String::new(),
                Some(2000)
            ),
            HubError::RateLimited {
                retry_after_ms: Some(2000),
                ..
            }
        ));
        assert!(matches!(
            map_status_error(
                provider,
                reqwest::StatusCode::BAD_REQUEST,
                "bad".to_string(),
                None
            ),
            HubError::InvalidRequest(_)
        ));
        // Overloaded and server errors are transient upstream failures.
        let err = map_status_error(
            provider,
            reqwest::StatusCode::from_u16(529).unwrap(),
            "busy".to_string(),
            None,
        );
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_estimate_tokens_heuristic() {
        let provider = make_provider();
        let messages = vec![
            Message::system("You are helpful."),
            Message::user("Hello world, how are you doing today?"),
        ];
        // (16 + 10) + (37 + 10) = 73 chars -> ceil(73 / 4) = 19 tokens.
        assert_eq!(provider.estimate_tokens(&messages), 19);
    }

    #[test]
    fn test_estimate_cost_uses_model_rates() {
        let provider = make_provider();
        let messages = vec![Message::user("Hello")];
        let cost = provider
            .estimate_cost(&messages, "claude-sonnet-4-20250514")
            .unwrap();
        // 4 prompt tokens at $0.003/1k + 500 assumed completion at $0.015/1k.
        let expected = (4.0 / 1000.0) * 0.003 + (500.0 / 1000.0) * 0.015;
        assert!((cost - expected).abs() < 1e-9, "got {cost}");

        assert!(matches!(
            provider.estimate_cost(&messages, "unknown"),
            Err(HubError::ModelNotFound(_))
        ));
    }

    #[test]
    fn test_base_url_override() {
        let provider = make_provider().with_base_url("http://localhost:8080".to_string());
        assert_eq!(
            provider.url("/v1/messages"),
            "http://localhost:8080/v1/messages"
        );
    }
}
