//! OpenAI-compatible provider adapter.
//!
//! A single [`OpenAiCompatProvider`] serves OpenAI itself plus any vendor
//! speaking the chat completions protocol, via a configurable base URL.
//!
//! Uses [`async_openai`] for type-safe request/response handling and
//! built-in SSE streaming.

pub mod streaming;

use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessage, ChatCompletionRequestAssistantMessageContent,
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
    ChatCompletionRequestSystemMessageContent, ChatCompletionRequestUserMessage,
    ChatCompletionRequestUserMessageContent, ChatCompletionStreamOptions,
    CreateChatCompletionRequest, FinishReason as OpenAiFinishReason,
};
use async_openai::Client;
use chrono::Utc;
use futures_util::Stream;
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

use self::streaming::{create_openai_stream, StreamContext};

/// Error rate above which a responsive provider is classified degraded.
const DEGRADED_ERROR_RATE: f64 = 0.25;

/// Assumed completion tokens when estimating the cost of an unsent request.
const ESTIMATED_COMPLETION_TOKENS: u32 = 500;

/// Per-message structural overhead in characters for token estimation.
const MESSAGE_OVERHEAD_CHARS: usize = 10;

/// Provider adapter for any OpenAI-compatible chat completions API.
///
/// # API Key Security
///
/// Does NOT derive Debug to prevent accidental exposure of the API key
/// stored inside the `async_openai::Client`. Same defense-in-depth
/// pattern as the Anthropic adapter.
pub struct OpenAiCompatProvider {
    client: Client<OpenAIConfig>,
    provider_id: String,
    provider_type: ProviderType,
    timeout_ms: u64,
    models: Vec<ModelDefinition>,
    retry: RetryPolicy,
    metrics: Arc<MetricsRecorder>,
}

impl OpenAiCompatProvider {
    /// Create a provider from its registration config.
    ///
    /// Fails with `AuthenticationFailed` when no API key is configured.
    /// The base URL defaults to `https://api.openai.com/v1`.
    pub fn new(config: &ProviderConfig) -> Result<Self, HubError> {
        let key = config
            .api_key
            .as_deref()
            .ok_or_else(|| HubError::AuthenticationFailed(config.id.clone()))?;

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());
        let openai_config = OpenAIConfig::new()
            .with_api_key(key)
            .with_api_base(&base_url);

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .expect("failed to create reqwest client");

        let models = if config.models.is_empty() {
            catalog::openai_default_models(&config.id)
        } else {
            config.models.clone()
        };

        Ok(Self {
            client: Client::with_config(openai_config).with_http_client(http_client),
            provider_id: config.id.clone(),
            provider_type: config.provider_type,
            timeout_ms: config.timeout_ms,
            models,
            retry: RetryPolicy::default(),
            metrics: Arc::new(MetricsRecorder::new()),
        })
    }

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

    /// Build a [`CreateChatCompletionRequest`] from a canonical request.
    fn build_request(
        &self,
        request: &ModelRequest,
        model: &ModelDefinition,
        stream: bool,
    ) -> Result<CreateChatCompletionRequest, HubError> {
        let mut messages: Vec<ChatCompletionRequestMessage> = Vec::new();
        for message in &request.messages {
            let wire = match message.role {
                MessageRole::System => {
                    ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
                        content: ChatCompletionRequestSystemMessageContent::Text(
                            message.content.clone(),
                        ),
                        name: None,
                    })
                }
                MessageRole::User => {
                    ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
                        content: ChatCompletionRequestUserMessageContent::Text(
                            message.content.clone(),
                        ),
                        name: None,
                    })
                }
                MessageRole::Assistant => {
                    #[allow(deprecated)]
                    ChatCompletionRequestMessage::Assistant(ChatCompletionRequestAssistantMessage {
                        content: Some(ChatCompletionRequestAssistantMessageContent::Text(
                            message.content.clone(),
                        )),
                        refusal: None,
                        name: None,
                        audio: None,
                        tool_calls: None,
                        function_call: None,
                    })
                }
            };
            messages.push(wire);
        }

        let mut req = CreateChatCompletionRequest {
            model: model.id.clone(),
            messages,
            max_completion_tokens: request.max_tokens,
            temperature: request.temperature.map(|t| t as f32),
            ..Default::default()
        };

        // Tool definitions are built in wire JSON form and deserialized
        // into the client types, which track the OpenAI schema exactly.
        if let Some(tools) = &request.tools {
            let wire: Vec<serde_json::Value> = tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        },
                    })
                })
                .collect();
            req.tools = Some(
                serde_json::from_value(serde_json::Value::Array(wire))
                    .map_err(|e| HubError::InvalidRequest(format!("tool definitions: {e}")))?,
            );
        }

        if stream {
            req.stream = Some(true);
            req.stream_options = Some(ChatCompletionStreamOptions {
                include_usage: Some(true),
                include_obfuscation: None,
            });
        }

        Ok(req)
    }
}

// OpenAiCompatProvider intentionally does NOT derive Debug; see above.

impl ModelProvider for OpenAiCompatProvider {
    fn id(&self) -> &str {
        &self.provider_id
    }

    fn provider_type(&self) -> ProviderType {
        self.provider_type
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
        let oai_request = self.build_request(request, &model, false)?;

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
        let result = retry_with_backoff(&self.retry, || async {
            self.client
                .chat()
                .create(oai_request.clone())
                .await
                .map_err(|e| map_openai_error(&self.provider_id, self.timeout_ms, e))
        })
        .instrument(span.clone())
        .await;
        let latency_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(response) => {
                let content = response
                    .choices
                    .first()
                    .and_then(|c| c.message.content.clone())
                    .unwrap_or_default();

                // Tool calls are extracted at the wire level so the
                // mapping is insensitive to client type layering.
                let tool_calls = response
                    .choices
                    .first()
                    .and_then(|c| serde_json::to_value(&c.message.tool_calls).ok())
                    .map(parse_wire_tool_calls)
                    .unwrap_or_default();

                let finish_reason = response
                    .choices
                    .first()
                    .and_then(|c| c.finish_reason.clone())
                    .map(|fr| map_finish_reason(&fr))
                    .unwrap_or(FinishReason::Stop);

                let usage = response
                    .usage
                    .map(|u| Usage::new(u.prompt_tokens, u.completion_tokens))
                    .unwrap_or_default();
                let cost = model.cost_for(usage.prompt_tokens, usage.completion_tokens);

                span.record(
                    genai_attrs::GEN_AI_USAGE_INPUT_TOKENS,
                    usage.prompt_tokens as u64,
                );
                span.record(
                    genai_attrs::GEN_AI_USAGE_OUTPUT_TOKENS,
                    usage.completion_tokens as u64,
                );
                span.record(genai_attrs::GEN_AI_RESPONSE_ID, response.id.as_str());
                tracing::debug!(
                    model = %response.model,
                    latency_ms,
                    cost = %catalog::format_cost(cost),
                    "OpenAI-compatible chat completed"
                );
                self.metrics
                    .record_success(latency_ms, cost, usage.total_tokens as u64);

                Ok(ModelResponse {
                    id: response.id,
                    model: response.model,
                    provider_id: self.provider_id.clone(),
                    content,
                    tool_calls,
                    finish_reason,
                    usage,
                    cost,
                    latency_ms,
                    cached: false,
                    created_at: Utc::now(),
                    request_id: uuid::Uuid::now_v7(),
                })
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
        let oai_request = match self.build_request(&request, &model, true) {
            Ok(req) => req,
            Err(err) => {
                return Box::pin(futures_util::stream::once(async move { Err(err) }));
            }
        };

        tracing::debug!(
            gen_ai.operation.name = genai_attrs::OP_CHAT_STREAM,
            gen_ai.provider.name = %self.provider_id,
            gen_ai.request.model = %model.id,
            "Starting OpenAI-compatible stream"
        );

        create_openai_stream(
            StreamContext {
                client: self.client.clone(),
                provider_id: self.provider_id.clone(),
                model,
                timeout_ms: self.timeout_ms,
                retry: self.retry.clone(),
                metrics: Arc::clone(&self.metrics),
            },
            oai_request,
        )
    }

    async fn health_check(&self) -> Result<ProviderHealth, HubError> {
        let model = self
            .models
            .iter()
            .min_by(|a, b| {
                a.output_cost_per_1k
                    .partial_cmp(&b.output_cost_per_1k)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .ok_or_else(|| HubError::ModelNotFound(format!("{} default", self.provider_id)))?;

        let probe = ModelRequest {
            messages: vec![Message::user("ping")],
            model: Some(model.id.clone()),
            max_tokens: Some(1),
            temperature: Some(0.0),
            tools: None,
            requirements: None,
        };
        let oai_request = self.build_request(&probe, model, false)?;
        let result = self
            .client
            .chat()
            .create(oai_request)
            .await
            .map_err(|e| map_openai_error(&self.provider_id, self.timeout_ms, e));

        let metrics = self.metrics.snapshot();
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
            rate_limit_remaining: None,
            rate_limit_reset: None,
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
        tracing::debug!(provider = %self.provider_id, "OpenAI-compatible provider shut down");
    }
}

/// Extract canonical tool calls from the wire JSON form of a response
/// message's `tool_calls` array.
fn parse_wire_tool_calls(value: serde_json::Value) -> Vec<ToolCall> {
    let Some(items) = value.as_array() else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let id = item.get("id")?.as_str()?.to_string();
            let function = item.get("function")?;
            let name = function.get("name")?.as_str()?.to_string();
            let raw_arguments = function
                .get("arguments")
                .and_then(|a| a.as_str())
                .unwrap_or("{}");
            let arguments =
                serde_json::from_str(raw_arguments).unwrap_or(serde_json::Value::Null);
            Some(ToolCall {
                id,
                name,
                arguments,
            })
        })
        .collect()
}

/// Map an OpenAI finish reason to the canonical enum.
pub(super) fn map_finish_reason(finish_reason: &OpenAiFinishReason) -> FinishReason {
    match finish_reason {
        OpenAiFinishReason::Stop => FinishReason::Stop,
        OpenAiFinishReason::Length => FinishReason::Length,
        OpenAiFinishReason::ToolCalls => FinishReason::ToolCalls,
        OpenAiFinishReason::ContentFilter => FinishReason::ContentFilter,
        OpenAiFinishReason::FunctionCall => FinishReason::ToolCalls,
    }
}

/// Map an [`async_openai::error::OpenAIError`] into the hub taxonomy.
pub(super) fn map_openai_error(
    provider: &str,
    timeout_ms: u64,
    err: async_openai::error::OpenAIError,
) -> HubError {
    use async_openai::error::OpenAIError;

    match &err {
        OpenAIError::ApiError(api_err) => {
            let code = api_err.code.as_deref().unwrap_or("");
            let error_type = api_err.r#type.as_deref().unwrap_or("");

            if code == "authentication_error"
                || error_type == "authentication_error"
                || api_err.message.contains("Incorrect API key")
                || api_err.message.contains("Invalid API key")
            {
                HubError::AuthenticationFailed(provider.to_string())
            } else if code == "rate_limit_exceeded" || error_type == "rate_limit_error" {
                HubError::RateLimited {
                    provider: provider.to_string(),
                    retry_after_ms: None,
                }
            } else if code == "context_length_exceeded"
                || api_err.message.contains("maximum context length")
            {
                HubError::InvalidRequest(api_err.message.clone())
            } else {
                HubError::UpstreamCallFailed {
                    provider: provider.to_string(),
                    message: err.to_string(),
                }
            }
        }
        OpenAIError::Reqwest(reqwest_err) => {
            if reqwest_err.is_timeout() {
                HubError::Timeout {
                    provider: provider.to_string(),
                    timeout_ms,
                }
            } else if let Some(status) = reqwest_err.status() {
                match status.as_u16() {
                    401 | 403 => HubError::AuthenticationFailed(provider.to_string()),
                    429 => HubError::RateLimited {
                        provider: provider.to_string(),
                        retry_after_ms: None,
                    },
                    _ => HubError::UpstreamCallFailed {
                        provider: provider.to_string(),
                        message: err.to_string(),
                    },
                }
            } else {
                HubError::UpstreamCallFailed {
                    provider: provider.to_string(),
                    message: err.to_string(),
                }
            }
        }
        OpenAIError::JSONDeserialize(_, content) => {
            HubError::Deserialization(format!("failed to parse response: {content}"))
        }
        OpenAIError::StreamError(stream_err) => HubError::Stream(stream_err.to_string()),
        OpenAIError::InvalidArgument(msg) => HubError::InvalidRequest(msg.clone()),
        _ => HubError::UpstreamCallFailed {
            provider: provider.to_string(),
            message: err.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ProviderConfig {
        ProviderConfig {
            id: "openai".to_string(),
            provider_type: ProviderType::OpenAi,
            api_key: Some("sk-test".to_string()),
            base_url: None,
            timeout_ms: 30_000,
            models: vec![],
        }
    }

    fn make_provider() -> OpenAiCompatProvider {
        OpenAiCompatProvider::new(&config()).unwrap()
    }

    #[test]
    fn test_missing_api_key_fails() {
        let mut config = config();
        config.api_key = None;
        assert!(matches!(
            OpenAiCompatProvider::new(&config),
            Err(HubError::AuthenticationFailed(_))
        ));
    }

    #[test]
    fn test_default_catalog_when_config_declares_no_models() {
        let provider = make_provider();
        assert_eq!(provider.models.len(), 2);
        assert!(provider.models.iter().any(|m| m.id == "gpt-4o"));
    }

    #[test]
    fn test_build_request_messages() {
        let provider = make_provider();
        let request = ModelRequest {
            messages: vec![
                Message::system("Be helpful"),
                Message::user("Hello"),
                Message::assistant("Hi there!"),
            ],
            model: None,
            max_tokens: Some(1024),
            temperature: Some(0.7),
            tools: None,
            requirements: None,
        };
        let model = provider.models[0].clone();

        let oai_req = provider.build_request(&request, &model, false).unwrap();
        assert_eq!(oai_req.model, model.id);
        assert_eq!(oai_req.messages.len(), 3);
        assert_eq!(oai_req.max_completion_tokens, Some(1024));
        assert!(oai_req.stream.is_none());
        assert!(oai_req.stream_options.is_none());
    }

    #[test]
    fn test_build_request_streaming_requests_usage() {
        let provider = make_provider();
        let request = ModelRequest::new(vec![Message::user("Hello")]);
        let model = provider.models[0].clone();

        let oai_req = provider.build_request(&request, &model, true).unwrap();
        assert_eq!(oai_req.stream, Some(true));
        let opts = oai_req.stream_options.unwrap();
        assert_eq!(opts.include_usage, Some(true));
    }

    #[test]
    fn test_build_request_maps_tools() {
        let provider = make_provider();
        let request = ModelRequest {
            messages: vec![Message::user("compute")],
            model: None,
            max_tokens: None,
            temperature: None,
            tools: Some(vec![modelhub_types::chat::ToolDefinition {
                name: "search".to_string(),
                description: "Search the web".to_string(),
                parameters: serde_json::json!({"type": "object", "properties": {}}),
            }]),
            requirements: None,
        };
        let model = provider.models[0].clone();

        let oai_req = provider.build_request(&request, &model, false).unwrap();
        let tools = serde_json::to_value(oai_req.tools.unwrap()).unwrap();
        assert_eq!(tools[0]["function"]["name"], "search");
    }

    #[test]
    fn test_parse_wire_tool_calls() {
        let value = serde_json::json!([{
            "id": "call_1",
            "type": "function",
            "function": {"name": "search", "arguments": "{\"query\": \"rust\"}"}
        }]);
        let calls = parse_wire_tool_calls(value);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "call_1");
        assert_eq!(calls[0].name, "search");
        assert_eq!(calls[0].arguments["query"], "rust");
    }

    #[test]
    fn test_parse_wire_tool_calls_tolerates_null() {
        assert!(parse_wire_tool_calls(serde_json::Value::Null).is_empty());
    }

    #[test]
    fn test_finish_reason_mapping() {
        assert_eq!(
            map_finish_reason(&OpenAiFinishReason::Stop),
            FinishReason::Stop
        );
        assert_eq!(
            map_finish_reason(&OpenAiFinishReason::Length),
            FinishReason::Length
        );
        assert_eq!(
            map_finish_reason(&OpenAiFinishReason::ToolCalls),
            FinishReason::ToolCalls
        );
        assert_eq!(
            map_finish_reason(&OpenAiFinishReason::ContentFilter),
            FinishReason::ContentFilter
        );
    }

    #[test]
    fn test_map_openai_error_auth() {
        use async_openai::error::{ApiError, OpenAIError};
        let api_err = ApiError {
            message: "Incorrect API key provided".to_string(),
            r#type: Some("authentication_error".to_string()),
            param: None,
            code: None,
        };
        let err = map_openai_error("openai", 30_000, OpenAIError::ApiError(api_err));
        assert!(matches!(err, HubError::AuthenticationFailed(_)));
    }

    #[test]
    fn test_map_openai_error_rate_limit() {
        use async_openai::error::{ApiError, OpenAIError};
        let api_err = ApiError {
            message: "Rate limit exceeded".to_string(),
            r#type: Some("rate_limit_error".to_string()),
            param: None,
            code: None,
        };
        let err = map_openai_error("openai", 30_000, OpenAIError::ApiError(api_err));
        assert!(matches!(err, HubError::RateLimited { .. }));
        assert!(err.is_transient());
    }

    #[test]
    fn test_map_openai_error_invalid_argument() {
        use async_openai::error::OpenAIError;
        let err = map_openai_error(
            "openai",
            30_000,
            OpenAIError::InvalidArgument("bad arg".to_string()),
        );
        assert!(matches!(err, HubError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_estimate_tokens_heuristic() {
        let provider = make_provider();
        let messages = vec![Message::user("Hello world, how are you doing today?")];
        // 37 + 10 = 47 chars -> ceil(47 / 4) = 12 tokens.
        assert_eq!(provider.estimate_tokens(&messages), 12);
    }
}
