//! SSE stream adapter for the Anthropic Messages API.
//!
//! Implements the streaming protocol:
//! 1. `message_start` -- message object with the prompt-side usage
//! 2. Per block: `content_block_start` -> N x `content_block_delta` ->
//!    `content_block_stop`
//! 3. `message_delta` -- stop_reason and completion-side usage
//! 4. `message_stop` -- final event
//! 5. `ping` events may appear anywhere (keepalive)
//! 6. `error` events may appear mid-stream
//!
//! Until the real usage arrives in `message_delta`, `cost_so_far` is an
//! estimate priced from the character-count token heuristic; it converges
//! to the exact figure once usage is reported.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use eventsource_stream::Eventsource;
use futures_util::{Stream, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use uuid::Uuid;

use modelhub_core::provider::MetricsRecorder;
use modelhub_types::chat::{FinishReason, Usage};
use modelhub_types::error::HubError;
use modelhub_types::model::ModelDefinition;
use modelhub_types::stream::{ChunkMeta, ChunkPayload, StreamChunk};

use crate::retry::{retry_with_backoff, RetryPolicy};

use super::client::{map_status_error, map_stop_reason, map_transport_error, parse_retry_after};
use super::types::{
    AnthropicContentBlock, AnthropicDelta, AnthropicRequest, ContentBlockDeltaPayload,
    ContentBlockStartPayload, ErrorPayload, MessageDeltaPayload, MessageStartPayload,
};

/// Everything the stream needs, cloned out of the provider so the
/// returned stream is `'static`.
pub(super) struct StreamContext {
    pub client: reqwest::Client,
    pub url: String,
    pub api_key: Arc<SecretString>,
    pub api_version: &'static str,
    pub provider_id: String,
    pub model: ModelDefinition,
    pub timeout_ms: u64,
    pub retry: RetryPolicy,
    pub metrics: Arc<MetricsRecorder>,
}

fn chunk(
    ctx: &StreamContext,
    request_id: Uuid,
    started: Instant,
    cost_so_far: f64,
    payload: ChunkPayload,
) -> StreamChunk {
    StreamChunk {
        meta: ChunkMeta {
            request_id,
            model: ctx.model.id.clone(),
            provider_id: ctx.provider_id.clone(),
            latency_ms: started.elapsed().as_millis() as u64,
            cost_so_far,
        },
        payload,
    }
}

/// Open a streaming SSE connection to the Messages API and map its
/// events to canonical [`StreamChunk`]s.
///
/// The connection attempt runs under the retry policy; once the stream
/// has started, errors terminate it (no mid-stream failover).
pub(super) fn create_anthropic_stream(
    ctx: StreamContext,
    body: AnthropicRequest,
) -> Pin<Box<dyn Stream<Item = Result<StreamChunk, HubError>> + Send + 'static>> {
    Box::pin(async_stream::stream! {
        let started = Instant::now();
        let request_id = Uuid::now_v7();

        let connect = || async {
            let response = ctx
                .client
                .post(&ctx.url)
                .header("x-api-key", ctx.api_key.expose_secret())
                .header("anthropic-version", ctx.api_version)
                .header("content-type", "application/json")
                .json(&body)
                .send()
                .await
                .map_err(|e| map_transport_error(&ctx.provider_id, ctx.timeout_ms, e))?;

            let status = response.status();
            if !status.is_success() {
                let retry_after_ms = parse_retry_after(response.headers());
                let error_body = response.text().await.unwrap_or_default();
                return Err(map_status_error(
                    &ctx.provider_id,
                    status,
                    error_body,
                    retry_after_ms,
                ));
            }
            Ok(response)
        };

        match retry_with_backoff(&ctx.retry, connect).await {
            Err(err) => {
                ctx.metrics
                    .record_failure(started.elapsed().as_millis() as u64);
                yield Err(err);
            }
            Ok(response) => {
                let mut events = response.bytes_stream().eventsource();

                let mut prompt_tokens: u32 = 0;
                let mut output_chars: usize = 0;
                let mut usage: Option<Usage> = None;
                let mut finish_reason = FinishReason::Stop;
                let mut cost_so_far = 0.0f64;
                let mut terminated = false;

                while let Some(event) = events.next().await {
                    let event = match event {
                        Ok(event) => event,
                        Err(e) => {
                            ctx.metrics
                                .record_failure(started.elapsed().as_millis() as u64);
                            yield Err(HubError::Stream(e.to_string()));
                            terminated = true;
                            break;
                        }
                    };

                    match event.event.as_str() {
                        "message_start" => {
                            match serde_json::from_str::<MessageStartPayload>(&event.data) {
                                Ok(payload) => {
                                    prompt_tokens = payload
                                        .message
                                        .usage
                                        .map(|u| u.input_tokens)
                                        .unwrap_or(0);
                                    cost_so_far = ctx.model.cost_for(prompt_tokens, 0);
                                }
                                Err(e) => {
                                    yield Err(HubError::Deserialization(format!(
                                        "message_start: {e}"
                                    )));
                                    terminated = true;
                                    break;
                                }
                            }
                        }

                        "content_block_start" => {
                            match serde_json::from_str::<ContentBlockStartPayload>(&event.data) {
                                Ok(payload) => {
                                    if let AnthropicContentBlock::ToolUse { id, name, .. } =
                                        payload.content_block
                                    {
                                        yield Ok(chunk(
                                            &ctx,
                                            request_id,
                                            started,
                                            cost_so_far,
                                            ChunkPayload::ToolCallDelta {
                                                id: Some(id),
                                                name: Some(name),
                                                arguments_delta: String::new(),
                                            },
                                        ));
                                    }
                                }
                                Err(e) => {
                                    yield Err(HubError::Deserialization(format!(
                                        "content_block_start: {e}"
                                    )));
                                    terminated = true;
                                    break;
                                }
                            }
                        }

                        "content_block_delta" => {
                            match serde_json::from_str::<ContentBlockDeltaPayload>(&event.data) {
                                Ok(payload) => match payload.delta {
                                    AnthropicDelta::TextDelta { text } => {
                                        output_chars += text.len();
                                        cost_so_far = ctx.model.cost_for(
                                            prompt_tokens,
                                            (output_chars as f64 / 4.0).ceil() as u32,
                                        );
                                        yield Ok(chunk(
                                            &ctx,
                                            request_id,
                                            started,
                                            cost_so_far,
                                            ChunkPayload::Content { delta: text },
                                        ));
                                    }
                                    AnthropicDelta::InputJsonDelta { partial_json } => {
                                        output_chars += partial_json.len();
                                        cost_so_far = ctx.model.cost_for(
                                            prompt_tokens,
                                            (output_chars as f64 / 4.0).ceil() as u32,
                                        );
                                        yield Ok(chunk(
                                            &ctx,
                                            request_id,
                                            started,
                                            cost_so_far,
                                            ChunkPayload::ToolCallDelta {
                                                id: None,
                                                name: None,
                                                arguments_delta: partial_json,
                                            },
                                        ));
                                    }
                                },
                                Err(e) => {
                                    yield Err(HubError::Deserialization(format!(
                                        "content_block_delta: {e}"
                                    )));
                                    terminated = true;
                                    break;
                                }
                            }
                        }

                        "message_delta" => {
                            match serde_json::from_str::<MessageDeltaPayload>(&event.data) {
                                Ok(payload) => {
                                    finish_reason =
                                        map_stop_reason(payload.delta.stop_reason.as_deref());
                                    let reported =
                                        Usage::new(prompt_tokens, payload.usage.output_tokens);
                                    cost_so_far = ctx.model.cost_for(
                                        reported.prompt_tokens,
                                        reported.completion_tokens,
                                    );
                                    usage = Some(reported);
                                    yield Ok(chunk(
                                        &ctx,
                                        request_id,
                                        started,
                                        cost_so_far,
                                        ChunkPayload::Usage(reported),
                                    ));
                                }
                                Err(e) => {
                                    yield Err(HubError::Deserialization(format!(
                                        "message_delta: {e}"
                                    )));
                                    terminated = true;
                                    break;
                                }
                            }
                        }

                        "message_stop" => {
                            let latency_ms = started.elapsed().as_millis() as u64;
                            let tokens = usage.map(|u| u.total_tokens as u64).unwrap_or(0);
                            ctx.metrics.record_success(latency_ms, cost_so_far, tokens);
                            yield Ok(chunk(
                                &ctx,
                                request_id,
                                started,
                                cost_so_far,
                                ChunkPayload::Done { finish_reason },
                            ));
                            terminated = true;
                            break;
                        }

                        "error" => {
                            let message = serde_json::from_str::<ErrorPayload>(&event.data)
                                .map(|p| p.error.message)
                                .unwrap_or_else(|_| event.data.clone());
                            ctx.metrics
                                .record_failure(started.elapsed().as_millis() as u64);
                            yield Ok(chunk(
                                &ctx,
                                request_id,
                                started,
                                cost_so_far,
                                ChunkPayload::Error { message },
                            ));
                            terminated = true;
                            break;
                        }

                        // ping and content_block_stop carry nothing we forward
                        _ => {}
                    }
                }

                if !terminated {
                    // Upstream closed without message_stop; still deliver
                    // exactly one terminal chunk.
                    let latency_ms = started.elapsed().as_millis() as u64;
                    let tokens = usage.map(|u| u.total_tokens as u64).unwrap_or(0);
                    ctx.metrics.record_success(latency_ms, cost_so_far, tokens);
                    yield Ok(chunk(
                        &ctx,
                        request_id,
                        started,
                        cost_so_far,
                        ChunkPayload::Done { finish_reason },
                    ));
                }
            }
        }
    })
}
