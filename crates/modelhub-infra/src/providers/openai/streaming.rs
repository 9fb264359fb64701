//! OpenAI SSE stream to [`StreamChunk`] adapter.
//!
//! Maps `async-openai`'s chat completion stream to canonical chunks:
//! content deltas, tool-call fragments (forwarded as-is, not
//! accumulated), a usage chunk (requires `stream_options.include_usage`
//! on the request), and exactly one terminal `Done` after the upstream
//! sequence ends. Until usage is reported, `cost_so_far` is priced from
//! the character-count token heuristic.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use async_openai::config::OpenAIConfig;
use async_openai::types::chat::CreateChatCompletionRequest;
use async_openai::Client;
use futures_util::{Stream, StreamExt};
use uuid::Uuid;

use modelhub_core::provider::MetricsRecorder;
use modelhub_types::chat::{FinishReason, Usage};
use modelhub_types::error::HubError;
use modelhub_types::model::ModelDefinition;
use modelhub_types::stream::{ChunkMeta, ChunkPayload, StreamChunk};

use crate::retry::{retry_with_backoff, RetryPolicy};

use super::{map_finish_reason, map_openai_error};

/// Everything the stream needs, cloned out of the provider so the
/// returned stream is `'static`.
pub(super) struct StreamContext {
    pub client: Client<OpenAIConfig>,
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

/// Open a chat completion stream and map its events to canonical
/// [`StreamChunk`]s. The connection attempt runs under the retry policy;
/// once streaming has started, errors terminate the sequence.
pub(super) fn create_openai_stream(
    ctx: StreamContext,
    request: CreateChatCompletionRequest,
) -> Pin<Box<dyn Stream<Item = Result<StreamChunk, HubError>> + Send + 'static>> {
    Box::pin(async_stream::stream! {
        let started = Instant::now();
        let request_id = Uuid::now_v7();

        let connect = || async {
            ctx.client
                .chat()
                .create_stream(request.clone())
                .await
                .map_err(|e| map_openai_error(&ctx.provider_id, ctx.timeout_ms, e))
        };

        match retry_with_backoff(&ctx.retry, connect).await {
            Err(err) => {
                ctx.metrics
                    .record_failure(started.elapsed().as_millis() as u64);
                yield Err(err);
            }
            Ok(mut upstream) => {
                let mut prompt_tokens: u32 = 0;
                let mut output_chars: usize = 0;
                let mut usage: Option<Usage> = None;
                let mut finish_reason: Option<FinishReason> = None;
                let mut cost_so_far = 0.0f64;
                let mut failed = false;

                while let Some(result) = upstream.next().await {
                    let response = match result {
                        Ok(response) => response,
                        Err(e) => {
                            ctx.metrics
                                .record_failure(started.elapsed().as_millis() as u64);
                            yield Err(map_openai_error(&ctx.provider_id, ctx.timeout_ms, e));
                            failed = true;
                            break;
                        }
                    };

                    // The final chunk carries usage with an empty choices
                    // array when include_usage is set.
                    if let Some(u) = &response.usage {
                        let reported = Usage::new(u.prompt_tokens, u.completion_tokens);
                        prompt_tokens = reported.prompt_tokens;
                        cost_so_far = ctx
                            .model
                            .cost_for(reported.prompt_tokens, reported.completion_tokens);
                        usage = Some(reported);
                        yield Ok(chunk(
                            &ctx,
                            request_id,
                            started,
                            cost_so_far,
                            ChunkPayload::Usage(reported),
                        ));
                    }

                    let choices_len = response.choices.len();
                    for i in 0..choices_len {
                        let choice = &response.choices[i];

                        if let Some(content) = &choice.delta.content {
                            if !content.is_empty() {
                                output_chars += content.len();
                                if usage.is_none() {
                                    cost_so_far = ctx.model.cost_for(
                                        prompt_tokens,
                                        (output_chars as f64 / 4.0).ceil() as u32,
                                    );
                                }
                                yield Ok(chunk(
                                    &ctx,
                                    request_id,
                                    started,
                                    cost_so_far,
                                    ChunkPayload::Content {
                                        delta: content.clone(),
                                    },
                                ));
                            }
                        }

                        if let Some(tool_calls) = &choice.delta.tool_calls {
                            for tc in tool_calls {
                                let id = tc.id.clone().filter(|s| !s.is_empty());
                                let name = tc
                                    .function
                                    .as_ref()
                                    .and_then(|f| f.name.clone())
                                    .filter(|s| !s.is_empty());
                                let arguments_delta = tc
                                    .function
                                    .as_ref()
                                    .and_then(|f| f.arguments.clone())
                                    .unwrap_or_default();
                                output_chars += arguments_delta.len();
                                yield Ok(chunk(
                                    &ctx,
                                    request_id,
                                    started,
                                    cost_so_far,
                                    ChunkPayload::ToolCallDelta {
                                        id,
                                        name,
                                        arguments_delta,
                                    },
                                ));
                            }
                        }

                        if let Some(fr) = &choice.finish_reason {
                            finish_reason = Some(map_finish_reason(fr));
                        }
                    }
                }

                if !failed {
                    let latency_ms = started.elapsed().as_millis() as u64;
                    let tokens = usage.map(|u| u.total_tokens as u64).unwrap_or(0);
                    ctx.metrics.record_success(latency_ms, cost_so_far, tokens);
                    yield Ok(chunk(
                        &ctx,
                        request_id,
                        started,
                        cost_so_far,
                        ChunkPayload::Done {
                            finish_reason: finish_reason.unwrap_or(FinishReason::Stop),
                        },
                    ));
                }
            }
        }
    })
}
