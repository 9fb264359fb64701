//! Streaming chunk types.
//!
//! A stream is a strictly ordered, finite, non-restartable sequence of
//! [`StreamChunk`]s terminated by exactly one `Done` or one `Error`
//! payload. Every chunk of one logical call carries the same request id
//! in its [`ChunkMeta`].

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chat::{FinishReason, Usage};

/// Metadata envelope attached to every chunk of a stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMeta {
    pub request_id: Uuid,
    pub model: String,
    pub provider_id: String,
    /// Milliseconds elapsed since the stream started.
    pub latency_ms: u64,
    /// Cost in USD accumulated so far (estimated until usage is reported).
    pub cost_so_far: f64,
}

/// The payload of one stream chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChunkPayload {
    /// A delta of text content.
    Content { delta: String },

    /// A fragment of a tool call. `id`/`name` are present on the first
    /// fragment of each call; `arguments_delta` accumulates into the
    /// call's JSON arguments.
    ToolCallDelta {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        arguments_delta: String,
    },

    /// Token usage reported by the provider.
    Usage(Usage),

    /// The stream failed. Terminal.
    Error { message: String },

    /// The stream completed. Terminal.
    Done { finish_reason: FinishReason },
}

/// One element of a streaming response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    pub meta: ChunkMeta,
    pub payload: ChunkPayload,
}

impl StreamChunk {
    /// Whether this chunk terminates its stream.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.payload,
            ChunkPayload::Done { .. } | ChunkPayload::Error { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> ChunkMeta {
        ChunkMeta {
            request_id: Uuid::now_v7(),
            model: "test-model".to_string(),
            provider_id: "test".to_string(),
            latency_ms: 42,
            cost_so_far: 0.0,
        }
    }

    #[test]
    fn test_terminal_chunks() {
        let done = StreamChunk {
            meta: meta(),
            payload: ChunkPayload::Done {
                finish_reason: FinishReason::Stop,
            },
        };
        let error = StreamChunk {
            meta: meta(),
            payload: ChunkPayload::Error {
                message: "boom".to_string(),
            },
        };
        let content = StreamChunk {
            meta: meta(),
            payload: ChunkPayload::Content {
                delta: "hi".to_string(),
            },
        };
        assert!(done.is_terminal());
        assert!(error.is_terminal());
        assert!(!content.is_terminal());
    }

    #[test]
    fn test_payload_serde_tagging() {
        let json = serde_json::to_string(&ChunkPayload::Content {
            delta: "hello".to_string(),
        })
        .unwrap();
        assert!(json.contains("\"type\":\"content\""));

        let usage = ChunkPayload::Usage(Usage::new(10, 5));
        let json = serde_json::to_string(&usage).unwrap();
        assert!(json.contains("\"type\":\"usage\""));
        assert!(json.contains("\"total_tokens\":15"));
    }
}
