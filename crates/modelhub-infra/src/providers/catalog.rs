//! Default model catalogs and cost display helpers.
//!
//! When a `ProviderConfig` declares no models, the adapter supplies these
//! defaults on initialize. Per-1K rates are approximate as of early 2026
//! and expressed in USD; cost estimates are clearly labeled as
//! approximate (`~$0.12`) when displayed.

use modelhub_types::model::{ModelCapability, ModelDefinition};

/// Default catalog for an Anthropic provider.
pub fn anthropic_default_models(provider_id: &str) -> Vec<ModelDefinition> {
    vec![
        ModelDefinition {
            id: "claude-sonnet-4-20250514".to_string(),
            display_name: "Claude Sonnet 4".to_string(),
            provider_id: provider_id.to_string(),
            max_output_tokens: 8_192,
            input_cost_per_1k: 0.003,
            output_cost_per_1k: 0.015,
            capabilities: vec![
                ModelCapability::TextGeneration,
                ModelCapability::FunctionCalling,
                ModelCapability::Vision,
                ModelCapability::CodeGeneration,
            ],
            context_window: 200_000,
            features: vec!["streaming".to_string(), "system-prompt".to_string()],
            avg_latency_ms: 1_200,
            max_concurrency: 20,
        },
        ModelDefinition {
            id: "claude-opus-4-20250514".to_string(),
            display_name: "Claude Opus 4".to_string(),
            provider_id: provider_id.to_string(),
            max_output_tokens: 32_000,
            input_cost_per_1k: 0.015,
            output_cost_per_1k: 0.075,
            capabilities: vec![
                ModelCapability::TextGeneration,
                ModelCapability::FunctionCalling,
                ModelCapability::Vision,
                ModelCapability::CodeGeneration,
            ],
            context_window: 200_000,
            features: vec![
                "streaming".to_string(),
                "system-prompt".to_string(),
                "extended-thinking".to_string(),
            ],
            avg_latency_ms: 2_500,
            max_concurrency: 10,
        },
        ModelDefinition {
            id: "claude-haiku-3-5-20241022".to_string(),
            display_name: "Claude Haiku 3.5".to_string(),
            provider_id: provider_id.to_string(),
            max_output_tokens: 8_192,
            input_cost_per_1k: 0.00025,
            output_cost_per_1k: 0.00125,
            capabilities: vec![
                ModelCapability::TextGeneration,
                ModelCapability::FunctionCalling,
                ModelCapability::Vision,
            ],
            context_window: 200_000,
            features: vec!["streaming".to_string(), "system-prompt".to_string()],
            avg_latency_ms: 500,
            max_concurrency: 50,
        },
    ]
}

/// Default catalog for an OpenAI (or compatible) provider.
pub fn openai_default_models(provider_id: &str) -> Vec<ModelDefinition> {
    vec![
        ModelDefinition {
            id: "gpt-4o".to_string(),
            display_name: "GPT-4o".to_string(),
            provider_id: provider_id.to_string(),
            max_output_tokens: 16_384,
            input_cost_per_1k: 0.0025,
            output_cost_per_1k: 0.010,
            capabilities: vec![
                ModelCapability::TextGeneration,
                ModelCapability::FunctionCalling,
                ModelCapability::Vision,
                ModelCapability::CodeGeneration,
            ],
            context_window: 128_000,
            features: vec!["streaming".to_string(), "json-mode".to_string()],
            avg_latency_ms: 900,
            max_concurrency: 30,
        },
        ModelDefinition {
            id: "gpt-4o-mini".to_string(),
            display_name: "GPT-4o mini".to_string(),
            provider_id: provider_id.to_string(),
            max_output_tokens: 16_384,
            input_cost_per_1k: 0.00015,
            output_cost_per_1k: 0.0006,
            capabilities: vec![
                ModelCapability::TextGeneration,
                ModelCapability::FunctionCalling,
            ],
            context_window: 128_000,
            features: vec!["streaming".to_string(), "json-mode".to_string()],
            avg_latency_ms: 400,
            max_concurrency: 50,
        },
    ]
}

/// Format a cost estimate as a human-readable string.
///
/// Always prefixed with `~` to indicate the value is an estimate.
/// - Costs below $0.01 use 3 decimal places: `~$0.001`
/// - Costs $0.01 and above use 2 decimal places: `~$0.12`
pub fn format_cost(cost: f64) -> String {
    if cost < 0.01 {
        format!("~${cost:.3}")
    } else {
        format!("~${cost:.2}")
    }
}
