//! Model and provider definitions.
//!
//! A [`ModelDefinition`] is the static profile of one named model offering:
//! cost, capability set, context window, declared latency and concurrency.
//! Definitions are immutable once registered with the hub and are removed
//! when their owning provider is unregistered.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A declared capability of a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelCapability {
    TextGeneration,
    FunctionCalling,
    Vision,
    CodeGeneration,
    Embeddings,
}

impl fmt::Display for ModelCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelCapability::TextGeneration => write!(f, "text-generation"),
            ModelCapability::FunctionCalling => write!(f, "function-calling"),
            ModelCapability::Vision => write!(f, "vision"),
            ModelCapability::CodeGeneration => write!(f, "code-generation"),
            ModelCapability::Embeddings => write!(f, "embeddings"),
        }
    }
}

/// Static profile of one model offering from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDefinition {
    /// Globally unique model id (e.g., "claude-sonnet-4-20250514").
    pub id: String,
    /// Human-readable display name.
    pub display_name: String,
    /// Id of the provider that owns this model.
    pub provider_id: String,
    /// Maximum output tokens the model can produce.
    pub max_output_tokens: u32,
    /// Cost in USD per 1K prompt tokens.
    pub input_cost_per_1k: f64,
    /// Cost in USD per 1K completion tokens.
    pub output_cost_per_1k: f64,
    pub capabilities: Vec<ModelCapability>,
    /// Declared context window in tokens.
    pub context_window: u32,
    /// Supported protocol features (e.g., "streaming", "json-mode").
    #[serde(default)]
    pub features: Vec<String>,
    /// Declared average latency in milliseconds.
    pub avg_latency_ms: u64,
    /// Maximum concurrent in-flight calls the model tolerates.
    pub max_concurrency: u32,
}

impl ModelDefinition {
    /// Cost in USD for the given token counts at this model's rates.
    pub fn cost_for(&self, prompt_tokens: u32, completion_tokens: u32) -> f64 {
        (prompt_tokens as f64 / 1000.0) * self.input_cost_per_1k
            + (completion_tokens as f64 / 1000.0) * self.output_cost_per_1k
    }

    pub fn has_capability(&self, capability: ModelCapability) -> bool {
        self.capabilities.contains(&capability)
    }

    pub fn has_feature(&self, feature: &str) -> bool {
        self.features.iter().any(|f| f == feature)
    }
}

/// Type of provider backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderType {
    Anthropic,
    OpenAi,
    #[serde(rename = "openai_compatible")]
    OpenAiCompatible,
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderType::Anthropic => write!(f, "anthropic"),
            ProviderType::OpenAi => write!(f, "openai"),
            ProviderType::OpenAiCompatible => write!(f, "openai_compatible"),
        }
    }
}

impl FromStr for ProviderType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "anthropic" => Ok(ProviderType::Anthropic),
            "openai" => Ok(ProviderType::OpenAi),
            "openai_compatible" => Ok(ProviderType::OpenAiCompatible),
            other => Err(format!("invalid provider type: '{other}'")),
        }
    }
}

/// Configuration for one provider, passed once at registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Unique provider id (e.g., "anthropic", "openai-eu").
    pub id: String,
    pub provider_type: ProviderType,
    /// API key. Adapters wrap this in `SecretString` and never log it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Override the default base URL for the provider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Per-call timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Models this provider exposes. Empty means the adapter supplies
    /// its default catalog on initialize.
    #[serde(default)]
    pub models: Vec<ModelDefinition>,
}

fn default_timeout_ms() -> u64 {
    120_000
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_model() -> ModelDefinition {
        ModelDefinition {
            id: "test-model".to_string(),
            display_name: "Test Model".to_string(),
            provider_id: "test".to_string(),
            max_output_tokens: 4096,
            input_cost_per_1k: 0.003,
            output_cost_per_1k: 0.015,
            capabilities: vec![
                ModelCapability::TextGeneration,
                ModelCapability::FunctionCalling,
            ],
            context_window: 200_000,
            features: vec!["streaming".to_string()],
            avg_latency_ms: 1200,
            max_concurrency: 10,
        }
    }

    #[test]
    fn test_cost_for_uses_per_1k_rates() {
        let model = sample_model();
        // 2000 prompt at $0.003/1k + 1000 completion at $0.015/1k
        let cost = model.cost_for(2000, 1000);
        assert!((cost - 0.021).abs() < 1e-9, "got {cost}");
    }

    #[test]
    fn test_capability_and_feature_lookup() {
        let model = sample_model();
        assert!(model.has_capability(ModelCapability::TextGeneration));
        assert!(!model.has_capability(ModelCapability::Vision));
        assert!(model.has_feature("streaming"));
        assert!(!model.has_feature("json-mode"));
    }

    #[test]
    fn test_capability_serde_kebab_case() {
        let json = serde_json::to_string(&ModelCapability::FunctionCalling).unwrap();
        assert_eq!(json, "\"function-calling\"");
    }

    #[test]
    fn test_provider_type_roundtrip() {
        for pt in [
            ProviderType::Anthropic,
            ProviderType::OpenAi,
            ProviderType::OpenAiCompatible,
        ] {
            let s = pt.to_string();
            let parsed: ProviderType = s.parse().unwrap();
            assert_eq!(pt, parsed);
        }
    }

    #[test]
    fn test_provider_config_default_timeout() {
        let json = r#"{"id":"anthropic","provider_type":"anthropic"}"#;
        let config: ProviderConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.timeout_ms, 120_000);
        assert!(config.models.is_empty());
    }
}
