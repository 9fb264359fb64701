//! Provider adapter implementations.
//!
//! Contains concrete implementations of the `ModelProvider` trait defined
//! in `modelhub-core`, a factory ([`create_provider`]) that constructs the
//! right adapter from a [`ProviderConfig`], and a connection test helper
//! ([`test_provider_connection`]) for verifying provider connectivity.

pub mod anthropic;
pub mod catalog;
pub mod openai;

use modelhub_core::provider::BoxModelProvider;
use modelhub_types::chat::{Message, ModelRequest};
use modelhub_types::error::HubError;
use modelhub_types::model::{ProviderConfig, ProviderType};

use self::anthropic::AnthropicProvider;
use self::openai::OpenAiCompatProvider;

/// Create a [`BoxModelProvider`] from a [`ProviderConfig`].
///
/// # Errors
///
/// Returns `AuthenticationFailed` when the provider type requires an API
/// key and none is configured.
pub fn create_provider(config: &ProviderConfig) -> Result<BoxModelProvider, HubError> {
    match config.provider_type {
        ProviderType::Anthropic => {
            let provider = AnthropicProvider::new(config)?;
            Ok(BoxModelProvider::new(provider))
        }
        ProviderType::OpenAi | ProviderType::OpenAiCompatible => {
            let provider = OpenAiCompatProvider::new(config)?;
            Ok(BoxModelProvider::new(provider))
        }
    }
}

/// Test provider connectivity by sending a minimal completion request.
///
/// Used when a new provider is configured to verify the API key and
/// endpoint are working. Sends a tiny "Hello" message with minimal token
/// budget.
pub async fn test_provider_connection(provider: &BoxModelProvider) -> Result<(), HubError> {
    let request = ModelRequest {
        messages: vec![Message::user("Hello")],
        model: None, // provider uses its configured default
        max_tokens: Some(10),
        temperature: Some(0.0),
        tools: None,
        requirements: None,
    };
    provider.chat(&request).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(id: &str, provider_type: ProviderType) -> ProviderConfig {
        ProviderConfig {
            id: id.to_string(),
            provider_type,
            api_key: Some("test-key".to_string()),
            base_url: None,
            timeout_ms: 30_000,
            models: vec![],
        }
    }

    #[test]
    fn test_create_provider_anthropic() {
        let provider = create_provider(&config("anthropic", ProviderType::Anthropic)).unwrap();
        assert_eq!(provider.id(), "anthropic");
        assert_eq!(provider.provider_type(), ProviderType::Anthropic);
    }

    #[test]
    fn test_create_provider_openai() {
        let provider = create_provider(&config("openai", ProviderType::OpenAi)).unwrap();
        assert_eq!(provider.id(), "openai");
        assert_eq!(provider.provider_type(), ProviderType::OpenAi);
    }

    #[test]
    fn test_create_provider_openai_compatible_with_base_url() {
        let mut config = config("groq", ProviderType::OpenAiCompatible);
        config.base_url = Some("https://api.groq.com/openai/v1".to_string());
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.id(), "groq");
        assert_eq!(provider.provider_type(), ProviderType::OpenAiCompatible);
    }

    #[test]
    fn test_create_provider_missing_key() {
        let mut config = config("anthropic", ProviderType::Anthropic);
        config.api_key = None;
        let result = create_provider(&config);
        match result {
            Err(HubError::AuthenticationFailed(provider)) => assert_eq!(provider, "anthropic"),
            Err(other) => panic!("expected AuthenticationFailed, got: {other}"),
            Ok(_) => panic!("expected error but got Ok"),
        }
    }

    #[tokio::test]
    async fn test_list_models_falls_back_to_default_catalog() {
        let cfg = config("anthropic", ProviderType::Anthropic);
        let provider = create_provider(&cfg).unwrap();
        provider.initialize(&cfg).await.unwrap();
        let models = provider.list_models();
        assert!(!models.is_empty());
        assert!(models.iter().all(|m| m.provider_id == "anthropic"));
    }

    #[tokio::test]
    async fn test_list_models_prefers_declared_models() {
        let mut cfg = config("openai", ProviderType::OpenAi);
        cfg.models = catalog::openai_default_models("openai")
            .into_iter()
            .take(1)
            .collect();
        let provider = create_provider(&cfg).unwrap();
        provider.initialize(&cfg).await.unwrap();
        assert_eq!(provider.list_models().len(), 1);
    }
}
