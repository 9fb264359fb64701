//! Provider abstractions for the Model Routing Hub.
//!
//! - [`ModelProvider`]: RPITIT trait for concrete adapter implementations
//! - [`BoxModelProvider`]: object-safe wrapper for dynamic dispatch
//! - [`MetricsRecorder`]: rolling per-adapter performance counters

pub mod box_provider;
pub mod metrics;

use std::pin::Pin;

use futures_util::Stream;

use modelhub_types::chat::{Message, ModelRequest, ModelResponse};
use modelhub_types::error::HubError;
use modelhub_types::health::{PerformanceMetrics, ProviderHealth};
use modelhub_types::model::{ModelDefinition, ProviderConfig, ProviderType};
use modelhub_types::stream::StreamChunk;

pub use box_provider::BoxModelProvider;
pub use metrics::MetricsRecorder;

/// Trait for provider adapters (Anthropic, OpenAI-compatible, etc.).
///
/// Uses native async fn in traits (RPITIT) for the unary methods. The
/// `stream` method returns a boxed stream because streams need to be
/// object-safe for the `BoxModelProvider` wrapper.
///
/// Implementations live in `modelhub-infra`.
pub trait ModelProvider: Send + Sync {
    /// Unique provider id (matches `ProviderConfig.id`).
    fn id(&self) -> &str;

    /// Backend type of this provider.
    fn provider_type(&self) -> ProviderType;

    /// Validate configuration before the provider starts serving calls.
    fn initialize(
        &self,
        config: &ProviderConfig,
    ) -> impl std::future::Future<Output = Result<(), HubError>> + Send;

    /// The models this provider exposes: the config-declared list, or
    /// the adapter's default catalog when the config declared none.
    fn list_models(&self) -> Vec<ModelDefinition>;

    /// Execute a non-streaming chat call and return the canonical response.
    fn chat(
        &self,
        request: &ModelRequest,
    ) -> impl std::future::Future<Output = Result<ModelResponse, HubError>> + Send;

    /// Execute a streaming chat call. The returned sequence is strictly
    /// ordered and terminated by exactly one `Done` or `Error` chunk.
    fn stream(
        &self,
        request: ModelRequest,
    ) -> Pin<Box<dyn Stream<Item = Result<StreamChunk, HubError>> + Send + 'static>>;

    /// Perform a minimal, low-cost real call and classify the result.
    fn health_check(
        &self,
    ) -> impl std::future::Future<Output = Result<ProviderHealth, HubError>> + Send;

    /// Snapshot of this adapter's rolling performance counters.
    fn metrics(&self) -> PerformanceMetrics;

    /// Estimate the cost in USD of sending `messages` to `model_id`,
    /// using the model's per-1K rates and the token heuristic.
    fn estimate_cost(&self, messages: &[Message], model_id: &str) -> Result<f64, HubError>;

    /// Heuristic token count for a message list (character-based with a
    /// fixed per-message structural overhead).
    fn estimate_tokens(&self, messages: &[Message]) -> u32;

    /// Release resources. Idempotent.
    fn shutdown(&self) -> impl std::future::Future<Output = ()> + Send;
}
