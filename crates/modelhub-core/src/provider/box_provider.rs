//! BoxModelProvider -- object-safe dynamic dispatch wrapper for ModelProvider.
//!
//! 1. Define an object-safe `ModelProviderDyn` trait with boxed futures
//! 2. Blanket-impl `ModelProviderDyn` for all `T: ModelProvider`
//! 3. `BoxModelProvider` wraps `Box<dyn ModelProviderDyn>` and delegates

use std::future::Future;
use std::pin::Pin;

use futures_util::Stream;

use modelhub_types::chat::{Message, ModelRequest, ModelResponse};
use modelhub_types::error::HubError;
use modelhub_types::health::{PerformanceMetrics, ProviderHealth};
use modelhub_types::model::{ModelDefinition, ProviderConfig, ProviderType};
use modelhub_types::stream::StreamChunk;

use super::ModelProvider;

/// Object-safe version of [`ModelProvider`] with boxed futures.
///
/// This trait exists solely to enable dynamic dispatch. A blanket
/// implementation is provided for all types implementing `ModelProvider`.
pub trait ModelProviderDyn: Send + Sync {
    fn id(&self) -> &str;

    fn provider_type(&self) -> ProviderType;

    fn initialize_boxed<'a>(
        &'a self,
        config: &'a ProviderConfig,
    ) -> Pin<Box<dyn Future<Output = Result<(), HubError>> + Send + 'a>>;

    fn list_models(&self) -> Vec<ModelDefinition>;

    fn chat_boxed<'a>(
        &'a self,
        request: &'a ModelRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ModelResponse, HubError>> + Send + 'a>>;

    fn stream_boxed(
        &self,
        request: ModelRequest,
    ) -> Pin<Box<dyn Stream<Item = Result<StreamChunk, HubError>> + Send + 'static>>;

    fn health_check_boxed<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<ProviderHealth, HubError>> + Send + 'a>>;

    fn metrics(&self) -> PerformanceMetrics;

    fn estimate_cost(&self, messages: &[Message], model_id: &str) -> Result<f64, HubError>;

    fn estimate_tokens(&self, messages: &[Message]) -> u32;

    fn shutdown_boxed<'a>(&'a self) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>>;
}

/// Blanket implementation: any `ModelProvider` automatically implements
/// `ModelProviderDyn`.
impl<T: ModelProvider> ModelProviderDyn for T {
    fn id(&self) -> &str {
        ModelProvider::id(self)
    }

    fn provider_type(&self) -> ProviderType {
        ModelProvider::provider_type(self)
    }

    fn initialize_boxed<'a>(
        &'a self,
        config: &'a ProviderConfig,
    ) -> Pin<Box<dyn Future<Output = Result<(), HubError>> + Send + 'a>> {
        Box::pin(self.initialize(config))
    }

    fn list_models(&self) -> Vec<ModelDefinition> {
        ModelProvider::list_models(self)
    }

    fn chat_boxed<'a>(
        &'a self,
        request: &'a ModelRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ModelResponse, HubError>> + Send + 'a>> {
        Box::pin(self.chat(request))
    }

    fn stream_boxed(
        &self,
        request: ModelRequest,
    ) -> Pin<Box<dyn Stream<Item = Result<StreamChunk, HubError>> + Send + 'static>> {
        self.stream(request)
    }

    fn health_check_boxed<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<ProviderHealth, HubError>> + Send + 'a>> {
        Box::pin(self.health_check())
    }

    fn metrics(&self) -> PerformanceMetrics {
        ModelProvider::metrics(self)
    }

    fn estimate_cost(&self, messages: &[Message], model_id: &str) -> Result<f64, HubError> {
        ModelProvider::estimate_cost(self, messages, model_id)
    }

    fn estimate_tokens(&self, messages: &[Message]) -> u32 {
        ModelProvider::estimate_tokens(self, messages)
    }

    fn shutdown_boxed<'a>(&'a self) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(self.shutdown())
    }
}

/// Type-erased provider adapter for runtime registration.
///
/// Since `ModelProvider` uses RPITIT, it cannot be used as a trait object
/// directly. `BoxModelProvider` provides equivalent methods that delegate
/// to the inner `ModelProviderDyn` trait object.
pub struct BoxModelProvider {
    inner: Box<dyn ModelProviderDyn + Send + Sync>,
}

impl BoxModelProvider {
    /// Wrap a concrete `ModelProvider` in a type-erased box.
    pub fn new<T: ModelProvider + 'static>(provider: T) -> Self {
        Self {
            inner: Box::new(provider),
        }
    }

    /// Unique provider id.
    pub fn id(&self) -> &str {
        self.inner.id()
    }

    /// Backend type of this provider.
    pub fn provider_type(&self) -> ProviderType {
        self.inner.provider_type()
    }

    /// Validate configuration before the provider starts serving calls.
    pub async fn initialize(&self, config: &ProviderConfig) -> Result<(), HubError> {
        self.inner.initialize_boxed(config).await
    }

    /// The models this provider exposes.
    pub fn list_models(&self) -> Vec<ModelDefinition> {
        self.inner.list_models()
    }

    /// Execute a non-streaming chat call.
    pub async fn chat(&self, request: &ModelRequest) -> Result<ModelResponse, HubError> {
        self.inner.chat_boxed(request).await
    }

    /// Execute a streaming chat call.
    pub fn stream(
        &self,
        request: ModelRequest,
    ) -> Pin<Box<dyn Stream<Item = Result<StreamChunk, HubError>> + Send + 'static>> {
        self.inner.stream_boxed(request)
    }

    /// Perform a minimal health check call.
    pub async fn health_check(&self) -> Result<ProviderHealth, HubError> {
        self.inner.health_check_boxed().await
    }

    /// Snapshot of rolling performance counters.
    pub fn metrics(&self) -> PerformanceMetrics {
        self.inner.metrics()
    }

    /// Estimate the cost in USD of sending `messages` to `model_id`.
    pub fn estimate_cost(&self, messages: &[Message], model_id: &str) -> Result<f64, HubError> {
        self.inner.estimate_cost(messages, model_id)
    }

    /// Heuristic token count for a message list.
    pub fn estimate_tokens(&self, messages: &[Message]) -> u32 {
        self.inner.estimate_tokens(messages)
    }

    /// Release resources. Idempotent.
    pub async fn shutdown(&self) {
        self.inner.shutdown_boxed().await;
    }
}
