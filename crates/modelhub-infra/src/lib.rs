//! Concrete provider adapters for the Model Routing Hub.
//!
//! Contains implementations of the [`ModelProvider`] trait defined in
//! `modelhub-core`: Anthropic (Messages API over reqwest + SSE) and
//! OpenAI-compatible vendors (via `async-openai`), plus the bounded-retry
//! helper and default model catalogs with pricing.
//!
//! [`ModelProvider`]: modelhub_core::provider::ModelProvider

pub mod providers;
pub mod retry;

pub use providers::{create_provider, test_provider_connection};
