//! Anthropic Messages API provider adapter.

pub mod client;
pub mod streaming;
pub mod types;

pub use client::AnthropicProvider;
