//! Core logic for the Model Routing Hub.
//!
//! This crate defines the provider contract ([`provider::ModelProvider`])
//! and the components the orchestrator wires together per request: the
//! intelligent router, the budget tracker, the response cache, and the
//! broadcast event bus. Concrete provider adapters live in
//! `modelhub-infra`; this crate never depends on HTTP or vendor crates.

pub mod budget;
pub mod cache;
pub mod event;
pub mod hub;
pub mod provider;
pub mod router;
