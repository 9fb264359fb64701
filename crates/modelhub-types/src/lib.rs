//! Shared domain types for the Model Routing Hub.
//!
//! This crate contains the canonical request/response shapes, model and
//! provider definitions, routing decisions, health/metrics snapshots,
//! budget types, hub events, and the error taxonomy.
//!
//! Zero infrastructure dependencies -- only serde, serde_json, uuid,
//! chrono, thiserror.

pub mod budget;
pub mod chat;
pub mod config;
pub mod error;
pub mod event;
pub mod health;
pub mod model;
pub mod router;
pub mod stream;
