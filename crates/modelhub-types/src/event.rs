//! Events emitted by the hub for observability.
//!
//! Collaborators (dashboards, alerting) subscribe to this stream; events
//! carry no mutation responsibility over requests or responses.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::budget::BudgetAlert;

/// An observability event emitted by the hub.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HubEvent {
    ProviderRegistered {
        provider_id: String,
        model_count: usize,
    },

    ProviderUnregistered {
        provider_id: String,
    },

    /// The router picked a model for a request.
    ModelSelected {
        request_id: Uuid,
        model: String,
        provider_id: String,
        confidence: f64,
    },

    RequestCompleted {
        request_id: Uuid,
        model: String,
        provider_id: String,
        cost: f64,
        latency_ms: u64,
        cached: bool,
    },

    RequestFailed {
        request_id: Uuid,
        error: String,
    },

    CacheHit {
        request_id: Uuid,
        key: String,
    },

    StreamStarted {
        request_id: Uuid,
        model: String,
        provider_id: String,
    },

    StreamCompleted {
        request_id: Uuid,
        model: String,
        provider_id: String,
        cost: f64,
    },

    /// The upstream stream emitted an error chunk after starting.
    StreamError {
        request_id: Uuid,
        message: String,
    },

    /// The stream could not be started (budget, routing, or setup failure).
    StreamFailed {
        request_id: Uuid,
        error: String,
    },

    /// An execution attempt failed and the hub moved to the next
    /// alternative in the fallback chain.
    FallbackTriggered {
        request_id: Uuid,
        from_model: String,
        to_model: String,
        error: String,
    },

    BudgetAlert(BudgetAlert),

    ConfigUpdated,

    BudgetUpdated,

    Shutdown,
}
