//! Error taxonomy for the Model Routing Hub.

use thiserror::Error;

use crate::budget::BudgetWindow;

/// Errors surfaced by hub operations.
///
/// Routing, eligibility, and budget errors are deterministic given current
/// state and are never retried. Transient upstream errors are retried
/// inside the provider adapters before surfacing; see [`HubError::is_transient`].
#[derive(Debug, Error)]
pub enum HubError {
    #[error("provider not found: '{0}'")]
    ProviderNotFound(String),

    #[error("model not found: '{0}'")]
    ModelNotFound(String),

    #[error("no models satisfy the request requirements")]
    NoEligibleModels,

    #[error("{window} budget exceeded: ${usage:.4} of ${limit:.2} limit")]
    BudgetExceeded {
        window: BudgetWindow,
        limit: f64,
        usage: f64,
    },

    #[error("provider '{0}' is unavailable")]
    ProviderUnavailable(String),

    #[error("upstream call to '{provider}' failed: {message}")]
    UpstreamCallFailed { provider: String, message: String },

    #[error("authentication failed for provider '{0}'")]
    AuthenticationFailed(String),

    #[error("rate limited by '{provider}' (retry after {retry_after_ms:?}ms)")]
    RateLimited {
        provider: String,
        retry_after_ms: Option<u64>,
    },

    #[error("call to '{provider}' timed out after {timeout_ms}ms")]
    Timeout { provider: String, timeout_ms: u64 },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("deserialization error: {0}")]
    Deserialization(String),

    #[error("stream error: {0}")]
    Stream(String),

    #[error("all fallbacks exhausted after {attempts} attempt(s): {last_error}")]
    AllFallbacksExhausted { attempts: usize, last_error: String },
}

impl HubError {
    /// Whether this error is transient and eligible for adapter retry
    /// and the orchestrator's fallback loop.
    ///
    /// Validation, auth, routing, and budget errors are deterministic --
    /// retrying them cannot help.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            HubError::UpstreamCallFailed { .. }
                | HubError::RateLimited { .. }
                | HubError::Timeout { .. }
                | HubError::Stream(..)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_exceeded_display() {
        let err = HubError::BudgetExceeded {
            window: BudgetWindow::Daily,
            limit: 10.0,
            usage: 10.01,
        };
        let msg = err.to_string();
        assert!(msg.contains("daily"));
        assert!(msg.contains("10.01"));
        assert!(msg.contains("10.00"));
    }

    #[test]
    fn test_transient_classification() {
        assert!(HubError::UpstreamCallFailed {
            provider: "openai".to_string(),
            message: "connection reset".to_string(),
        }
        .is_transient());
        assert!(HubError::Timeout {
            provider: "openai".to_string(),
            timeout_ms: 30_000,
        }
        .is_transient());
        assert!(HubError::RateLimited {
            provider: "anthropic".to_string(),
            retry_after_ms: Some(1000),
        }
        .is_transient());
        assert!(HubError::Stream("broken pipe".to_string()).is_transient());

        assert!(!HubError::AuthenticationFailed("openai".to_string()).is_transient());
        assert!(!HubError::ModelNotFound("gpt-x".to_string()).is_transient());
        assert!(!HubError::NoEligibleModels.is_transient());
        assert!(!HubError::InvalidRequest("empty messages".to_string()).is_transient());
        assert!(!HubError::BudgetExceeded {
            window: BudgetWindow::Monthly,
            limit: 100.0,
            usage: 100.0,
        }
        .is_transient());
    }

    #[test]
    fn test_all_fallbacks_exhausted_display() {
        let err = HubError::AllFallbacksExhausted {
            attempts: 3,
            last_error: "timeout".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("3 attempt"));
        assert!(msg.contains("timeout"));
    }
}
