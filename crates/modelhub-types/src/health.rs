//! Provider health and performance snapshot types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Classified health of a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Point-in-time health snapshot for one provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderHealth {
    pub provider_id: String,
    pub status: HealthStatus,
    pub last_check: DateTime<Utc>,
    /// Fraction of recent calls that failed, in [0, 1].
    pub error_rate: f64,
    /// Fraction of recent calls that succeeded, in [0, 1].
    pub availability: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit_remaining: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit_reset: Option<DateTime<Utc>>,
}

impl ProviderHealth {
    /// A fresh healthy snapshot with no observed errors.
    pub fn healthy(provider_id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            status: HealthStatus::Healthy,
            last_check: Utc::now(),
            error_rate: 0.0,
            availability: 1.0,
            rate_limit_remaining: None,
            rate_limit_reset: None,
        }
    }
}

/// Rolling performance counters for one provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub request_count: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub avg_latency_ms: f64,
    pub total_cost: f64,
    pub total_tokens: u64,
    pub last_updated: DateTime<Utc>,
}

impl Default for PerformanceMetrics {
    fn default() -> Self {
        Self {
            request_count: 0,
            success_count: 0,
            failure_count: 0,
            avg_latency_ms: 0.0,
            total_cost: 0.0,
            total_tokens: 0,
            last_updated: Utc::now(),
        }
    }
}

impl PerformanceMetrics {
    /// Fraction of calls that failed, in [0, 1]. Zero when no calls yet.
    pub fn error_rate(&self) -> f64 {
        if self.request_count == 0 {
            0.0
        } else {
            self.failure_count as f64 / self.request_count as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_status_display() {
        assert_eq!(HealthStatus::Healthy.to_string(), "healthy");
        assert_eq!(HealthStatus::Degraded.to_string(), "degraded");
        assert_eq!(HealthStatus::Unhealthy.to_string(), "unhealthy");
    }

    #[test]
    fn test_healthy_snapshot() {
        let health = ProviderHealth::healthy("anthropic");
        assert_eq!(health.provider_id, "anthropic");
        assert_eq!(health.status, HealthStatus::Healthy);
        assert!((health.availability - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_error_rate() {
        let mut metrics = PerformanceMetrics::default();
        assert_eq!(metrics.error_rate(), 0.0);
        metrics.request_count = 10;
        metrics.failure_count = 3;
        assert!((metrics.error_rate() - 0.3).abs() < f64::EPSILON);
    }
}
