//! Top-level hub configuration.

use serde::{Deserialize, Serialize};

use crate::budget::BudgetLimits;
use crate::router::RouterConfig;

/// Configuration for a hub instance.
///
/// All fields have serde defaults so a partial TOML/JSON fragment
/// deserializes into a working configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub budget: BudgetLimits,
    /// Cache entry time-to-live in seconds.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// Cache entry count ceiling before eviction kicks in.
    #[serde(default = "default_cache_max_entries")]
    pub cache_max_entries: usize,
    /// Interval between health/metrics refresh ticks in seconds.
    #[serde(default = "default_monitor_interval_secs")]
    pub monitor_interval_secs: u64,
    /// Event bus channel capacity.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_cache_ttl_secs() -> u64 {
    300
}

fn default_cache_max_entries() -> usize {
    1000
}

fn default_monitor_interval_secs() -> u64 {
    30
}

fn default_event_capacity() -> usize {
    1024
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            router: RouterConfig::default(),
            budget: BudgetLimits::default(),
            cache_ttl_secs: default_cache_ttl_secs(),
            cache_max_entries: default_cache_max_entries(),
            monitor_interval_secs: default_monitor_interval_secs(),
            event_capacity: default_event_capacity(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hub_config_from_toml_fragment() {
        let fragment = r#"
            cache_ttl_secs = 120
            monitor_interval_secs = 10

            [router]
            strategy = "cost-optimized"
            load_balancing = "least-connections"

            [budget]
            daily_limit = 25.0
        "#;
        let config: HubConfig = toml::from_str(fragment).unwrap();
        assert_eq!(config.cache_ttl_secs, 120);
        assert_eq!(config.monitor_interval_secs, 10);
        assert_eq!(
            config.router.strategy,
            crate::router::RoutingStrategy::CostOptimized
        );
        assert_eq!(config.budget.daily_limit, Some(25.0));
        // Unset fields keep their defaults.
        assert_eq!(config.cache_max_entries, 1000);
        assert!((config.budget.warning_threshold_pct - 80.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_hub_config_defaults_from_empty_fragment() {
        let config: HubConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.cache_ttl_secs, 300);
        assert_eq!(config.cache_max_entries, 1000);
        assert_eq!(config.monitor_interval_secs, 30);
        assert_eq!(config.event_capacity, 1024);
        assert!(config.budget.daily_limit.is_none());
    }
}
