//! Budget limit, usage, and alert types.
//!
//! Budget windows are rolling: daily resets 24h after its last reset
//! instant, monthly after 30 x 24h. They are deliberately not aligned to
//! calendar boundaries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// The two rolling spend-tracking windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetWindow {
    Daily,
    Monthly,
}

impl fmt::Display for BudgetWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BudgetWindow::Daily => write!(f, "daily"),
            BudgetWindow::Monthly => write!(f, "monthly"),
        }
    }
}

/// Spend ceilings and the warning threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetLimits {
    /// Daily ceiling in USD. `None` disables the daily check.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daily_limit: Option<f64>,
    /// Monthly ceiling in USD. `None` disables the monthly check.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monthly_limit: Option<f64>,
    /// Percentage of a limit at which a warning alert is raised.
    #[serde(default = "default_warning_threshold_pct")]
    pub warning_threshold_pct: f64,
}

fn default_warning_threshold_pct() -> f64 {
    80.0
}

impl Default for BudgetLimits {
    fn default() -> Self {
        Self {
            daily_limit: None,
            monthly_limit: None,
            warning_threshold_pct: default_warning_threshold_pct(),
        }
    }
}

/// Snapshot of current accumulated spend.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct BudgetUsage {
    pub daily_spend: f64,
    pub monthly_spend: f64,
}

/// Informational alert raised when usage crosses the warning threshold.
///
/// Alerts never block a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetAlert {
    pub window: BudgetWindow,
    pub usage: f64,
    pub limit: f64,
    pub percent_used: f64,
}

/// Aggregated spend over a time range, summed from the hub's usage log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostAnalysis {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub total_cost: f64,
    pub request_count: u64,
    pub cost_by_provider: HashMap<String, f64>,
    pub cost_by_model: HashMap<String, f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_window_display() {
        assert_eq!(BudgetWindow::Daily.to_string(), "daily");
        assert_eq!(BudgetWindow::Monthly.to_string(), "monthly");
    }

    #[test]
    fn test_limits_default_threshold() {
        let json = "{}";
        let limits: BudgetLimits = serde_json::from_str(json).unwrap();
        assert!(limits.daily_limit.is_none());
        assert!(limits.monthly_limit.is_none());
        assert!((limits.warning_threshold_pct - 80.0).abs() < f64::EPSILON);
    }
}
