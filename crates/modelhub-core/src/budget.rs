//! Budget tracking against rolling daily/monthly spend windows.
//!
//! All checks, recordings, and window resets happen inside one mutex so a
//! reset applies exactly once per elapsed window and no caller observes a
//! partially applied `record_usage`. Windows are rolling wall-clock
//! periods (24h and 30 x 24h), not calendar-aligned.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use modelhub_types::budget::{BudgetAlert, BudgetLimits, BudgetUsage, BudgetWindow};
use modelhub_types::error::HubError;

const DAILY_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);
const MONTHLY_WINDOW: Duration = Duration::from_secs(30 * 24 * 60 * 60);

struct WindowState {
    spend: f64,
    last_reset: Instant,
}

struct BudgetState {
    limits: BudgetLimits,
    daily: WindowState,
    monthly: WindowState,
}

impl BudgetState {
    /// Reset any window whose period has elapsed. Called at the top of
    /// every operation, inside the lock, so resets apply exactly once no
    /// matter how many requests race to observe the stale window.
    fn maybe_reset(&mut self, now: Instant) {
        if now.duration_since(self.daily.last_reset) >= DAILY_WINDOW {
            self.daily.spend = 0.0;
            self.daily.last_reset = now;
        }
        if now.duration_since(self.monthly.last_reset) >= MONTHLY_WINDOW {
            self.monthly.spend = 0.0;
            self.monthly.last_reset = now;
        }
    }
}

/// Tracks spend against the configured daily/monthly ceilings.
pub struct BudgetTracker {
    state: Mutex<BudgetState>,
}

impl BudgetTracker {
    pub fn new(limits: BudgetLimits) -> Self {
        let now = Instant::now();
        Self {
            state: Mutex::new(BudgetState {
                limits,
                daily: WindowState {
                    spend: 0.0,
                    last_reset: now,
                },
                monthly: WindowState {
                    spend: 0.0,
                    last_reset: now,
                },
            }),
        }
    }

    /// Fail with `BudgetExceeded` when current usage already meets or
    /// exceeds a configured ceiling. The check is against *current* usage,
    /// not usage plus the upcoming request's estimated cost.
    pub fn check_budget(&self) -> Result<(), HubError> {
        self.check_budget_at(Instant::now())
    }

    fn check_budget_at(&self, now: Instant) -> Result<(), HubError> {
        let mut state = self.state.lock().expect("budget lock poisoned");
        state.maybe_reset(now);

        if let Some(limit) = state.limits.daily_limit {
            if state.daily.spend >= limit {
                return Err(HubError::BudgetExceeded {
                    window: BudgetWindow::Daily,
                    limit,
                    usage: state.daily.spend,
                });
            }
        }
        if let Some(limit) = state.limits.monthly_limit {
            if state.monthly.spend >= limit {
                return Err(HubError::BudgetExceeded {
                    window: BudgetWindow::Monthly,
                    limit,
                    usage: state.monthly.spend,
                });
            }
        }
        Ok(())
    }

    /// Add a completed request's cost to both accumulators.
    pub fn record_usage(&self, cost: f64) {
        self.record_usage_at(cost, Instant::now());
    }

    fn record_usage_at(&self, cost: f64, now: Instant) {
        let mut state = self.state.lock().expect("budget lock poisoned");
        state.maybe_reset(now);
        state.daily.spend += cost;
        state.monthly.spend += cost;
    }

    /// Return threshold-crossing alerts. Informational only -- alerts
    /// never block a request.
    pub fn check_alerts(&self) -> Vec<BudgetAlert> {
        self.check_alerts_at(Instant::now())
    }

    fn check_alerts_at(&self, now: Instant) -> Vec<BudgetAlert> {
        let mut state = self.state.lock().expect("budget lock poisoned");
        state.maybe_reset(now);

        let threshold_pct = state.limits.warning_threshold_pct;
        let mut alerts = Vec::new();

        let windows = [
            (BudgetWindow::Daily, state.limits.daily_limit, state.daily.spend),
            (
                BudgetWindow::Monthly,
                state.limits.monthly_limit,
                state.monthly.spend,
            ),
        ];
        for (window, limit, spend) in windows {
            let Some(limit) = limit else { continue };
            if limit <= 0.0 {
                continue;
            }
            if spend >= limit * threshold_pct / 100.0 {
                alerts.push(BudgetAlert {
                    window,
                    usage: spend,
                    limit,
                    percent_used: spend / limit * 100.0,
                });
            }
        }
        alerts
    }

    /// Replace the configured limits. Existing accumulators are kept.
    pub fn set_limits(&self, limits: BudgetLimits) {
        let mut state = self.state.lock().expect("budget lock poisoned");
        state.limits = limits;
    }

    pub fn limits(&self) -> BudgetLimits {
        self.state
            .lock()
            .expect("budget lock poisoned")
            .limits
            .clone()
    }

    /// Snapshot of current accumulated spend.
    pub fn usage(&self) -> BudgetUsage {
        let state = self.state.lock().expect("budget lock poisoned");
        BudgetUsage {
            daily_spend: state.daily.spend,
            monthly_spend: state.monthly.spend,
        }
    }
}
