//! Admission control over per-cost-class daily budgets.
//!
//! Budgets are tracked per cost class, not per model: several models share
//! one quota pool. Every operation takes a single lock acquisition, so
//! `check_budget` and `record_usage` are each individually atomic; the
//! pair remains separate in the orchestration sequence, which accepts
//! transient over-budget slop bounded by in-flight request concurrency.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use adlens_core::{CostClass, IgnoreLock as _};

use crate::config::BudgetLimits;
use crate::registry::{ModelId, ModelRegistry};

/// Utilization fraction above which a warning is surfaced.
const WARN_UTILIZATION: f64 = 0.8;

/// Admission decision for one prospective model call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostDecision {
    /// Whether the call may proceed.
    pub allowed: bool,
    /// Human-readable reason.
    pub reason: String,
    /// Remaining calls in the model's cost class today.
    pub remaining: u64,
    /// Cheaper affine model proposed when the class is exhausted.
    pub suggested_downgrade: Option<ModelId>,
}

/// Read-only snapshot of one cost class's budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetSnapshot {
    /// Cost class this budget covers.
    pub cost_class: CostClass,
    /// Daily call limit.
    pub daily_limit: u64,
    /// Calls used in the current window.
    pub used: u64,
    /// Calls remaining in the current window.
    pub remaining: u64,
    /// When the window resets.
    pub resets_at: DateTime<Utc>,
}

/// Near-limit warning for operator visibility. Observational only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetWarning {
    /// Cost class nearing its limit.
    pub cost_class: CostClass,
    /// Calls used in the current window.
    pub used: u64,
    /// Daily call limit.
    pub daily_limit: u64,
    /// Fraction of the budget consumed.
    pub utilization: f64,
}

/// Mutable budget window for one cost class.
struct BudgetWindow {
    daily_limit: u64,
    used: u64,
    resets_at: DateTime<Utc>,
}

impl BudgetWindow {
    fn new(daily_limit: u64) -> Self {
        Self {
            daily_limit,
            used: 0,
            resets_at: Utc::now() + ChronoDuration::hours(24),
        }
    }

    /// Lazily rolls the window forward past the daily boundary.
    fn reset_if_due(&mut self, now: DateTime<Utc>) {
        if now >= self.resets_at {
            self.used = 0;
            while self.resets_at <= now {
                self.resets_at += ChronoDuration::hours(24);
            }
        }
    }

    fn remaining(&self) -> u64 {
        self.daily_limit.saturating_sub(self.used)
    }
}

/// Admission controller tracking daily usage per cost class.
pub struct CostGovernor {
    /// Capability table for cost classes and downgrade search.
    registry: Arc<ModelRegistry>,
    /// Budget windows keyed by cost class, shared across requests.
    budgets: Mutex<HashMap<CostClass, BudgetWindow>>,
}

impl CostGovernor {
    /// Creates a governor with the configured per-class limits.
    #[must_use]
    pub fn new(registry: Arc<ModelRegistry>, limits: &BudgetLimits) -> Self {
        let mut budgets = HashMap::new();
        budgets.insert(CostClass::Low, BudgetWindow::new(limits.low_daily_limit));
        budgets.insert(
            CostClass::Medium,
            BudgetWindow::new(limits.medium_daily_limit),
        );
        budgets.insert(CostClass::High, BudgetWindow::new(limits.high_daily_limit));

        Self {
            registry,
            budgets: Mutex::new(budgets),
        }
    }

    /// Checks whether a call against `model` fits its class budget.
    ///
    /// On denial, proposes the cheapest lower-class model with overlapping
    /// task affinity whose own class still has budget, when one exists.
    #[must_use]
    pub fn check_budget(&self, model: ModelId) -> CostDecision {
        let Some(profile) = self.registry.get(model) else {
            return CostDecision {
                allowed: false,
                reason: format!("model {model} is not registered"),
                remaining: 0,
                suggested_downgrade: None,
            };
        };
        let cost_class = profile.cost_class;

        let now = Utc::now();
        let mut budgets = self.budgets.lock_ignore_poison();

        for window in budgets.values_mut() {
            window.reset_if_due(now);
        }

        let (remaining, limit) = budgets
            .get(&cost_class)
            .map_or((0, 0), |window| (window.remaining(), window.daily_limit));

        if remaining > 0 {
            return CostDecision {
                allowed: true,
                reason: format!("within {cost_class} class budget"),
                remaining,
                suggested_downgrade: None,
            };
        }

        // Class is exhausted: the registry's downgrade policy proposes the
        // candidates; the governor keeps only those with budget headroom.
        let suggested_downgrade = self
            .registry
            .downgrade_candidates(model)
            .into_iter()
            .find(|candidate| {
                budgets
                    .get(&candidate.cost_class)
                    .is_some_and(|window| window.remaining() > 0)
            })
            .map(|candidate| candidate.id);

        CostDecision {
            allowed: false,
            reason: format!("daily limit of {limit} reached for {cost_class} class"),
            remaining: 0,
            suggested_downgrade,
        }
    }

    /// Records one call against the model's cost class.
    ///
    /// A single atomic increment under one lock acquisition; never a
    /// read-modify-write across two calls.
    pub fn record_usage(&self, model: ModelId) {
        let Some(profile) = self.registry.get(model) else {
            tracing::warn!("usage recorded for unregistered model {model}");
            return;
        };

        let now = Utc::now();
        let mut budgets = self.budgets.lock_ignore_poison();
        if let Some(window) = budgets.get_mut(&profile.cost_class) {
            window.reset_if_due(now);
            window.used += 1;
        }
    }

    /// Snapshots of all budget windows, cheapest class first.
    #[must_use]
    pub fn usage_stats(&self) -> Vec<BudgetSnapshot> {
        let now = Utc::now();
        let mut budgets = self.budgets.lock_ignore_poison();

        CostClass::all()
            .into_iter()
            .filter_map(|cost_class| {
                budgets.get_mut(&cost_class).map(|window| {
                    window.reset_if_due(now);
                    BudgetSnapshot {
                        cost_class,
                        daily_limit: window.daily_limit,
                        used: window.used,
                        remaining: window.remaining(),
                        resets_at: window.resets_at,
                    }
                })
            })
            .collect()
    }

    /// Near-limit warnings (>80% consumed). Never blocks a request.
    #[must_use]
    pub fn warnings(&self) -> Vec<BudgetWarning> {
        self.usage_stats()
            .into_iter()
            .filter_map(|snapshot| {
                if snapshot.daily_limit == 0 {
                    return None;
                }
                let utilization = snapshot.used as f64 / snapshot.daily_limit as f64;
                (utilization > WARN_UTILIZATION).then(|| BudgetWarning {
                    cost_class: snapshot.cost_class,
                    used: snapshot.used,
                    daily_limit: snapshot.daily_limit,
                    utilization,
                })
            })
            .collect()
    }
}
