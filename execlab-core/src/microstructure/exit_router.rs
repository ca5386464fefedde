//! Exit order optimizer: order style per exit reason.
//!
//! Profit-taking exits rest passively and fall back to aggressive after the
//! wait budget. Protective and forced exits always cross the spread.

use serde::{Deserialize, Serialize};

use crate::domain::{ExitReason, OrderStyle};

use super::fill_probability::FillEstimate;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub style: OrderStyle,
    /// Seconds a passive order may rest. Zero for aggressive plans.
    pub wait_budget_secs: f64,
    /// Style to use when the passive order is not filled in time.
    pub fallback: Option<OrderStyle>,
}

impl ExecutionPlan {
    pub fn aggressive() -> Self {
        Self {
            style: OrderStyle::Aggressive,
            wait_budget_secs: 0.0,
            fallback: None,
        }
    }

    pub fn passive(wait_budget_secs: f64, fallback: Option<OrderStyle>) -> Self {
        Self {
            style: OrderStyle::Passive,
            wait_budget_secs,
            fallback,
        }
    }

    pub fn is_passive(&self) -> bool {
        self.style == OrderStyle::Passive
    }
}

#[derive(Debug, Clone)]
pub struct ExitOrderOptimizer {
    wait_budget_secs: f64,
    aggressive_fallback: bool,
}

impl ExitOrderOptimizer {
    pub fn new(wait_budget_secs: f64, aggressive_fallback: bool) -> Self {
        Self {
            wait_budget_secs,
            aggressive_fallback,
        }
    }

    pub fn plan(&self, reason: ExitReason) -> ExecutionPlan {
        match reason {
            ExitReason::Target | ExitReason::PartialTarget => ExecutionPlan::passive(
                self.wait_budget_secs,
                self.aggressive_fallback.then_some(OrderStyle::Aggressive),
            ),
            ExitReason::StopLoss
            | ExitReason::BreakevenStop
            | ExitReason::TrailingStop
            | ExitReason::TimeFlatten
            | ExitReason::EndOfData => ExecutionPlan::aggressive(),
        }
    }

    /// Like [`plan`](Self::plan), but a passive plan whose fill estimate does
    /// not recommend waiting becomes aggressive immediately.
    pub fn plan_with_estimate(&self, reason: ExitReason, estimate: &FillEstimate) -> ExecutionPlan {
        let plan = self.plan(reason);
        if plan.is_passive() && !estimate.recommend_wait {
            return ExecutionPlan::aggressive();
        }
        plan
    }
}

impl Default for ExitOrderOptimizer {
    fn default() -> Self {
        Self::new(10.0, true)
    }
}
