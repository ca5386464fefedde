//! Bid/ask microstructure — liquidity conditions, passive fill estimates,
//! spread-aware sizing and exit order routing.
//!
//! Only consulted when book-aware simulation is enabled and quotes are
//! supplied; otherwise every fill is priced from bars alone.
//!
//! - [`condition`] — spread vs rolling baseline → [`MarketCondition`]
//! - [`fill_probability`] — passive fill probability and expected wait
//! - [`sizing`] — shrink size when costs eat the expected profit
//! - [`exit_router`] — passive vs aggressive per exit reason
//! - [`queue_monitor`] — poll a resting order, detect stale prices
//! - [`post_trade`] — signal vs fill statistics

pub mod condition;
pub mod exit_router;
pub mod fill_probability;
pub mod post_trade;
pub mod queue_monitor;
pub mod sizing;

pub use condition::{
    ConditionConfig, ConditionReading, MarketCondition, MarketConditionClassifier, SpreadBaseline,
};
pub use exit_router::{ExecutionPlan, ExitOrderOptimizer};
pub use fill_probability::{FillEstimate, FillProbabilityConfig, FillProbabilityEstimator};
pub use post_trade::{
    summarize, ExecutionQualityRecord, ExecutionStats, FillKind, PostTradeAnalyzer, StyleStats,
};
pub use queue_monitor::{QueueMonitor, QueueMonitorConfig, QueueOutcome};
pub use sizing::{SizingDecision, SpreadAwareSizer};

use serde::{Deserialize, Serialize};

use crate::domain::{Instrument, Quote};
use crate::execution::CostModel;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MicrostructureConfig {
    pub condition: ConditionConfig,
    pub fill_probability: FillProbabilityConfig,
    pub queue: QueueMonitorConfig,
    /// Largest acceptable round-trip cost as a fraction of expected profit.
    pub max_cost_fraction: f64,
    /// Unfilled passive exits cross the spread after the wait budget.
    pub aggressive_fallback: bool,
    /// Spread used for sizing when no quote is available.
    pub assumed_spread_ticks: f64,
}

impl Default for MicrostructureConfig {
    fn default() -> Self {
        Self {
            condition: ConditionConfig::default(),
            fill_probability: FillProbabilityConfig::default(),
            queue: QueueMonitorConfig::default(),
            max_cost_fraction: 0.15,
            aggressive_fallback: true,
            assumed_spread_ticks: 1.0,
        }
    }
}

/// The stateless microstructure services for one instrument.
///
/// Spread baselines are per symbol and live in the engine's sessions;
/// see [`condition_classifier`](Self::condition_classifier).
#[derive(Debug, Clone)]
pub struct MicrostructureManager {
    config: MicrostructureConfig,
    tick_size: f64,
    estimator: FillProbabilityEstimator,
    sizer: SpreadAwareSizer,
    optimizer: ExitOrderOptimizer,
    monitor: QueueMonitor,
}

impl MicrostructureManager {
    pub fn new(config: MicrostructureConfig, costs: CostModel, instrument: &Instrument) -> Self {
        Self {
            estimator: FillProbabilityEstimator::new(config.fill_probability.clone()),
            sizer: SpreadAwareSizer::new(config.max_cost_fraction, costs, instrument.tick_value),
            optimizer: ExitOrderOptimizer::new(
                config.fill_probability.timeout_secs,
                config.aggressive_fallback,
            ),
            monitor: QueueMonitor::new(config.queue.clone(), instrument.tick_size),
            tick_size: instrument.tick_size,
            config,
        }
    }

    pub fn config(&self) -> &MicrostructureConfig {
        &self.config
    }

    /// A fresh classifier with an empty spread baseline.
    pub fn condition_classifier(&self) -> MarketConditionClassifier {
        MarketConditionClassifier::new(self.config.condition.clone())
    }

    pub fn estimator(&self) -> &FillProbabilityEstimator {
        &self.estimator
    }

    pub fn sizer(&self) -> &SpreadAwareSizer {
        &self.sizer
    }

    pub fn optimizer(&self) -> &ExitOrderOptimizer {
        &self.optimizer
    }

    pub fn monitor(&self) -> &QueueMonitor {
        &self.monitor
    }

    /// Size an entry from the latest quote's spread, or the assumed spread.
    pub fn size_entry(
        &self,
        base_contracts: u32,
        quote: Option<&Quote>,
        expected_profit_ticks: f64,
    ) -> SizingDecision {
        let spread_ticks = quote
            .filter(|q| q.is_valid() && self.tick_size > 0.0)
            .map(|q| q.spread() / self.tick_size)
            .unwrap_or(self.config.assumed_spread_ticks);
        self.sizer
            .size(base_contracts, spread_ticks, expected_profit_ticks)
    }
}
