//! Spread-aware sizing: shrink the order when round-trip costs eat too much
//! of the expected profit.

use serde::{Deserialize, Serialize};

use crate::execution::CostModel;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SizingDecision {
    pub contracts: u32,
    pub base_contracts: u32,
    /// Round-trip cost in ticks: spread + 2 x slippage + 2 x commission.
    pub cost_ticks: f64,
    /// `cost_ticks / expected_profit_ticks`.
    pub cost_ratio: f64,
    pub reduced: bool,
}

#[derive(Debug, Clone)]
pub struct SpreadAwareSizer {
    max_cost_fraction: f64,
    costs: CostModel,
    tick_value: f64,
}

impl SpreadAwareSizer {
    pub fn new(max_cost_fraction: f64, costs: CostModel, tick_value: f64) -> Self {
        Self {
            max_cost_fraction,
            costs,
            tick_value,
        }
    }

    pub fn round_trip_cost_ticks(&self, spread_ticks: f64) -> f64 {
        let commission_ticks = if self.tick_value > 0.0 {
            self.costs.commission_per_contract / self.tick_value
        } else {
            0.0
        };
        spread_ticks.max(0.0) + 2.0 * self.costs.slippage_ticks + 2.0 * commission_ticks
    }

    pub fn size(&self, base: u32, spread_ticks: f64, expected_profit_ticks: f64) -> SizingDecision {
        let base = base.max(1);
        let cost_ticks = self.round_trip_cost_ticks(spread_ticks);
        let cost_ratio = if expected_profit_ticks > 0.0 {
            cost_ticks / expected_profit_ticks
        } else {
            f64::INFINITY
        };

        let contracts = if cost_ratio > self.max_cost_fraction {
            let scaled = base as f64 * self.max_cost_fraction / cost_ratio;
            (scaled.floor() as u32).clamp(1, base)
        } else {
            base
        };

        SizingDecision {
            contracts,
            base_contracts: base,
            cost_ticks,
            cost_ratio,
            reduced: contracts < base,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sizer() -> SpreadAwareSizer {
        SpreadAwareSizer::new(0.15, CostModel::new(1.0, 2.5), 12.5)
    }

    #[test]
    fn wide_spread_shrinks_size_but_not_to_zero() {
        // 8 + 2 + 0.4 = 10.4 ticks against 10 ticks of expected profit
        let d = sizer().size(5, 8.0, 10.0);
        assert!((d.cost_ticks - 10.4).abs() < 1e-9);
        assert!(d.reduced);
        assert!(d.contracts >= 1 && d.contracts < 5);
    }

    #[test]
    fn cheap_trade_keeps_base_size() {
        let cheap = SpreadAwareSizer::new(0.15, CostModel::frictionless(), 12.5);
        let d = cheap.size(5, 1.0, 40.0);
        assert_eq!(d.contracts, 5);
        assert!(!d.reduced);
    }

    #[test]
    fn partial_reduction() {
        // cost 1 + 2 + 0.4 = 3.4 ticks on 20 ticks → ratio 0.17 → floor(10 * 0.15 / 0.17) = 8
        let d = sizer().size(10, 1.0, 20.0);
        assert_eq!(d.contracts, 8);
    }

    #[test]
    fn non_positive_expected_profit_trades_one() {
        assert_eq!(sizer().size(4, 1.0, 0.0).contracts, 1);
    }
}
