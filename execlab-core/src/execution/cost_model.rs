//! Cost model — slippage and commission calculation.
//!
//! Slippage is directional and measured in ticks: buyers pay up, sellers give up.
//! Commission is a flat dollar amount per contract per side.
//! Tick rounding is applied after slippage: buy rounds up, sell rounds down.

use serde::{Deserialize, Serialize};

use crate::domain::{round_to_tick, OrderSide};

/// Execution friction for one instrument.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostModel {
    /// Slippage per aggressive fill, in ticks, applied against the trader.
    pub slippage_ticks: f64,
    /// Dollars per contract per side.
    pub commission_per_contract: f64,
}

impl CostModel {
    pub fn new(slippage_ticks: f64, commission_per_contract: f64) -> Self {
        Self {
            slippage_ticks,
            commission_per_contract,
        }
    }

    pub fn frictionless() -> Self {
        Self::new(0.0, 0.0)
    }

    /// Apply `slippage_ticks` to a raw price, then round adversely to the tick grid.
    pub fn apply_slippage(&self, raw_price: f64, side: OrderSide, tick_size: f64) -> f64 {
        self.apply_slippage_scaled(raw_price, side, tick_size, 1.0)
    }

    /// Same as [`apply_slippage`](Self::apply_slippage) with the slippage scaled
    /// by `multiplier` (market-condition adjustment).
    pub fn apply_slippage_scaled(
        &self,
        raw_price: f64,
        side: OrderSide,
        tick_size: f64,
        multiplier: f64,
    ) -> f64 {
        let slip = self.slippage_ticks.max(0.0) * multiplier.max(0.0) * tick_size;
        round_to_tick(raw_price + side.sign() * slip, tick_size, side)
    }

    /// Commission for a fill of `quantity` contracts (one side).
    pub fn commission(&self, quantity: u32) -> f64 {
        self.commission_per_contract * quantity as f64
    }
}

impl Default for CostModel {
    fn default() -> Self {
        Self::new(1.0, 2.50)
    }
}
