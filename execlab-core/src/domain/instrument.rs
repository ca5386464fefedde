use serde::{Deserialize, Serialize};

use super::order::OrderSide;

/// Instrument metadata: tick grid and the dollar value of one tick.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Instrument {
    pub symbol: String,
    /// Minimum price increment.
    pub tick_size: f64,
    /// Dollars per tick per contract.
    pub tick_value: f64,
}

impl Instrument {
    pub fn new(symbol: impl Into<String>, tick_size: f64, tick_value: f64) -> Self {
        Self {
            symbol: symbol.into(),
            tick_size,
            tick_value,
        }
    }

    /// E-mini S&P 500: 0.25 tick, $12.50 per tick.
    pub fn es() -> Self {
        Self::new("ES", 0.25, 12.5)
    }

    /// E-mini Nasdaq-100: 0.25 tick, $5.00 per tick.
    pub fn nq() -> Self {
        Self::new("NQ", 0.25, 5.0)
    }

    /// Price distance expressed in ticks (not rounded).
    pub fn price_to_ticks(&self, price_delta: f64) -> f64 {
        price_delta / self.tick_size
    }

    pub fn ticks_to_price(&self, ticks: f64) -> f64 {
        ticks * self.tick_size
    }

    /// Dollar value of a tick move across `quantity` contracts.
    pub fn ticks_to_dollars(&self, ticks: f64, quantity: u32) -> f64 {
        ticks * self.tick_value * quantity as f64
    }

    /// Round to the tick grid in the direction adverse to `side`.
    pub fn round_adverse(&self, price: f64, side: OrderSide) -> f64 {
        round_to_tick(price, self.tick_size, side)
    }

    pub fn round_nearest(&self, price: f64) -> f64 {
        (price / self.tick_size).round() * self.tick_size
    }
}

/// Round a price to the tick grid adversely: buys round up, sells round down.
///
/// A small tolerance keeps already-aligned prices (e.g. 4500.25 stored as
/// 4500.2499999) from jumping a full tick.
pub fn round_to_tick(price: f64, tick_size: f64, side: OrderSide) -> f64 {
    if tick_size <= 0.0 {
        return price;
    }
    let ticks = price / tick_size;
    let rounded = match side {
        OrderSide::Buy => (ticks - 1e-9).ceil(),
        OrderSide::Sell => (ticks + 1e-9).floor(),
    };
    rounded * tick_size
}
