//! Order intents: what the engine or the exit state machine wants executed.
//!
//! An intent is created, handed to the fill simulator once, and discarded.
//! Nothing here is persisted between bars.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// +1 for buys, -1 for sells. Slippage is applied as `price + sign * slip`.
    pub fn sign(self) -> f64 {
        match self {
            OrderSide::Buy => 1.0,
            OrderSide::Sell => -1.0,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

/// What kind of order and its price parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum OrderType {
    /// Fill at the next available price (bar open or best quote).
    Market,
    /// Fill at `limit_price` exactly, only if the market reaches it.
    Limit { limit_price: f64 },
    /// Triggers when the market trades through `stop_price`, then fills as market.
    Stop { stop_price: f64 },
}

/// How an order interacts with the book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStyle {
    /// Rests at a price and waits for a counterparty.
    Passive,
    /// Crosses the spread for immediate execution.
    Aggressive,
}

/// A single order request consumed by the fill simulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderIntent {
    pub side: OrderSide,
    pub order_type: OrderType,
    /// Price the decision was made at (signal price). Used for execution-quality stats.
    pub reference_price: f64,
    pub quantity: u32,
}

impl OrderIntent {
    pub fn market(side: OrderSide, quantity: u32, reference_price: f64) -> Self {
        Self {
            side,
            order_type: OrderType::Market,
            reference_price,
            quantity,
        }
    }

    pub fn limit(side: OrderSide, quantity: u32, limit_price: f64) -> Self {
        Self {
            side,
            order_type: OrderType::Limit { limit_price },
            reference_price: limit_price,
            quantity,
        }
    }

    pub fn stop(side: OrderSide, quantity: u32, stop_price: f64) -> Self {
        Self {
            side,
            order_type: OrderType::Stop { stop_price },
            reference_price: stop_price,
            quantity,
        }
    }

    pub fn style(&self) -> OrderStyle {
        match self.order_type {
            OrderType::Limit { .. } => OrderStyle::Passive,
            OrderType::Market | OrderType::Stop { .. } => OrderStyle::Aggressive,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_sign_and_opposite() {
        assert_eq!(OrderSide::Buy.sign(), 1.0);
        assert_eq!(OrderSide::Sell.sign(), -1.0);
        assert_eq!(OrderSide::Buy.opposite(), OrderSide::Sell);
    }

    #[test]
    fn limit_intents_are_passive() {
        let intent = OrderIntent::limit(OrderSide::Sell, 2, 4510.0);
        assert_eq!(intent.style(), OrderStyle::Passive);
        assert_eq!(intent.reference_price, 4510.0);
    }

    #[test]
    fn stop_and_market_intents_are_aggressive() {
        assert_eq!(
            OrderIntent::stop(OrderSide::Sell, 1, 4498.0).style(),
            OrderStyle::Aggressive
        );
        assert_eq!(
            OrderIntent::market(OrderSide::Buy, 1, 4500.0).style(),
            OrderStyle::Aggressive
        );
    }

    #[test]
    fn intent_serialization_roundtrip() {
        let intent = OrderIntent::stop(OrderSide::Buy, 3, 4512.25);
        let json = serde_json::to_string(&intent).unwrap();
        let deser: OrderIntent = serde_json::from_str(&json).unwrap();
        assert_eq!(intent, deser);
    }
}
