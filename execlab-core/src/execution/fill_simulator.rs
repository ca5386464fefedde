//! Fill simulator — turns an order intent plus the next bar or quote into a fill.
//!
//! Bar rules:
//! - Market: bar open ± slippage.
//! - Sell stop: triggers if `low <= stop`; gap-through if `open <= stop`, in
//!   which case the base price is the open. Buy stop mirrors on the high.
//! - Buy limit: fills iff `low <= limit`; sell limit iff `high >= limit`.
//!   Limit fills are exactly at the limit, never improved.
//!
//! Quote rules substitute the touch: buys use the ask, sells the bid.
//!
//! A zero-volume bar, or a quote with no size on the side the order needs,
//! never fills.

use serde::{Deserialize, Serialize};

use crate::domain::{Bar, Instrument, OrderIntent, OrderSide, OrderType, Quote};

use super::cost_model::CostModel;

/// What the simulator prices against.
#[derive(Debug, Clone, Copy)]
pub enum PriceSource<'a> {
    Bar(&'a Bar),
    Quote(&'a Quote),
}

/// A confirmed fill.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub price: f64,
    /// Adverse distance between the fill and the order's frictionless price, in ticks.
    pub slippage_ticks: f64,
    /// A stop filled at the open because the market gapped through it.
    pub gapped: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoFillReason {
    /// Stop price not reached.
    NotTriggered,
    /// Limit price not reached.
    LimitNotReached,
    /// Zero volume, or no size on the needed side of the book.
    NoLiquidity,
    /// Non-finite or non-positive prices, or a crossed quote.
    InvalidData,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FillOutcome {
    Filled(Execution),
    NotFilled(NoFillReason),
}

impl FillOutcome {
    pub fn is_filled(&self) -> bool {
        matches!(self, FillOutcome::Filled(_))
    }

    pub fn execution(&self) -> Option<Execution> {
        match self {
            FillOutcome::Filled(exec) => Some(*exec),
            FillOutcome::NotFilled(_) => None,
        }
    }
}

/// Which side of a stop/target bracket filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BracketLeg {
    Stop,
    Target,
}

/// Outcome of a bar that may reach both a protective stop and a profit target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BracketResolution {
    pub leg: BracketLeg,
    pub execution: Execution,
    /// Both legs were reachable within the bar; the stop was taken.
    pub ambiguous: bool,
}

/// Stateless fill simulator for one instrument.
#[derive(Debug, Clone)]
pub struct FillSimulator {
    instrument: Instrument,
    costs: CostModel,
}

impl FillSimulator {
    pub fn new(instrument: Instrument, costs: CostModel) -> Self {
        Self { instrument, costs }
    }

    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    pub fn costs(&self) -> &CostModel {
        &self.costs
    }

    pub fn simulate(&self, intent: &OrderIntent, source: PriceSource<'_>) -> FillOutcome {
        self.simulate_scaled(intent, source, 1.0)
    }

    /// Simulate with the configured slippage scaled by `slippage_mult`.
    pub fn simulate_scaled(
        &self,
        intent: &OrderIntent,
        source: PriceSource<'_>,
        slippage_mult: f64,
    ) -> FillOutcome {
        match source {
            PriceSource::Bar(bar) => self.against_bar(intent, bar, slippage_mult),
            PriceSource::Quote(quote) => self.against_quote(intent, quote, slippage_mult),
        }
    }

    /// Resolve a protective stop and a profit target on the same bar.
    ///
    /// When both are reachable the stop wins: the bar carries no path
    /// information, so losses are recognized before gains.
    pub fn resolve_bracket(
        &self,
        stop: &OrderIntent,
        target: &OrderIntent,
        bar: &Bar,
    ) -> Option<BracketResolution> {
        self.resolve_bracket_scaled(stop, target, bar, 1.0)
    }

    /// [`resolve_bracket`](Self::resolve_bracket) with the stop leg's
    /// slippage multiplied by `stop_slippage_mult`.
    pub fn resolve_bracket_scaled(
        &self,
        stop: &OrderIntent,
        target: &OrderIntent,
        bar: &Bar,
        stop_slippage_mult: f64,
    ) -> Option<BracketResolution> {
        let stop_fill = self.simulate_scaled(stop, PriceSource::Bar(bar), stop_slippage_mult);
        let target_fill = self.simulate(target, PriceSource::Bar(bar));
        match (stop_fill, target_fill) {
            (FillOutcome::Filled(execution), other) => Some(BracketResolution {
                leg: BracketLeg::Stop,
                execution,
                ambiguous: other.is_filled(),
            }),
            (FillOutcome::NotFilled(_), FillOutcome::Filled(execution)) => {
                Some(BracketResolution {
                    leg: BracketLeg::Target,
                    execution,
                    ambiguous: false,
                })
            }
            _ => None,
        }
    }

    fn against_bar(&self, intent: &OrderIntent, bar: &Bar, slippage_mult: f64) -> FillOutcome {
        if !bar.is_sane() {
            return FillOutcome::NotFilled(NoFillReason::InvalidData);
        }
        if !bar.has_liquidity() {
            return FillOutcome::NotFilled(NoFillReason::NoLiquidity);
        }

        match intent.order_type {
            OrderType::Market => {
                FillOutcome::Filled(self.aggressive(bar.open, intent.side, false, slippage_mult))
            }
            OrderType::Stop { stop_price } => {
                let (triggered, gapped) = match intent.side {
                    OrderSide::Sell => (bar.low <= stop_price, bar.open <= stop_price),
                    OrderSide::Buy => (bar.high >= stop_price, bar.open >= stop_price),
                };
                if !triggered {
                    return FillOutcome::NotFilled(NoFillReason::NotTriggered);
                }
                let base = if gapped { bar.open } else { stop_price };
                let mut exec = self.aggressive(base, intent.side, gapped, slippage_mult);
                exec.slippage_ticks = self.adverse_ticks(exec.price, stop_price, intent.side);
                FillOutcome::Filled(exec)
            }
            OrderType::Limit { limit_price } => {
                let reached = match intent.side {
                    OrderSide::Buy => bar.low <= limit_price,
                    OrderSide::Sell => bar.high >= limit_price,
                };
                if reached {
                    FillOutcome::Filled(passive(limit_price))
                } else {
                    FillOutcome::NotFilled(NoFillReason::LimitNotReached)
                }
            }
        }
    }

    fn against_quote(&self, intent: &OrderIntent, quote: &Quote, slippage_mult: f64) -> FillOutcome {
        if !quote.is_valid() {
            return FillOutcome::NotFilled(NoFillReason::InvalidData);
        }
        // Buys take the ask, sells hit the bid.
        let (touch, size) = match intent.side {
            OrderSide::Buy => (quote.ask, quote.ask_size),
            OrderSide::Sell => (quote.bid, quote.bid_size),
        };
        if size == 0 {
            return FillOutcome::NotFilled(NoFillReason::NoLiquidity);
        }

        match intent.order_type {
            OrderType::Market => {
                FillOutcome::Filled(self.aggressive(touch, intent.side, false, slippage_mult))
            }
            OrderType::Stop { stop_price } => {
                let triggered = match intent.side {
                    OrderSide::Sell => touch <= stop_price,
                    OrderSide::Buy => touch >= stop_price,
                };
                if !triggered {
                    return FillOutcome::NotFilled(NoFillReason::NotTriggered);
                }
                let gapped = (touch - stop_price).abs() > 1e-9;
                let mut exec = self.aggressive(touch, intent.side, gapped, slippage_mult);
                exec.slippage_ticks = self.adverse_ticks(exec.price, stop_price, intent.side);
                FillOutcome::Filled(exec)
            }
            OrderType::Limit { limit_price } => {
                let reached = match intent.side {
                    OrderSide::Buy => touch <= limit_price,
                    OrderSide::Sell => touch >= limit_price,
                };
                if reached {
                    FillOutcome::Filled(passive(limit_price))
                } else {
                    FillOutcome::NotFilled(NoFillReason::LimitNotReached)
                }
            }
        }
    }

    fn aggressive(&self, base: f64, side: OrderSide, gapped: bool, slippage_mult: f64) -> Execution {
        let price =
            self.costs
                .apply_slippage_scaled(base, side, self.instrument.tick_size, slippage_mult);
        Execution {
            price,
            slippage_ticks: self.adverse_ticks(price, base, side),
            gapped,
        }
    }

    fn adverse_ticks(&self, price: f64, reference: f64, side: OrderSide) -> f64 {
        self.instrument
            .price_to_ticks(side.sign() * (price - reference))
            .max(0.0)
    }
}

fn passive(limit_price: f64) -> Execution {
    Execution {
        price: limit_price,
        slippage_ticks: 0.0,
        gapped: false,
    }
}
