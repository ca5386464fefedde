//! Execution venues — the seam between the exit logic and whatever fills orders.
//!
//! The simulation core only talks to [`ExecutionVenue`]. [`SimulatedVenue`]
//! prices against one bar, and against that bar's quotes when book-aware
//! simulation supplied them. Broker adapters would be further implementations
//! and stay outside this crate.

use serde::{Deserialize, Serialize};

use crate::domain::{Bar, OrderIntent, OrderStyle, OrderType, Quote};
use crate::microstructure::{ExecutionPlan, MarketCondition, MicrostructureManager, QueueOutcome};

use super::fill_simulator::{
    BracketResolution, Execution, FillOutcome, FillSimulator, NoFillReason, PriceSource,
};

/// A fill together with the style it was executed with.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VenueFill {
    pub execution: Execution,
    pub style: OrderStyle,
}

pub trait ExecutionVenue {
    fn name(&self) -> &str;

    /// Execute `intent` on `bar` following `plan`.
    fn execute(
        &self,
        intent: &OrderIntent,
        plan: &ExecutionPlan,
        bar: &Bar,
    ) -> Result<VenueFill, NoFillReason>;

    /// Resolve a protective stop and a profit target on the same bar, stop first.
    fn bracket(
        &self,
        stop: &OrderIntent,
        target: &OrderIntent,
        bar: &Bar,
    ) -> Option<BracketResolution>;
}

/// Quotes that fall inside the current bar, with the bar's market condition.
#[derive(Debug, Clone, Copy)]
pub struct BookContext<'a> {
    pub quotes: &'a [Quote],
    pub condition: MarketCondition,
    pub micro: &'a MicrostructureManager,
}

/// Simulated fills for one bar.
#[derive(Debug, Clone, Copy)]
pub struct SimulatedVenue<'a> {
    simulator: &'a FillSimulator,
    book: Option<BookContext<'a>>,
}

impl<'a> SimulatedVenue<'a> {
    pub fn bars_only(simulator: &'a FillSimulator) -> Self {
        Self {
            simulator,
            book: None,
        }
    }

    /// Book-aware venue. Falls back to bar pricing when `book` holds no quotes.
    pub fn with_book(simulator: &'a FillSimulator, book: BookContext<'a>) -> Self {
        let book = (!book.quotes.is_empty()).then_some(book);
        Self { simulator, book }
    }

    pub fn is_book_aware(&self) -> bool {
        self.book.is_some()
    }

    fn on_bar(&self, intent: &OrderIntent, bar: &Bar) -> Result<VenueFill, NoFillReason> {
        match self.simulator.simulate(intent, PriceSource::Bar(bar)) {
            FillOutcome::Filled(execution) => Ok(VenueFill {
                execution,
                style: intent.style(),
            }),
            FillOutcome::NotFilled(reason) => Err(reason),
        }
    }

    /// Cross the spread at the first quote from `from` that has size.
    fn aggressive_on_book(
        &self,
        intent: &OrderIntent,
        book: &BookContext<'_>,
        from: usize,
    ) -> Result<VenueFill, NoFillReason> {
        let market = OrderIntent {
            order_type: OrderType::Market,
            ..intent.clone()
        };
        let mult = book.condition.slippage_multiplier();
        let mut last = NoFillReason::NoLiquidity;
        for quote in book.quotes.iter().skip(from) {
            match self
                .simulator
                .simulate_scaled(&market, PriceSource::Quote(quote), mult)
            {
                FillOutcome::Filled(execution) => {
                    return Ok(VenueFill {
                        execution,
                        style: OrderStyle::Aggressive,
                    })
                }
                FillOutcome::NotFilled(reason) => last = reason,
            }
        }
        Err(last)
    }

    fn passive_on_book(
        &self,
        intent: &OrderIntent,
        limit_price: f64,
        plan: &ExecutionPlan,
        book: &BookContext<'_>,
    ) -> Result<VenueFill, NoFillReason> {
        let Some(first) = book.quotes.iter().find(|q| q.is_valid()) else {
            return Err(NoFillReason::InvalidData);
        };
        let estimate = book
            .micro
            .estimator()
            .estimate(intent.side, first, book.condition);
        if !estimate.recommend_wait {
            return self.aggressive_on_book(intent, book, 0);
        }

        let outcome = book.micro.monitor().monitor_with_budget(
            intent.side,
            limit_price,
            book.quotes,
            first.timestamp,
            plan.wait_budget_secs,
        );
        match outcome {
            QueueOutcome::Filled { .. } => Ok(VenueFill {
                execution: Execution {
                    price: limit_price,
                    slippage_ticks: 0.0,
                    gapped: false,
                },
                style: OrderStyle::Passive,
            }),
            other => {
                if plan.fallback != Some(OrderStyle::Aggressive) {
                    return Err(NoFillReason::LimitNotReached);
                }
                tracing::debug!(?other, limit_price, "passive exit unfilled, crossing spread");
                self.aggressive_on_book(intent, book, other.fallback_quote().unwrap_or(0))
            }
        }
    }
}

impl ExecutionVenue for SimulatedVenue<'_> {
    fn name(&self) -> &str {
        if self.book.is_some() {
            "simulated-book"
        } else {
            "simulated-bars"
        }
    }

    fn execute(
        &self,
        intent: &OrderIntent,
        plan: &ExecutionPlan,
        bar: &Bar,
    ) -> Result<VenueFill, NoFillReason> {
        let Some(book) = self.book.as_ref() else {
            return self.on_bar(intent, bar);
        };
        match intent.order_type {
            OrderType::Market => self.aggressive_on_book(intent, book, 0),
            OrderType::Limit { .. } if !plan.is_passive() => {
                self.aggressive_on_book(intent, book, 0)
            }
            OrderType::Limit { limit_price } => {
                match self.passive_on_book(intent, limit_price, plan, book) {
                    Err(NoFillReason::InvalidData) => self.on_bar(intent, bar),
                    other => other,
                }
            }
            OrderType::Stop { .. } => {
                let mult = book.condition.slippage_multiplier();
                match self
                    .simulator
                    .simulate_scaled(intent, PriceSource::Bar(bar), mult)
                {
                    FillOutcome::Filled(execution) => Ok(VenueFill {
                        execution,
                        style: OrderStyle::Aggressive,
                    }),
                    FillOutcome::NotFilled(reason) => Err(reason),
                }
            }
        }
    }

    fn bracket(
        &self,
        stop: &OrderIntent,
        target: &OrderIntent,
        bar: &Bar,
    ) -> Option<BracketResolution> {
        let mult = self
            .book
            .as_ref()
            .map_or(1.0, |book| book.condition.slippage_multiplier());
        self.simulator.resolve_bracket_scaled(stop, target, bar, mult)
    }
}
