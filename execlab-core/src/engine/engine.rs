//! The bar replay loop.
//!
//! Each symbol runs in its own [`SymbolSession`]. Per accepted bar:
//!
//! 1. data-quality gate (bad bars are skipped)
//! 2. fill a pending entry at the open
//! 3. attempt a pending forced flatten at the open
//! 4. classify the regime from accepted history
//! 5. run the adaptive exit state machine on the open position
//! 6. evaluate the entry signal when flat (fills on the next bar)
//!
//! Sessions share nothing, so replaying them one after another gives the
//! same result as interleaving them by timestamp. Trades are sorted at the end.

use std::collections::BTreeMap;

use crate::domain::{
    Bar, ExitLeg, ExitReason, OrderIntent, OrderSide, OrderStyle, Position, PositionSide, Quote,
    Trade,
};
use crate::execution::{
    BookContext, Execution, ExecutionVenue, FillSimulator, SimulatedVenue, VenueFill,
};
use crate::exits::{AdaptiveExitManager, EffectiveThresholds};
use crate::microstructure::{
    ExecutionPlan, ExecutionQualityRecord, FillKind, MarketCondition, MicrostructureManager,
};
use crate::regime::{RegimeClassifier, RegimeLabel};
use crate::signal::EntrySignal;

use super::config::EngineConfig;
use super::quality::{DataQualityIssue, QualityGate};
use super::result::{EngineError, RunResult, RunWarning, SKIP_RATE_THRESHOLD};
use super::series::MarketSeries;
use super::session::{PendingEntry, PendingFlatten, SessionState, SymbolSession};

/// A validated engine. Cheap to share across threads; `run` takes `&self`.
#[derive(Debug, Clone)]
pub struct BacktestEngine {
    config: EngineConfig,
    simulator: FillSimulator,
    exits: AdaptiveExitManager,
    micro: MicrostructureManager,
    classifier: RegimeClassifier,
}

/// Everything one bar step needs besides the session.
struct BarContext<'a> {
    bar: &'a Bar,
    index: usize,
    venue: SimulatedVenue<'a>,
    condition: MarketCondition,
    /// First usable quote of the bar, for sizing.
    first_quote: Option<&'a Quote>,
}

impl BacktestEngine {
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let simulator = FillSimulator::new(config.instrument.clone(), config.costs);
        let micro = MicrostructureManager::new(
            config.microstructure.clone(),
            config.costs,
            &config.instrument,
        );
        let exits = AdaptiveExitManager::new(
            config.exits.clone(),
            config.instrument.clone(),
            config.costs,
            micro.optimizer().clone(),
        );
        let classifier = RegimeClassifier::new(config.regime.clone());
        Ok(Self {
            config,
            simulator,
            exits,
            micro,
            classifier,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn run(
        &self,
        series: &[MarketSeries],
        signal: &dyn EntrySignal,
    ) -> Result<RunResult, EngineError> {
        if series.iter().all(|s| s.bars.is_empty()) {
            return Err(EngineError::NoData);
        }
        let mut by_symbol: BTreeMap<&str, &MarketSeries> = BTreeMap::new();
        for s in series {
            if by_symbol.insert(s.symbol.as_str(), s).is_some() {
                return Err(EngineError::DuplicateSymbol(s.symbol.clone()));
            }
        }

        let mut result = RunResult {
            initial_capital: self.config.initial_capital,
            ..RunResult::default()
        };
        for s in by_symbol.values() {
            self.run_series(s, signal, &mut result);
        }

        result.trades.sort_by(|a, b| {
            a.exit_time
                .cmp(&b.exit_time)
                .then_with(|| a.symbol.cmp(&b.symbol))
        });
        result.execution.sort_by(|a, b| {
            a.time.cmp(&b.time).then_with(|| a.symbol.cmp(&b.symbol))
        });

        tracing::info!(
            symbols = by_symbol.len(),
            signal = signal.name(),
            trades = result.trades.len(),
            bars = result.bars_processed,
            skipped = result.bars_skipped,
            warnings = result.warnings.len(),
            "run complete"
        );
        Ok(result)
    }

    fn run_series(&self, series: &MarketSeries, signal: &dyn EntrySignal, result: &mut RunResult) {
        let mut session = SymbolSession::new(&series.symbol, self.micro.condition_classifier());
        let book_aware = self.config.book_aware && series.has_quotes();
        if self.config.book_aware && !series.has_quotes() {
            tracing::info!(symbol = %series.symbol, "no quotes supplied, pricing from bars");
        }

        for (input_index, bar) in series.bars.iter().enumerate() {
            if let Err(issue) = session.gate.check_bar(&series.symbol, input_index, bar) {
                self.skip_bar(&mut session, issue, result);
                continue;
            }
            session.history.push(bar.clone());
            result.bars_processed += 1;

            let next_ts = series.bars.get(input_index + 1).map(|b| b.timestamp);
            let (quote_offset, quotes) = if book_aware {
                series.quotes_between(bar.timestamp, next_ts)
            } else {
                (0, &[][..])
            };
            let condition = if book_aware {
                let (condition, invalid) = session.observe_quotes(quotes);
                for i in invalid {
                    self.flag_quote(&series.symbol, quote_offset + i, &quotes[i], result);
                }
                condition
            } else {
                MarketCondition::Normal
            };

            let venue = if book_aware {
                SimulatedVenue::with_book(
                    &self.simulator,
                    BookContext {
                        quotes,
                        condition,
                        micro: &self.micro,
                    },
                )
            } else {
                SimulatedVenue::bars_only(&self.simulator)
            };
            let ctx = BarContext {
                bar,
                index: session.current_index(),
                venue,
                condition,
                first_quote: quotes.iter().find(|q| q.is_valid()),
            };
            self.step(&mut session, &ctx, signal, result);
        }

        self.finish(&mut session, result);

        let total = series.bars.len();
        if total > 0 && session.skipped() as f64 / total as f64 > SKIP_RATE_THRESHOLD {
            tracing::warn!(
                symbol = %series.symbol,
                skipped = session.skipped(),
                total,
                "skip rate exceeds {:.0}%",
                SKIP_RATE_THRESHOLD * 100.0
            );
            result.warnings.push(RunWarning::HighSkipRate {
                symbol: series.symbol.clone(),
                skipped: session.skipped(),
                total,
            });
        }
    }

    fn step(
        &self,
        session: &mut SymbolSession,
        ctx: &BarContext<'_>,
        signal: &dyn EntrySignal,
        result: &mut RunResult,
    ) {
        self.fill_pending_entry(session, ctx, result);
        self.attempt_flatten(session, ctx, result);

        let snapshot = self.classifier.classify(&session.history);
        if session.tracker.observe(&session.symbol, &snapshot).is_some() {
            result.regime_changes += 1;
        }

        self.manage_position(session, ctx, snapshot.label, result);

        if matches!(session.state, SessionState::Flat) {
            self.evaluate_signal(session, ctx, signal);
        }
    }

    fn skip_bar(&self, session: &mut SymbolSession, issue: DataQualityIssue, result: &mut RunResult) {
        tracing::warn!(
            symbol = %issue.symbol,
            index = issue.index,
            timestamp = %issue.timestamp,
            kind = issue.kind.as_str(),
            "bar skipped"
        );
        session.skipped += 1;
        result.bars_skipped += 1;
        result.data_issues.push(issue);
    }

    fn flag_quote(&self, symbol: &str, index: usize, quote: &Quote, result: &mut RunResult) {
        if let Err(issue) = QualityGate::check_quote(symbol, index, quote) {
            tracing::warn!(symbol, index, "invalid quote ignored");
            result.data_issues.push(issue);
        }
    }

    // ── Entries ──

    fn evaluate_signal(&self, session: &mut SymbolSession, ctx: &BarContext<'_>, signal: &dyn EntrySignal) {
        let Some(decision) = signal.evaluate(&session.history, ctx.index) else {
            return;
        };
        if decision.confidence.is_nan() || decision.confidence < self.config.min_confidence {
            tracing::debug!(
                symbol = session.symbol(),
                confidence = decision.confidence,
                "signal below minimum confidence"
            );
            return;
        }
        if decision.side == PositionSide::Short && !self.config.allow_short {
            return;
        }
        session.state = SessionState::EntryPending(PendingEntry {
            decision,
            signal_time: ctx.bar.timestamp,
            signal_price: ctx.bar.close,
        });
    }

    fn fill_pending_entry(&self, session: &mut SymbolSession, ctx: &BarContext<'_>, result: &mut RunResult) {
        let SessionState::EntryPending(pending) = session.state else {
            return;
        };
        let side = pending.decision.side;
        let base = self.config.base_contracts;
        let quantity = if ctx.venue.is_book_aware() {
            let sizing = self
                .micro
                .size_entry(base, ctx.first_quote, self.config.exits.target_ticks);
            if sizing.reduced {
                tracing::debug!(
                    symbol = session.symbol(),
                    base,
                    contracts = sizing.contracts,
                    cost_ratio = sizing.cost_ratio,
                    "entry size reduced by spread cost"
                );
            }
            sizing.contracts
        } else {
            base
        };

        let intent = OrderIntent::market(side.entry_side(), quantity, pending.signal_price);
        match ctx.venue.execute(&intent, &ExecutionPlan::aggressive(), ctx.bar) {
            Ok(fill) => {
                let mut position = self.exits.open_position(
                    session.symbol(),
                    side,
                    quantity,
                    fill.execution.price,
                    ctx.bar.timestamp,
                );
                position.regime_at_entry = session.tracker.current();
                result.execution.push(self.entry_record(
                    &position,
                    pending.signal_price,
                    fill.style,
                    ctx.condition,
                ));
                tracing::debug!(
                    symbol = session.symbol(),
                    ?side,
                    quantity,
                    price = position.entry_price,
                    stop = position.current_stop,
                    target = position.target,
                    regime = %position.regime_at_entry,
                    "entry filled"
                );
                session.open(position);
            }
            Err(reason) => {
                tracing::warn!(symbol = session.symbol(), ?side, ?reason, "entry not filled");
                result.warnings.push(RunWarning::EntryNotFilled {
                    symbol: session.symbol().to_string(),
                    time: ctx.bar.timestamp,
                    side,
                    reason,
                });
                session.state = SessionState::Flat;
            }
        }
    }

    // ── Exits ──

    fn attempt_flatten(&self, session: &mut SymbolSession, ctx: &BarContext<'_>, result: &mut RunResult) {
        let SessionState::ExitPending(mut pending) = session.state else {
            return;
        };
        if ctx.index < pending.next_attempt {
            return;
        }
        let reference = session.previous_close().unwrap_or(ctx.bar.open);
        let symbol = session.symbol().to_string();
        let Some(position) = session.position.as_mut() else {
            session.state = SessionState::Flat;
            return;
        };

        let quantity = position.quantity;
        let intent = OrderIntent::market(position.side.exit_side(), quantity, reference);
        match ctx.venue.execute(&intent, &ExecutionPlan::aggressive(), ctx.bar) {
            Ok(fill) => {
                let leg = self.exits.exit(
                    position,
                    ctx.bar.timestamp,
                    quantity,
                    ExitReason::TimeFlatten,
                    reference,
                    fill,
                );
                result
                    .execution
                    .push(self.exit_record(&symbol, position.side, &leg, ctx.condition));
                self.close(session, result);
            }
            Err(reason) => {
                pending.failures += 1;
                let policy = self.config.flatten_retry;
                if policy.exhausted(pending.failures) {
                    tracing::warn!(
                        symbol = %symbol,
                        attempts = pending.failures,
                        open_quantity = quantity,
                        ?reason,
                        "forced flatten failed, position abandoned"
                    );
                    result.warnings.push(RunWarning::ForcedFlattenFailed {
                        symbol,
                        requested_at: pending.requested_at,
                        attempts: pending.failures,
                        open_quantity: quantity,
                    });
                    session.position = None;
                    session.state = SessionState::Halted;
                } else {
                    let wait = policy.backoff_bars(pending.failures);
                    pending.next_attempt = ctx.index + wait;
                    tracing::warn!(
                        symbol = %symbol,
                        attempt = pending.failures,
                        retry_in_bars = wait,
                        ?reason,
                        "forced flatten not filled, retrying"
                    );
                    session.state = SessionState::ExitPending(pending);
                }
            }
        }
    }

    fn manage_position(
        &self,
        session: &mut SymbolSession,
        ctx: &BarContext<'_>,
        regime: RegimeLabel,
        result: &mut RunResult,
    ) {
        if !session.state.has_position() {
            return;
        }
        let thresholds =
            EffectiveThresholds::for_regime(&self.config.exits, &self.config.multipliers, regime);
        let symbol = session.symbol().to_string();
        let Some(position) = session.position.as_mut() else {
            return;
        };

        let outcome = self.exits.on_bar(position, ctx.bar, &thresholds, &ctx.venue);
        if outcome.ambiguous {
            result.ambiguous_bars += 1;
            tracing::debug!(symbol = %symbol, timestamp = %ctx.bar.timestamp, "stop and target on one bar");
        }
        for leg in &outcome.legs {
            result
                .execution
                .push(self.exit_record(&symbol, position.side, leg, ctx.condition));
        }

        if outcome.closed {
            self.close(session, result);
        } else if outcome.flatten_requested && matches!(session.state, SessionState::Open) {
            session.state = SessionState::ExitPending(PendingFlatten {
                requested_at: ctx.bar.timestamp,
                failures: 0,
                next_attempt: ctx.index + 1,
            });
        }
    }

    /// Close anything still open at the last accepted close.
    fn finish(&self, session: &mut SymbolSession, result: &mut RunResult) {
        if matches!(session.state, SessionState::EntryPending(_)) {
            tracing::debug!(symbol = session.symbol(), "entry signal on the last bar dropped");
            session.state = SessionState::Flat;
        }
        if !session.state.has_position() {
            return;
        }
        let Some(last) = session.history.last().cloned() else {
            return;
        };
        let symbol = session.symbol().to_string();
        let Some(position) = session.position.as_mut() else {
            return;
        };
        let fill = VenueFill {
            execution: Execution {
                price: last.close,
                slippage_ticks: 0.0,
                gapped: false,
            },
            style: OrderStyle::Aggressive,
        };
        let quantity = position.quantity;
        let leg = self.exits.exit(
            position,
            last.timestamp,
            quantity,
            ExitReason::EndOfData,
            last.close,
            fill,
        );
        result
            .execution
            .push(self.exit_record(&symbol, position.side, &leg, MarketCondition::Normal));
        self.close(session, result);
    }

    fn close(&self, session: &mut SymbolSession, result: &mut RunResult) {
        session.state = SessionState::Flat;
        let Some(position) = session.position.take() else {
            return;
        };
        match Trade::from_closed(&position, &self.config.instrument) {
            Some(trade) => {
                tracing::info!(
                    symbol = %trade.symbol,
                    side = ?trade.side,
                    quantity = trade.quantity,
                    entry = trade.entry_price,
                    exit = trade.exit_price,
                    reason = %trade.exit_reason,
                    net_pnl = trade.net_pnl,
                    "trade closed"
                );
                result.trades.push(trade);
            }
            None => {
                tracing::warn!(
                    symbol = %position.symbol,
                    remaining = position.quantity,
                    "position still open at close, no trade recorded"
                );
            }
        }
    }

    // ── Execution quality ──

    fn commission_ticks(&self) -> f64 {
        self.config.costs.commission_per_contract / self.config.instrument.tick_value
    }

    fn estimated_cost_ticks(&self, style: OrderStyle, condition: MarketCondition) -> f64 {
        let slippage = match style {
            OrderStyle::Aggressive => {
                self.config.costs.slippage_ticks * condition.slippage_multiplier()
            }
            OrderStyle::Passive => 0.0,
        };
        slippage + self.commission_ticks()
    }

    fn adverse_ticks(&self, side: OrderSide, signal_price: f64, fill_price: f64) -> f64 {
        self.config
            .instrument
            .price_to_ticks(side.sign() * (fill_price - signal_price))
    }

    fn entry_record(
        &self,
        position: &Position,
        signal_price: f64,
        style: OrderStyle,
        condition: MarketCondition,
    ) -> ExecutionQualityRecord {
        let side = position.side.entry_side();
        let slippage_ticks = self.adverse_ticks(side, signal_price, position.entry_price);
        ExecutionQualityRecord {
            symbol: position.symbol.clone(),
            time: position.entry_time,
            kind: FillKind::Entry,
            reason: None,
            side,
            style,
            quantity: position.initial_quantity,
            signal_price,
            fill_price: position.entry_price,
            slippage_ticks,
            estimated_cost_ticks: self.estimated_cost_ticks(style, condition),
            actual_cost_ticks: slippage_ticks + self.commission_ticks(),
        }
    }

    fn exit_record(
        &self,
        symbol: &str,
        position_side: PositionSide,
        leg: &ExitLeg,
        condition: MarketCondition,
    ) -> ExecutionQualityRecord {
        let side = position_side.exit_side();
        let slippage_ticks = self.adverse_ticks(side, leg.reference_price, leg.price);
        ExecutionQualityRecord {
            symbol: symbol.to_string(),
            time: leg.time,
            kind: FillKind::Exit,
            reason: Some(leg.reason),
            side,
            style: leg.style,
            quantity: leg.quantity,
            signal_price: leg.reference_price,
            fill_price: leg.price,
            slippage_ticks,
            estimated_cost_ticks: self.estimated_cost_ticks(leg.style, condition),
            actual_cost_ticks: slippage_ticks + self.commission_ticks(),
        }
    }
}
