//! Adaptive exit state machine — one bar of position management.
//!
//! Fixed evaluation order per bar:
//! (a) stop hit, (b) target hit, (c) partial-exit milestones,
//! (d) breakeven arming, (e) trailing ratchet, (f) time-decay tightening,
//! (g) forced time flatten.
//!
//! An exit from (a) or (b) ends the bar. A partial cascade that exits the
//! full quantity also ends it. Every stop change goes through
//! [`Position::ratchet_stop`], so stops only ever tighten.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    Bar, ExitLeg, ExitReason, Instrument, OrderIntent, OrderStyle, Position, PositionSide,
    StopSource,
};
use crate::execution::{BracketLeg, CostModel, ExecutionVenue, VenueFill};
use crate::microstructure::ExitOrderOptimizer;

use super::thresholds::{EffectiveThresholds, ExitConfig};

/// A stop adjustment made during one bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StopMove {
    pub from: f64,
    pub to: f64,
    pub source: StopSource,
}

/// Everything that happened to a position on one bar.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BarOutcome {
    pub legs: Vec<ExitLeg>,
    pub stop_moves: Vec<StopMove>,
    /// The maximum hold was reached on this bar; flatten on the next.
    pub flatten_requested: bool,
    /// Stop and target were both reachable; the stop was taken.
    pub ambiguous: bool,
    pub closed: bool,
}

impl BarOutcome {
    pub fn exited_quantity(&self) -> u32 {
        self.legs.iter().map(|l| l.quantity).sum()
    }
}

fn stop_reason(source: StopSource) -> ExitReason {
    match source {
        StopSource::Initial | StopSource::TimeDecay => ExitReason::StopLoss,
        StopSource::Breakeven => ExitReason::BreakevenStop,
        StopSource::Trailing => ExitReason::TrailingStop,
    }
}

/// Stateless driver: all per-position state lives in [`Position::exit_state`].
#[derive(Debug, Clone)]
pub struct AdaptiveExitManager {
    config: ExitConfig,
    instrument: Instrument,
    costs: CostModel,
    optimizer: ExitOrderOptimizer,
}

impl AdaptiveExitManager {
    pub fn new(
        config: ExitConfig,
        instrument: Instrument,
        costs: CostModel,
        optimizer: ExitOrderOptimizer,
    ) -> Self {
        Self {
            config,
            instrument,
            costs,
            optimizer,
        }
    }

    pub fn config(&self) -> &ExitConfig {
        &self.config
    }

    /// Initial stop and target for an entry at `entry_price`.
    pub fn initial_levels(&self, side: PositionSide, entry_price: f64) -> (f64, f64) {
        let sign = side.sign();
        let stop = entry_price - sign * self.instrument.ticks_to_price(self.config.initial_stop_ticks);
        let target = entry_price + sign * self.instrument.ticks_to_price(self.config.target_ticks);
        (
            self.instrument.round_nearest(stop),
            self.instrument.round_nearest(target),
        )
    }

    /// Open a position with initial levels and one flag per partial milestone.
    pub fn open_position(
        &self,
        symbol: &str,
        side: PositionSide,
        quantity: u32,
        entry_price: f64,
        entry_time: DateTime<Utc>,
    ) -> Position {
        let (stop, target) = self.initial_levels(side, entry_price);
        let mut position = Position::open(
            symbol,
            side,
            quantity,
            entry_price,
            entry_time,
            stop,
            target,
            self.config.partial_exits.len(),
        );
        position.entry_commission = self.costs.commission(quantity);
        position
    }

    /// Record an exit fill on `position` and return the leg.
    pub fn exit(
        &self,
        position: &mut Position,
        time: DateTime<Utc>,
        quantity: u32,
        reason: ExitReason,
        reference_price: f64,
        fill: VenueFill,
    ) -> ExitLeg {
        let quantity = quantity.min(position.quantity);
        let leg = ExitLeg {
            time,
            price: fill.execution.price,
            reference_price,
            quantity,
            reason,
            style: fill.style,
            commission: self.costs.commission(quantity),
        };
        position.record_exit(leg.clone());
        leg
    }

    pub fn on_bar(
        &self,
        position: &mut Position,
        bar: &Bar,
        thresholds: &EffectiveThresholds,
        venue: &dyn ExecutionVenue,
    ) -> BarOutcome {
        let mut out = BarOutcome::default();
        if position.is_closed() {
            out.closed = true;
            return out;
        }

        position.bars_held += 1;
        position.update_extremes(bar);

        // ── (a)/(b) stop and target ──
        if self.check_bracket(position, bar, venue, &mut out) {
            return out;
        }

        // ── (c) partial exits ──
        if self.check_partials(position, bar, venue, &mut out) {
            return out;
        }

        let tick = self.instrument.tick_size;
        let sign = position.side.sign();
        let exit_side = position.side.exit_side();
        let profit_ticks = self
            .instrument
            .price_to_ticks(position.favorable_move(bar.close));

        // ── (d) breakeven ──
        if !position.exit_state.breakeven_active
            && profit_ticks >= thresholds.breakeven_threshold_ticks
        {
            position.exit_state.breakeven_active = true;
            let candidate = position.entry_price + sign * thresholds.breakeven_offset_ticks * tick;
            self.ratchet(position, candidate, StopSource::Breakeven, &mut out);
        }

        // ── (e) trailing ──
        if !position.exit_state.trailing_active
            && profit_ticks >= thresholds.trailing_min_profit_ticks
        {
            position.exit_state.trailing_active = true;
        }
        if position.exit_state.trailing_active {
            let distance = thresholds.trailing_distance_ticks
                * self
                    .config
                    .trailing_decay_factor(position.exit_state.time_decay_stage);
            let raw = position.favorable_extreme() - sign * distance * tick;
            let candidate = self.instrument.round_adverse(raw, exit_side);
            self.ratchet(position, candidate, StopSource::Trailing, &mut out);
        }

        // ── (f) time decay ──
        let elapsed = (bar.timestamp - position.entry_time).num_seconds() as f64 / 60.0;
        let max_hold = self.config.max_hold_minutes;
        while let Some(stage) = self
            .config
            .time_decay_stages
            .get(position.exit_state.time_decay_stage)
        {
            if elapsed < stage.elapsed_fraction * max_hold {
                break;
            }
            position.exit_state.time_decay_stage += 1;
            let distance = sign * (bar.close - position.current_stop);
            if distance > 0.0 {
                let tightened = distance * (1.0 - stage.tighten_fraction);
                let candidate = self
                    .instrument
                    .round_adverse(bar.close - sign * tightened, exit_side);
                self.ratchet(position, candidate, StopSource::TimeDecay, &mut out);
            }
        }

        // ── (g) forced flatten ──
        if !position.exit_state.flatten_requested && elapsed >= max_hold {
            position.exit_state.flatten_requested = true;
            out.flatten_requested = true;
            tracing::debug!(
                symbol = %position.symbol,
                elapsed_minutes = elapsed,
                "max hold reached, flatten requested"
            );
        }

        out
    }

    /// Returns true when the position closed.
    fn check_bracket(
        &self,
        position: &mut Position,
        bar: &Bar,
        venue: &dyn ExecutionVenue,
        out: &mut BarOutcome,
    ) -> bool {
        let exit_side = position.side.exit_side();
        let qty = position.quantity;
        let stop = OrderIntent::stop(exit_side, qty, position.current_stop);
        let target = OrderIntent::limit(exit_side, qty, position.target);

        let Some(resolution) = venue.bracket(&stop, &target, bar) else {
            return false;
        };
        out.ambiguous = resolution.ambiguous;

        match resolution.leg {
            BracketLeg::Stop => {
                let reason = stop_reason(position.exit_state.stop_source);
                let stop_price = position.current_stop;
                let fill = VenueFill {
                    execution: resolution.execution,
                    style: OrderStyle::Aggressive,
                };
                let leg = self.exit(position, bar.timestamp, qty, reason, stop_price, fill);
                out.legs.push(leg);
            }
            BracketLeg::Target => {
                let plan = self.optimizer.plan(ExitReason::Target);
                match venue.execute(&target, &plan, bar) {
                    Ok(fill) => {
                        let target_price = position.target;
                        let leg = self.exit(
                            position,
                            bar.timestamp,
                            qty,
                            ExitReason::Target,
                            target_price,
                            fill,
                        );
                        out.legs.push(leg);
                    }
                    Err(reason) => {
                        tracing::debug!(?reason, target = position.target, "target touched, not filled");
                        return false;
                    }
                }
            }
        }
        out.closed = position.is_closed();
        out.closed
    }

    /// Returns true when the cascade exited the full position.
    fn check_partials(
        &self,
        position: &mut Position,
        bar: &Bar,
        venue: &dyn ExecutionVenue,
        out: &mut BarOutcome,
    ) -> bool {
        let exit_side = position.side.exit_side();
        for (i, milestone) in self.config.partial_exits.iter().enumerate() {
            if position.exit_state.partials_fired.get(i).copied().unwrap_or(true) {
                continue;
            }
            let price = self
                .instrument
                .round_nearest(position.r_multiple_price(milestone.r_multiple));
            let reached = match position.side {
                PositionSide::Long => bar.high >= price,
                PositionSide::Short => bar.low <= price,
            };
            if !reached {
                continue;
            }

            let remaining = position.quantity;
            let qty = if milestone.fraction >= 1.0 {
                remaining
            } else {
                ((remaining as f64 * milestone.fraction).floor() as u32).clamp(1, remaining)
            };
            let intent = OrderIntent::limit(exit_side, qty, price);
            let plan = self.optimizer.plan(ExitReason::PartialTarget);
            let Ok(fill) = venue.execute(&intent, &plan, bar) else {
                continue;
            };

            position.exit_state.partials_fired[i] = true;
            let leg = self.exit(
                position,
                bar.timestamp,
                qty,
                ExitReason::PartialTarget,
                price,
                fill,
            );
            out.legs.push(leg);
            if position.is_closed() {
                out.closed = true;
                return true;
            }
        }
        false
    }

    fn ratchet(
        &self,
        position: &mut Position,
        candidate: f64,
        source: StopSource,
        out: &mut BarOutcome,
    ) {
        let from = position.current_stop;
        if position.ratchet_stop(candidate, self.instrument.tick_size, source) {
            let to = position.current_stop;
            tracing::debug!(symbol = %position.symbol, from, to, ?source, "stop ratcheted");
            out.stop_moves.push(StopMove { from, to, source });
        }
    }
}
