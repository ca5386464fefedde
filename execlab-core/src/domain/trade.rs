//! Trade — a completed round trip, built from a fully closed position.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::instrument::Instrument;
use super::position::{ExitLeg, Position, PositionSide};
use crate::regime::RegimeLabel;

/// Why an exit leg happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    BreakevenStop,
    TrailingStop,
    Target,
    PartialTarget,
    TimeFlatten,
    EndOfData,
}

impl ExitReason {
    pub fn as_str(self) -> &'static str {
        match self {
            ExitReason::StopLoss => "stop_loss",
            ExitReason::BreakevenStop => "breakeven_stop",
            ExitReason::TrailingStop => "trailing_stop",
            ExitReason::Target => "target",
            ExitReason::PartialTarget => "partial_target",
            ExitReason::TimeFlatten => "time_flatten",
            ExitReason::EndOfData => "end_of_data",
        }
    }

    /// Stop-type exits: the protective stop was hit.
    pub fn is_stop(self) -> bool {
        matches!(
            self,
            ExitReason::StopLoss | ExitReason::BreakevenStop | ExitReason::TrailingStop
        )
    }
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A complete round-trip trade: entry → (partials) → final exit.
///
/// Immutable once created. `exit_price` is the quantity-weighted average of
/// all exit legs; `exit_reason` is the reason of the final leg.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    // ── Identification ──
    pub symbol: String,
    pub side: PositionSide,

    // ── Entry ──
    pub entry_time: DateTime<Utc>,
    pub entry_price: f64,
    pub stop_at_entry: f64,
    pub target_at_entry: f64,
    pub regime_at_entry: RegimeLabel,

    // ── Exit ──
    pub exit_time: DateTime<Utc>,
    pub exit_price: f64,
    pub exit_reason: ExitReason,

    // ── Size ──
    pub quantity: u32,
    pub partial_exits: usize,

    // ── PnL (dollars) ──
    pub gross_pnl: f64,
    pub commission: f64,
    pub net_pnl: f64,
    /// Average favorable move per contract, in ticks.
    pub tick_delta: f64,

    // ── Duration ──
    pub duration_secs: i64,
    pub bars_held: usize,

    // ── Excursion (ticks) ──
    /// Maximum adverse excursion (zero or negative).
    pub mae_ticks: f64,
    /// Maximum favorable excursion (zero or positive).
    pub mfe_ticks: f64,

    pub legs: Vec<ExitLeg>,
}

impl Trade {
    /// Build a trade from a position whose remaining quantity is zero.
    ///
    /// Returns `None` for a position that still has open quantity: a trade
    /// must always reference a fully closed position.
    pub fn from_closed(position: &Position, instrument: &Instrument) -> Option<Trade> {
        if !position.is_closed() || position.legs.is_empty() {
            return None;
        }
        let last = position.legs.last()?;
        let sign = position.side.sign();
        let quantity = position.initial_quantity;

        let exited: u32 = position.legs.iter().map(|l| l.quantity).sum();
        let exit_notional: f64 = position
            .legs
            .iter()
            .map(|l| l.price * l.quantity as f64)
            .sum();
        let exit_price = if exited > 0 {
            exit_notional / exited as f64
        } else {
            last.price
        };

        let gross_pnl: f64 = position
            .legs
            .iter()
            .map(|l| {
                let ticks = instrument.price_to_ticks(sign * (l.price - position.entry_price));
                instrument.ticks_to_dollars(ticks, l.quantity)
            })
            .sum();
        let commission =
            position.entry_commission + position.legs.iter().map(|l| l.commission).sum::<f64>();

        let tick_delta = instrument.price_to_ticks(sign * (exit_price - position.entry_price));
        let mfe_ticks = instrument
            .price_to_ticks(position.favorable_move(position.favorable_extreme()))
            .max(0.0);
        let mae_ticks = instrument
            .price_to_ticks(position.favorable_move(position.adverse_extreme()))
            .min(0.0);

        let partial_exits = position
            .legs
            .iter()
            .filter(|l| l.reason == ExitReason::PartialTarget)
            .count();

        Some(Trade {
            symbol: position.symbol.clone(),
            side: position.side,
            entry_time: position.entry_time,
            entry_price: position.entry_price,
            stop_at_entry: position.initial_stop,
            target_at_entry: position.target,
            regime_at_entry: position.regime_at_entry,
            exit_time: last.time,
            exit_price,
            exit_reason: last.reason,
            quantity,
            partial_exits,
            gross_pnl,
            commission,
            net_pnl: gross_pnl - commission,
            tick_delta,
            duration_secs: (last.time - position.entry_time).num_seconds(),
            bars_held: position.bars_held,
            mae_ticks,
            mfe_ticks,
            legs: position.legs.clone(),
        })
    }

    pub fn duration(&self) -> Duration {
        Duration::seconds(self.duration_secs)
    }

    pub fn is_winner(&self) -> bool {
        self.net_pnl > 0.0
    }

    pub fn is_loser(&self) -> bool {
        self.net_pnl < 0.0
    }

    /// Return on the equity available before the trade.
    pub fn return_on(&self, equity_before: f64) -> f64 {
        if equity_before <= 0.0 {
            return 0.0;
        }
        self.net_pnl / equity_before
    }

    /// Realized P&L per contract as a multiple of initial risk.
    pub fn r_multiple(&self) -> f64 {
        let risk = (self.entry_price - self.stop_at_entry).abs();
        if risk <= 0.0 {
            return 0.0;
        }
        self.side.sign() * (self.exit_price - self.entry_price) / risk
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::OrderStyle;
    use chrono::TimeZone;

    fn t(min: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 14, 30, 0).unwrap() + Duration::minutes(min)
    }

    fn leg(min: i64, price: f64, quantity: u32, reason: ExitReason) -> ExitLeg {
        ExitLeg {
            time: t(min),
            price,
            reference_price: price,
            quantity,
            reason,
            style: OrderStyle::Passive,
            commission: 2.0 * quantity as f64,
        }
    }

    fn closed_long() -> Position {
        let mut pos = Position::open("ES", PositionSide::Long, 3, 4500.0, t(0), 4497.0, 4509.0, 1);
        pos.entry_commission = 6.0;
        pos.highest_price = 4509.0;
        pos.lowest_price = 4499.0;
        pos.bars_held = 12;
        pos.record_exit(leg(5, 4506.0, 1, ExitReason::PartialTarget));
        pos.record_exit(leg(12, 4509.0, 2, ExitReason::Target));
        pos
    }

    #[test]
    fn open_position_yields_no_trade() {
        let pos = Position::open("ES", PositionSide::Long, 1, 4500.0, t(0), 4497.0, 4506.0, 0);
        assert!(Trade::from_closed(&pos, &Instrument::es()).is_none());
    }

    #[test]
    fn trade_aggregates_legs() {
        let trade = Trade::from_closed(&closed_long(), &Instrument::es()).unwrap();
        assert_eq!(trade.quantity, 3);
        assert_eq!(trade.partial_exits, 1);
        assert_eq!(trade.exit_reason, ExitReason::Target);
        // VWAP exit: (4506 + 2 * 4509) / 3 = 4508
        assert!((trade.exit_price - 4508.0).abs() < 1e-9);
        // 24 ticks * 1 + 36 ticks * 2 = 96 ticks * $12.50 = $1200
        assert!((trade.gross_pnl - 1200.0).abs() < 1e-9);
        // entry 6 + legs 2 + 4
        assert!((trade.commission - 12.0).abs() < 1e-9);
        assert!((trade.net_pnl - 1188.0).abs() < 1e-9);
        assert!((trade.tick_delta - 32.0).abs() < 1e-9);
        assert_eq!(trade.duration_secs, 12 * 60);
        assert!((trade.mfe_ticks - 36.0).abs() < 1e-9);
        assert!((trade.mae_ticks + 4.0).abs() < 1e-9);
        assert!(trade.is_winner());
    }

    #[test]
    fn short_trade_pnl_sign() {
        let mut pos = Position::open("ES", PositionSide::Short, 1, 4500.0, t(0), 4503.0, 4494.0, 0);
        pos.record_exit(leg(3, 4503.25, 1, ExitReason::StopLoss));
        let trade = Trade::from_closed(&pos, &Instrument::es()).unwrap();
        // -13 ticks * 12.5 = -162.5, minus commission 2
        assert!((trade.gross_pnl + 162.5).abs() < 1e-9);
        assert!((trade.net_pnl + 164.5).abs() < 1e-9);
        assert!(trade.is_loser());
        assert!(trade.r_multiple() < -1.0);
    }

    #[test]
    fn trade_serialization_roundtrip() {
        let trade = Trade::from_closed(&closed_long(), &Instrument::es()).unwrap();
        let json = serde_json::to_string(&trade).unwrap();
        let deser: Trade = serde_json::from_str(&json).unwrap();
        assert_eq!(trade, deser);
    }
}
