//! Position — one open exposure and the exit state that manages it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::bar::Bar;
use super::order::{OrderSide, OrderStyle};
use super::trade::ExitReason;
use crate::regime::RegimeLabel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    /// +1 for longs, -1 for shorts. Favorable move = `sign * (price - entry)`.
    pub fn sign(self) -> f64 {
        match self {
            PositionSide::Long => 1.0,
            PositionSide::Short => -1.0,
        }
    }

    pub fn entry_side(self) -> OrderSide {
        match self {
            PositionSide::Long => OrderSide::Buy,
            PositionSide::Short => OrderSide::Sell,
        }
    }

    pub fn exit_side(self) -> OrderSide {
        self.entry_side().opposite()
    }

    pub fn from_entry_side(side: OrderSide) -> Self {
        match side {
            OrderSide::Buy => PositionSide::Long,
            OrderSide::Sell => PositionSide::Short,
        }
    }
}

/// Which rule last placed the protective stop. Decides the exit reason on a stop hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopSource {
    Initial,
    Breakeven,
    Trailing,
    TimeDecay,
}

/// The exit state machine's record, embedded in the position it manages.
///
/// States are flags rather than a single enum: breakeven, trailing and
/// time-decay can all be armed at once. Every flag is one-way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitState {
    pub breakeven_active: bool,
    pub trailing_active: bool,
    /// Number of time-decay stages already applied.
    pub time_decay_stage: usize,
    /// One flag per configured partial-exit milestone.
    pub partials_fired: Vec<bool>,
    pub stop_source: StopSource,
    /// A forced time flatten has been requested and awaits confirmation.
    pub flatten_requested: bool,
    pub closed: bool,
}

impl ExitState {
    pub fn new(milestones: usize) -> Self {
        Self {
            breakeven_active: false,
            trailing_active: false,
            time_decay_stage: 0,
            partials_fired: vec![false; milestones],
            stop_source: StopSource::Initial,
            flatten_requested: false,
            closed: false,
        }
    }

    /// Still in the initial "armed" state: nothing has moved the stop yet.
    pub fn is_armed_only(&self) -> bool {
        !self.breakeven_active && !self.trailing_active && self.time_decay_stage == 0
    }

    pub fn partials_fired_count(&self) -> usize {
        self.partials_fired.iter().filter(|f| **f).count()
    }
}

/// One fill that reduced the position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitLeg {
    pub time: DateTime<Utc>,
    pub price: f64,
    /// Price the exit was aiming for (stop, target or milestone level).
    pub reference_price: f64,
    pub quantity: u32,
    pub reason: ExitReason,
    pub style: OrderStyle,
    pub commission: f64,
}

/// An open position. Owned by exactly one session of one engine run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub side: PositionSide,
    /// Remaining open quantity.
    pub quantity: u32,
    pub initial_quantity: u32,
    pub entry_price: f64,
    pub entry_time: DateTime<Utc>,
    pub entry_commission: f64,
    pub initial_stop: f64,
    pub current_stop: f64,
    pub target: f64,
    pub bars_held: usize,
    /// Highest high seen since entry (including the entry bar).
    pub highest_price: f64,
    /// Lowest low seen since entry (including the entry bar).
    pub lowest_price: f64,
    pub regime_at_entry: RegimeLabel,
    pub legs: Vec<ExitLeg>,
    pub exit_state: ExitState,
}

impl Position {
    #[allow(clippy::too_many_arguments)]
    pub fn open(
        symbol: impl Into<String>,
        side: PositionSide,
        quantity: u32,
        entry_price: f64,
        entry_time: DateTime<Utc>,
        stop: f64,
        target: f64,
        milestones: usize,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            quantity,
            initial_quantity: quantity,
            entry_price,
            entry_time,
            entry_commission: 0.0,
            initial_stop: stop,
            current_stop: stop,
            target,
            bars_held: 0,
            highest_price: entry_price,
            lowest_price: entry_price,
            regime_at_entry: RegimeLabel::Normal,
            legs: Vec::new(),
            exit_state: ExitState::new(milestones),
        }
    }

    pub fn is_long(&self) -> bool {
        self.side == PositionSide::Long
    }

    pub fn is_closed(&self) -> bool {
        self.quantity == 0
    }

    /// Favorable move from entry to `price`, in price units (negative when losing).
    pub fn favorable_move(&self, price: f64) -> f64 {
        self.side.sign() * (price - self.entry_price)
    }

    /// Price distance between entry and the initial stop (the "1R" unit).
    pub fn initial_risk(&self) -> f64 {
        (self.entry_price - self.initial_stop).abs()
    }

    /// Price at which the position shows `r` multiples of initial risk in profit.
    pub fn r_multiple_price(&self, r: f64) -> f64 {
        self.entry_price + self.side.sign() * r * self.initial_risk()
    }

    /// Best price reached since entry: highest high for longs, lowest low for shorts.
    pub fn favorable_extreme(&self) -> f64 {
        match self.side {
            PositionSide::Long => self.highest_price,
            PositionSide::Short => self.lowest_price,
        }
    }

    pub fn adverse_extreme(&self) -> f64 {
        match self.side {
            PositionSide::Long => self.lowest_price,
            PositionSide::Short => self.highest_price,
        }
    }

    /// Fold a bar's range into the since-entry extremes.
    pub fn update_extremes(&mut self, bar: &Bar) {
        if bar.high > self.highest_price {
            self.highest_price = bar.high;
        }
        if bar.low < self.lowest_price {
            self.lowest_price = bar.low;
        }
    }

    /// Is `candidate` a tighter stop than the current one?
    pub fn is_tighter_stop(&self, candidate: f64) -> bool {
        match self.side {
            PositionSide::Long => candidate > self.current_stop + 1e-9,
            PositionSide::Short => candidate < self.current_stop - 1e-9,
        }
    }

    /// One-way stop ratchet. Returns true if the stop moved.
    ///
    /// Longs: the stop only rises. Shorts: the stop only falls. A candidate at
    /// or beyond the favorable extreme is pulled back so the stop always sits
    /// on the losing side of the best price seen.
    pub fn ratchet_stop(&mut self, candidate: f64, tick_size: f64, source: StopSource) -> bool {
        let bounded = match self.side {
            PositionSide::Long => candidate.min(self.highest_price - tick_size),
            PositionSide::Short => candidate.max(self.lowest_price + tick_size),
        };
        if self.is_tighter_stop(bounded) {
            self.current_stop = bounded;
            self.exit_state.stop_source = source;
            true
        } else {
            false
        }
    }

    /// Record an exit fill. Quantity is clamped to what remains.
    pub fn record_exit(&mut self, leg: ExitLeg) -> u32 {
        let qty = leg.quantity.min(self.quantity);
        self.quantity -= qty;
        self.legs.push(ExitLeg {
            quantity: qty,
            ..leg
        });
        if self.quantity == 0 {
            self.exit_state.closed = true;
        }
        qty
    }

    /// Quantity already exited through legs.
    pub fn exited_quantity(&self) -> u32 {
        self.legs.iter().map(|l| l.quantity).sum()
    }
}
