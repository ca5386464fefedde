//! Per-symbol session: lifecycle state, the open position and bar history.
//!
//! ```text
//! Flat ──signal──▶ EntryPending ──fill──▶ Open ──max hold──▶ ExitPending
//!  ▲                    │                  │                      │
//!  └────no fill─────────┘                  └──exit────────────────┤
//!  ▲                                                              │
//!  └──────────────────────────flattened──────────────────────────┘
//!                                          retries exhausted ──▶ Halted
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Bar, Position, Quote};
use crate::microstructure::{MarketCondition, MarketConditionClassifier};
use crate::regime::RegimeTracker;
use crate::signal::EntryDecision;

use super::quality::QualityGate;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PendingEntry {
    pub decision: EntryDecision,
    pub signal_time: DateTime<Utc>,
    /// Close of the signal bar.
    pub signal_price: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingFlatten {
    pub requested_at: DateTime<Utc>,
    pub failures: u32,
    /// Accepted-bar index at which the next attempt is made.
    pub next_attempt: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Flat,
    EntryPending(PendingEntry),
    Open,
    ExitPending(PendingFlatten),
    /// A forced flatten could not be confirmed. No further entries.
    Halted,
}

impl SessionState {
    pub fn has_position(&self) -> bool {
        matches!(self, SessionState::Open | SessionState::ExitPending(_))
    }
}

#[derive(Debug, Clone)]
pub struct SymbolSession {
    pub(crate) symbol: String,
    pub(crate) state: SessionState,
    pub(crate) position: Option<Position>,
    /// Accepted bars only.
    pub(crate) history: Vec<Bar>,
    pub(crate) gate: QualityGate,
    pub(crate) tracker: RegimeTracker,
    pub(crate) condition: MarketConditionClassifier,
    pub(crate) skipped: usize,
}

impl SymbolSession {
    pub fn new(symbol: impl Into<String>, condition: MarketConditionClassifier) -> Self {
        Self {
            symbol: symbol.into(),
            state: SessionState::Flat,
            position: None,
            history: Vec::new(),
            gate: QualityGate::new(),
            tracker: RegimeTracker::new(),
            condition,
            skipped: 0,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    pub fn history(&self) -> &[Bar] {
        &self.history
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Index of the latest accepted bar.
    pub(crate) fn current_index(&self) -> usize {
        self.history.len().saturating_sub(1)
    }

    /// Close of the accepted bar before the current one.
    pub(crate) fn previous_close(&self) -> Option<f64> {
        let n = self.history.len();
        (n >= 2).then(|| self.history[n - 2].close)
    }

    pub(crate) fn open(&mut self, position: Position) {
        self.position = Some(position);
        self.state = SessionState::Open;
    }

    /// Feed a bar's quotes into the spread baseline and return the worst
    /// condition seen. Invalid quotes are skipped and their positions returned.
    pub(crate) fn observe_quotes(&mut self, quotes: &[Quote]) -> (MarketCondition, Vec<usize>) {
        let mut worst = MarketCondition::Normal;
        let mut invalid = Vec::new();
        for (i, quote) in quotes.iter().enumerate() {
            if !quote.is_valid() {
                invalid.push(i);
                continue;
            }
            let reading = self.condition.observe(quote);
            if reading.condition.slippage_multiplier() > worst.slippage_multiplier() {
                worst = reading.condition;
            }
        }
        (worst, invalid)
    }
}
