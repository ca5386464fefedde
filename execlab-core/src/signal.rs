//! Entry signals. The engine only asks "enter now, and which way?".
//!
//! A signal sees the accepted bar history of one symbol up to and including
//! the bar that just closed. It never sees positions or fills.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Bar, PositionSide};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EntryDecision {
    pub side: PositionSide,
    /// 0.0 to 1.0. Decisions under the engine's minimum are ignored.
    pub confidence: f64,
}

impl EntryDecision {
    pub fn long(confidence: f64) -> Self {
        Self {
            side: PositionSide::Long,
            confidence,
        }
    }

    pub fn short(confidence: f64) -> Self {
        Self {
            side: PositionSide::Short,
            confidence,
        }
    }
}

pub trait EntrySignal: Send + Sync {
    fn name(&self) -> &str;

    /// Evaluate at the close of `bars[index]`. Must not look past `index`.
    fn evaluate(&self, bars: &[Bar], index: usize) -> Option<EntryDecision>;
}

/// Never enters.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSignal;

impl EntrySignal for NullSignal {
    fn name(&self) -> &str {
        "null"
    }

    fn evaluate(&self, _bars: &[Bar], _index: usize) -> Option<EntryDecision> {
        None
    }
}

/// Decisions keyed by symbol and the timestamp of the signal bar.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScheduledSignal {
    schedule: BTreeMap<String, BTreeMap<DateTime<Utc>, EntryDecision>>,
}

impl ScheduledSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn at(
        mut self,
        symbol: impl Into<String>,
        timestamp: DateTime<Utc>,
        decision: EntryDecision,
    ) -> Self {
        self.insert(symbol, timestamp, decision);
        self
    }

    pub fn insert(
        &mut self,
        symbol: impl Into<String>,
        timestamp: DateTime<Utc>,
        decision: EntryDecision,
    ) {
        self.schedule
            .entry(symbol.into())
            .or_default()
            .insert(timestamp, decision);
    }

    pub fn len(&self) -> usize {
        self.schedule.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EntrySignal for ScheduledSignal {
    fn name(&self) -> &str {
        "scheduled"
    }

    fn evaluate(&self, bars: &[Bar], index: usize) -> Option<EntryDecision> {
        let bar = bars.get(index)?;
        self.schedule.get(&bar.symbol)?.get(&bar.timestamp).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn bars(symbol: &str, n: usize) -> Vec<Bar> {
        let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 14, 30, 0).unwrap();
        (0..n)
            .map(|i| Bar {
                symbol: symbol.into(),
                timestamp: t0 + Duration::minutes(i as i64),
                open: 4500.0,
                high: 4501.0,
                low: 4499.0,
                close: 4500.0,
                volume: 10,
            })
            .collect()
    }

    #[test]
    fn scheduled_signal_fires_on_its_bar_only() {
        let es = bars("ES", 5);
        let signal = ScheduledSignal::new().at("ES", es[2].timestamp, EntryDecision::long(0.9));
        assert_eq!(signal.len(), 1);
        assert!(signal.evaluate(&es, 1).is_none());
        assert_eq!(signal.evaluate(&es, 2), Some(EntryDecision::long(0.9)));
        assert!(signal.evaluate(&es, 99).is_none());
    }

    #[test]
    fn scheduled_signal_is_per_symbol() {
        let es = bars("ES", 3);
        let nq = bars("NQ", 3);
        let signal = ScheduledSignal::new().at("NQ", nq[1].timestamp, EntryDecision::short(1.0));
        assert!(signal.evaluate(&es, 1).is_none());
        assert_eq!(signal.evaluate(&nq, 1).map(|d| d.side), Some(PositionSide::Short));
    }

    #[test]
    fn null_signal_never_enters() {
        let es = bars("ES", 3);
        assert!((0..3).all(|i| NullSignal.evaluate(&es, i).is_none()));
    }
}
