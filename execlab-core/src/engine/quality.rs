//! Data-quality gate. Bad bars are skipped and reported, never repaired.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Bar, Quote};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataQualityKind {
    /// NaN or infinite price fields.
    VoidPrice,
    /// Non-positive prices or an OHLC set that does not bracket itself.
    InconsistentOhlc,
    /// Timestamp not strictly after the previous accepted bar.
    NonIncreasingTimestamp,
    /// Bar carries a different symbol than its series.
    SymbolMismatch,
    /// Crossed, non-positive or non-finite quote. The bar is still replayed.
    InvalidQuote,
}

impl DataQualityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DataQualityKind::VoidPrice => "void_price",
            DataQualityKind::InconsistentOhlc => "inconsistent_ohlc",
            DataQualityKind::NonIncreasingTimestamp => "non_increasing_timestamp",
            DataQualityKind::SymbolMismatch => "symbol_mismatch",
            DataQualityKind::InvalidQuote => "invalid_quote",
        }
    }

    /// Whether the offending bar is dropped from the replay.
    pub fn skips_bar(self) -> bool {
        !matches!(self, DataQualityKind::InvalidQuote)
    }
}

/// One rejected bar or quote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataQualityIssue {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    /// Position of the bar in its input series.
    pub index: usize,
    pub kind: DataQualityKind,
}

/// Per-symbol gate. Remembers the last accepted timestamp.
#[derive(Debug, Clone, Default)]
pub struct QualityGate {
    last_accepted: Option<DateTime<Utc>>,
}

impl QualityGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check a bar; accepted bars advance the timestamp watermark.
    pub fn check_bar(&mut self, symbol: &str, index: usize, bar: &Bar) -> Result<(), DataQualityIssue> {
        let kind = if bar.symbol != symbol {
            Some(DataQualityKind::SymbolMismatch)
        } else if bar.is_void() {
            Some(DataQualityKind::VoidPrice)
        } else if !bar.is_sane() {
            Some(DataQualityKind::InconsistentOhlc)
        } else if self.last_accepted.is_some_and(|last| bar.timestamp <= last) {
            Some(DataQualityKind::NonIncreasingTimestamp)
        } else {
            None
        };

        match kind {
            Some(kind) => Err(DataQualityIssue {
                symbol: symbol.to_string(),
                timestamp: bar.timestamp,
                index,
                kind,
            }),
            None => {
                self.last_accepted = Some(bar.timestamp);
                Ok(())
            }
        }
    }

    pub fn check_quote(symbol: &str, index: usize, quote: &Quote) -> Result<(), DataQualityIssue> {
        if quote.is_valid() {
            Ok(())
        } else {
            Err(DataQualityIssue {
                symbol: symbol.to_string(),
                timestamp: quote.timestamp,
                index,
                kind: DataQualityKind::InvalidQuote,
            })
        }
    }

    pub fn last_accepted(&self) -> Option<DateTime<Utc>> {
        self.last_accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn bar(min: i64, close: f64) -> Bar {
        Bar {
            symbol: "ES".into(),
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 14, 30, 0).unwrap() + Duration::minutes(min),
            open: close,
            high: close + 0.5,
            low: close - 0.5,
            close,
            volume: 100,
        }
    }

    #[test]
    fn accepts_clean_increasing_bars() {
        let mut gate = QualityGate::new();
        assert!(gate.check_bar("ES", 0, &bar(0, 4500.0)).is_ok());
        assert!(gate.check_bar("ES", 1, &bar(1, 4501.0)).is_ok());
        assert_eq!(gate.last_accepted(), Some(bar(1, 0.0).timestamp));
    }

    #[test]
    fn rejects_nan_high_low_inversion_and_repeats() {
        let mut gate = QualityGate::new();
        gate.check_bar("ES", 0, &bar(0, 4500.0)).unwrap();

        let mut nan = bar(1, 4500.0);
        nan.high = f64::NAN;
        assert_eq!(gate.check_bar("ES", 1, &nan).unwrap_err().kind, DataQualityKind::VoidPrice);

        let mut inverted = bar(2, 4500.0);
        inverted.high = 4499.0;
        inverted.low = 4501.0;
        assert_eq!(
            gate.check_bar("ES", 2, &inverted).unwrap_err().kind,
            DataQualityKind::InconsistentOhlc
        );

        let repeat = bar(0, 4502.0);
        let issue = gate.check_bar("ES", 3, &repeat).unwrap_err();
        assert_eq!(issue.kind, DataQualityKind::NonIncreasingTimestamp);
        assert_eq!(issue.index, 3);
    }

    #[test]
    fn rejected_bars_do_not_move_the_watermark() {
        let mut gate = QualityGate::new();
        gate.check_bar("ES", 0, &bar(0, 4500.0)).unwrap();
        let mut bad = bar(5, 4500.0);
        bad.close = -1.0;
        assert!(gate.check_bar("ES", 1, &bad).is_err());
        assert!(gate.check_bar("ES", 2, &bar(2, 4500.0)).is_ok());
    }

    #[test]
    fn wrong_symbol_is_flagged() {
        let mut gate = QualityGate::new();
        let issue = gate.check_bar("NQ", 0, &bar(0, 4500.0)).unwrap_err();
        assert_eq!(issue.kind, DataQualityKind::SymbolMismatch);
        assert!(issue.kind.skips_bar());
    }

    #[test]
    fn crossed_quote_is_flagged_but_does_not_skip() {
        let quote = Quote {
            timestamp: bar(0, 0.0).timestamp,
            bid: 4500.5,
            bid_size: 10,
            ask: 4500.0,
            ask_size: 10,
            last: 4500.25,
        };
        let issue = QualityGate::check_quote("ES", 4, &quote).unwrap_err();
        assert_eq!(issue.kind, DataQualityKind::InvalidQuote);
        assert!(!issue.kind.skips_bar());
    }
}
