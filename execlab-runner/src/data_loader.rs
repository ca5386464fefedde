//! CSV loading for bars, quotes and entry signals.
//!
//! Files are read row by row. A row that cannot be parsed, or that violates
//! the bar invariants, is dropped and reported as a [`RowIssue`]; the rest of
//! the file still loads. Only I/O failures and a missing header abort a load.
//!
//! Expected headers (column order is free):
//! - bars: `timestamp,symbol,open,high,low,close,volume`
//! - quotes: `timestamp,symbol,bid,bid_size,ask,ask_size,last`
//! - signals: `timestamp,symbol,side,confidence` (`side` is `long` or
//!   `short`, `confidence` may be empty and defaults to 1.0)
//!
//! Timestamps are RFC 3339, e.g. `2024-03-01T14:30:00Z`.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use execlab_core::domain::{Bar, Quote};
use execlab_core::engine::MarketSeries;
use execlab_core::signal::{EntryDecision, ScheduledSignal};

/// Errors that stop a file from loading at all.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to read CSV: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum RowIssueKind {
    /// The row could not be parsed.
    Malformed(String),
    NonPositivePrice,
    /// High below low, or open/close outside the range.
    InvertedRange,
    /// Duplicate or out-of-order timestamp for the row's symbol.
    NonIncreasingTimestamp,
    UnknownSide(String),
}

/// A dropped input row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowIssue {
    /// 1-based line number in the file, header included.
    pub line: u64,
    /// Empty when the row was too broken to name one.
    pub symbol: String,
    pub kind: RowIssueKind,
}

#[derive(Debug, Clone, Default)]
pub struct LoadedBars {
    pub bars: BTreeMap<String, Vec<Bar>>,
    pub issues: Vec<RowIssue>,
}

impl LoadedBars {
    pub fn bar_count(&self) -> usize {
        self.bars.values().map(Vec::len).sum()
    }

    /// BLAKE3 over every accepted bar in symbol order.
    pub fn dataset_hash(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for (symbol, bars) in &self.bars {
            hasher.update(symbol.as_bytes());
            for bar in bars {
                hasher.update(&bar.timestamp.timestamp_millis().to_le_bytes());
                hasher.update(&bar.open.to_le_bytes());
                hasher.update(&bar.high.to_le_bytes());
                hasher.update(&bar.low.to_le_bytes());
                hasher.update(&bar.close.to_le_bytes());
                hasher.update(&bar.volume.to_le_bytes());
            }
        }
        hasher.finalize().to_hex().to_string()
    }

    /// One series per symbol, with that symbol's quotes attached.
    pub fn into_series(self, mut quotes: BTreeMap<String, Vec<Quote>>) -> Vec<MarketSeries> {
        self.bars
            .into_iter()
            .map(|(symbol, bars)| {
                let series = MarketSeries::new(symbol.clone(), bars);
                match quotes.remove(&symbol) {
                    Some(q) => series.with_quotes(q),
                    None => series,
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoadedQuotes {
    pub quotes: BTreeMap<String, Vec<Quote>>,
    pub issues: Vec<RowIssue>,
}

#[derive(Debug, Clone, Default)]
pub struct LoadedSignals {
    pub signal: ScheduledSignal,
    pub issues: Vec<RowIssue>,
}

// ─── Row shapes ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct BarRow {
    timestamp: DateTime<Utc>,
    symbol: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: u64,
}

#[derive(Debug, Deserialize)]
struct QuoteRow {
    timestamp: DateTime<Utc>,
    symbol: String,
    bid: f64,
    bid_size: u64,
    ask: f64,
    ask_size: u64,
    last: f64,
}

#[derive(Debug, Deserialize)]
struct SignalRow {
    timestamp: DateTime<Utc>,
    symbol: String,
    side: String,
    confidence: Option<f64>,
}

// ─── Entry points ───────────────────────────────────────────────────

pub fn load_bars_csv(path: &Path) -> Result<LoadedBars, LoadError> {
    read_bars(open(path)?)
}

pub fn load_quotes_csv(path: &Path) -> Result<LoadedQuotes, LoadError> {
    read_quotes(open(path)?)
}

pub fn load_signals_csv(path: &Path) -> Result<LoadedSignals, LoadError> {
    read_signals(open(path)?)
}

fn open(path: &Path) -> Result<std::fs::File, LoadError> {
    std::fs::File::open(path).map_err(|source| LoadError::Open {
        path: path.to_path_buf(),
        source,
    })
}

pub fn read_bars<R: Read>(reader: R) -> Result<LoadedBars, LoadError> {
    let mut out = LoadedBars::default();
    for_each_row(reader, &mut out.issues, |line, row: BarRow, issues| {
        let bar = Bar {
            symbol: row.symbol,
            timestamp: row.timestamp,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
        };
        let problem = if [bar.open, bar.high, bar.low, bar.close]
            .iter()
            .any(|p| !p.is_finite() || *p <= 0.0)
        {
            Some(RowIssueKind::NonPositivePrice)
        } else if !bar.is_sane() {
            Some(RowIssueKind::InvertedRange)
        } else {
            None
        };

        let series = out.bars.entry(bar.symbol.clone()).or_default();
        let problem = problem.or_else(|| {
            series
                .last()
                .filter(|last| bar.timestamp <= last.timestamp)
                .map(|_| RowIssueKind::NonIncreasingTimestamp)
        });
        match problem {
            Some(kind) => issues.push(RowIssue {
                line,
                symbol: bar.symbol,
                kind,
            }),
            None => series.push(bar),
        }
    })?;
    out.bars.retain(|_, bars| !bars.is_empty());
    warn_on_issues("bars", &out.issues);
    Ok(out)
}

/// Quotes are only checked for shape; crossed or empty books are the
/// engine's to report.
pub fn read_quotes<R: Read>(reader: R) -> Result<LoadedQuotes, LoadError> {
    let mut out = LoadedQuotes::default();
    for_each_row(reader, &mut out.issues, |_, row: QuoteRow, _| {
        out.quotes.entry(row.symbol).or_default().push(Quote {
            timestamp: row.timestamp,
            bid: row.bid,
            bid_size: row.bid_size,
            ask: row.ask,
            ask_size: row.ask_size,
            last: row.last,
        });
    })?;
    warn_on_issues("quotes", &out.issues);
    Ok(out)
}

pub fn read_signals<R: Read>(reader: R) -> Result<LoadedSignals, LoadError> {
    let mut out = LoadedSignals::default();
    for_each_row(reader, &mut out.issues, |line, row: SignalRow, issues| {
        let confidence = row.confidence.unwrap_or(1.0);
        let decision = match row.side.to_ascii_lowercase().as_str() {
            "long" | "buy" => EntryDecision::long(confidence),
            "short" | "sell" => EntryDecision::short(confidence),
            _ => {
                issues.push(RowIssue {
                    line,
                    symbol: row.symbol,
                    kind: RowIssueKind::UnknownSide(row.side),
                });
                return;
            }
        };
        out.signal.insert(row.symbol, row.timestamp, decision);
    })?;
    warn_on_issues("signals", &out.issues);
    Ok(out)
}

/// Deserialize each record into `T` and hand it to `accept`. Rows that fail
/// to parse become `Malformed` issues; I/O errors abort.
fn for_each_row<R, T, F>(reader: R, issues: &mut Vec<RowIssue>, mut accept: F) -> Result<(), LoadError>
where
    R: Read,
    T: DeserializeOwned,
    F: FnMut(u64, T, &mut Vec<RowIssue>),
{
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = rdr.headers()?.clone();

    for result in rdr.records() {
        let record = match result {
            Ok(record) => record,
            Err(err) if err.is_io_error() => return Err(err.into()),
            Err(err) => {
                let line = err.position().map(|p| p.line()).unwrap_or(0);
                issues.push(malformed(line, String::new(), &err));
                continue;
            }
        };
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        match record.deserialize::<T>(Some(&headers)) {
            Ok(row) => accept(line, row, issues),
            Err(err) => {
                let symbol = headers
                    .iter()
                    .position(|h| h == "symbol")
                    .and_then(|i| record.get(i))
                    .unwrap_or_default()
                    .to_string();
                issues.push(malformed(line, symbol, &err));
            }
        }
    }
    Ok(())
}

fn malformed(line: u64, symbol: String, err: &csv::Error) -> RowIssue {
    RowIssue {
        line,
        symbol,
        kind: RowIssueKind::Malformed(err.to_string()),
    }
}

fn warn_on_issues(what: &str, issues: &[RowIssue]) {
    if !issues.is_empty() {
        tracing::warn!(file = what, dropped = issues.len(), "rows dropped while loading");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BARS: &str = "\
timestamp,symbol,open,high,low,close,volume
2024-03-01T14:30:00Z,ES,4500.00,4501.00,4499.50,4500.50,1200
2024-03-01T14:31:00Z,ES,4500.50,4502.00,4500.25,4501.75,900
2024-03-01T14:30:00Z,NQ,18000.0,18004.0,17998.0,18002.0,400
";

    #[test]
    fn loads_bars_grouped_by_symbol() {
        let loaded = read_bars(BARS.as_bytes()).unwrap();
        assert!(loaded.issues.is_empty());
        assert_eq!(loaded.bar_count(), 3);
        assert_eq!(loaded.bars["ES"].len(), 2);
        assert_eq!(loaded.bars["ES"][1].close, 4501.75);
        assert_eq!(loaded.bars["NQ"][0].volume, 400);
    }

    #[test]
    fn bad_rows_are_reported_and_skipped() {
        let csv = "\
timestamp,symbol,open,high,low,close,volume
2024-03-01T14:30:00Z,ES,4500.00,4501.00,4499.50,4500.50,1200
2024-03-01T14:31:00Z,ES,0.0,4501.00,4499.50,4500.50,1200
2024-03-01T14:32:00Z,ES,4500.00,4499.00,4501.00,4500.50,1200
2024-03-01T14:30:00Z,ES,4500.00,4501.00,4499.50,4500.50,1200
not-a-time,ES,4500.00,4501.00,4499.50,4500.50,1200
2024-03-01T14:33:00Z,ES,4500.00,4501.00,4499.50,4500.50,1200
";
        let loaded = read_bars(csv.as_bytes()).unwrap();
        assert_eq!(loaded.bars["ES"].len(), 2);
        let kinds: Vec<(u64, &RowIssueKind)> =
            loaded.issues.iter().map(|i| (i.line, &i.kind)).collect();
        assert_eq!(kinds.len(), 4);
        assert_eq!(kinds[0], (3, &RowIssueKind::NonPositivePrice));
        assert_eq!(kinds[1], (4, &RowIssueKind::InvertedRange));
        assert_eq!(kinds[2], (5, &RowIssueKind::NonIncreasingTimestamp));
        assert_eq!(kinds[3].0, 6);
        assert!(matches!(kinds[3].1, RowIssueKind::Malformed(_)));
        assert_eq!(loaded.issues[3].symbol, "ES");
    }

    #[test]
    fn missing_column_makes_every_row_malformed() {
        let csv = "timestamp,symbol,open,high,low,close\n2024-03-01T14:30:00Z,ES,1,1,1,1\n";
        let loaded = read_bars(csv.as_bytes()).unwrap();
        assert!(loaded.bars.is_empty());
        assert_eq!(loaded.issues.len(), 1);
    }

    #[test]
    fn dataset_hash_depends_on_content() {
        let a = read_bars(BARS.as_bytes()).unwrap();
        let b = read_bars(BARS.replace("1200", "1201").as_bytes()).unwrap();
        assert_eq!(a.dataset_hash(), read_bars(BARS.as_bytes()).unwrap().dataset_hash());
        assert_ne!(a.dataset_hash(), b.dataset_hash());
    }

    #[test]
    fn quotes_attach_to_their_series() {
        let quotes = read_quotes(
            "\
timestamp,symbol,bid,bid_size,ask,ask_size,last
2024-03-01T14:30:20Z,ES,4500.25,30,4500.50,25,4500.25
2024-03-01T14:30:10Z,ES,4500.00,40,4500.25,35,4500.25
"
            .as_bytes(),
        )
        .unwrap();
        assert!(quotes.issues.is_empty());
        let series = read_bars(BARS.as_bytes()).unwrap().into_series(quotes.quotes);
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].symbol, "ES");
        assert!(series[0].has_quotes());
        assert_eq!(series[0].quotes[0].bid, 4500.00);
        assert!(!series[1].has_quotes());
    }

    #[test]
    fn signals_parse_sides_and_default_confidence() {
        let loaded = read_signals(
            "\
timestamp,symbol,side,confidence
2024-03-01T14:30:00Z,ES,long,0.8
2024-03-01T14:31:00Z,ES,SHORT,
2024-03-01T14:32:00Z,ES,flat,1.0
"
            .as_bytes(),
        )
        .unwrap();
        assert_eq!(loaded.signal.len(), 2);
        assert_eq!(loaded.issues.len(), 1);
        assert_eq!(loaded.issues[0].line, 4);
        assert_eq!(loaded.issues[0].kind, RowIssueKind::UnknownSide("flat".into()));
    }

    #[test]
    fn files_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bars.csv");
        std::fs::write(&path, BARS).unwrap();
        assert_eq!(load_bars_csv(&path).unwrap().bar_count(), 3);

        let err = load_bars_csv(&dir.path().join("missing.csv")).unwrap_err();
        assert!(matches!(err, LoadError::Open { .. }));
    }
}
