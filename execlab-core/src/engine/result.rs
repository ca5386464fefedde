//! Run outcome: trades, execution quality, data issues and warnings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{PositionSide, Trade};
use crate::execution::NoFillReason;
use crate::microstructure::{summarize, ExecutionQualityRecord, ExecutionStats};

use super::config::ConfigError;
use super::quality::DataQualityIssue;

// ─── Error type ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    #[error("no market data supplied")]
    NoData,

    #[error("symbol {0} supplied more than once")]
    DuplicateSymbol(String),
}

/// Something the run recovered from but the caller should know about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunWarning {
    /// Every flatten attempt failed. The position was abandoned without a
    /// trade and the symbol takes no further entries.
    ForcedFlattenFailed {
        symbol: String,
        requested_at: DateTime<Utc>,
        attempts: u32,
        open_quantity: u32,
    },
    /// A pending entry could not be filled at the next bar's open.
    EntryNotFilled {
        symbol: String,
        time: DateTime<Utc>,
        side: PositionSide,
        reason: NoFillReason,
    },
    /// More than [`SKIP_RATE_THRESHOLD`] of a symbol's bars failed the gate.
    HighSkipRate {
        symbol: String,
        skipped: usize,
        total: usize,
    },
}

impl RunWarning {
    pub fn symbol(&self) -> &str {
        match self {
            RunWarning::ForcedFlattenFailed { symbol, .. }
            | RunWarning::EntryNotFilled { symbol, .. }
            | RunWarning::HighSkipRate { symbol, .. } => symbol,
        }
    }
}

/// Fraction of skipped bars above which a symbol gets a warning.
pub const SKIP_RATE_THRESHOLD: f64 = 0.10;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    /// Sorted by exit time, then symbol.
    pub trades: Vec<Trade>,
    pub execution: Vec<ExecutionQualityRecord>,
    pub data_issues: Vec<DataQualityIssue>,
    pub warnings: Vec<RunWarning>,
    /// Bars on which stop and target were both reachable.
    pub ambiguous_bars: usize,
    /// Bars that passed the data-quality gate.
    pub bars_processed: usize,
    pub bars_skipped: usize,
    pub regime_changes: usize,
    pub initial_capital: f64,
}

impl RunResult {
    pub fn execution_stats(&self) -> ExecutionStats {
        summarize(&self.execution)
    }

    pub fn net_pnl(&self) -> f64 {
        self.trades.iter().map(|t| t.net_pnl).sum()
    }

    pub fn trades_for<'a>(&'a self, symbol: &'a str) -> impl Iterator<Item = &'a Trade> + 'a {
        self.trades.iter().filter(move |t| t.symbol == symbol)
    }

    /// Deterministic digest of the trade list; identical inputs give identical digests.
    pub fn trade_digest(&self) -> String {
        crate::fingerprint::trade_digest(&self.trades)
    }
}
