//! Backtest runner: wires configuration, data and the engine into a report.
//!
//! Two entry points:
//! - `run_backtest()`: in-memory series and signal, no I/O. Used by sweeps.
//! - `run_from_files()`: loads the TOML config and CSV inputs, then runs.
//!   Used by the CLI.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use execlab_core::engine::{BacktestEngine, EngineError, MarketSeries, RunResult};
use execlab_core::microstructure::ExecutionStats;
use execlab_core::signal::{EntrySignal, NullSignal};

use crate::config::{BacktestConfig, ConfigError};
use crate::data_loader::{
    load_bars_csv, load_quotes_csv, load_signals_csv, LoadError, LoadedBars, RowIssue,
};
use crate::metrics::{by_exit_reason, by_regime, GroupStats, PerformanceSummary, TradeStreaks};

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("data error: {0}")]
    Data(#[from] LoadError),
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
}

/// Current schema version for persisted reports.
pub const SCHEMA_VERSION: u32 = 1;

/// Everything one run produced, ready to export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestReport {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub config_id: String,
    pub dataset_hash: String,
    pub signal: String,
    pub summary: PerformanceSummary,
    pub streaks: TradeStreaks,
    pub by_exit_reason: BTreeMap<String, GroupStats>,
    pub by_regime: BTreeMap<String, GroupStats>,
    pub execution_stats: ExecutionStats,
    /// Input rows dropped by the loader.
    pub row_issues: Vec<RowIssue>,
    pub trade_digest: String,
    pub result: RunResult,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// Input file locations for [`run_from_files`].
#[derive(Debug, Clone, Default)]
pub struct RunPaths {
    pub config: Option<PathBuf>,
    pub bars: PathBuf,
    pub quotes: Option<PathBuf>,
    pub signals: Option<PathBuf>,
}

/// Run one backtest over pre-loaded data.
pub fn run_backtest(
    config: &BacktestConfig,
    series: &[MarketSeries],
    signal: &dyn EntrySignal,
    dataset_hash: &str,
) -> Result<BacktestReport, RunError> {
    let engine = BacktestEngine::new(config.into_engine_config()?)?;
    let result = engine.run(series, signal)?;
    Ok(build_report(config, signal.name(), dataset_hash, result))
}

/// Summarize a finished run.
pub fn build_report(
    config: &BacktestConfig,
    signal_name: &str,
    dataset_hash: &str,
    result: RunResult,
) -> BacktestReport {
    let summary = PerformanceSummary::from_trades(
        &result.trades,
        result.initial_capital,
        config.engine.annualization,
    );
    BacktestReport {
        schema_version: SCHEMA_VERSION,
        config_id: config.config_id(),
        dataset_hash: dataset_hash.to_string(),
        signal: signal_name.to_string(),
        summary,
        streaks: TradeStreaks::from_trades(&result.trades),
        by_exit_reason: by_exit_reason(&result.trades),
        by_regime: by_regime(&result.trades),
        execution_stats: result.execution_stats(),
        row_issues: Vec::new(),
        trade_digest: result.trade_digest(),
        result,
    }
}

/// Load the config and CSV inputs, then run.
///
/// Without a config file the defaults apply; without a signals file the run
/// takes no entries.
pub fn run_from_files(paths: &RunPaths) -> Result<BacktestReport, RunError> {
    let config = match &paths.config {
        Some(path) => BacktestConfig::load(path)?,
        None => BacktestConfig::default(),
    };
    // Fail on a bad config before touching the data.
    config.into_engine_config()?;

    let bars = load_bars_csv(&paths.bars)?;
    let mut row_issues = bars.issues.clone();
    let dataset_hash = bars.dataset_hash();

    let quotes = match &paths.quotes {
        Some(path) => {
            let loaded = load_quotes_csv(path)?;
            row_issues.extend(loaded.issues);
            loaded.quotes
        }
        None => BTreeMap::new(),
    };
    let series = bars.into_series(quotes);

    let mut report = match &paths.signals {
        Some(path) => {
            let loaded = load_signals_csv(path)?;
            row_issues.extend(loaded.issues);
            run_backtest(&config, &series, &loaded.signal, &dataset_hash)?
        }
        None => run_backtest(&config, &series, &NullSignal, &dataset_hash)?,
    };
    report.row_issues = row_issues;

    tracing::info!(
        config_id = execlab_core::fingerprint::short_id(&report.config_id),
        trades = report.summary.total_trades,
        net_pnl = report.summary.total_pnl,
        "backtest finished"
    );
    Ok(report)
}

/// Load just the bars, for `validate`-style checks.
pub fn inspect_bars(path: &Path) -> Result<LoadedBars, RunError> {
    Ok(load_bars_csv(path)?)
}
