//! ExecLab Runner — backtest orchestration on top of `execlab-core`.
//!
//! This crate provides:
//! - TOML configuration with defaults and fail-fast validation
//! - CSV loading for bars, quotes and entry signals with per-row issues
//! - Performance metrics computed from the trade list
//! - Single-run orchestration and parallel exit-parameter sweeps
//! - JSON, CSV and Markdown artifact export

pub mod config;
pub mod data_loader;
pub mod export;
pub mod metrics;
pub mod runner;
pub mod sweep;

pub use config::{BacktestConfig, ConfigError, DEFAULT_ANNUALIZATION};
pub use data_loader::{
    load_bars_csv, load_quotes_csv, load_signals_csv, LoadError, LoadedBars, LoadedQuotes,
    LoadedSignals, RowIssue, RowIssueKind,
};
pub use export::{save_artifacts, save_sweep, ExportError};
pub use metrics::{GroupStats, PerformanceSummary, TradeStreaks, PROFIT_FACTOR_CAP};
pub use runner::{run_backtest, run_from_files, BacktestReport, RunError, RunPaths};
pub use sweep::{run_sweep, SweepError, SweepGrid, SweepOutcome, SweepResults};
