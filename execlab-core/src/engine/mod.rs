//! Backtesting engine — bar replay over per-symbol sessions.
//!
//! The engine consumes validated configuration, one [`MarketSeries`] per
//! symbol and an [`EntrySignal`](crate::signal::EntrySignal), and produces a
//! [`RunResult`]. It never performs I/O.

pub mod config;
#[allow(clippy::module_inception)]
pub mod engine;
pub mod quality;
pub mod result;
pub mod series;
pub mod session;

pub use config::{ConfigError, EngineConfig, FlattenRetryPolicy};
pub use engine::BacktestEngine;
pub use quality::{DataQualityIssue, DataQualityKind, QualityGate};
pub use result::{EngineError, RunResult, RunWarning, SKIP_RATE_THRESHOLD};
pub use series::MarketSeries;
pub use session::{PendingEntry, PendingFlatten, SessionState, SymbolSession};
