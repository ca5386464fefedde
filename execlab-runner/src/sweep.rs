//! Parameter sweeps over exit settings.
//!
//! Each variant builds its own engine and owns its results; nothing mutable
//! is shared between workers. Outcomes come back in grid order whether the
//! sweep ran on the rayon pool or sequentially.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use execlab_core::engine::MarketSeries;
use execlab_core::signal::EntrySignal;

use crate::config::BacktestConfig;
use crate::metrics::PerformanceSummary;
use crate::runner::{run_backtest, RunError};

#[derive(Debug, Error)]
pub enum SweepError {
    #[error("sweep grid is empty")]
    EmptyGrid,

    #[error("variant trailing={trailing} breakeven={breakeven}: {source}")]
    Variant {
        trailing: f64,
        breakeven: f64,
        #[source]
        source: RunError,
    },
}

/// Cartesian grid of trailing distances and breakeven thresholds, in ticks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SweepGrid {
    pub trailing_distance_ticks: Vec<f64>,
    pub breakeven_threshold_ticks: Vec<f64>,
}

impl SweepGrid {
    pub fn new(trailing: Vec<f64>, breakeven: Vec<f64>) -> Self {
        Self {
            trailing_distance_ticks: trailing,
            breakeven_threshold_ticks: breakeven,
        }
    }

    pub fn size(&self) -> usize {
        self.trailing_distance_ticks.len() * self.breakeven_threshold_ticks.len()
    }

    /// One config per grid point, trailing-major.
    pub fn variants(&self, base: &BacktestConfig) -> Vec<SweepVariant> {
        let mut out = Vec::with_capacity(self.size());
        for &trailing in &self.trailing_distance_ticks {
            for &breakeven in &self.breakeven_threshold_ticks {
                let mut config = base.clone();
                config.exits.trailing_distance_ticks = trailing;
                config.exits.breakeven_threshold_ticks = breakeven;
                out.push(SweepVariant {
                    trailing,
                    breakeven,
                    config,
                });
            }
        }
        out
    }
}

#[derive(Debug, Clone)]
pub struct SweepVariant {
    pub trailing: f64,
    pub breakeven: f64,
    pub config: BacktestConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepOutcome {
    pub trailing_distance_ticks: f64,
    pub breakeven_threshold_ticks: f64,
    pub config_id: String,
    pub summary: PerformanceSummary,
    pub ambiguous_bars: usize,
    /// BLAKE3 over the variant's trade list.
    pub trade_digest: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SweepResults {
    /// Grid order.
    pub outcomes: Vec<SweepOutcome>,
}

impl SweepResults {
    /// Highest Sharpe ratio; ties keep the earlier grid point.
    pub fn best_by_sharpe(&self) -> Option<&SweepOutcome> {
        self.outcomes.iter().reduce(|best, o| {
            if o.summary.sharpe_ratio > best.summary.sharpe_ratio {
                o
            } else {
                best
            }
        })
    }

    /// Outcomes ordered by net P&L, best first.
    pub fn ranked_by_pnl(&self) -> Vec<&SweepOutcome> {
        let mut ranked: Vec<&SweepOutcome> = self.outcomes.iter().collect();
        ranked.sort_by(|a, b| b.summary.total_pnl.total_cmp(&a.summary.total_pnl));
        ranked
    }
}

/// Run every grid point against the same data and signal.
pub fn run_sweep(
    base: &BacktestConfig,
    grid: &SweepGrid,
    series: &[MarketSeries],
    signal: &dyn EntrySignal,
    dataset_hash: &str,
    parallel: bool,
) -> Result<SweepResults, SweepError> {
    let variants = grid.variants(base);
    if variants.is_empty() {
        return Err(SweepError::EmptyGrid);
    }
    tracing::info!(variants = variants.len(), parallel, "sweep started");

    let run_one = |variant: &SweepVariant| -> Result<SweepOutcome, SweepError> {
        let report =
            run_backtest(&variant.config, series, signal, dataset_hash).map_err(|source| {
                SweepError::Variant {
                    trailing: variant.trailing,
                    breakeven: variant.breakeven,
                    source,
                }
            })?;
        Ok(SweepOutcome {
            trailing_distance_ticks: variant.trailing,
            breakeven_threshold_ticks: variant.breakeven,
            config_id: report.config_id,
            summary: report.summary,
            ambiguous_bars: report.result.ambiguous_bars,
            trade_digest: report.trade_digest,
        })
    };

    let outcomes = if parallel {
        variants.par_iter().map(run_one).collect::<Result<Vec<_>, _>>()?
    } else {
        variants.iter().map(run_one).collect::<Result<Vec<_>, _>>()?
    };
    Ok(SweepResults { outcomes })
}

/// Parse a comma-separated tick list such as `6,8,10`.
pub fn parse_tick_list(text: &str) -> Result<Vec<f64>, std::num::ParseFloatError> {
    text.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .collect()
}
