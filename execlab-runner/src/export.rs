//! Artifact export: JSON reports, CSV tapes and a Markdown summary.
//!
//! Every JSON report carries a `schema_version`; newer versions are
//! rejected on load.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use thiserror::Error;

use execlab_core::domain::Trade;
use execlab_core::fingerprint::short_id;
use execlab_core::microstructure::ExecutionQualityRecord;

use crate::runner::{BacktestReport, SCHEMA_VERSION};
use crate::sweep::SweepResults;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to serialize JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to write CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("unsupported schema version {found} (max supported: {supported})")]
    SchemaVersion { found: u32, supported: u32 },
}

// ─── JSON ───────────────────────────────────────────────────────────

pub fn export_json(report: &BacktestReport) -> Result<String, ExportError> {
    Ok(serde_json::to_string_pretty(report)?)
}

pub fn import_json(json: &str) -> Result<BacktestReport, ExportError> {
    let report: BacktestReport = serde_json::from_str(json)?;
    if report.schema_version > SCHEMA_VERSION {
        return Err(ExportError::SchemaVersion {
            found: report.schema_version,
            supported: SCHEMA_VERSION,
        });
    }
    Ok(report)
}

// ─── CSV ────────────────────────────────────────────────────────────

/// One row per trade. Exit legs are summarized by `partial_exits`; the
/// full legs live in the JSON report.
pub fn trades_csv(trades: &[Trade]) -> Result<String, ExportError> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "symbol",
        "side",
        "entry_time",
        "entry_price",
        "exit_time",
        "exit_price",
        "exit_reason",
        "quantity",
        "partial_exits",
        "gross_pnl",
        "commission",
        "net_pnl",
        "tick_delta",
        "bars_held",
        "duration_secs",
        "mae_ticks",
        "mfe_ticks",
        "regime_at_entry",
    ])?;
    for t in trades {
        wtr.write_record([
            t.symbol.clone(),
            format!("{:?}", t.side),
            t.entry_time.to_rfc3339(),
            format!("{:.6}", t.entry_price),
            t.exit_time.to_rfc3339(),
            format!("{:.6}", t.exit_price),
            t.exit_reason.as_str().to_string(),
            t.quantity.to_string(),
            t.partial_exits.to_string(),
            format!("{:.2}", t.gross_pnl),
            format!("{:.2}", t.commission),
            format!("{:.2}", t.net_pnl),
            format!("{:.4}", t.tick_delta),
            t.bars_held.to_string(),
            t.duration_secs.to_string(),
            format!("{:.2}", t.mae_ticks),
            format!("{:.2}", t.mfe_ticks),
            t.regime_at_entry.as_str().to_string(),
        ])?;
    }
    finish(wtr)
}

pub fn execution_csv(records: &[ExecutionQualityRecord]) -> Result<String, ExportError> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    for record in records {
        wtr.serialize(record)?;
    }
    finish(wtr)
}

pub fn sweep_csv(results: &SweepResults) -> Result<String, ExportError> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "trailing_distance_ticks",
        "breakeven_threshold_ticks",
        "total_trades",
        "total_pnl",
        "win_rate",
        "profit_factor",
        "sharpe_ratio",
        "max_drawdown_dollars",
        "ambiguous_bars",
        "trade_digest",
    ])?;
    for o in &results.outcomes {
        let s = &o.summary;
        wtr.write_record([
            o.trailing_distance_ticks.to_string(),
            o.breakeven_threshold_ticks.to_string(),
            s.total_trades.to_string(),
            format!("{:.2}", s.total_pnl),
            format!("{:.4}", s.win_rate),
            format!("{:.4}", s.profit_factor),
            format!("{:.4}", s.sharpe_ratio),
            format!("{:.2}", s.max_drawdown_dollars),
            o.ambiguous_bars.to_string(),
            o.trade_digest.clone(),
        ])?;
    }
    finish(wtr)
}

fn finish(wtr: csv::Writer<Vec<u8>>) -> Result<String, ExportError> {
    let data = wtr
        .into_inner()
        .map_err(|e| ExportError::Csv(e.into_error().into()))?;
    Ok(String::from_utf8_lossy(&data).into_owned())
}

// ─── Markdown ───────────────────────────────────────────────────────

pub fn markdown_report(report: &BacktestReport) -> String {
    let s = &report.summary;
    let r = &report.result;
    let mut md = String::with_capacity(2048);

    let _ = writeln!(md, "# Backtest Report\n");
    let _ = writeln!(md, "| Field | Value |\n| --- | --- |");
    let _ = writeln!(md, "| Config | {} |", short_id(&report.config_id));
    let _ = writeln!(md, "| Dataset | {} |", short_id(&report.dataset_hash));
    let _ = writeln!(md, "| Signal | {} |", report.signal);
    let _ = writeln!(
        md,
        "| Bars | {} processed, {} skipped |",
        r.bars_processed, r.bars_skipped
    );
    let _ = writeln!(md, "| Ambiguous bars | {} |", r.ambiguous_bars);
    let _ = writeln!(md, "| Regime changes | {} |\n", r.regime_changes);

    let _ = writeln!(md, "## Performance\n");
    let _ = writeln!(md, "| Metric | Value |\n| --- | --- |");
    let _ = writeln!(md, "| Trades | {} |", s.total_trades);
    let _ = writeln!(md, "| Net P&L | ${:.2} |", s.total_pnl);
    let _ = writeln!(md, "| Win rate | {:.1}% |", s.win_rate * 100.0);
    let _ = writeln!(md, "| Profit factor | {:.2} |", s.profit_factor);
    let _ = writeln!(md, "| Sharpe | {:.3} |", s.sharpe_ratio);
    let _ = writeln!(
        md,
        "| Max drawdown | ${:.2} ({:.2}%) |",
        s.max_drawdown_dollars, s.max_drawdown_percent
    );
    let _ = writeln!(md, "| Average win | ${:.2} |", s.average_win);
    let _ = writeln!(md, "| Average loss | ${:.2} |", s.average_loss);
    let _ = writeln!(md, "| Final equity | ${:.2} |", s.final_equity);
    let _ = writeln!(md, "| Total return | {:.2}% |\n", s.total_return);

    if !report.by_exit_reason.is_empty() {
        let _ = writeln!(md, "## Exits\n");
        let _ = writeln!(md, "| Reason | Trades | Net P&L | Win rate |\n| --- | --- | --- | --- |");
        for (reason, g) in &report.by_exit_reason {
            let _ = writeln!(
                md,
                "| {reason} | {} | ${:.2} | {:.1}% |",
                g.trades,
                g.total_pnl,
                g.win_rate * 100.0
            );
        }
        md.push('\n');
    }

    let e = &report.execution_stats;
    let _ = writeln!(md, "## Execution\n");
    let _ = writeln!(
        md,
        "| Style | Fills | Mean slippage (ticks) | Mean cost est/actual (ticks) |\n| --- | --- | --- | --- |"
    );
    for (name, style) in [("passive", &e.passive), ("aggressive", &e.aggressive)] {
        let _ = writeln!(
            md,
            "| {name} | {} | {:.2} | {:.2} / {:.2} |",
            style.fills,
            style.mean_slippage_ticks,
            style.mean_estimated_cost_ticks,
            style.mean_actual_cost_ticks
        );
    }

    if !r.warnings.is_empty() || !r.data_issues.is_empty() || !report.row_issues.is_empty() {
        let _ = writeln!(md, "\n## Warnings\n");
        for w in &r.warnings {
            let _ = writeln!(md, "- {w:?}");
        }
        if !r.data_issues.is_empty() {
            let _ = writeln!(md, "- {} bars failed the data-quality gate", r.data_issues.len());
        }
        if !report.row_issues.is_empty() {
            let _ = writeln!(md, "- {} input rows dropped while loading", report.row_issues.len());
        }
    }
    md
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Write the full artifact set for one run.
///
/// Creates `{config}_{dataset}/` under `output_dir` (short ids, so reruns of
/// the same inputs land in the same place) containing `report.json`,
/// `summary.json`, `trades.csv`, `execution.csv` and `report.md`.
pub fn save_artifacts(report: &BacktestReport, output_dir: &Path) -> Result<PathBuf, ExportError> {
    let dirname = format!(
        "{}_{}",
        short_id(&report.config_id),
        short_id(&report.dataset_hash)
    );
    let run_dir = output_dir.join(dirname);
    create_dir(&run_dir)?;

    write(&run_dir.join("report.json"), &export_json(report)?)?;
    write(
        &run_dir.join("summary.json"),
        &serde_json::to_string_pretty(&report.summary)?,
    )?;
    write(&run_dir.join("trades.csv"), &trades_csv(&report.result.trades)?)?;
    write(
        &run_dir.join("execution.csv"),
        &execution_csv(&report.result.execution)?,
    )?;
    write(&run_dir.join("report.md"), &markdown_report(report))?;
    Ok(run_dir)
}

pub fn save_sweep(results: &SweepResults, output_dir: &Path) -> Result<PathBuf, ExportError> {
    create_dir(output_dir)?;
    let path = output_dir.join("sweep.csv");
    write(&path, &sweep_csv(results)?)?;
    write(
        &output_dir.join("sweep.json"),
        &serde_json::to_string_pretty(results)?,
    )?;
    Ok(path)
}

pub fn load_report(dir: &Path) -> Result<BacktestReport, ExportError> {
    let path = dir.join("report.json");
    let json = std::fs::read_to_string(&path).map_err(|source| ExportError::Io {
        path: path.clone(),
        source,
    })?;
    import_json(&json)
}

fn create_dir(dir: &Path) -> Result<(), ExportError> {
    std::fs::create_dir_all(dir).map_err(|source| ExportError::Io {
        path: dir.to_path_buf(),
        source,
    })
}

fn write(path: &Path, contents: &str) -> Result<(), ExportError> {
    std::fs::write(path, contents).map_err(|source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    })
}
