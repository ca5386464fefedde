//! ExecLab CLI — run, sweep, and validate commands.
//!
//! Commands:
//! - `run` — replay bars through the engine and save the artifact set
//! - `sweep` — grid over trailing distance and breakeven threshold
//! - `validate` — load a bar file and list the rows that would be dropped

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use execlab_core::fingerprint::short_id;
use execlab_core::signal::NullSignal;
use execlab_runner::runner::{inspect_bars, RunPaths};
use execlab_runner::sweep::parse_tick_list;
use execlab_runner::{
    load_bars_csv, load_quotes_csv, load_signals_csv, run_from_files, run_sweep, save_artifacts,
    save_sweep, BacktestConfig, BacktestReport, RowIssue, SweepGrid, SweepResults,
};

#[derive(Parser)]
#[command(
    name = "execlab",
    about = "ExecLab CLI — bar-replay execution simulator"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one backtest and save report, trades, and execution artifacts.
    Run {
        /// Path to a TOML config file. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Bar CSV: timestamp,symbol,open,high,low,close,volume.
        #[arg(long)]
        bars: PathBuf,

        /// Optional quote CSV for book-aware fills.
        #[arg(long)]
        quotes: Option<PathBuf>,

        /// Entry signal CSV: timestamp,symbol,side[,confidence].
        #[arg(long)]
        signals: Option<PathBuf>,

        /// Output directory for artifacts.
        #[arg(long, default_value = "runs")]
        output_dir: PathBuf,
    },
    /// Sweep trailing distance and breakeven threshold over the same inputs.
    Sweep {
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long)]
        bars: PathBuf,

        #[arg(long)]
        quotes: Option<PathBuf>,

        #[arg(long)]
        signals: Option<PathBuf>,

        /// Trailing distances in ticks, comma-separated.
        #[arg(long, default_value = "6,8,10")]
        trailing: String,

        /// Breakeven thresholds in ticks, comma-separated.
        #[arg(long, default_value = "6,8")]
        breakeven: String,

        #[arg(long, default_value = "runs")]
        output_dir: PathBuf,

        /// Run variants one at a time instead of on the thread pool.
        #[arg(long, default_value_t = false)]
        sequential: bool,
    },
    /// Check a bar file and report rows that fail validation.
    Validate {
        #[arg(long)]
        bars: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            bars,
            quotes,
            signals,
            output_dir,
        } => run_backtest_cmd(
            RunPaths {
                config,
                bars,
                quotes,
                signals,
            },
            &output_dir,
        ),
        Commands::Sweep {
            config,
            bars,
            quotes,
            signals,
            trailing,
            breakeven,
            output_dir,
            sequential,
        } => run_sweep_cmd(
            RunPaths {
                config,
                bars,
                quotes,
                signals,
            },
            &trailing,
            &breakeven,
            &output_dir,
            !sequential,
        ),
        Commands::Validate { bars } => run_validate(&bars),
    }
}

fn run_backtest_cmd(paths: RunPaths, output_dir: &Path) -> Result<()> {
    tracing::info!(bars = %paths.bars.display(), "run started");
    let report = run_from_files(&paths)?;
    print_summary(&report);

    let run_dir = save_artifacts(&report, output_dir)?;
    tracing::info!(dir = %run_dir.display(), "artifacts saved");
    println!("Artifacts saved to: {}", run_dir.display());
    Ok(())
}

fn run_sweep_cmd(
    paths: RunPaths,
    trailing: &str,
    breakeven: &str,
    output_dir: &Path,
    parallel: bool,
) -> Result<()> {
    let trailing = parse_tick_list(trailing).context("invalid --trailing list")?;
    let breakeven = parse_tick_list(breakeven).context("invalid --breakeven list")?;
    let grid = SweepGrid::new(trailing, breakeven);
    if grid.size() == 0 {
        bail!("--trailing and --breakeven must each name at least one value");
    }
    tracing::info!(variants = grid.size(), parallel, "sweep requested");

    let base = match &paths.config {
        Some(path) => BacktestConfig::load(path)?,
        None => BacktestConfig::default(),
    };
    base.into_engine_config()?;

    let bars = load_bars_csv(&paths.bars)?;
    let dataset_hash = bars.dataset_hash();
    report_issues("bars", &bars.issues);

    let quotes = match &paths.quotes {
        Some(path) => {
            let loaded = load_quotes_csv(path)?;
            report_issues("quotes", &loaded.issues);
            loaded.quotes
        }
        None => BTreeMap::new(),
    };
    let series = bars.into_series(quotes);

    let results = match &paths.signals {
        Some(path) => {
            let loaded = load_signals_csv(path)?;
            report_issues("signals", &loaded.issues);
            run_sweep(&base, &grid, &series, &loaded.signal, &dataset_hash, parallel)?
        }
        None => run_sweep(&base, &grid, &series, &NullSignal, &dataset_hash, parallel)?,
    };

    print_sweep(&results);
    let csv_path = save_sweep(&results, output_dir)?;
    tracing::info!(path = %csv_path.display(), "sweep saved");
    println!("Sweep saved to: {}", csv_path.display());
    Ok(())
}

fn run_validate(bars: &Path) -> Result<()> {
    let loaded = inspect_bars(bars)?;
    tracing::info!(
        bars = loaded.bar_count(),
        issues = loaded.issues.len(),
        "validation finished"
    );
    println!("File: {}", bars.display());
    println!("Symbols: {}", loaded.bars.len());
    println!("Valid bars: {}", loaded.bar_count());
    println!("Dataset hash: {}", short_id(&loaded.dataset_hash()));

    if loaded.issues.is_empty() {
        println!("No row issues.");
        return Ok(());
    }

    println!();
    println!("{:>6}  {:<8}  Issue", "Line", "Symbol");
    println!("{}", "-".repeat(48));
    for issue in &loaded.issues {
        println!("{:>6}  {:<8}  {:?}", issue.line, issue.symbol, issue.kind);
    }
    println!("{} row(s) dropped", loaded.issues.len());
    Ok(())
}

fn report_issues(source: &str, issues: &[RowIssue]) {
    if !issues.is_empty() {
        eprintln!("{source}: {} row(s) dropped", issues.len());
    }
}

fn print_summary(report: &BacktestReport) {
    let s = &report.summary;
    let r = &report.result;

    println!();
    println!("=== Backtest Results ===");
    println!("Config:        {}", short_id(&report.config_id));
    println!("Dataset:       {}", short_id(&report.dataset_hash));
    println!("Signal:        {}", report.signal);
    println!("Bars:          {} processed, {} skipped", r.bars_processed, r.bars_skipped);
    println!();
    println!("Trades:        {}", s.total_trades);
    println!("Net P&L:       ${:.2}", s.total_pnl);
    println!("Final equity:  ${:.2}", s.final_equity);
    println!("Total return:  {:.2}%", s.total_return);
    println!("Win rate:      {:.1}%", s.win_rate * 100.0);
    println!("Profit factor: {:.2}", s.profit_factor);
    println!("Sharpe:        {:.3}", s.sharpe_ratio);
    println!(
        "Max drawdown:  ${:.2} ({:.2}%)",
        s.max_drawdown_dollars, s.max_drawdown_percent
    );
    println!("Avg win:       ${:.2}", s.average_win);
    println!("Avg loss:      ${:.2}", s.average_loss);

    if r.ambiguous_bars > 0 {
        println!("Ambiguous bars: {}", r.ambiguous_bars);
    }
    if !r.warnings.is_empty() {
        println!("Warnings:      {}", r.warnings.len());
    }
    if !report.row_issues.is_empty() {
        println!("Dropped rows:  {}", report.row_issues.len());
    }
    println!();
}

fn print_sweep(results: &SweepResults) {
    println!();
    println!(
        "{:>9} {:>10} {:>7} {:>12} {:>8} {:>12}",
        "Trailing", "Breakeven", "Trades", "Net P&L", "Sharpe", "Max DD $"
    );
    println!("{}", "-".repeat(63));
    for o in &results.outcomes {
        let s = &o.summary;
        println!(
            "{:>9} {:>10} {:>7} {:>12.2} {:>8.3} {:>12.2}",
            o.trailing_distance_ticks,
            o.breakeven_threshold_ticks,
            s.total_trades,
            s.total_pnl,
            s.sharpe_ratio,
            s.max_drawdown_dollars
        );
    }
    if let Some(best) = results.best_by_sharpe() {
        println!();
        println!(
            "Best Sharpe: trailing={} breakeven={} ({:.3})",
            best.trailing_distance_ticks, best.breakeven_threshold_ticks, best.summary.sharpe_ratio
        );
    }
    println!();
}
