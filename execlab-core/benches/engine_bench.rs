//! Criterion benchmarks for ExecLab hot paths.
//!
//! Benchmarks:
//! 1. Bar replay (full engine run, bars-only and book-aware)
//! 2. Fill simulation (market, stop, limit, bracket resolution)
//! 3. Regime classification over a rolling window
//! 4. Exit state machine (sequential on_bar calls)

use chrono::{DateTime, Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use execlab_core::domain::{Bar, Instrument, OrderIntent, OrderSide, PositionSide, Quote};
use execlab_core::engine::{BacktestEngine, EngineConfig, MarketSeries};
use execlab_core::execution::{CostModel, FillSimulator, PriceSource, SimulatedVenue};
use execlab_core::exits::{AdaptiveExitManager, EffectiveThresholds, ExitConfig};
use execlab_core::microstructure::ExitOrderOptimizer;
use execlab_core::regime::{RegimeClassifier, RegimeMultipliers};
use execlab_core::signal::{EntryDecision, ScheduledSignal};

// ── Helpers ──────────────────────────────────────────────────────────

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 14, 30, 0).unwrap()
}

/// Sine-wave ES bars snapped to the tick grid.
fn make_bars(symbol: &str, n: usize) -> Vec<Bar> {
    let snap = |p: f64| (p * 4.0).round() / 4.0;
    (0..n)
        .map(|i| {
            let close = snap(4500.0 + (i as f64 * 0.05).sin() * 20.0);
            let open = snap(close - 0.5);
            Bar {
                symbol: symbol.to_string(),
                timestamp: t0() + Duration::minutes(i as i64),
                open,
                high: open.max(close) + 1.25,
                low: open.min(close) - 1.25,
                close,
                volume: 1_000 + (i as u64 % 500),
            }
        })
        .collect()
}

/// Four quotes per bar around the bar's close.
fn make_quotes(bars: &[Bar]) -> Vec<Quote> {
    bars.iter()
        .flat_map(|bar| {
            (0..4).map(move |k| Quote {
                timestamp: bar.timestamp + Duration::seconds(k * 15),
                bid: bar.close - 0.25,
                bid_size: 40 + k as u64,
                ask: bar.close,
                ask_size: 35 + k as u64,
                last: bar.close,
            })
        })
        .collect()
}

/// Alternating long/short entries every `every` bars.
fn make_signal(bars: &[Bar], every: usize) -> ScheduledSignal {
    let mut signal = ScheduledSignal::new();
    for (i, bar) in bars.iter().enumerate().step_by(every) {
        let decision = if (i / every) % 2 == 0 {
            EntryDecision::long(1.0)
        } else {
            EntryDecision::short(1.0)
        };
        signal.insert(&bar.symbol, bar.timestamp, decision);
    }
    signal
}

fn simulator() -> FillSimulator {
    FillSimulator::new(Instrument::es(), CostModel::new(1.0, 2.5))
}

// ── 1. Bar Replay ────────────────────────────────────────────────────

fn bench_bar_replay(c: &mut Criterion) {
    let mut group = c.benchmark_group("bar_replay");
    let engine = BacktestEngine::new(EngineConfig::default()).unwrap();

    for &bar_count in &[390, 1950, 7800] {
        let bars = make_bars("ES", bar_count);
        let signal = make_signal(&bars, 25);
        let series = [MarketSeries::new("ES", bars)];

        group.bench_with_input(
            BenchmarkId::new("bars_only", bar_count),
            &bar_count,
            |b, _| {
                b.iter(|| engine.run(black_box(&series), &signal));
            },
        );
    }

    let book_engine = BacktestEngine::new(EngineConfig {
        book_aware: true,
        ..EngineConfig::default()
    })
    .unwrap();
    let bars = make_bars("ES", 1950);
    let quotes = make_quotes(&bars);
    let signal = make_signal(&bars, 25);
    let series = [MarketSeries::new("ES", bars).with_quotes(quotes)];
    group.bench_function("book_aware_1950_bars", |b| {
        b.iter(|| book_engine.run(black_box(&series), &signal));
    });

    group.finish();
}

// ── 2. Fill Simulation ───────────────────────────────────────────────

fn bench_fills(c: &mut Criterion) {
    let mut group = c.benchmark_group("fill_simulation");
    let sim = simulator();
    let bars = make_bars("ES", 1000);

    let market = OrderIntent::market(OrderSide::Buy, 1, 4500.0);
    group.bench_function("market_1000_bars", |b| {
        b.iter(|| {
            for bar in &bars {
                black_box(sim.simulate(&market, PriceSource::Bar(bar)));
            }
        });
    });

    let stop = OrderIntent::stop(OrderSide::Sell, 1, 4495.0);
    let target = OrderIntent::limit(OrderSide::Sell, 1, 4510.0);
    group.bench_function("bracket_1000_bars", |b| {
        b.iter(|| {
            for bar in &bars {
                black_box(sim.resolve_bracket(&stop, &target, bar));
            }
        });
    });

    let quotes = make_quotes(&bars);
    group.bench_function("market_vs_quote_4000", |b| {
        b.iter(|| {
            for quote in &quotes {
                black_box(sim.simulate(&market, PriceSource::Quote(quote)));
            }
        });
    });

    group.finish();
}

// ── 3. Regime Classification ─────────────────────────────────────────

fn bench_regime(c: &mut Criterion) {
    let mut group = c.benchmark_group("regime");
    let classifier = RegimeClassifier::default();
    let bars = make_bars("ES", 2000);
    let window = classifier.config().window;

    group.bench_function("rolling_classify_2000_bars", |b| {
        b.iter(|| {
            for end in 1..=bars.len() {
                let start = end.saturating_sub(window);
                black_box(classifier.classify(&bars[start..end]));
            }
        });
    });

    group.finish();
}

// ── 4. Exit State Machine ────────────────────────────────────────────

fn bench_exit_state_machine(c: &mut Criterion) {
    let mut group = c.benchmark_group("exit_state_machine");
    let config = ExitConfig::default();
    let manager = AdaptiveExitManager::new(
        config.clone(),
        Instrument::es(),
        CostModel::new(1.0, 2.5),
        ExitOrderOptimizer::default(),
    );
    let sim = simulator();
    let venue = SimulatedVenue::bars_only(&sim);
    let thresholds = EffectiveThresholds::derive(&config, RegimeMultipliers::identity());
    let bars = make_bars("ES", 500);

    group.bench_function("on_bar_until_closed", |b| {
        b.iter(|| {
            let mut position =
                manager.open_position("ES", PositionSide::Long, 10, bars[0].open, bars[0].timestamp);
            for bar in &bars {
                if manager.on_bar(&mut position, bar, &thresholds, &venue).closed {
                    break;
                }
            }
            black_box(position)
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_bar_replay,
    bench_fills,
    bench_regime,
    bench_exit_state_machine,
);
criterion_main!(benches);
