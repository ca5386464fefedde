//! Performance metrics: pure functions over a trade list.
//!
//! Everything is recomputed from the trades on each call. The equity curve
//! is trade-by-trade: it starts at the initial capital and steps by each
//! trade's net P&L in the order given (the engine orders by exit time).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use execlab_core::domain::Trade;

/// Profit factor reported when there are winners but no losers.
pub const PROFIT_FACTOR_CAP: f64 = 100.0;

/// Aggregate performance of one run. Serializes to exactly these eleven keys.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSummary {
    pub total_trades: usize,
    /// Net of commission.
    pub total_pnl: f64,
    /// Winners over all trades, as a fraction.
    pub win_rate: f64,
    pub profit_factor: f64,
    pub sharpe_ratio: f64,
    /// Largest peak-to-trough fall, in dollars (zero or positive).
    pub max_drawdown_dollars: f64,
    /// Same fall as a percent of the peak.
    pub max_drawdown_percent: f64,
    pub average_win: f64,
    /// Mean net loss of the losing trades (zero or negative).
    pub average_loss: f64,
    pub final_equity: f64,
    /// Percent of initial capital.
    pub total_return: f64,
}

impl PerformanceSummary {
    pub fn from_trades(trades: &[Trade], initial_capital: f64, annualization: f64) -> Self {
        let total_pnl: f64 = trades.iter().map(|t| t.net_pnl).sum();
        let curve = equity_curve(trades, initial_capital);
        let (max_drawdown_dollars, max_drawdown_percent) = max_drawdown(&curve);
        let total_return = if initial_capital > 0.0 {
            total_pnl / initial_capital * 100.0
        } else {
            0.0
        };
        Self {
            total_trades: trades.len(),
            total_pnl,
            win_rate: win_rate(trades),
            profit_factor: profit_factor(trades),
            sharpe_ratio: sharpe_ratio(&trade_returns(trades, initial_capital), annualization),
            max_drawdown_dollars,
            max_drawdown_percent,
            average_win: average_win(trades),
            average_loss: average_loss(trades),
            final_equity: initial_capital + total_pnl,
            total_return,
        }
    }
}

// ─── Individual metric functions ────────────────────────────────────

/// Equity after each trade, starting with `initial_capital`.
pub fn equity_curve(trades: &[Trade], initial_capital: f64) -> Vec<f64> {
    let mut equity = initial_capital;
    let mut curve = Vec::with_capacity(trades.len() + 1);
    curve.push(equity);
    for trade in trades {
        equity += trade.net_pnl;
        curve.push(equity);
    }
    curve
}

/// Each trade's net P&L over the equity available before it.
pub fn trade_returns(trades: &[Trade], initial_capital: f64) -> Vec<f64> {
    equity_curve(trades, initial_capital)
        .iter()
        .zip(trades)
        .map(|(&before, trade)| trade.return_on(before))
        .collect()
}

/// Mean over sample standard deviation, scaled by √`annualization`.
///
/// Zero with fewer than two returns or when every return is the same.
pub fn sharpe_ratio(returns: &[f64], annualization: f64) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let std = std_dev(returns);
    if std < 1e-15 {
        return 0.0;
    }
    mean_f64(returns) / std * annualization.max(0.0).sqrt()
}

/// Largest peak-to-trough fall as `(dollars, percent of peak)`.
pub fn max_drawdown(curve: &[f64]) -> (f64, f64) {
    let Some(&first) = curve.first() else {
        return (0.0, 0.0);
    };
    let mut peak = first;
    let mut worst_dollars = 0.0_f64;
    let mut worst_percent = 0.0_f64;
    for &equity in curve {
        peak = peak.max(equity);
        let fall = peak - equity;
        worst_dollars = worst_dollars.max(fall);
        if peak > 0.0 {
            worst_percent = worst_percent.max(fall / peak * 100.0);
        }
    }
    (worst_dollars, worst_percent)
}

pub fn win_rate(trades: &[Trade]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    trades.iter().filter(|t| t.is_winner()).count() as f64 / trades.len() as f64
}

/// Gross profit over gross loss.
///
/// Zero with neither wins nor losses, [`PROFIT_FACTOR_CAP`] with wins and no
/// losses. Otherwise the plain ratio, which may exceed the cap.
pub fn profit_factor(trades: &[Trade]) -> f64 {
    let gross_profit: f64 = trades.iter().filter(|t| t.is_winner()).map(|t| t.net_pnl).sum();
    let gross_loss: f64 = trades
        .iter()
        .filter(|t| t.is_loser())
        .map(|t| t.net_pnl.abs())
        .sum();
    gross_ratio(gross_profit, gross_loss)
}

fn gross_ratio(gross_profit: f64, gross_loss: f64) -> f64 {
    if gross_loss < 1e-10 {
        return if gross_profit > 0.0 { PROFIT_FACTOR_CAP } else { 0.0 };
    }
    gross_profit / gross_loss
}

pub fn average_win(trades: &[Trade]) -> f64 {
    let wins: Vec<f64> = trades.iter().filter(|t| t.is_winner()).map(|t| t.net_pnl).collect();
    mean_f64(&wins)
}

pub fn average_loss(trades: &[Trade]) -> f64 {
    let losses: Vec<f64> = trades.iter().filter(|t| t.is_loser()).map(|t| t.net_pnl).collect();
    mean_f64(&losses)
}

// ─── Streaks ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TradeStreaks {
    pub max_consecutive_wins: usize,
    pub max_consecutive_losses: usize,
    pub avg_losing_streak: f64,
}

impl TradeStreaks {
    /// Break-even trades end a winning streak and extend a losing one.
    pub fn from_trades(trades: &[Trade]) -> Self {
        let mut losing_streaks = Vec::new();
        let mut wins = 0usize;
        let mut losses = 0usize;
        let mut out = Self::default();
        for trade in trades {
            if trade.is_winner() {
                wins += 1;
                if losses > 0 {
                    losing_streaks.push(losses);
                }
                losses = 0;
            } else {
                losses += 1;
                wins = 0;
            }
            out.max_consecutive_wins = out.max_consecutive_wins.max(wins);
            out.max_consecutive_losses = out.max_consecutive_losses.max(losses);
        }
        if losses > 0 {
            losing_streaks.push(losses);
        }
        if !losing_streaks.is_empty() {
            out.avg_losing_streak =
                losing_streaks.iter().sum::<usize>() as f64 / losing_streaks.len() as f64;
        }
        out
    }
}

// ─── Breakdowns ─────────────────────────────────────────────────────

/// Summary of the trades sharing one key.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroupStats {
    pub trades: usize,
    pub total_pnl: f64,
    pub win_rate: f64,
    pub average_pnl: f64,
    pub profit_factor: f64,
}

impl GroupStats {
    fn from_members(members: &[&Trade]) -> Self {
        let n = members.len();
        let total_pnl: f64 = members.iter().map(|t| t.net_pnl).sum();
        let wins = members.iter().filter(|t| t.is_winner()).count();
        let gross_profit: f64 = members.iter().map(|t| t.net_pnl.max(0.0)).sum();
        let gross_loss: f64 = members.iter().map(|t| (-t.net_pnl).max(0.0)).sum();
        let (win_rate, average_pnl) = if n == 0 {
            (0.0, 0.0)
        } else {
            (wins as f64 / n as f64, total_pnl / n as f64)
        };
        Self {
            trades: n,
            total_pnl,
            win_rate,
            average_pnl,
            profit_factor: gross_ratio(gross_profit, gross_loss),
        }
    }
}

fn group_by<F>(trades: &[Trade], key: F) -> BTreeMap<String, GroupStats>
where
    F: Fn(&Trade) -> &'static str,
{
    let mut groups: BTreeMap<String, Vec<&Trade>> = BTreeMap::new();
    for trade in trades {
        groups.entry(key(trade).to_string()).or_default().push(trade);
    }
    groups
        .into_iter()
        .map(|(k, members)| (k, GroupStats::from_members(&members)))
        .collect()
}

/// Keyed by `ExitReason::as_str` (`stop_loss`, `trailing_stop`, ...).
pub fn by_exit_reason(trades: &[Trade]) -> BTreeMap<String, GroupStats> {
    group_by(trades, |t| t.exit_reason.as_str())
}

/// Keyed by the regime at entry (`HIGH_VOL_CHOPPY`, ...).
pub fn by_regime(trades: &[Trade]) -> BTreeMap<String, GroupStats> {
    group_by(trades, |t| t.regime_at_entry.as_str())
}

// ─── Helpers ────────────────────────────────────────────────────────

pub(crate) fn mean_f64(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub(crate) fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = mean_f64(values);
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{Duration, TimeZone, Utc};
    use execlab_core::domain::{ExitReason, PositionSide, Trade};
    use execlab_core::regime::RegimeLabel;

    /// A one-contract ES long whose net P&L is `net_pnl`.
    pub fn make_trade(net_pnl: f64, exit_minute: i64) -> Trade {
        let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 14, 30, 0).unwrap();
        let exit_price = 4500.0 + net_pnl / 50.0;
        Trade {
            symbol: "ES".into(),
            side: PositionSide::Long,
            entry_time: t0,
            entry_price: 4500.0,
            stop_at_entry: 4498.0,
            target_at_entry: 4512.0,
            regime_at_entry: RegimeLabel::Normal,
            exit_time: t0 + Duration::minutes(exit_minute),
            exit_price,
            exit_reason: if net_pnl >= 0.0 {
                ExitReason::Target
            } else {
                ExitReason::StopLoss
            },
            quantity: 1,
            partial_exits: 0,
            gross_pnl: net_pnl,
            commission: 0.0,
            net_pnl,
            tick_delta: net_pnl / 12.5,
            duration_secs: exit_minute * 60,
            bars_held: exit_minute as usize,
            mae_ticks: 0.0,
            mfe_ticks: 0.0,
            legs: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::make_trade;
    use super::*;
    use execlab_core::domain::ExitReason;

    fn trades(pnls: &[f64]) -> Vec<Trade> {
        pnls.iter()
            .enumerate()
            .map(|(i, &p)| make_trade(p, i as i64 + 1))
            .collect()
    }

    // ── Summary ──

    #[test]
    fn summary_serializes_exactly_eleven_keys() {
        let summary = PerformanceSummary::from_trades(&trades(&[100.0, -50.0]), 10_000.0, 252.0);
        let value = serde_json::to_value(summary).unwrap();
        let mut keys: Vec<&str> = value.as_object().unwrap().keys().map(String::as_str).collect();
        keys.sort_unstable();
        let mut expected = vec![
            "total_trades",
            "total_pnl",
            "win_rate",
            "profit_factor",
            "sharpe_ratio",
            "max_drawdown_dollars",
            "max_drawdown_percent",
            "average_win",
            "average_loss",
            "final_equity",
            "total_return",
        ];
        expected.sort_unstable();
        assert_eq!(keys, expected);
    }

    #[test]
    fn hand_computed_summary() {
        // Equity: 10_000 → 10_200 → 10_100 → 10_400 → 10_300
        let summary =
            PerformanceSummary::from_trades(&trades(&[200.0, -100.0, 300.0, -100.0]), 10_000.0, 252.0);
        assert_eq!(summary.total_trades, 4);
        assert!((summary.total_pnl - 300.0).abs() < 1e-9);
        assert!((summary.win_rate - 0.5).abs() < 1e-12);
        assert!((summary.profit_factor - 2.5).abs() < 1e-12);
        assert!((summary.average_win - 250.0).abs() < 1e-9);
        assert!((summary.average_loss + 100.0).abs() < 1e-9);
        assert!((summary.final_equity - 10_300.0).abs() < 1e-9);
        assert!((summary.total_return - 3.0).abs() < 1e-9);
        // Worst fall: 10_400 → 10_300 (100) vs 10_200 → 10_100 (100); percent favors the lower peak.
        assert!((summary.max_drawdown_dollars - 100.0).abs() < 1e-9);
        assert!((summary.max_drawdown_percent - 100.0 / 10_200.0 * 100.0).abs() < 1e-9);
        assert!(summary.sharpe_ratio > 0.0);
    }

    #[test]
    fn no_trades_is_all_zero_but_equity() {
        let summary = PerformanceSummary::from_trades(&[], 50_000.0, 252.0);
        assert_eq!(summary.total_trades, 0);
        assert_eq!(summary.win_rate, 0.0);
        assert_eq!(summary.profit_factor, 0.0);
        assert_eq!(summary.sharpe_ratio, 0.0);
        assert_eq!(summary.max_drawdown_dollars, 0.0);
        assert_eq!(summary.final_equity, 50_000.0);
        assert_eq!(summary.total_return, 0.0);
    }

    #[test]
    fn summary_is_recomputed_not_accumulated() {
        let list = trades(&[120.0, -40.0, 75.0]);
        let a = PerformanceSummary::from_trades(&list, 10_000.0, 252.0);
        let b = PerformanceSummary::from_trades(&list, 10_000.0, 252.0);
        assert_eq!(a, b);
        let shorter = PerformanceSummary::from_trades(&list[..2], 10_000.0, 252.0);
        assert_eq!(shorter.total_trades, 2);
        assert!((shorter.total_pnl - 80.0).abs() < 1e-9);
    }

    // ── Profit factor ──

    #[test]
    fn profit_factor_edge_cases() {
        assert_eq!(profit_factor(&[]), 0.0);
        assert_eq!(profit_factor(&trades(&[0.0, 0.0])), 0.0);
        assert_eq!(profit_factor(&trades(&[10.0, 20.0])), PROFIT_FACTOR_CAP);
        assert_eq!(profit_factor(&trades(&[-10.0])), 0.0);
        assert_eq!(profit_factor(&trades(&[1_000_000.0, -1.0])), 1_000_000.0);
    }

    #[test]
    fn profit_factor_above_cap_is_not_clamped() {
        assert_eq!(profit_factor(&trades(&[10_000.0, -50.0])), 200.0);
    }

    // ── Sharpe ──

    #[test]
    fn sharpe_needs_two_varied_returns() {
        assert_eq!(sharpe_ratio(&[], 252.0), 0.0);
        assert_eq!(sharpe_ratio(&[0.01], 252.0), 0.0);
        assert_eq!(sharpe_ratio(&[0.01, 0.01, 0.01], 252.0), 0.0);
    }

    #[test]
    fn sharpe_known_value() {
        // mean 0.02, sample variance 0.0004 / 3, √4 = 2
        let returns = [0.01, 0.03, 0.03, 0.01];
        let std = std_dev(&returns);
        assert!((std - (0.0004_f64 / 3.0).sqrt()).abs() < 1e-12);
        let expected = 0.02 / std * 2.0;
        assert!((sharpe_ratio(&returns, 4.0) - expected).abs() < 1e-9);
    }

    #[test]
    fn trade_returns_use_equity_before_each_trade() {
        let returns = trade_returns(&trades(&[1_000.0, -1_100.0]), 10_000.0);
        assert!((returns[0] - 0.1).abs() < 1e-12);
        assert!((returns[1] + 0.1).abs() < 1e-12);
    }

    // ── Drawdown ──

    #[test]
    fn drawdown_from_first_trade_loss() {
        let curve = equity_curve(&trades(&[-500.0, 200.0]), 10_000.0);
        assert_eq!(curve, vec![10_000.0, 9_500.0, 9_700.0]);
        let (dollars, percent) = max_drawdown(&curve);
        assert!((dollars - 500.0).abs() < 1e-9);
        assert!((percent - 5.0).abs() < 1e-9);
    }

    #[test]
    fn monotonic_equity_has_no_drawdown() {
        let curve = equity_curve(&trades(&[10.0, 20.0, 30.0]), 1_000.0);
        assert_eq!(max_drawdown(&curve), (0.0, 0.0));
    }

    // ── Streaks and breakdowns ──

    #[test]
    fn streaks_count_runs() {
        let s = TradeStreaks::from_trades(&trades(&[10.0, 10.0, 10.0, -5.0, -5.0, 10.0, -5.0]));
        assert_eq!(s.max_consecutive_wins, 3);
        assert_eq!(s.max_consecutive_losses, 2);
        assert!((s.avg_losing_streak - 1.5).abs() < 1e-12);
    }

    #[test]
    fn breakdown_by_exit_reason() {
        let list = trades(&[100.0, -50.0, 200.0, -25.0]);
        let groups = by_exit_reason(&list);
        assert_eq!(groups.len(), 2);
        let target = &groups[ExitReason::Target.as_str()];
        assert_eq!(target.trades, 2);
        assert!((target.total_pnl - 300.0).abs() < 1e-9);
        assert_eq!(target.win_rate, 1.0);
        let stops = &groups[ExitReason::StopLoss.as_str()];
        assert!((stops.average_pnl + 37.5).abs() < 1e-9);
        assert_eq!(stops.profit_factor, 0.0);

        let regimes = by_regime(&list);
        assert_eq!(regimes["NORMAL"].trades, 4);
    }
}
