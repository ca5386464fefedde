//! Post-trade analysis: signal price versus realized fill, per order style.
//!
//! Read-only statistics for tuning tools. Nothing here feeds back into the
//! simulation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ExitReason, OrderSide, OrderStyle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillKind {
    Entry,
    Exit,
}

/// One fill's execution quality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionQualityRecord {
    pub symbol: String,
    pub time: DateTime<Utc>,
    pub kind: FillKind,
    /// Exit reason; `None` for entries.
    pub reason: Option<ExitReason>,
    pub side: OrderSide,
    pub style: OrderStyle,
    pub quantity: u32,
    pub signal_price: f64,
    pub fill_price: f64,
    /// Adverse distance between signal and fill, in ticks (negative = improvement).
    pub slippage_ticks: f64,
    pub estimated_cost_ticks: f64,
    /// Slippage plus per-contract commission, in ticks.
    pub actual_cost_ticks: f64,
}

impl ExecutionQualityRecord {
    /// Estimation error: positive when the fill cost more than estimated.
    pub fn cost_surprise_ticks(&self) -> f64 {
        self.actual_cost_ticks - self.estimated_cost_ticks
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StyleStats {
    pub fills: usize,
    pub contracts: u64,
    pub mean_slippage_ticks: f64,
    pub worst_slippage_ticks: f64,
    pub mean_estimated_cost_ticks: f64,
    pub mean_actual_cost_ticks: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStats {
    pub total_fills: usize,
    pub passive: StyleStats,
    pub aggressive: StyleStats,
}

#[derive(Debug, Clone, Default)]
pub struct PostTradeAnalyzer {
    records: Vec<ExecutionQualityRecord>,
}

impl PostTradeAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, record: ExecutionQualityRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[ExecutionQualityRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<ExecutionQualityRecord> {
        self.records
    }

    pub fn stats(&self) -> ExecutionStats {
        summarize(&self.records)
    }
}

/// Aggregate any record slice, e.g. a run result's quality tape.
pub fn summarize(records: &[ExecutionQualityRecord]) -> ExecutionStats {
    ExecutionStats {
        total_fills: records.len(),
        passive: style_stats(records, OrderStyle::Passive),
        aggressive: style_stats(records, OrderStyle::Aggressive),
    }
}

fn style_stats(records: &[ExecutionQualityRecord], style: OrderStyle) -> StyleStats {
    let selected: Vec<&ExecutionQualityRecord> =
        records.iter().filter(|r| r.style == style).collect();
    if selected.is_empty() {
        return StyleStats::default();
    }
    let n = selected.len() as f64;
    StyleStats {
        fills: selected.len(),
        contracts: selected.iter().map(|r| r.quantity as u64).sum(),
        mean_slippage_ticks: selected.iter().map(|r| r.slippage_ticks).sum::<f64>() / n,
        worst_slippage_ticks: selected
            .iter()
            .map(|r| r.slippage_ticks)
            .fold(f64::NEG_INFINITY, f64::max),
        mean_estimated_cost_ticks: selected.iter().map(|r| r.estimated_cost_ticks).sum::<f64>()
            / n,
        mean_actual_cost_ticks: selected.iter().map(|r| r.actual_cost_ticks).sum::<f64>() / n,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn rec(style: OrderStyle, slippage: f64, estimated: f64) -> ExecutionQualityRecord {
        ExecutionQualityRecord {
            symbol: "ES".into(),
            time: Utc.with_ymd_and_hms(2024, 3, 1, 14, 30, 0).unwrap(),
            kind: FillKind::Exit,
            reason: Some(ExitReason::Target),
            side: OrderSide::Sell,
            style,
            quantity: 2,
            signal_price: 4510.0,
            fill_price: 4510.0,
            slippage_ticks: slippage,
            estimated_cost_ticks: estimated,
            actual_cost_ticks: slippage + 0.2,
        }
    }

    #[test]
    fn stats_split_by_style() {
        let mut analyzer = PostTradeAnalyzer::new();
        analyzer.record(rec(OrderStyle::Passive, 0.0, 0.2));
        analyzer.record(rec(OrderStyle::Aggressive, 1.0, 1.2));
        analyzer.record(rec(OrderStyle::Aggressive, 3.0, 1.2));

        let stats = analyzer.stats();
        assert_eq!(stats.total_fills, 3);
        assert_eq!(stats.passive.fills, 1);
        assert_eq!(stats.aggressive.fills, 2);
        assert_eq!(stats.aggressive.contracts, 4);
        assert!((stats.aggressive.mean_slippage_ticks - 2.0).abs() < 1e-12);
        assert_eq!(stats.aggressive.worst_slippage_ticks, 3.0);
        assert!((stats.aggressive.mean_actual_cost_ticks - 2.2).abs() < 1e-12);
    }

    #[test]
    fn empty_style_is_default() {
        let analyzer = PostTradeAnalyzer::new();
        assert_eq!(analyzer.stats(), ExecutionStats::default());
    }

    #[test]
    fn cost_surprise() {
        let r = rec(OrderStyle::Aggressive, 3.0, 1.2);
        assert!((r.cost_surprise_ticks() - 2.0).abs() < 1e-12);
    }
}
