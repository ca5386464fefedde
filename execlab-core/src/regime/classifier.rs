//! Regime classifier — ATR percent and directional strength over a rolling window.
//!
//! Volatility: ATR = mean true range over the window, expressed as a percent
//! of the mean close (`atr_pct`).
//! Trend: a simplified ADX. +DM/-DM and TR are summed over the window,
//! +DI = 100 * sum(+DM) / sum(TR), -DI likewise, and
//! strength = 100 * |+DI - -DI| / (+DI + -DI).
//!
//! Fewer than `min_bars` bars ⇒ `NORMAL` with `sufficient_data = false`.

use serde::{Deserialize, Serialize};

use super::RegimeLabel;
use crate::domain::Bar;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VolatilityClass {
    High,
    Normal,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrendClass {
    Trending,
    Choppy,
}

/// Classifier thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegimeConfig {
    /// Bars considered (the most recent `window`).
    pub window: usize,
    /// Below this many bars the classifier returns `NORMAL`.
    pub min_bars: usize,
    /// `atr_pct` above this is HIGH volatility (percent, 0.15 = 0.15%).
    pub high_vol_atr_pct: f64,
    /// `atr_pct` below this is LOW volatility.
    pub low_vol_atr_pct: f64,
    /// Directional strength above this is TRENDING (0–100 scale).
    pub trend_threshold: f64,
}

impl Default for RegimeConfig {
    fn default() -> Self {
        Self {
            window: 50,
            min_bars: 20,
            high_vol_atr_pct: 0.15,
            low_vol_atr_pct: 0.05,
            trend_threshold: 20.0,
        }
    }
}

/// Result of one classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeSnapshot {
    pub label: RegimeLabel,
    pub atr: f64,
    pub atr_pct: f64,
    pub trend_strength: f64,
    pub bars_used: usize,
    pub sufficient_data: bool,
}

impl RegimeSnapshot {
    fn insufficient(bars_used: usize) -> Self {
        Self {
            label: RegimeLabel::Normal,
            atr: 0.0,
            atr_pct: 0.0,
            trend_strength: 0.0,
            bars_used,
            sufficient_data: false,
        }
    }
}

/// Stateless regime classifier. Construct one per run and pass it by reference.
#[derive(Debug, Clone, Default)]
pub struct RegimeClassifier {
    config: RegimeConfig,
}

impl RegimeClassifier {
    pub fn new(config: RegimeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RegimeConfig {
        &self.config
    }

    /// Classify the most recent `window` bars of `bars`.
    pub fn classify(&self, bars: &[Bar]) -> RegimeSnapshot {
        if bars.len() < self.config.min_bars.max(2) {
            return RegimeSnapshot::insufficient(bars.len());
        }
        let start = bars.len().saturating_sub(self.config.window.max(2));
        let window = &bars[start..];

        let tr = true_range(window);
        let atr = tr.iter().sum::<f64>() / tr.len() as f64;
        let mean_close = window.iter().map(|b| b.close).sum::<f64>() / window.len() as f64;
        // A window with no range carries no volatility or direction signal.
        if !atr.is_finite() || atr <= 0.0 || !mean_close.is_finite() || mean_close <= 0.0 {
            return RegimeSnapshot::insufficient(window.len());
        }

        let atr_pct = atr / mean_close * 100.0;
        let trend_strength = directional_strength(window);

        let volatility = if atr_pct > self.config.high_vol_atr_pct {
            VolatilityClass::High
        } else if atr_pct < self.config.low_vol_atr_pct {
            VolatilityClass::Low
        } else {
            VolatilityClass::Normal
        };
        let trend = if trend_strength > self.config.trend_threshold {
            TrendClass::Trending
        } else {
            TrendClass::Choppy
        };

        RegimeSnapshot {
            label: RegimeLabel::combine(volatility, trend),
            atr,
            atr_pct,
            trend_strength,
            bars_used: window.len(),
            sufficient_data: true,
        }
    }
}

/// True Range series. TR[0] = high - low; TR[t] = max(h-l, |h-pc|, |l-pc|).
pub fn true_range(bars: &[Bar]) -> Vec<f64> {
    let mut tr = Vec::with_capacity(bars.len());
    for (i, bar) in bars.iter().enumerate() {
        let range = bar.high - bar.low;
        if i == 0 {
            tr.push(range);
            continue;
        }
        let pc = bars[i - 1].close;
        tr.push(range.max((bar.high - pc).abs()).max((bar.low - pc).abs()));
    }
    tr
}

/// Directional strength on a 0–100 scale (window-summed DX).
pub fn directional_strength(bars: &[Bar]) -> f64 {
    if bars.len() < 2 {
        return 0.0;
    }
    let tr = true_range(bars);
    let mut plus_dm = 0.0;
    let mut minus_dm = 0.0;
    let mut tr_sum = 0.0;

    for i in 1..bars.len() {
        let up = bars[i].high - bars[i - 1].high;
        let down = bars[i - 1].low - bars[i].low;
        if up > down && up > 0.0 {
            plus_dm += up;
        }
        if down > up && down > 0.0 {
            minus_dm += down;
        }
        tr_sum += tr[i];
    }

    if tr_sum <= 0.0 {
        return 0.0;
    }
    let plus_di = 100.0 * plus_dm / tr_sum;
    let minus_di = 100.0 * minus_dm / tr_sum;
    let di_sum = plus_di + minus_di;
    if di_sum <= 0.0 {
        return 0.0;
    }
    100.0 * (plus_di - minus_di).abs() / di_sum
}

/// Remembers the last label so regime changes can be logged.
#[derive(Debug, Clone, Default)]
pub struct RegimeTracker {
    current: Option<RegimeLabel>,
    changes: usize,
}

impl RegimeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a snapshot. Returns the previous label when the regime changed.
    pub fn observe(&mut self, symbol: &str, snapshot: &RegimeSnapshot) -> Option<RegimeLabel> {
        let previous = self.current.replace(snapshot.label);
        match previous {
            Some(prev) if prev != snapshot.label => {
                self.changes += 1;
                tracing::debug!(
                    symbol,
                    from = %prev,
                    to = %snapshot.label,
                    atr_pct = snapshot.atr_pct,
                    trend_strength = snapshot.trend_strength,
                    "regime change"
                );
                Some(prev)
            }
            _ => None,
        }
    }

    pub fn current(&self) -> RegimeLabel {
        self.current.unwrap_or_default()
    }

    pub fn changes(&self) -> usize {
        self.changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    /// Bars with closes following `closes`, open = previous close, symmetric range.
    fn bars_from(closes: &[f64], range: f64) -> Vec<Bar> {
        let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 14, 30, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| {
                let open = if i == 0 { close } else { closes[i - 1] };
                Bar {
                    symbol: "ES".into(),
                    timestamp: t0 + Duration::minutes(i as i64),
                    open,
                    high: open.max(close) + range / 2.0,
                    low: open.min(close) - range / 2.0,
                    close,
                    volume: 500,
                }
            })
            .collect()
    }

    #[test]
    fn too_few_bars_is_normal() {
        let closes: Vec<f64> = (0..19).map(|i| 4500.0 + i as f64 * 5.0).collect();
        let snap = RegimeClassifier::default().classify(&bars_from(&closes, 2.0));
        assert_eq!(snap.label, RegimeLabel::Normal);
        assert!(!snap.sufficient_data);
    }

    #[test]
    fn flat_window_is_normal_without_data() {
        let closes = vec![4500.0; 30];
        let snap = RegimeClassifier::default().classify(&bars_from(&closes, 0.0));
        assert_eq!(snap.label, RegimeLabel::Normal);
        assert!(!snap.sufficient_data);
        assert_eq!(snap.atr_pct, 0.0);
        assert_eq!(snap.bars_used, 30);
    }

    #[test]
    fn steady_grind_is_low_vol_trending() {
        // Each bar: +0.25 close step, 1.0 range → ATR ≈ 1.25 on ~4506 ≈ 0.028%
        let closes: Vec<f64> = (0..50).map(|i| 4500.0 + i as f64 * 0.25).collect();
        let snap = RegimeClassifier::default().classify(&bars_from(&closes, 1.0));
        assert!(snap.sufficient_data);
        assert!(snap.atr_pct < 0.05, "atr_pct = {}", snap.atr_pct);
        assert!(snap.trend_strength > 90.0);
        assert_eq!(snap.label, RegimeLabel::LowVolTrending);
    }

    #[test]
    fn whipsaw_is_high_vol_choppy() {
        // Highs and lows step up and down by 5 alternately: +DM and -DM balance.
        let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 14, 30, 0).unwrap();
        let bars: Vec<Bar> = (0..50)
            .map(|i| {
                let (high, low, close) = if i % 2 == 0 {
                    (4505.0, 4495.0, 4500.0)
                } else {
                    (4510.0, 4500.0, 4505.0)
                };
                Bar {
                    symbol: "ES".into(),
                    timestamp: t0 + Duration::minutes(i),
                    open: close,
                    high,
                    low,
                    close,
                    volume: 500,
                }
            })
            .collect();
        let snap = RegimeClassifier::default().classify(&bars);
        assert!(snap.atr_pct > 0.15, "atr_pct = {}", snap.atr_pct);
        assert!(snap.trend_strength < 20.0, "strength = {}", snap.trend_strength);
        assert_eq!(snap.label, RegimeLabel::HighVolChoppy);
    }

    #[test]
    fn strong_trend_with_wide_bars_is_high_vol_trending() {
        let closes: Vec<f64> = (0..50).map(|i| 4500.0 + i as f64 * 8.0).collect();
        let snap = RegimeClassifier::default().classify(&bars_from(&closes, 4.0));
        assert_eq!(snap.label, RegimeLabel::HighVolTrending);
    }

    #[test]
    fn only_the_last_window_is_used() {
        // Wide fast trend (would be HIGH_VOL_TRENDING), then a slow grind.
        let mut closes: Vec<f64> = (0..50).map(|i| 4000.0 + i as f64 * 8.0).collect();
        closes.extend((1..=50).map(|i| 4392.0 + i as f64 * 0.25));
        let snap = RegimeClassifier::default().classify(&bars_from(&closes, 1.0));
        assert_eq!(snap.bars_used, 50);
        assert_eq!(snap.label, RegimeLabel::LowVolTrending);
    }

    #[test]
    fn classification_is_pure() {
        let closes: Vec<f64> = (0..60).map(|i| 4500.0 + (i as f64 * 0.3).sin() * 4.0).collect();
        let bars = bars_from(&closes, 2.0);
        let c = RegimeClassifier::default();
        assert_eq!(c.classify(&bars), c.classify(&bars));
    }

    #[test]
    fn true_range_uses_previous_close() {
        let bars = bars_from(&[100.0, 110.0], 0.0);
        let tr = true_range(&bars);
        assert_eq!(tr[0], 0.0);
        // high = 110, low = 100, prev close = 100
        assert_eq!(tr[1], 10.0);
    }

    #[test]
    fn tracker_reports_changes_only() {
        let mut tracker = RegimeTracker::new();
        let mut snap = RegimeSnapshot::insufficient(0);
        assert_eq!(tracker.observe("ES", &snap), None);
        assert_eq!(tracker.observe("ES", &snap), None);
        snap.label = RegimeLabel::HighVolChoppy;
        assert_eq!(tracker.observe("ES", &snap), Some(RegimeLabel::Normal));
        assert_eq!(tracker.current(), RegimeLabel::HighVolChoppy);
        assert_eq!(tracker.changes(), 1);
    }
}
