//! Market condition — current spread against a rolling spread baseline.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::domain::Quote;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketCondition {
    Normal,
    Volatile,
    Illiquid,
    Stressed,
}

impl MarketCondition {
    /// Factor applied to configured slippage for aggressive fills.
    pub fn slippage_multiplier(self) -> f64 {
        match self {
            MarketCondition::Normal => 1.0,
            MarketCondition::Volatile => 1.5,
            MarketCondition::Illiquid => 2.0,
            MarketCondition::Stressed => 3.0,
        }
    }

    /// Factor applied to passive fill probability.
    pub fn fill_discount(self) -> f64 {
        match self {
            MarketCondition::Normal => 1.0,
            MarketCondition::Volatile => 0.85,
            MarketCondition::Illiquid => 0.7,
            MarketCondition::Stressed => 0.5,
        }
    }
}

/// Rolling mean of observed spreads.
#[derive(Debug, Clone)]
pub struct SpreadBaseline {
    window: usize,
    spreads: VecDeque<f64>,
    sum: f64,
}

impl SpreadBaseline {
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            window,
            spreads: VecDeque::with_capacity(window),
            sum: 0.0,
        }
    }

    pub fn observe(&mut self, spread: f64) {
        if !spread.is_finite() || spread < 0.0 {
            return;
        }
        if self.spreads.len() == self.window {
            if let Some(old) = self.spreads.pop_front() {
                self.sum -= old;
            }
        }
        self.spreads.push_back(spread);
        self.sum += spread;
    }

    pub fn mean(&self) -> Option<f64> {
        if self.spreads.is_empty() {
            None
        } else {
            Some(self.sum / self.spreads.len() as f64)
        }
    }

    pub fn len(&self) -> usize {
        self.spreads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spreads.is_empty()
    }
}

/// Thresholds for [`MarketConditionClassifier`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConditionConfig {
    pub baseline_window: usize,
    /// Spread ratio above which the market is volatile.
    pub volatile_ratio: f64,
    /// Spread ratio at or above which the market is stressed.
    pub stressed_ratio: f64,
    /// Top-of-book size below which the market is illiquid.
    pub thin_size: u64,
}

impl Default for ConditionConfig {
    fn default() -> Self {
        Self {
            baseline_window: 100,
            volatile_ratio: 1.2,
            stressed_ratio: 2.5,
            thin_size: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConditionReading {
    pub condition: MarketCondition,
    pub spread: f64,
    /// Baseline the spread was compared against (`None` before any observation).
    pub baseline: Option<f64>,
    pub ratio: f64,
}

/// Classifies quotes; owns the spread baseline of one symbol.
#[derive(Debug, Clone)]
pub struct MarketConditionClassifier {
    config: ConditionConfig,
    baseline: SpreadBaseline,
}

impl MarketConditionClassifier {
    pub fn new(config: ConditionConfig) -> Self {
        let baseline = SpreadBaseline::new(config.baseline_window);
        Self { config, baseline }
    }

    /// Classify `quote` against the baseline, then fold its spread in.
    pub fn observe(&mut self, quote: &Quote) -> ConditionReading {
        let reading = self.classify(quote);
        if quote.is_valid() {
            self.baseline.observe(quote.spread());
        }
        reading
    }

    /// Classify without updating the baseline.
    pub fn classify(&self, quote: &Quote) -> ConditionReading {
        let spread = quote.spread();
        let baseline = self.baseline.mean();
        let ratio = match baseline {
            Some(b) if b > 0.0 => spread / b,
            _ => 1.0,
        };
        let thin = quote.bid_size.min(quote.ask_size) < self.config.thin_size;

        let condition = if !quote.is_valid() || ratio >= self.config.stressed_ratio {
            MarketCondition::Stressed
        } else if thin {
            MarketCondition::Illiquid
        } else if ratio > self.config.volatile_ratio {
            MarketCondition::Volatile
        } else {
            MarketCondition::Normal
        };

        ConditionReading {
            condition,
            spread,
            baseline,
            ratio,
        }
    }

    pub fn baseline(&self) -> &SpreadBaseline {
        &self.baseline
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn quote(spread_ticks: f64, size: u64) -> Quote {
        let bid = 4500.0;
        Quote {
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 14, 30, 0).unwrap(),
            bid,
            bid_size: size,
            ask: bid + spread_ticks * 0.25,
            ask_size: size,
            last: bid,
        }
    }

    fn warmed() -> MarketConditionClassifier {
        let mut c = MarketConditionClassifier::new(ConditionConfig::default());
        for _ in 0..20 {
            c.observe(&quote(1.0, 50));
        }
        c
    }

    #[test]
    fn baseline_rolls() {
        let mut b = SpreadBaseline::new(3);
        for s in [1.0, 2.0, 3.0, 4.0] {
            b.observe(s);
        }
        assert_eq!(b.len(), 3);
        assert!((b.mean().unwrap() - 3.0).abs() < 1e-12);
    }

    #[test]
    fn normal_spread_is_normal() {
        assert_eq!(warmed().classify(&quote(1.0, 50)).condition, MarketCondition::Normal);
    }

    #[test]
    fn wide_spread_is_volatile_then_stressed() {
        let c = warmed();
        assert_eq!(c.classify(&quote(2.0, 50)).condition, MarketCondition::Volatile);
        assert_eq!(c.classify(&quote(3.0, 50)).condition, MarketCondition::Stressed);
    }

    #[test]
    fn thin_book_is_illiquid() {
        assert_eq!(warmed().classify(&quote(1.0, 2)).condition, MarketCondition::Illiquid);
    }

    #[test]
    fn first_quote_has_no_baseline() {
        let mut c = MarketConditionClassifier::new(ConditionConfig::default());
        let r = c.observe(&quote(4.0, 50));
        assert_eq!(r.baseline, None);
        assert_eq!(r.condition, MarketCondition::Normal);
        assert_eq!(c.baseline().len(), 1);
    }
}
