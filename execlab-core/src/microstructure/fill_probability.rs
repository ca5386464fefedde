//! Passive fill probability and expected wait.
//!
//! A resting buy joins the bid queue and is filled by sellers, so the
//! opposing size is the ask size and the queue ahead is the bid size.
//! Sells mirror.

use serde::{Deserialize, Serialize};

use crate::domain::{OrderSide, Quote};

use super::condition::MarketCondition;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FillProbabilityConfig {
    /// Longest a passive order may wait.
    pub timeout_secs: f64,
    /// Below this probability the estimator recommends aggressive execution.
    pub min_probability: f64,
    /// Contracts per second removed from the front of the queue.
    pub depletion_rate_per_sec: f64,
}

impl Default for FillProbabilityConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10.0,
            min_probability: 0.5,
            depletion_rate_per_sec: 5.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FillEstimate {
    pub probability: f64,
    /// Capped at the timeout.
    pub expected_wait_secs: f64,
    pub recommend_wait: bool,
}

#[derive(Debug, Clone, Default)]
pub struct FillProbabilityEstimator {
    config: FillProbabilityConfig,
}

impl FillProbabilityEstimator {
    pub fn new(config: FillProbabilityConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FillProbabilityConfig {
        &self.config
    }

    pub fn estimate(&self, side: OrderSide, quote: &Quote, condition: MarketCondition) -> FillEstimate {
        let (same, opposing) = match side {
            OrderSide::Buy => (quote.bid_size, quote.ask_size),
            OrderSide::Sell => (quote.ask_size, quote.bid_size),
        };
        let total = same as f64 + opposing as f64;
        let raw = if total > 0.0 { opposing as f64 / total } else { 0.0 };
        let probability = (raw * condition.fill_discount()).clamp(0.0, 1.0);

        let timeout = self.config.timeout_secs;
        let expected_wait_secs = if self.config.depletion_rate_per_sec > 0.0 {
            (same as f64 / self.config.depletion_rate_per_sec).min(timeout)
        } else {
            timeout
        };

        FillEstimate {
            probability,
            expected_wait_secs,
            recommend_wait: probability >= self.config.min_probability
                && expected_wait_secs < timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn quote(bid_size: u64, ask_size: u64) -> Quote {
        Quote {
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 14, 30, 0).unwrap(),
            bid: 4499.75,
            bid_size,
            ask: 4500.0,
            ask_size,
            last: 4500.0,
        }
    }

    #[test]
    fn heavy_opposing_side_recommends_waiting() {
        // Passive sell: the bid side (80) takes our offer; 20 ahead of us.
        let est = FillProbabilityEstimator::default().estimate(
            OrderSide::Sell,
            &quote(80, 20),
            MarketCondition::Normal,
        );
        assert!((est.probability - 0.8).abs() < 1e-12);
        assert!((est.expected_wait_secs - 4.0).abs() < 1e-12);
        assert!(est.recommend_wait);
    }

    #[test]
    fn light_opposing_side_goes_aggressive() {
        let est = FillProbabilityEstimator::default().estimate(
            OrderSide::Sell,
            &quote(20, 80),
            MarketCondition::Normal,
        );
        assert!((est.probability - 0.2).abs() < 1e-12);
        assert!(!est.recommend_wait);
    }

    #[test]
    fn wait_is_capped_at_timeout() {
        let est = FillProbabilityEstimator::default().estimate(
            OrderSide::Buy,
            &quote(500, 900),
            MarketCondition::Normal,
        );
        assert_eq!(est.expected_wait_secs, 10.0);
        assert!(!est.recommend_wait);
    }

    #[test]
    fn stressed_market_discounts_probability() {
        let est = FillProbabilityEstimator::default().estimate(
            OrderSide::Sell,
            &quote(80, 20),
            MarketCondition::Stressed,
        );
        assert!((est.probability - 0.4).abs() < 1e-12);
        assert!(!est.recommend_wait);
    }

    #[test]
    fn extreme_sizes_do_not_overflow() {
        let est = FillProbabilityEstimator::default().estimate(
            OrderSide::Sell,
            &quote(u64::MAX, u64::MAX),
            MarketCondition::Normal,
        );
        assert!((est.probability - 0.5).abs() < 1e-12);
        assert_eq!(est.expected_wait_secs, FillProbabilityConfig::default().timeout_secs);
    }

    #[test]
    fn empty_book_has_zero_probability() {
        let est = FillProbabilityEstimator::default().estimate(
            OrderSide::Buy,
            &quote(0, 0),
            MarketCondition::Normal,
        );
        assert_eq!(est.probability, 0.0);
    }
}
