//! Queue monitor — polls a resting passive order against the quote stream.
//!
//! Polls happen at most once per `poll_interval_ms` until `timeout_secs`
//! after the start. A poll fills the order when the market trades through
//! it or the opposite touch reaches it. The order goes stale, and the caller
//! must reassess, once the same-side touch has moved `stale_ticks` or more
//! away from the resting price.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{OrderSide, Quote};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueMonitorConfig {
    pub poll_interval_ms: u64,
    pub timeout_secs: f64,
    pub stale_ticks: f64,
}

impl Default for QueueMonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            timeout_secs: 10.0,
            stale_ticks: 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum QueueOutcome {
    Filled {
        at: DateTime<Utc>,
        polls: usize,
    },
    /// Cancelled early: the market moved away. `quote` indexes the quote
    /// that showed the move.
    Stale {
        moved_ticks: f64,
        quote: usize,
        polls: usize,
    },
    /// The wait budget ran out. `last_quote` is the final quote polled.
    TimedOut {
        last_quote: Option<usize>,
        polls: usize,
    },
}

impl QueueOutcome {
    pub fn is_filled(&self) -> bool {
        matches!(self, QueueOutcome::Filled { .. })
    }

    /// Quote to fall back against when the passive order did not fill.
    pub fn fallback_quote(&self) -> Option<usize> {
        match self {
            QueueOutcome::Filled { .. } => None,
            QueueOutcome::Stale { quote, .. } => Some(*quote),
            QueueOutcome::TimedOut { last_quote, .. } => *last_quote,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueueMonitor {
    config: QueueMonitorConfig,
    tick_size: f64,
}

impl QueueMonitor {
    pub fn new(config: QueueMonitorConfig, tick_size: f64) -> Self {
        Self { config, tick_size }
    }

    pub fn config(&self) -> &QueueMonitorConfig {
        &self.config
    }

    /// Watch a resting order of `side` at `resting_price` from `start`.
    /// `quotes` must be in timestamp order.
    pub fn monitor(
        &self,
        side: OrderSide,
        resting_price: f64,
        quotes: &[Quote],
        start: DateTime<Utc>,
    ) -> QueueOutcome {
        self.monitor_with_budget(side, resting_price, quotes, start, self.config.timeout_secs)
    }

    /// [`monitor`](Self::monitor) with an explicit wait budget, capped at the timeout.
    pub fn monitor_with_budget(
        &self,
        side: OrderSide,
        resting_price: f64,
        quotes: &[Quote],
        start: DateTime<Utc>,
        budget_secs: f64,
    ) -> QueueOutcome {
        let budget = budget_secs.clamp(0.0, self.config.timeout_secs);
        let deadline = start + Duration::milliseconds((budget * 1000.0) as i64);
        let interval = Duration::milliseconds(self.config.poll_interval_ms.max(1) as i64);

        let mut next_poll = start;
        let mut polls = 0;
        let mut last_quote = None;

        for (index, quote) in quotes.iter().enumerate() {
            if quote.timestamp < next_poll {
                continue;
            }
            if quote.timestamp > deadline {
                break;
            }
            if !quote.is_valid() {
                continue;
            }
            polls += 1;
            last_quote = Some(index);
            next_poll = quote.timestamp + interval;

            if self.fills(side, resting_price, quote) {
                return QueueOutcome::Filled {
                    at: quote.timestamp,
                    polls,
                };
            }
            let moved_ticks = self.moved_away_ticks(side, resting_price, quote);
            if moved_ticks >= self.config.stale_ticks {
                return QueueOutcome::Stale {
                    moved_ticks,
                    quote: index,
                    polls,
                };
            }
        }

        QueueOutcome::TimedOut { last_quote, polls }
    }

    fn fills(&self, side: OrderSide, price: f64, quote: &Quote) -> bool {
        match side {
            OrderSide::Sell => quote.bid >= price || quote.last > price,
            OrderSide::Buy => quote.ask <= price || quote.last < price,
        }
    }

    /// How far the same-side touch has moved away from the resting price.
    fn moved_away_ticks(&self, side: OrderSide, price: f64, quote: &Quote) -> f64 {
        if self.tick_size <= 0.0 {
            return 0.0;
        }
        let moved = match side {
            OrderSide::Sell => price - quote.ask,
            OrderSide::Buy => quote.bid - price,
        };
        (moved / self.tick_size).max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 14, 30, 0).unwrap()
    }

    fn q(ms: i64, bid: f64, ask: f64, last: f64) -> Quote {
        Quote {
            timestamp: t0() + Duration::milliseconds(ms),
            bid,
            bid_size: 10,
            ask,
            ask_size: 10,
            last,
        }
    }

    fn monitor() -> QueueMonitor {
        QueueMonitor::new(QueueMonitorConfig::default(), 0.25)
    }

    #[test]
    fn sell_fills_when_traded_through() {
        let quotes = vec![
            q(0, 4509.5, 4509.75, 4509.75),
            q(600, 4509.75, 4510.0, 4510.0),
            q(1200, 4510.0, 4510.25, 4510.25),
        ];
        let out = monitor().monitor(OrderSide::Sell, 4510.0, &quotes, t0());
        assert!(out.is_filled());
        match out {
            QueueOutcome::Filled { polls, .. } => assert_eq!(polls, 3),
            other => panic!("expected fill, got {other:?}"),
        }
    }

    #[test]
    fn sell_goes_stale_when_market_drops() {
        let quotes = vec![
            q(0, 4509.75, 4510.0, 4510.0),
            q(600, 4509.25, 4509.5, 4509.5),
        ];
        match monitor().monitor(OrderSide::Sell, 4510.0, &quotes, t0()) {
            QueueOutcome::Stale {
                moved_ticks, quote, ..
            } => {
                assert_eq!(moved_ticks, 2.0);
                assert_eq!(quote, 1);
            }
            other => panic!("expected stale, got {other:?}"),
        }
    }

    #[test]
    fn times_out_after_budget() {
        let quotes: Vec<Quote> = (0..30)
            .map(|i| q(i * 1000, 4509.75, 4510.0, 4509.75))
            .collect();
        match monitor().monitor(OrderSide::Sell, 4510.0, &quotes, t0()) {
            QueueOutcome::TimedOut { last_quote, polls } => {
                // Quotes at 0s..=10s are inside the budget
                assert_eq!(polls, 11);
                assert_eq!(last_quote, Some(10));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[test]
    fn polls_respect_interval() {
        // Quotes every 100ms; polling every 500ms samples one in five
        let quotes: Vec<Quote> = (0..20)
            .map(|i| q(i * 100, 4509.75, 4510.0, 4509.75))
            .collect();
        let out = monitor().monitor_with_budget(OrderSide::Sell, 4510.0, &quotes, t0(), 1.9);
        match out {
            QueueOutcome::TimedOut { polls, .. } => assert_eq!(polls, 4),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[test]
    fn buy_fills_when_ask_reaches_price() {
        let quotes = vec![q(0, 4499.5, 4499.75, 4499.75), q(500, 4499.25, 4499.5, 4499.5)];
        assert!(monitor()
            .monitor(OrderSide::Buy, 4499.5, &quotes, t0())
            .is_filled());
    }

    #[test]
    fn no_quotes_times_out_without_fallback() {
        let out = monitor().monitor(OrderSide::Buy, 4500.0, &[], t0());
        assert_eq!(out.fallback_quote(), None);
    }
}
