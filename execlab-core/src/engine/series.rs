//! One symbol's market data: bars plus an optional quote stream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Bar, Quote};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSeries {
    pub symbol: String,
    pub bars: Vec<Bar>,
    /// Sorted by timestamp. Only read in book-aware runs.
    pub quotes: Vec<Quote>,
}

impl MarketSeries {
    pub fn new(symbol: impl Into<String>, bars: Vec<Bar>) -> Self {
        Self {
            symbol: symbol.into(),
            bars,
            quotes: Vec::new(),
        }
    }

    pub fn with_quotes(mut self, mut quotes: Vec<Quote>) -> Self {
        quotes.sort_by_key(|q| q.timestamp);
        self.quotes = quotes;
        self
    }

    pub fn has_quotes(&self) -> bool {
        !self.quotes.is_empty()
    }

    /// Quotes in `[from, until)`, with the index of the first one.
    /// `until = None` runs to the end of the stream.
    pub fn quotes_between(
        &self,
        from: DateTime<Utc>,
        until: Option<DateTime<Utc>>,
    ) -> (usize, &[Quote]) {
        let start = self.quotes.partition_point(|q| q.timestamp < from);
        let end = until
            .map(|u| self.quotes.partition_point(|q| q.timestamp < u))
            .unwrap_or(self.quotes.len())
            .max(start);
        (start, &self.quotes[start..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t(sec: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 14, 30, 0).unwrap() + Duration::seconds(sec)
    }

    fn quote(sec: i64) -> Quote {
        Quote {
            timestamp: t(sec),
            bid: 4500.0,
            bid_size: 10,
            ask: 4500.25,
            ask_size: 10,
            last: 4500.0,
        }
    }

    #[test]
    fn quotes_are_windowed_half_open() {
        let series = MarketSeries::new("ES", Vec::new())
            .with_quotes(vec![quote(90), quote(0), quote(30), quote(60)]);
        let (start, window) = series.quotes_between(t(30), Some(t(90)));
        assert_eq!(start, 1);
        assert_eq!(window.len(), 2);
        assert_eq!(window[0].timestamp, t(30));

        let (_, tail) = series.quotes_between(t(60), None);
        assert_eq!(tail.len(), 2);
    }

    #[test]
    fn backwards_window_is_empty() {
        let series = MarketSeries::new("ES", Vec::new()).with_quotes(vec![quote(0), quote(30)]);
        let (_, window) = series.quotes_between(t(30), Some(t(0)));
        assert!(window.is_empty());
    }
}
