use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::Symbol;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyClose {
    pub date: NaiveDate,
    pub close: f64,
}

/// Daily closing prices for one symbol, oldest first.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceHistory {
    pub symbol: Symbol,
    pub closes: Vec<DailyClose>,
}

impl PriceHistory {
    /// Providers may deliver newest-first; the series is always stored ascending.
    pub fn new(symbol: Symbol, mut closes: Vec<DailyClose>) -> Self {
        closes.sort_by_key(|c| c.date);
        Self { symbol, closes }
    }

    pub fn len(&self) -> usize {
        self.closes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.closes.is_empty()
    }

    pub fn prices(&self) -> Vec<f64> {
        self.closes.iter().map(|c| c.close).collect()
    }

    pub fn last_close(&self) -> Option<f64> {
        self.closes.last().map(|c| c.close)
    }
}
