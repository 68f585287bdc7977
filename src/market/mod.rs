pub mod binance;
pub mod csv_file;

pub use binance::BinanceClient;
pub use csv_file::CsvPriceFiles;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{PriceHistory, Symbol};

/// Source of daily closes and live quotes. Fetch failures surface as
/// `MarkovError::DataUnavailable`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn daily_history(&self, symbol: &Symbol) -> Result<PriceHistory>;
    async fn current_price(&self, symbol: &Symbol) -> Result<f64>;
}
