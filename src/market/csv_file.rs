use std::path::PathBuf;

use async_trait::async_trait;
use chrono::NaiveDate;
use csv::ReaderBuilder;
use tracing::{info, warn};

use super::MarketDataProvider;
use crate::error::{MarkovError, Result};
use crate::types::{DailyClose, PriceHistory, Symbol};

/// Offline provider reading `<dir>/<SYMBOL>.csv` daily-price downloads.
///
/// Needs a header row with `Date` (YYYY-MM-DD) and `Close` columns; other
/// columns are ignored. Rows whose close is not a number (e.g. `null`) are skipped.
/// The live quote is the latest close in the file.
#[derive(Debug, Clone)]
pub struct CsvPriceFiles {
    dir: PathBuf,
}

impl CsvPriceFiles {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn file_for(&self, symbol: &Symbol) -> PathBuf {
        self.dir.join(format!("{}.csv", symbol.as_str()))
    }

    fn read(&self, symbol: &Symbol) -> Result<PriceHistory> {
        let path = self.file_for(symbol);
        let unavailable = |reason: String| MarkovError::unavailable(symbol.as_str(), reason);

        let mut reader = ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(&path)
            .map_err(|e| unavailable(format!("{}: {}", path.display(), e)))?;

        let headers = reader
            .headers()
            .map_err(|e| unavailable(e.to_string()))?
            .clone();
        let column = |name: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(name));
        let date_col = column("date").ok_or_else(|| unavailable("missing Date column".to_string()))?;
        let close_col =
            column("close").ok_or_else(|| unavailable("missing Close column".to_string()))?;

        let mut closes = Vec::new();
        let mut skipped = 0usize;
        for record in reader.records() {
            let record = record.map_err(|e| unavailable(e.to_string()))?;
            let date = record
                .get(date_col)
                .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok());
            let close = record.get(close_col).and_then(|s| s.parse::<f64>().ok());

            match (date, close) {
                (Some(date), Some(close)) => closes.push(DailyClose { date, close }),
                _ => skipped += 1,
            }
        }

        if skipped > 0 {
            warn!("Skipped {} unparsable rows in {}", skipped, path.display());
        }

        Ok(PriceHistory::new(symbol.clone(), closes))
    }
}

#[async_trait]
impl MarketDataProvider for CsvPriceFiles {
    async fn daily_history(&self, symbol: &Symbol) -> Result<PriceHistory> {
        let history = self.read(symbol)?;
        if history.is_empty() {
            return Err(MarkovError::unavailable(symbol.as_str(), "no parsable closes in file"));
        }
        info!("Loaded {} daily closes for {}", history.len(), symbol);
        Ok(history)
    }

    async fn current_price(&self, symbol: &Symbol) -> Result<f64> {
        self.read(symbol)?
            .last_close()
            .ok_or_else(|| MarkovError::unavailable(symbol.as_str(), "no closes in file"))
    }
}
