use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use super::MarketDataProvider;
use crate::error::{MarkovError, Result};
use crate::types::{DailyClose, PriceHistory, Symbol};

pub const BINANCE_US_API: &str = "https://api.binance.us";

/// Binance caps a single klines request at 1000 candles.
const MAX_KLINES: u32 = 1000;

/// Public (unsigned) Binance REST endpoints used for daily closes and quotes.
#[derive(Debug, Clone)]
pub struct BinanceClient {
    client: Client,
    base_url: String,
    history_days: u32,
}

#[derive(Debug, Deserialize)]
struct TickerPriceResponse {
    price: String,
}

impl BinanceClient {
    pub fn new(base_url: impl Into<String>, history_days: u32, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MarkovError::invalid(format!("http client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            history_days: history_days.clamp(2, MAX_KLINES),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, symbol: &Symbol, url: &str) -> Result<T> {
        debug!("GET {}", url);
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| MarkovError::unavailable(symbol.as_str(), e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(MarkovError::unavailable(
                symbol.as_str(),
                format!("HTTP {}: {}", status, body),
            ));
        }

        resp.json::<T>()
            .await
            .map_err(|e| MarkovError::unavailable(symbol.as_str(), e))
    }
}

/// Turn a klines payload (`[open_time, open, high, low, close, volume, close_time, ...]`)
/// into daily closes. Candles still open at `now` are dropped; their close is a live price.
pub fn parse_klines(
    symbol: &Symbol,
    klines: Vec<Vec<serde_json::Value>>,
    now: DateTime<Utc>,
) -> Result<PriceHistory> {
    let unavailable = |reason: String| MarkovError::unavailable(symbol.as_str(), reason);
    let now_ms = now.timestamp_millis();

    let mut closes = Vec::with_capacity(klines.len());
    for k in klines {
        let open_time = k
            .first()
            .and_then(|v| v.as_i64())
            .ok_or_else(|| unavailable("kline missing open time".to_string()))?;
        let close = k
            .get(4)
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse::<f64>().ok())
            .ok_or_else(|| unavailable("kline missing close".to_string()))?;
        let close_time = k
            .get(6)
            .and_then(|v| v.as_i64())
            .ok_or_else(|| unavailable("kline missing close time".to_string()))?;

        if close_time > now_ms {
            debug!("Dropping unfinished {} candle opened at {}", symbol, open_time);
            continue;
        }

        let date = Utc
            .timestamp_millis_opt(open_time)
            .single()
            .ok_or_else(|| unavailable(format!("bad open time {}", open_time)))?
            .date_naive();
        closes.push(DailyClose { date, close });
    }

    Ok(PriceHistory::new(symbol.clone(), closes))
}

#[async_trait]
impl MarketDataProvider for BinanceClient {
    async fn daily_history(&self, symbol: &Symbol) -> Result<PriceHistory> {
        let url = format!(
            "{}/api/v3/klines?symbol={}&interval=1d&limit={}",
            self.base_url,
            symbol.as_str(),
            self.history_days
        );

        let resp: Vec<Vec<serde_json::Value>> = self.get_json(symbol, &url).await?;
        let history = parse_klines(symbol, resp, Utc::now())?;

        info!("Fetched {} daily closes for {}", history.len(), symbol);
        Ok(history)
    }

    async fn current_price(&self, symbol: &Symbol) -> Result<f64> {
        let url = format!("{}/api/v3/ticker/price?symbol={}", self.base_url, symbol.as_str());
        let resp: TickerPriceResponse = self.get_json(symbol, &url).await?;

        resp.price
            .parse::<f64>()
            .map_err(|e| MarkovError::unavailable(symbol.as_str(), format!("bad price '{}': {}", resp.price, e)))
    }
}
