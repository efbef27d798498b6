// External crates
use async_trait::async_trait;
use log::debug;
use polars::prelude::*;
use serde_json::Value;
use std::time::Duration;

// Local modules
use super::{ticks_to_frame, PriceSource, PriceTick};
use crate::error::{PredictorError, Result};

const SERVICE: &str = "binance";
const MAX_KLINES_PER_REQUEST: usize = 1000;
const HOUR_MS: i64 = 3_600_000;

/// Hourly klines from the Binance public REST API
pub struct BinanceKlineSource {
    client: reqwest::Client,
    base_url: String,
    symbol: String,
}

impl BinanceKlineSource {
    pub fn new(base_url: &str, symbol: &str, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| PredictorError::external(SERVICE, e))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            symbol: symbol.to_uppercase(),
        })
    }

    async fn fetch_page(&self, end_time: Option<i64>, limit: usize) -> Result<Vec<PriceTick>> {
        let mut url = format!(
            "{}/api/v3/klines?symbol={}&interval=1h&limit={}",
            self.base_url, self.symbol, limit
        );
        if let Some(end) = end_time {
            url.push_str(&format!("&endTime={}", end));
        }

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| PredictorError::external(SERVICE, e))?;
        if !response.status().is_success() {
            return Err(PredictorError::external(
                SERVICE,
                format!("klines request returned HTTP {}", response.status()),
            ));
        }
        let rows: Vec<Vec<Value>> = response
            .json()
            .await
            .map_err(|e| PredictorError::external(SERVICE, format!("malformed payload: {}", e)))?;

        rows.iter().map(|row| parse_kline(row)).collect()
    }
}

fn decimal_field(row: &[Value], idx: usize) -> Result<f64> {
    row.get(idx)
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse::<f64>().ok())
        .ok_or_else(|| PredictorError::external(SERVICE, format!("bad kline field {}", idx)))
}

/// Parses one kline array: `[open_time, open, high, low, close, volume, ...]`
pub fn parse_kline(row: &[Value]) -> Result<PriceTick> {
    let timestamp = row
        .first()
        .and_then(|v| v.as_i64())
        .ok_or_else(|| PredictorError::external(SERVICE, "kline without open time"))?;
    Ok(PriceTick {
        timestamp,
        open: decimal_field(row, 1)?,
        high: decimal_field(row, 2)?,
        low: decimal_field(row, 3)?,
        close: decimal_field(row, 4)?,
        volume: decimal_field(row, 5)?,
    })
}

#[async_trait]
impl PriceSource for BinanceKlineSource {
    fn name(&self) -> &str {
        "binance"
    }

    async fn fetch(&self, hours: usize) -> Result<DataFrame> {
        let mut ticks: Vec<PriceTick> = Vec::with_capacity(hours);
        let mut end_time = None;

        // Page backwards from now until enough history is collected
        while ticks.len() < hours {
            let limit = (hours - ticks.len()).min(MAX_KLINES_PER_REQUEST);
            let page = self.fetch_page(end_time, limit).await?;
            debug!("Fetched {} klines for {}", page.len(), self.symbol);
            let Some(first) = page.first() else {
                break;
            };
            end_time = Some(first.timestamp - HOUR_MS);
            let exhausted = page.len() < limit;
            let mut page = page;
            page.extend(ticks);
            ticks = page;
            if exhausted {
                break;
            }
        }

        if ticks.is_empty() {
            return Err(PredictorError::external(SERVICE, "no klines returned"));
        }
        ticks_to_frame(&ticks)
    }
}
