//! Price feeds: every source yields hourly OHLCV ticks as a DataFrame.

pub mod binance;
pub mod cache;
pub mod csv_source;
pub mod random_walk;

use async_trait::async_trait;
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use binance::BinanceKlineSource;
pub use cache::CachedPriceSource;
pub use csv_source::CsvPriceSource;
pub use random_walk::RandomWalkSource;

/// One hourly OHLCV tick; `timestamp` is epoch milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceTick {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Supplies the most recent `hours` ticks of price history
#[async_trait]
pub trait PriceSource: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch(&self, hours: usize) -> Result<DataFrame>;
}

/// Which price feed the service pulls from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSourceKind {
    #[default]
    RandomWalk,
    Binance,
    Csv,
}

/// Builds a price frame with columns `timestamp, open, high, low, close, volume`
pub fn ticks_to_frame(ticks: &[PriceTick]) -> Result<DataFrame> {
    let df = DataFrame::new(vec![
        Series::new(
            "timestamp".into(),
            ticks.iter().map(|t| t.timestamp).collect::<Vec<i64>>(),
        )
        .into_column(),
        Series::new("open".into(), ticks.iter().map(|t| t.open).collect::<Vec<f64>>())
            .into_column(),
        Series::new("high".into(), ticks.iter().map(|t| t.high).collect::<Vec<f64>>())
            .into_column(),
        Series::new("low".into(), ticks.iter().map(|t| t.low).collect::<Vec<f64>>())
            .into_column(),
        Series::new("close".into(), ticks.iter().map(|t| t.close).collect::<Vec<f64>>())
            .into_column(),
        Series::new("volume".into(), ticks.iter().map(|t| t.volume).collect::<Vec<f64>>())
            .into_column(),
    ])?;
    Ok(df)
}
