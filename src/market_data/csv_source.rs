// External crates
use async_trait::async_trait;
use polars::prelude::*;
use std::path::PathBuf;

// Local modules
use super::PriceSource;
use crate::error::Result;
use crate::util::file_utils::read_price_csv;

/// Serves the tail of a local CSV price history
pub struct CsvPriceSource {
    path: PathBuf,
}

impl CsvPriceSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl PriceSource for CsvPriceSource {
    fn name(&self) -> &str {
        "csv"
    }

    async fn fetch(&self, hours: usize) -> Result<DataFrame> {
        let path = self.path.clone();
        let df = tokio::task::spawn_blocking(move || read_price_csv(path)).await??;
        let height = df.height();
        Ok(df.slice(height.saturating_sub(hours) as i64, hours))
    }
}
