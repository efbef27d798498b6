// Shared doubles for the service and API suites
use async_trait::async_trait;
use polars::prelude::DataFrame;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

use crate::config::ModelConfig;
use crate::error::{PredictorError, Result};
use crate::market_data::{PriceSource, RandomWalkSource};
use crate::sentiment::{NewsArticle, NewsSource, SentimentAggregator, StaticNewsSource, VaderScorer};
use crate::service::{PredictionService, ServiceSettings};

/// Seeded random walk that counts fetches
pub struct CountingSource {
    inner: RandomWalkSource,
    calls: AtomicUsize,
}

impl CountingSource {
    pub fn new(seed: u64) -> Self {
        Self {
            inner: RandomWalkSource::new(Some(seed)),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PriceSource for CountingSource {
    fn name(&self) -> &str {
        "counting"
    }

    async fn fetch(&self, hours: usize) -> Result<DataFrame> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.fetch(hours).await
    }
}

/// Blocks inside `fetch` until released, then fails
pub struct GatedSource {
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
}

#[async_trait]
impl PriceSource for GatedSource {
    fn name(&self) -> &str {
        "gated"
    }

    async fn fetch(&self, _hours: usize) -> Result<DataFrame> {
        self.entered.notify_one();
        self.release.notified().await;
        Err(PredictorError::external("gated", "released"))
    }
}

pub struct OfflineNews;

#[async_trait]
impl NewsSource for OfflineNews {
    async fn fetch_articles(&self, _days: u32) -> Result<Vec<NewsArticle>> {
        Err(PredictorError::external("news", "offline"))
    }
}

/// Tiny network and short window so training runs in seconds
pub fn small_settings(dir: &Path) -> ServiceSettings {
    ServiceSettings {
        model: ModelConfig {
            path: dir.join("lstm_model.bin"),
            checkpoint_path: dir.join("best_checkpoint.bin"),
            sequence_length: 12,
            hidden_size: 8,
            dense_units: 4,
            dropout: 0.0,
            batch_size: 64,
            epochs: 2,
            early_stopping_patience: 2,
            ..ModelConfig::default()
        },
        sentiment_window_days: 1,
        prediction_lookback_days: 10,
        run_log_dir: Some(dir.join("runs")),
    }
}

pub fn mock_sentiment() -> SentimentAggregator {
    SentimentAggregator::new(
        Arc::new(StaticNewsSource::sample(10)),
        Arc::new(VaderScorer::new()),
    )
}

pub fn offline_sentiment() -> SentimentAggregator {
    SentimentAggregator::new(Arc::new(OfflineNews), Arc::new(VaderScorer::new()))
}

pub fn counting_service(dir: &Path, source: Arc<CountingSource>) -> PredictionService {
    PredictionService::new(source, mock_sentiment(), small_settings(dir))
}
