// External imports
use chrono::{SecondsFormat, Utc};
use log::{info, warn};
use polars::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

// Internal imports
use super::timeframe::Timeframe;
use crate::config::{AppConfig, ModelConfig};
use crate::constants::{
    feature_columns, MAX_TRAINING_DAYS, PLACEHOLDER_CONFIDENCE, TARGET_COLUMN,
    TECHNICAL_INDICATORS, TICKS_PER_DAY,
};
use crate::error::{PredictorError, Result};
use crate::lstm::step_1_tensor_preparation::{prepare_sequences, scale};
use crate::lstm::{EpochMetrics, ModelArchitecture, PricePredictor, TrainingConfig, TrainingContext};
use crate::market_data::{
    BinanceKlineSource, CachedPriceSource, CsvPriceSource, PriceSource, PriceSourceKind,
    RandomWalkSource,
};
use crate::sentiment::{
    NewsApiClient, NewsSource, SentimentAggregator, SentimentVector, StaticNewsSource, VaderScorer,
};
use crate::util::feature_engineering::{add_sentiment_columns, calculate_indicators, latest_values};
use crate::util::model_logger::TrainingRunRecord;
use crate::util::pre_processor::{column_f64, column_i64};

pub const CONFIDENCE_METHOD: &str = "placeholder";

/// Service-level knobs derived from [`AppConfig`]
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub model: ModelConfig,
    pub sentiment_window_days: u32,
    pub prediction_lookback_days: u32,
    pub run_log_dir: Option<PathBuf>,
}

impl ServiceSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            model: config.model.clone(),
            sentiment_window_days: config.news.window_days.max(1),
            prediction_lookback_days: config.data.prediction_lookback_days,
            run_log_dir: Some(config.data.run_log_dir.clone()),
        }
    }

    fn architecture(&self) -> ModelArchitecture {
        ModelArchitecture::new(0)
            .with_hidden_size(self.model.hidden_size)
            .with_dropout(self.model.dropout)
            .with_dense_units(self.model.dense_units)
    }

    fn training_config(&self) -> TrainingConfig {
        TrainingConfig {
            learning_rate: self.model.learning_rate,
            batch_size: self.model.batch_size,
            epochs: self.model.epochs,
            validation_split: self.model.validation_split,
            patience: self.model.early_stopping_patience,
            checkpoint_path: Some(self.model.checkpoint_path.clone()),
            seed: self.model.seed,
        }
    }
}

/// Outcome of a training request
#[derive(Debug, Clone, Serialize)]
pub struct TrainingSummary {
    pub message: String,
    pub model_version: String,
    pub samples: usize,
    pub features: usize,
    pub sequence_length: usize,
    pub epochs_run: usize,
    pub best_epoch: usize,
    pub best_val_loss: Option<f64>,
    pub history: Vec<EpochMetrics>,
    pub model_path: String,
    pub trained_at: String,
}

/// Forecast for one timeframe
#[derive(Debug, Clone, Serialize)]
pub struct PredictionResponse {
    pub timestamp: String,
    pub timeframe: Timeframe,
    pub horizon_hours: usize,
    pub current_price: f64,
    pub predicted_price: f64,
    pub price_change_pct: f64,
    /// Fixed value until a calibrated metric exists; see `confidence_method`
    pub confidence: f64,
    pub confidence_method: String,
    pub technical_indicators: BTreeMap<String, f64>,
    pub sentiment: SentimentVector,
}

/// Indicator values and sentiment for the latest tick
#[derive(Debug, Clone, Serialize)]
pub struct IndicatorSnapshot {
    pub timestamp: i64,
    pub close: f64,
    pub technical_indicators: BTreeMap<String, f64>,
    pub sentiment: SentimentVector,
}

/// Orchestrates fetch, feature engineering, training and prediction
pub struct PredictionService {
    price_source: Arc<dyn PriceSource>,
    sentiment: SentimentAggregator,
    settings: ServiceSettings,
    predictor: Mutex<PricePredictor>,
    training_lock: tokio::sync::Mutex<()>,
}

impl PredictionService {
    pub fn new(
        price_source: Arc<dyn PriceSource>,
        sentiment: SentimentAggregator,
        settings: ServiceSettings,
    ) -> Self {
        let predictor = PricePredictor::new(settings.architecture());
        Self {
            price_source,
            sentiment,
            settings,
            predictor: Mutex::new(predictor),
            training_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Wires price feed, news feed and settings from configuration
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let data = &config.data;
        let base: Arc<dyn PriceSource> = match data.source {
            PriceSourceKind::RandomWalk => Arc::new(RandomWalkSource::new(data.random_seed)),
            PriceSourceKind::Binance => Arc::new(BinanceKlineSource::new(
                &data.binance_base_url,
                &data.symbol,
                data.fetch_timeout_secs,
            )?),
            PriceSourceKind::Csv => {
                let path = data.csv_path.clone().ok_or_else(|| {
                    PredictorError::validation("data.csv_path is required for the csv source")
                })?;
                Arc::new(CsvPriceSource::new(path))
            }
        };
        let price_source = Arc::new(CachedPriceSource::new(
            base,
            Duration::from_secs(data.fetch_timeout_secs),
        ));

        let news = &config.news;
        let news_source: Arc<dyn NewsSource> = if news.use_mock_feed {
            Arc::new(StaticNewsSource::sample(10))
        } else {
            match &news.base_url {
                Some(url) => Arc::new(NewsApiClient::with_base_url(
                    news.api_key.clone(),
                    news.timeout_secs,
                    url,
                )?),
                None => Arc::new(NewsApiClient::new(news.api_key.clone(), news.timeout_secs)?),
            }
        };
        let sentiment = SentimentAggregator::new(news_source, Arc::new(VaderScorer::new()));

        info!(
            "Prediction service using '{}' prices, model at {}",
            price_source.name(),
            config.model.path.display()
        );
        Ok(Self::new(price_source, sentiment, ServiceSettings::from_config(config)))
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    fn snapshot_predictor(&self) -> Result<PricePredictor> {
        self.predictor
            .lock()
            .map(|guard| guard.clone())
            .map_err(|_| PredictorError::Internal("model slot poisoned".into()))
    }

    fn install_predictor(&self, predictor: PricePredictor) -> Result<()> {
        let mut guard = self
            .predictor
            .lock()
            .map_err(|_| PredictorError::Internal("model slot poisoned".into()))?;
        *guard = predictor;
        Ok(())
    }

    pub fn is_model_loaded(&self) -> bool {
        self.snapshot_predictor().map(|p| p.is_ready()).unwrap_or(false)
    }

    /// Loads the configured artifact if one exists
    ///
    /// Returns `Ok(false)` when there is no artifact yet. A corrupt artifact is
    /// an error and leaves the service without a model.
    pub fn load_existing_model(&self) -> Result<bool> {
        let path = &self.settings.model.path;
        if !path.exists() {
            info!("No model artifact at {}, train one first", path.display());
            return Ok(false);
        }
        let mut predictor = self.snapshot_predictor()?;
        predictor.load(path)?;
        self.install_predictor(predictor)?;
        Ok(true)
    }

    /// Fetches `days` of prices and builds the full feature frame
    async fn build_feature_frame(&self, days: u32) -> Result<(DataFrame, SentimentVector)> {
        let hours = days as usize * TICKS_PER_DAY;
        let prices = self.price_source.fetch(hours).await?;
        let with_indicators = calculate_indicators(&prices)?;
        let sentiment = self
            .sentiment
            .aggregate_or_neutral(self.settings.sentiment_window_days)
            .await;
        let frame = add_sentiment_columns(&with_indicators, &sentiment)?;
        Ok((frame, sentiment))
    }

    /// Trains a new model on the last `days` of hourly prices
    ///
    /// Only one training run may be active; a concurrent request fails with
    /// `TrainingInProgress`. The new model replaces the current one only
    /// after its artifact has been written.
    pub async fn train(&self, days: u32) -> Result<TrainingSummary> {
        if !(1..=MAX_TRAINING_DAYS).contains(&days) {
            return Err(PredictorError::validation(format!(
                "days must be between 1 and {}, got {}",
                MAX_TRAINING_DAYS, days
            )));
        }
        let _guard = self
            .training_lock
            .try_lock()
            .map_err(|_| PredictorError::TrainingInProgress)?;

        info!("Training requested on {} days of data", days);
        let started = Instant::now();
        let (frame, _) = self.build_feature_frame(days).await?;

        let settings = self.settings.clone();
        let template = PricePredictor::new(settings.architecture());
        let (predictor, outcome, samples) = tokio::task::spawn_blocking(move || {
            let features = feature_columns();
            let mut scaled_columns = features.clone();
            if !scaled_columns.contains(&TARGET_COLUMN) {
                scaled_columns.push(TARGET_COLUMN);
            }
            let (scaled, scaler) = scale(&frame, &scaled_columns)?;
            let (x, y) = prepare_sequences(
                &scaled,
                settings.model.sequence_length,
                TARGET_COLUMN,
                &features,
            )?;

            let context = TrainingContext {
                sequence_length: settings.model.sequence_length,
                feature_columns: features.iter().map(|c| c.to_string()).collect(),
                target_column: TARGET_COLUMN.to_string(),
                scaler,
            };
            let mut predictor = template;
            let outcome = predictor.train(&x, &y, &settings.training_config(), context)?;
            predictor.save(&settings.model.path)?;
            Ok::<_, PredictorError>((predictor, outcome, x.dim().0))
        })
        .await??;

        self.install_predictor(predictor)?;

        let has_validation = outcome.history.iter().any(|m| m.val_loss.is_some());
        let best_val_loss = has_validation.then_some(outcome.best_loss);
        let model = &self.settings.model;
        let elapsed = started.elapsed().as_secs_f64();
        info!(
            "Training finished in {:.1}s: {} samples, {} epochs, best epoch {}",
            elapsed,
            samples,
            outcome.history.len(),
            outcome.best_epoch
        );

        if let Some(dir) = &self.settings.run_log_dir {
            let mut record =
                TrainingRunRecord::new(&model.version, days, samples, feature_columns().len());
            record.sequence_length = model.sequence_length;
            record.hidden_size = model.hidden_size;
            record.dense_units = model.dense_units;
            record.dropout = model.dropout;
            record.batch_size = model.batch_size;
            record.learning_rate = model.learning_rate;
            record.epochs_run = outcome.history.len();
            record.best_epoch = outcome.best_epoch;
            record.best_val_loss = best_val_loss;
            record.set_training_time(elapsed);
            if outcome.stopped_early {
                record.add_note("stopped early");
            }
            if let Err(e) = record.save(dir) {
                warn!("Failed to write training run log: {}", e);
            }
        }

        Ok(TrainingSummary {
            message: "Model trained successfully".to_string(),
            model_version: model.version.clone(),
            samples,
            features: feature_columns().len(),
            sequence_length: model.sequence_length,
            epochs_run: outcome.history.len(),
            best_epoch: outcome.best_epoch,
            best_val_loss,
            history: outcome.history,
            model_path: model.path.display().to_string(),
            trained_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        })
    }

    /// Parses a timeframe label, then predicts; bad labels never reach a feed
    pub async fn predict_by_label(&self, label: &str) -> Result<PredictionResponse> {
        let timeframe: Timeframe = label.parse()?;
        self.predict(timeframe).await
    }

    /// Forecasts the close price `timeframe` ahead
    pub async fn predict(&self, timeframe: Timeframe) -> Result<PredictionResponse> {
        let predictor = self.snapshot_predictor()?;
        let sequence_length = predictor
            .metadata()
            .map(|m| m.sequence_length)
            .ok_or(PredictorError::NotTrained)?;

        // Enough history for the indicator warm-up plus one input window
        let window_days = sequence_length.div_ceil(TICKS_PER_DAY) as u32 + 1;
        let days = self.settings.prediction_lookback_days.max(window_days);
        let (frame, sentiment) = self.build_feature_frame(days).await?;

        let close = column_f64(&frame, TARGET_COLUMN)?;
        let current_price = close
            .last()
            .copied()
            .ok_or_else(|| PredictorError::validation("no price data available"))?;
        let technical_indicators = indicator_map(&frame)?;

        let steps = timeframe.steps();
        let forecast =
            tokio::task::spawn_blocking(move || predictor.forecast(&frame, steps)).await??;
        let predicted_price = forecast
            .last()
            .copied()
            .ok_or_else(|| PredictorError::Internal("empty forecast".into()))?;

        let price_change_pct = if current_price != 0.0 {
            (predicted_price - current_price) / current_price * 100.0
        } else {
            0.0
        };
        info!(
            "Predicted {} ahead: {:.2} -> {:.2} ({:+.2}%)",
            timeframe, current_price, predicted_price, price_change_pct
        );

        Ok(PredictionResponse {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            timeframe,
            horizon_hours: steps,
            current_price,
            predicted_price,
            price_change_pct,
            confidence: PLACEHOLDER_CONFIDENCE,
            confidence_method: CONFIDENCE_METHOD.to_string(),
            technical_indicators,
            sentiment,
        })
    }

    /// Indicator values and sentiment for the most recent tick
    pub async fn current_indicators(&self) -> Result<IndicatorSnapshot> {
        let days = self.settings.prediction_lookback_days.max(1);
        let (frame, sentiment) = self.build_feature_frame(days).await?;
        let timestamp = column_i64(&frame, "timestamp")?
            .last()
            .copied()
            .ok_or_else(|| PredictorError::validation("no price data available"))?;
        let close = column_f64(&frame, TARGET_COLUMN)?
            .last()
            .copied()
            .unwrap_or_default();
        Ok(IndicatorSnapshot {
            timestamp,
            close,
            technical_indicators: indicator_map(&frame)?,
            sentiment,
        })
    }
}

fn indicator_map(frame: &DataFrame) -> Result<BTreeMap<String, f64>> {
    Ok(latest_values(frame, &TECHNICAL_INDICATORS)?.into_iter().collect())
}
