//! Layered service configuration: defaults, optional TOML file, environment.

use config::{Config, Environment, File};
use log::warn;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::constants::{
    CHECKPOINT_FILE_NAME, DEFAULT_BATCH_SIZE, DEFAULT_DENSE_UNITS, DEFAULT_DROPOUT, DEFAULT_EPOCHS,
    DEFAULT_HIDDEN_SIZE, DEFAULT_LEARNING_RATE, EARLY_STOPPING_PATIENCE, MODEL_PATH,
    SEQUENCE_LENGTH, VALIDATION_SPLIT_RATIO,
};
use crate::error::{PredictorError, Result};
use crate::market_data::PriceSourceKind;

pub const ENV_PREFIX: &str = "BTC_PREDICTOR";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_allowed_origins: vec!["http://localhost:3000".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub path: PathBuf,
    pub checkpoint_path: PathBuf,
    pub version: String,
    pub sequence_length: usize,
    pub hidden_size: usize,
    pub dropout: f64,
    pub dense_units: usize,
    pub batch_size: usize,
    pub epochs: usize,
    pub validation_split: f64,
    pub early_stopping_patience: usize,
    pub learning_rate: f64,
    pub seed: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        let path = PathBuf::from(MODEL_PATH);
        let checkpoint_path = path
            .parent()
            .map(|dir| dir.join(CHECKPOINT_FILE_NAME))
            .unwrap_or_else(|| PathBuf::from(CHECKPOINT_FILE_NAME));
        Self {
            path,
            checkpoint_path,
            version: env!("CARGO_PKG_VERSION").to_string(),
            sequence_length: SEQUENCE_LENGTH,
            hidden_size: DEFAULT_HIDDEN_SIZE,
            dropout: DEFAULT_DROPOUT,
            dense_units: DEFAULT_DENSE_UNITS,
            batch_size: DEFAULT_BATCH_SIZE,
            epochs: DEFAULT_EPOCHS,
            validation_split: VALIDATION_SPLIT_RATIO,
            early_stopping_patience: EARLY_STOPPING_PATIENCE,
            learning_rate: DEFAULT_LEARNING_RATE,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub source: PriceSourceKind,
    pub binance_base_url: String,
    pub symbol: String,
    pub csv_path: Option<PathBuf>,
    /// Seed for the random-walk feed; unset means a fresh seed per start
    pub random_seed: Option<u64>,
    pub fetch_timeout_secs: u64,
    /// History pulled for predictions and indicator snapshots
    pub prediction_lookback_days: u32,
    pub run_log_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            source: PriceSourceKind::RandomWalk,
            binance_base_url: "https://api.binance.com".to_string(),
            symbol: "BTCUSDT".to_string(),
            csv_path: None,
            random_seed: None,
            fetch_timeout_secs: 10,
            prediction_lookback_days: 30,
            run_log_dir: PathBuf::from("runs"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NewsConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub timeout_secs: u64,
    /// Days of articles aggregated into one sentiment vector
    pub window_days: u32,
    /// Serve canned headlines instead of calling the news API
    pub use_mock_feed: bool,
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            timeout_secs: 10,
            window_days: 1,
            use_mock_feed: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub secret_key: String,
    pub token_expire_minutes: i64,
    /// bcrypt work factor for stored passwords
    pub bcrypt_cost: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret_key: "change-me-in-production".to_string(),
            token_expire_minutes: 30,
            bcrypt_cost: bcrypt::DEFAULT_COST,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub data: DataConfig,
    pub news: NewsConfig,
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
}

/// Environment variable names kept from earlier deployments
const LEGACY_ENV: [(&str, &str); 6] = [
    ("ML_SERVICE_HOST", "server.host"),
    ("ML_SERVICE_PORT", "server.port"),
    ("NEWS_API_KEY", "news.api_key"),
    ("JWT_SECRET_KEY", "auth.secret_key"),
    ("MODEL_VERSION", "model.version"),
    ("MODEL_PATH", "model.path"),
];

impl AppConfig {
    /// Loads `.env`, then defaults, the optional TOML file and the environment
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        if let Err(e) = dotenvy::dotenv() {
            warn!("No .env file loaded: {}", e);
        }

        let mut builder = Config::builder();
        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).required(false));
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__"),
        );

        for (var, key) in LEGACY_ENV {
            builder = builder.set_override_option(key, std::env::var(var).ok())?;
        }
        let origins = std::env::var("CORS_ALLOWED_ORIGINS").ok().map(|raw| {
            raw.split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect::<Vec<String>>()
        });
        builder = builder.set_override_option("server.cors_allowed_origins", origins)?;

        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the service cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(PredictorError::validation("server.port must be non-zero"));
        }
        let model = &self.model;
        if model.sequence_length == 0
            || model.hidden_size == 0
            || model.batch_size == 0
            || model.epochs == 0
        {
            return Err(PredictorError::validation(
                "model sizes (sequence_length, hidden_size, batch_size, epochs) must be positive",
            ));
        }
        if !(0.0..1.0).contains(&model.validation_split) {
            return Err(PredictorError::validation("model.validation_split must be in [0, 1)"));
        }
        if !(0.0..1.0).contains(&model.dropout) {
            return Err(PredictorError::validation("model.dropout must be in [0, 1)"));
        }
        if model.learning_rate <= 0.0 {
            return Err(PredictorError::validation("model.learning_rate must be positive"));
        }
        if self.auth.secret_key.trim().is_empty() {
            return Err(PredictorError::validation("auth.secret_key must not be empty"));
        }
        if self.auth.token_expire_minutes <= 0 {
            return Err(PredictorError::validation("auth.token_expire_minutes must be positive"));
        }
        if !(4..=31).contains(&self.auth.bcrypt_cost) {
            return Err(PredictorError::validation("auth.bcrypt_cost must be between 4 and 31"));
        }
        if self.data.source == PriceSourceKind::Csv && self.data.csv_path.is_none() {
            return Err(PredictorError::validation("data.csv_path is required for the csv source"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.model.sequence_length, 60);
        assert_eq!(config.news.window_days, 1);
        assert_eq!(config.data.source, PriceSourceKind::RandomWalk);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[model]\nepochs = 3\nsequence_length = 12\n\n[data]\nsource = \"binance\"").unwrap();

        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.model.epochs, 3);
        assert_eq!(config.model.sequence_length, 12);
        assert_eq!(config.model.hidden_size, DEFAULT_HIDDEN_SIZE);
        assert_eq!(config.data.source, PriceSourceKind::Binance);
    }

    #[test]
    fn test_invalid_split_rejected() {
        let mut config = AppConfig::default();
        config.model.validation_split = 1.0;
        assert!(matches!(config.validate(), Err(PredictorError::Validation(_))));
    }

    #[test]
    fn test_csv_source_needs_path() {
        let mut config = AppConfig::default();
        config.data.source = PriceSourceKind::Csv;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bcrypt_cost_bounds() {
        let mut config = AppConfig::default();
        assert_eq!(config.auth.bcrypt_cost, bcrypt::DEFAULT_COST);
        config.auth.bcrypt_cost = 3;
        assert!(config.validate().is_err());
        config.auth.bcrypt_cost = 4;
        assert!(config.validate().is_ok());
    }
}
