// Price columns every tick must carry
pub const REQUIRED_PRICE_COLUMNS: [&str; 5] = ["timestamp", "close", "high", "low", "volume"];

// Technical indicator columns, in the order they are appended
pub const TECHNICAL_INDICATORS: [&str; 13] = [
    "rsi",
    "macd",
    "macd_signal",
    "macd_hist",
    "ema_9",
    "ema_21",
    "ema_50",
    "ema_200",
    "bb_upper",
    "bb_middle",
    "bb_lower",
    "obv",
    "mom",
];

// Sentiment fields and the columns they are broadcast into
pub const SENTIMENT_FIELDS: [&str; 4] = ["compound", "positive", "negative", "neutral"];
pub const SENTIMENT_COLUMNS: [&str; 4] = [
    "sentiment_compound",
    "sentiment_positive",
    "sentiment_negative",
    "sentiment_neutral",
];

// Raw price columns that are part of the model input
pub const PRICE_FEATURES: [&str; 4] = ["close", "high", "low", "volume"];

pub const TARGET_COLUMN: &str = "close";

// Indicator parameters
pub const RSI_PERIOD: usize = 14;
pub const MACD_FAST: usize = 12;
pub const MACD_SLOW: usize = 26;
pub const MACD_SIGNAL: usize = 9;
pub const EMA_PERIODS: [usize; 4] = [9, 21, 50, 200];
pub const BOLLINGER_PERIOD: usize = 20;
pub const BOLLINGER_STD_DEV: f64 = 2.0;
pub const MOMENTUM_PERIOD: usize = 10;

// Model parameters
pub const SEQUENCE_LENGTH: usize = 60; // Number of time steps to look back
pub const DEFAULT_HIDDEN_SIZE: usize = 50;
pub const DEFAULT_DROPOUT: f64 = 0.2;
pub const DEFAULT_DENSE_UNITS: usize = 25;

// Training defaults
pub const DEFAULT_BATCH_SIZE: usize = 32;
pub const DEFAULT_EPOCHS: usize = 50;
pub const VALIDATION_SPLIT_RATIO: f64 = 0.2; // 20% of samples for validation
pub const EARLY_STOPPING_PATIENCE: usize = 10;
pub const DEFAULT_LEARNING_RATE: f64 = 0.001;

// Price feed granularity; every tick is one hour
pub const TICKS_PER_DAY: usize = 24;
pub const MAX_TRAINING_DAYS: u32 = 365;

// Fixed value reported until a real confidence metric exists
pub const PLACEHOLDER_CONFIDENCE: f64 = 0.5;

// Model paths
pub const MODEL_PATH: &str = "models/lstm_model.bin";
pub const CHECKPOINT_FILE_NAME: &str = "best_checkpoint.bin";

/// Full model input column order: price, indicators, then sentiment.
pub fn feature_columns() -> Vec<&'static str> {
    PRICE_FEATURES
        .iter()
        .chain(TECHNICAL_INDICATORS.iter())
        .chain(SENTIMENT_COLUMNS.iter())
        .copied()
        .collect()
}
