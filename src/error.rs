// External crates
use polars::error::PolarsError;
use thiserror::Error;

/// Errors surfaced by the forecasting pipeline and the service around it.
///
/// Every variant maps to a stable machine-readable code (see [`PredictorError::code`]);
/// the HTTP layer turns that into a status and a JSON envelope.
#[derive(Debug, Error)]
pub enum PredictorError {
    /// Bad or missing input: columns, shapes, parameters, timeframes.
    #[error("validation error: {0}")]
    Validation(String),

    /// Price feed or news source unreachable, misconfigured or returned garbage.
    #[error("external service '{service}' failed: {message}")]
    ExternalService { service: String, message: String },

    /// Prediction requested before any model was trained or loaded.
    #[error("model has not been trained or loaded")]
    NotTrained,

    /// Persisted artifact is missing, truncated or incompatible.
    #[error("failed to load model artifact: {0}")]
    ModelLoad(String),

    /// Scaler or feature layout differs between training and inference.
    #[error("shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },

    #[error("a training run is already in progress")]
    TrainingInProgress,

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, PredictorError>;

impl PredictorError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn external(service: impl Into<String>, message: impl ToString) -> Self {
        Self::ExternalService {
            service: service.into(),
            message: message.to_string(),
        }
    }

    pub fn shape_mismatch(expected: impl ToString, actual: impl ToString) -> Self {
        Self::ShapeMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Stable code used in error envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::ExternalService { .. } => "EXTERNAL_SERVICE_ERROR",
            Self::NotTrained => "NOT_TRAINED",
            Self::ModelLoad(_) => "MODEL_LOAD_ERROR",
            Self::ShapeMismatch { .. } => "SHAPE_MISMATCH",
            Self::TrainingInProgress => "TRAINING_IN_PROGRESS",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Conflict(_) => "CONFLICT",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the message may be shown to API callers verbatim.
    pub fn is_client_safe(&self) -> bool {
        !matches!(self, Self::Internal(_) | Self::ModelLoad(_) | Self::ShapeMismatch { .. })
    }
}

impl From<PolarsError> for PredictorError {
    fn from(err: PolarsError) -> Self {
        match err {
            PolarsError::ColumnNotFound(msg) => {
                Self::Validation(format!("column not found: {}", msg))
            }
            other => Self::Internal(format!("dataframe error: {}", other)),
        }
    }
}

impl From<std::io::Error> for PredictorError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(format!("io error: {}", err))
    }
}

impl From<serde_json::Error> for PredictorError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("serialization error: {}", err))
    }
}

impl From<config::ConfigError> for PredictorError {
    fn from(err: config::ConfigError) -> Self {
        Self::Validation(format!("configuration error: {}", err))
    }
}

impl From<tokio::task::JoinError> for PredictorError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Internal(format!("background task failed: {}", err))
    }
}
