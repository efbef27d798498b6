pub mod prediction_service;
pub mod timeframe;

pub use prediction_service::{
    IndicatorSnapshot, PredictionResponse, PredictionService, ServiceSettings, TrainingSummary,
};
pub use timeframe::Timeframe;
