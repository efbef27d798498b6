// External imports
use log::{debug, info};
use ndarray::{Array1, Array3};
use polars::prelude::*;
use std::path::Path;

// Internal imports
use super::step_1_tensor_preparation::{feature_matrix, to_input_tensor, MinMaxScaler};
use super::step_3_lstm_model_arch::{ModelArchitecture, TimeSeriesLstm};
use super::step_4_train_model::{train_model, InferenceBackend, TrainingConfig, TrainingOutcome};
use super::step_6_model_serialization::{
    load_model_with_metadata, save_model_with_metadata, ModelMetadata,
};
use crate::error::{PredictorError, Result};

/// Column layout and scaler a model is trained under
#[derive(Debug, Clone)]
pub struct TrainingContext {
    pub sequence_length: usize,
    pub feature_columns: Vec<String>,
    pub target_column: String,
    pub scaler: MinMaxScaler,
}

/// A built or trained network plus everything needed to feed it
#[derive(Debug, Clone)]
pub struct TrainedModel {
    pub model: TimeSeriesLstm<InferenceBackend>,
    pub metadata: ModelMetadata,
}

/// Holds at most one model; predicting before build, train or load fails
#[derive(Debug, Clone)]
pub struct PricePredictor {
    architecture: ModelArchitecture,
    trained: Option<TrainedModel>,
}

impl PricePredictor {
    /// An empty predictor; `architecture.input_size` is replaced on build/train
    pub fn new(architecture: ModelArchitecture) -> Self {
        Self {
            architecture,
            trained: None,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.trained.is_some()
    }

    pub fn metadata(&self) -> Option<&ModelMetadata> {
        self.trained.as_ref().map(|t| &t.metadata)
    }

    fn require_model(&self) -> Result<&TrainedModel> {
        self.trained.as_ref().ok_or(PredictorError::NotTrained)
    }

    /// Builds an untrained network for `(sequence_length, n_features)` inputs
    pub fn build(&mut self, input_shape: (usize, usize)) -> Result<()> {
        let (sequence_length, n_features) = input_shape;
        if sequence_length == 0 || n_features == 0 {
            return Err(PredictorError::validation("input shape must be non-empty"));
        }
        let mut architecture = self.architecture.clone();
        architecture.input_size = n_features;
        let device = Default::default();
        let model = TimeSeriesLstm::<InferenceBackend>::new(&architecture, &device);
        let metadata = ModelMetadata::new(architecture, sequence_length, Vec::new(), String::new(), None);
        self.trained = Some(TrainedModel { model, metadata });
        Ok(())
    }

    /// Trains from fresh weights and keeps the best model
    pub fn train(
        &mut self,
        x: &Array3<f64>,
        y: &Array1<f64>,
        config: &TrainingConfig,
        context: TrainingContext,
    ) -> Result<TrainingOutcome> {
        let (_, sequence_length, n_features) = x.dim();
        if sequence_length != context.sequence_length || n_features != context.feature_columns.len() {
            return Err(PredictorError::shape_mismatch(
                format!("({}, {})", context.sequence_length, context.feature_columns.len()),
                format!("({}, {})", sequence_length, n_features),
            ));
        }

        let mut architecture = self.architecture.clone();
        architecture.input_size = n_features;
        let metadata = ModelMetadata::new(
            architecture,
            context.sequence_length,
            context.feature_columns,
            context.target_column,
            Some(context.scaler),
        );

        let outcome = train_model(x, y, config, &metadata)?;
        self.trained = Some(TrainedModel {
            model: outcome.model.clone(),
            metadata: metadata.restamped(),
        });
        Ok(outcome)
    }

    /// Raw scaled outputs for a batch of `(samples, L, F)` inputs
    pub fn predict(&self, x: &Array3<f64>) -> Result<Vec<f64>> {
        self.require_model()?.predict(x)
    }

    /// Recursive multi-step forecast in price units; see [`TrainedModel::forecast`]
    pub fn forecast(&self, df: &DataFrame, steps: usize) -> Result<Vec<f64>> {
        self.require_model()?.forecast(df, steps)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let trained = self.require_model()?;
        save_model_with_metadata(&trained.model, &trained.metadata, path)
    }

    /// Loads an artifact; on failure the predictor keeps its previous state
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let device = Default::default();
        let (model, metadata) = load_model_with_metadata::<InferenceBackend>(path.as_ref(), &device)?;
        info!(
            "Loaded model v{} ({} features, window {})",
            metadata.version,
            metadata.architecture.input_size,
            metadata.sequence_length
        );
        self.architecture = metadata.architecture.clone();
        self.trained = Some(TrainedModel { model, metadata });
        Ok(())
    }
}

impl TrainedModel {
    /// Runs the network on already scaled inputs
    pub fn predict(&self, x: &Array3<f64>) -> Result<Vec<f64>> {
        let (samples, steps, features) = x.dim();
        let expected = self.metadata.architecture.input_size;
        if features != expected {
            return Err(PredictorError::shape_mismatch(
                format!("{} features", expected),
                format!("{} features", features),
            ));
        }
        if samples == 0 || steps == 0 {
            return Err(PredictorError::validation("empty prediction input"));
        }

        let device = Default::default();
        let output = self
            .model
            .forward(to_input_tensor::<InferenceBackend>(x, &device));
        let values = output
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| PredictorError::Internal(format!("reading model output: {:?}", e)))?;
        Ok(values.into_iter().map(f64::from).collect())
    }

    fn scaler(&self) -> Result<&MinMaxScaler> {
        self.metadata
            .scaler
            .as_ref()
            .ok_or_else(|| PredictorError::shape_mismatch("a fitted scaler", "model without scaler"))
    }

    /// Forecasts the target `steps` hours ahead from the latest rows of `df`
    ///
    /// `df` holds unscaled features. The last window is scaled with the
    /// model's own scaler; each predicted target is fed back as the next row
    /// while the other features carry forward from the last observed row.
    ///
    /// # Returns
    ///
    /// Returns one inverse-scaled prediction per step
    pub fn forecast(&self, df: &DataFrame, steps: usize) -> Result<Vec<f64>> {
        if steps == 0 {
            return Err(PredictorError::validation("forecast horizon must be positive"));
        }
        let scaler = self.scaler()?;
        let metadata = &self.metadata;
        let columns: Vec<&str> = metadata.feature_columns.iter().map(String::as_str).collect();
        let sequence_length = metadata.sequence_length;
        if df.height() < sequence_length {
            return Err(PredictorError::validation(format!(
                "need at least {} rows to forecast, got {}",
                sequence_length,
                df.height()
            )));
        }

        let tail = df.slice((df.height() - sequence_length) as i64, sequence_length);
        let scaled = scaler.transform(&tail)?;
        let mut window = feature_matrix(&scaled, &columns)?;
        let target_idx = columns.iter().position(|c| *c == metadata.target_column);

        let mut predictions = Vec::with_capacity(steps);
        for step in 0..steps {
            let input = window
                .clone()
                .into_shape_with_order((1, sequence_length, columns.len()))
                .map_err(|e| PredictorError::Internal(format!("window buffer: {}", e)))?;
            let scaled_value = self
                .predict(&input)?
                .first()
                .copied()
                .ok_or_else(|| PredictorError::Internal("model returned no output".into()))?;
            predictions.push(scaled_value);

            if step + 1 < steps {
                // Shift the window by one row, feeding the prediction back in
                let mut next_row = window.row(sequence_length - 1).to_owned();
                if let Some(idx) = target_idx {
                    next_row[idx] = scaled_value;
                }
                for r in 0..sequence_length - 1 {
                    let shifted = window.row(r + 1).to_owned();
                    window.row_mut(r).assign(&shifted);
                }
                window.row_mut(sequence_length - 1).assign(&next_row);
            }
        }

        debug!("Forecast {} steps ahead", steps);
        scaler.inverse_scale_column(&metadata.target_column, &predictions)
    }
}
