// External imports
use burn::module::AutodiffModule;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::tensor::backend::Backend;
use burn::tensor::ElementConversion;
use burn_autodiff::Autodiff;
use burn_ndarray::NdArray;
use log::{debug, info, warn};
use ndarray::{Array1, Array3, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// Internal imports
use super::step_1_tensor_preparation::{to_input_tensor, to_target_tensor};
use super::step_3_lstm_model_arch::{mae, mse_loss, TimeSeriesLstm};
use super::step_6_model_serialization::{save_model_with_metadata, ModelMetadata};
use crate::constants::{
    DEFAULT_BATCH_SIZE, DEFAULT_EPOCHS, DEFAULT_LEARNING_RATE, EARLY_STOPPING_PATIENCE,
    VALIDATION_SPLIT_RATIO,
};
use crate::error::{PredictorError, Result};

pub type TrainingBackend = Autodiff<NdArray<f32>>;
pub type InferenceBackend = NdArray<f32>;

/// Configuration for training the model
#[derive(Debug, Clone)]
pub struct TrainingConfig {
    pub learning_rate: f64,
    pub batch_size: usize,
    pub epochs: usize,
    /// Fraction of samples, taken from the end, held out for validation
    pub validation_split: f64,
    pub patience: usize,
    /// Best-validation weights are written here after every improvement
    pub checkpoint_path: Option<PathBuf>,
    /// Seeds weight shuffling between batches
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            learning_rate: DEFAULT_LEARNING_RATE,
            batch_size: DEFAULT_BATCH_SIZE,
            epochs: DEFAULT_EPOCHS,
            validation_split: VALIDATION_SPLIT_RATIO,
            patience: EARLY_STOPPING_PATIENCE,
            checkpoint_path: None,
            seed: 42,
        }
    }
}

/// Losses of one epoch; validation fields are absent without a validation set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch: usize,
    pub loss: f64,
    pub mae: f64,
    pub val_loss: Option<f64>,
    pub val_mae: Option<f64>,
}

/// Result of a training run
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub model: TimeSeriesLstm<InferenceBackend>,
    pub history: Vec<EpochMetrics>,
    pub best_epoch: usize,
    /// Best monitored loss: validation loss, or training loss without a validation set
    pub best_loss: f64,
    pub stopped_early: bool,
}

/// Samples at the given positions, as owned arrays
fn select_samples(x: &Array3<f64>, y: &Array1<f64>, indices: &[usize]) -> (Array3<f64>, Array1<f64>) {
    (x.select(Axis(0), indices), y.select(Axis(0), indices))
}

/// Sample-weighted (mse, mae) of a model over a data set, without dropout
fn evaluate<B: Backend>(
    model: &TimeSeriesLstm<B>,
    x: &Array3<f64>,
    y: &Array1<f64>,
    batch_size: usize,
    device: &B::Device,
) -> (f64, f64) {
    let n = x.dim().0;
    let mut total_loss = 0.0;
    let mut total_mae = 0.0;
    let indices: Vec<usize> = (0..n).collect();
    for chunk in indices.chunks(batch_size) {
        let (bx, by) = select_samples(x, y, chunk);
        let predictions = model.forward(to_input_tensor::<B>(&bx, device));
        let targets = to_target_tensor::<B>(&by, device);
        let loss: f64 = mse_loss(predictions.clone(), targets.clone()).into_scalar().elem();
        let abs: f64 = mae(predictions, targets).into_scalar().elem();
        total_loss += loss * chunk.len() as f64;
        total_mae += abs * chunk.len() as f64;
    }
    (total_loss / n as f64, total_mae / n as f64)
}

/// Trains a freshly initialised model on windowed sequences
///
/// Adam with MSE loss; the last `validation_split` fraction of samples is the
/// validation set. Training stops once the monitored loss has not improved for
/// `patience` epochs and the best weights are restored. With no validation
/// samples the training loss is monitored instead.
///
/// # Arguments
///
/// * `x` - Inputs, `(samples, sequence_length, features)`
/// * `y` - Scaled targets, `(samples,)`
/// * `config` - Optimiser and early-stopping settings
/// * `metadata` - Architecture plus artifact context, reused for checkpoints
///
/// # Returns
///
/// Returns the best model (on the inference backend) and the per-epoch history
pub fn train_model(
    x: &Array3<f64>,
    y: &Array1<f64>,
    config: &TrainingConfig,
    metadata: &ModelMetadata,
) -> Result<TrainingOutcome> {
    let (n_samples, _, n_features) = x.dim();
    if n_samples == 0 || n_samples != y.len() {
        return Err(PredictorError::shape_mismatch(
            format!("{} labels", n_samples),
            format!("{} labels", y.len()),
        ));
    }
    if n_features != metadata.architecture.input_size {
        return Err(PredictorError::shape_mismatch(
            format!("{} features", metadata.architecture.input_size),
            format!("{} features", n_features),
        ));
    }
    if !(0.0..1.0).contains(&config.validation_split) {
        return Err(PredictorError::validation("validation split must be in [0, 1)"));
    }
    if config.batch_size == 0 || config.epochs == 0 {
        return Err(PredictorError::validation("batch size and epochs must be positive"));
    }

    let train_size = (n_samples as f64 * (1.0 - config.validation_split)).floor() as usize;
    if train_size == 0 {
        return Err(PredictorError::validation(format!(
            "validation split {} leaves no training samples out of {}",
            config.validation_split, n_samples
        )));
    }
    let train_idx: Vec<usize> = (0..train_size).collect();
    let val_idx: Vec<usize> = (train_size..n_samples).collect();
    let (train_x, train_y) = select_samples(x, y, &train_idx);
    let (val_x, val_y) = select_samples(x, y, &val_idx);
    let has_validation = !val_idx.is_empty();
    if !has_validation {
        warn!("No validation samples, monitoring training loss for early stopping");
    }

    info!(
        "Starting model training: {} train / {} validation samples, {} epochs",
        train_size,
        val_idx.len(),
        config.epochs
    );

    let device = <TrainingBackend as Backend>::Device::default();
    let mut model = TimeSeriesLstm::<TrainingBackend>::new(&metadata.architecture, &device);
    let mut optimizer = AdamConfig::new().init();
    let mut rng = StdRng::seed_from_u64(config.seed);

    let mut best_model = model.clone();
    let mut best_loss = f64::INFINITY;
    let mut best_epoch = 0;
    let mut epochs_no_improve = 0;
    let mut stopped_early = false;
    let mut history = Vec::with_capacity(config.epochs);
    let mut order = train_idx.clone();

    for epoch in 1..=config.epochs {
        order.shuffle(&mut rng);

        let mut epoch_loss = 0.0;
        let mut epoch_mae = 0.0;
        for chunk in order.chunks(config.batch_size) {
            let (bx, by) = select_samples(&train_x, &train_y, chunk);
            let predictions = model.forward(to_input_tensor::<TrainingBackend>(&bx, &device));
            let targets = to_target_tensor::<TrainingBackend>(&by, &device);

            let loss_tensor = mse_loss(predictions.clone(), targets.clone());
            let batch_mae: f64 = mae(predictions, targets).into_scalar().elem();
            let batch_loss: f64 = loss_tensor.clone().into_scalar().elem();
            epoch_loss += batch_loss * chunk.len() as f64;
            epoch_mae += batch_mae * chunk.len() as f64;

            // Backward pass and optimizer step
            let grads = loss_tensor.backward();
            let grads = GradientsParams::from_grads(grads, &model);
            model = optimizer.step(config.learning_rate, model, grads);
        }
        let loss = epoch_loss / train_size as f64;
        let train_mae = epoch_mae / train_size as f64;

        let (val_loss, val_mae) = if has_validation {
            let valid_model = model.valid();
            let (l, m) = evaluate(&valid_model, &val_x, &val_y, config.batch_size, &device);
            (Some(l), Some(m))
        } else {
            (None, None)
        };

        debug!(
            "Epoch {}: loss={:.6} mae={:.6} val_loss={:?}",
            epoch, loss, train_mae, val_loss
        );
        history.push(EpochMetrics {
            epoch,
            loss,
            mae: train_mae,
            val_loss,
            val_mae,
        });

        let monitored = val_loss.unwrap_or(loss);
        if !monitored.is_finite() {
            return Err(PredictorError::Internal(format!(
                "training diverged at epoch {}",
                epoch
            )));
        }

        // Early stopping logic
        if monitored < best_loss {
            best_loss = monitored;
            best_epoch = epoch;
            best_model = model.clone();
            epochs_no_improve = 0;
            if let Some(path) = &config.checkpoint_path {
                if let Err(e) = save_model_with_metadata(&best_model.valid(), &metadata.restamped(), path) {
                    warn!("Failed to write checkpoint {}: {}", path.display(), e);
                }
            }
        } else {
            epochs_no_improve += 1;
            if epochs_no_improve >= config.patience {
                info!(
                    "Early stopping triggered at epoch {} (best loss = {:.6} at epoch {})",
                    epoch, best_loss, best_epoch
                );
                stopped_early = true;
                break;
            }
        }
    }

    info!("Training completed after {} epochs", history.len());
    Ok(TrainingOutcome {
        model: best_model.valid(),
        history,
        best_epoch,
        best_loss,
        stopped_early,
    })
}
