use ndarray::{s, Array3};
use polars::prelude::*;
use std::fs;

use crate::constants::{feature_columns, TARGET_COLUMN};
use crate::error::PredictorError;
use crate::lstm::step_1_tensor_preparation::{prepare_sequences, scale, MinMaxScaler};
use crate::lstm::step_3_lstm_model_arch::TimeSeriesLstm;
use crate::lstm::step_4_train_model::InferenceBackend;
use crate::lstm::step_6_model_serialization::{encode_artifact, verify_model, ModelMetadata};
use crate::lstm::{ModelArchitecture, PricePredictor, TrainingConfig, TrainingContext};
use crate::sentiment::SentimentVector;
use crate::util::feature_engineering::{add_sentiment_columns, calculate_indicators};
use crate::util::test_utils::generate_test_dataframe;

const WINDOW: usize = 12;

fn small_architecture() -> ModelArchitecture {
    ModelArchitecture::new(0)
        .with_hidden_size(8)
        .with_dense_units(4)
        .with_dropout(0.0)
}

fn small_config() -> TrainingConfig {
    TrainingConfig {
        batch_size: 64,
        epochs: 3,
        patience: 3,
        ..TrainingConfig::default()
    }
}

struct Prepared {
    features: DataFrame,
    x: Array3<f64>,
    y: ndarray::Array1<f64>,
    scaler: MinMaxScaler,
}

fn prepared(rows: usize) -> Prepared {
    let prices = generate_test_dataframe(rows, 21).unwrap();
    let features =
        add_sentiment_columns(&calculate_indicators(&prices).unwrap(), &SentimentVector::neutral())
            .unwrap();
    let columns = feature_columns();
    let (scaled, scaler) = scale(&features, &columns).unwrap();
    let (x, y) = prepare_sequences(&scaled, WINDOW, TARGET_COLUMN, &columns).unwrap();
    Prepared { features, x, y, scaler }
}

fn context(scaler: MinMaxScaler) -> TrainingContext {
    TrainingContext {
        sequence_length: WINDOW,
        feature_columns: feature_columns().iter().map(|c| c.to_string()).collect(),
        target_column: TARGET_COLUMN.to_string(),
        scaler,
    }
}

#[test]
fn test_predict_before_training_fails() {
    let predictor = PricePredictor::new(small_architecture());
    assert!(!predictor.is_ready());
    let err = predictor.predict(&Array3::zeros((1, WINDOW, 21))).unwrap_err();
    assert!(matches!(err, PredictorError::NotTrained));
}

#[test]
fn test_train_save_load_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let data = prepared(200);
    let checkpoint = dir.path().join("best_checkpoint.bin");
    let config = TrainingConfig {
        checkpoint_path: Some(checkpoint.clone()),
        ..small_config()
    };

    let mut predictor = PricePredictor::new(small_architecture());
    let outcome = predictor
        .train(&data.x, &data.y, &config, context(data.scaler.clone()))
        .unwrap();
    assert!(!outcome.history.is_empty());
    assert!(outcome.history.iter().all(|m| m.val_loss.is_some()));
    assert!((1..=3).contains(&outcome.best_epoch));
    assert!(verify_model(&checkpoint));

    let artifact = dir.path().join("lstm_model.bin");
    predictor.save(&artifact).unwrap();
    assert!(verify_model(&artifact));

    let mut restored = PricePredictor::new(ModelArchitecture::new(1));
    restored.load(&artifact).unwrap();
    let metadata = restored.metadata().unwrap();
    assert_eq!(metadata.sequence_length, WINDOW);
    assert_eq!(metadata.architecture.input_size, 21);
    let saved_scaler = metadata.scaler.as_ref().unwrap();
    assert_eq!(saved_scaler.column_names(), data.scaler.column_names());
    for (saved, fitted) in saved_scaler.columns.iter().zip(data.scaler.columns.iter()) {
        assert!((saved.min - fitted.min).abs() <= 1e-9 * fitted.min.abs().max(1.0));
        assert!((saved.max - fitted.max).abs() <= 1e-9 * fitted.max.abs().max(1.0));
    }

    let batch = data.x.slice(s![0..5, .., ..]).to_owned();
    let before = predictor.predict(&batch).unwrap();
    let after = restored.predict(&batch).unwrap();
    assert_eq!(before.len(), 5);
    for (a, b) in before.iter().zip(after.iter()) {
        assert!((a - b).abs() < 1e-6);
    }
}

#[test]
fn test_forecast_returns_one_price_per_step() {
    let data = prepared(160);
    let mut predictor = PricePredictor::new(small_architecture());
    predictor
        .train(&data.x, &data.y, &small_config(), context(data.scaler.clone()))
        .unwrap();

    let forecast = predictor.forecast(&data.features, 4).unwrap();
    assert_eq!(forecast.len(), 4);
    assert!(forecast.iter().all(|v| v.is_finite()));

    let err = predictor.forecast(&data.features, 0).unwrap_err();
    assert_eq!(err.code(), "VALIDATION_ERROR");
}

#[test]
fn test_feature_width_mismatch_is_rejected() {
    let data = prepared(160);
    let mut predictor = PricePredictor::new(small_architecture());
    predictor
        .train(&data.x, &data.y, &small_config(), context(data.scaler.clone()))
        .unwrap();

    let err = predictor.predict(&Array3::zeros((1, WINDOW, 20))).unwrap_err();
    assert_eq!(err.code(), "SHAPE_MISMATCH");
}

#[test]
fn test_without_validation_split_training_loss_is_monitored() {
    let data = prepared(120);
    let config = TrainingConfig {
        validation_split: 0.0,
        epochs: 2,
        ..small_config()
    };
    let mut predictor = PricePredictor::new(small_architecture());
    let outcome = predictor
        .train(&data.x, &data.y, &config, context(data.scaler.clone()))
        .unwrap();
    assert!(outcome.history.iter().all(|m| m.val_loss.is_none()));
    assert!(outcome.best_loss.is_finite());
}

#[test]
fn test_corrupt_artifact_is_a_load_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lstm_model.bin");
    fs::write(&path, b"definitely not a model").unwrap();
    assert!(!verify_model(&path));

    let mut predictor = PricePredictor::new(small_architecture());
    let err = predictor.load(&path).unwrap_err();
    assert!(matches!(err, PredictorError::ModelLoad(_)));
    assert!(!predictor.is_ready());

    let missing = predictor.load(dir.path().join("missing.bin")).unwrap_err();
    assert!(matches!(missing, PredictorError::ModelLoad(_)));
}

#[test]
fn test_build_predicts_raw_values_without_training() {
    let mut predictor = PricePredictor::new(small_architecture());
    assert!(predictor.build((WINDOW, 0)).is_err());
    predictor.build((WINDOW, 21)).unwrap();
    assert!(predictor.is_ready());
    assert_eq!(predictor.predict(&Array3::zeros((3, WINDOW, 21))).unwrap().len(), 3);
}

/// Writes weights built for `weights_arch` under `metadata`
fn write_artifact(dir: &std::path::Path, weights_arch: &ModelArchitecture, metadata: &ModelMetadata) -> std::path::PathBuf {
    let device = Default::default();
    let model = TimeSeriesLstm::<InferenceBackend>::new(weights_arch, &device);
    let path = dir.join("lstm_model.bin");
    fs::write(&path, encode_artifact(&model, metadata).unwrap()).unwrap();
    path
}

fn full_metadata(architecture: ModelArchitecture) -> ModelMetadata {
    let data = prepared(80);
    let ctx = context(data.scaler);
    ModelMetadata::new(architecture, WINDOW, ctx.feature_columns, ctx.target_column, Some(ctx.scaler))
}

fn assert_rejected(path: &std::path::Path, needle: &str) {
    let mut predictor = PricePredictor::new(small_architecture());
    let err = predictor.load(path).unwrap_err();
    match err {
        PredictorError::ModelLoad(message) => assert!(message.contains(needle), "{}", message),
        other => panic!("expected ModelLoad, got {:?}", other),
    }
    assert!(!predictor.is_ready());
}

#[test]
fn test_weights_for_other_hidden_size_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let declared = ModelArchitecture::new(21).with_hidden_size(8).with_dense_units(4);
    let actual = declared.clone().with_hidden_size(16);
    let path = write_artifact(dir.path(), &actual, &full_metadata(declared));
    assert!(verify_model(&path));
    assert_rejected(&path, "weights do not match");
}

#[test]
fn test_missing_dense_layer_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let declared = ModelArchitecture::new(21).with_hidden_size(8).with_dense_units(4);
    let actual = declared.clone().with_dense_units(0);
    let path = write_artifact(dir.path(), &actual, &full_metadata(declared));
    assert_rejected(&path, "dense layer");
}

#[test]
fn test_inconsistent_metadata_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let arch = ModelArchitecture::new(21).with_hidden_size(8).with_dense_units(4);

    let mut short_columns = full_metadata(arch.clone());
    short_columns.feature_columns.pop();
    let path = write_artifact(dir.path(), &arch, &short_columns);
    assert_rejected(&path, "20 feature columns");

    let mut no_scaler = full_metadata(arch.clone());
    no_scaler.scaler = None;
    let path = write_artifact(dir.path(), &arch, &no_scaler);
    assert_rejected(&path, "scaler is missing");

    let mut partial_scaler = full_metadata(arch.clone());
    if let Some(scaler) = partial_scaler.scaler.as_mut() {
        scaler.columns.retain(|c| c.name != "rsi");
    }
    let path = write_artifact(dir.path(), &arch, &partial_scaler);
    assert_rejected(&path, "'rsi'");

    let mut no_window = full_metadata(arch.clone());
    no_window.sequence_length = 0;
    let path = write_artifact(dir.path(), &arch, &no_window);
    assert_rejected(&path, "sequence length");
}
