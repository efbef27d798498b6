use polars::prelude::*;

use crate::constants::{feature_columns, SEQUENCE_LENGTH, TARGET_COLUMN, TECHNICAL_INDICATORS};
use crate::lstm::step_1_tensor_preparation::{feature_matrix, last_window, prepare_sequences, scale};
use crate::sentiment::SentimentVector;
use crate::util::feature_engineering::{add_sentiment_columns, calculate_indicators};
use crate::util::pre_processor::column_f64;
use crate::util::test_utils::{generate_monotonic_dataframe, generate_test_dataframe};

fn sentiment() -> SentimentVector {
    SentimentVector {
        compound: 0.25,
        positive: 0.3,
        negative: 0.1,
        neutral: 0.6,
    }
}

fn feature_frame(prices: &DataFrame) -> DataFrame {
    let with_indicators = calculate_indicators(prices).unwrap();
    add_sentiment_columns(&with_indicators, &sentiment()).unwrap()
}

#[test]
fn test_indicators_leave_no_missing_values() {
    let prices = generate_test_dataframe(250, 11).unwrap();
    let df = calculate_indicators(&prices).unwrap();
    assert_eq!(df.height(), 250);

    for name in TECHNICAL_INDICATORS {
        let values = column_f64(&df, name).unwrap();
        assert!(values.iter().all(|v| v.is_finite()), "{} has missing values", name);
    }

    let rsi = column_f64(&df, "rsi").unwrap();
    assert!(rsi.iter().all(|v| (0.0..=100.0).contains(v)));
}

#[test]
fn test_warmup_rows_take_first_defined_value() {
    let df = calculate_indicators(&generate_test_dataframe(250, 5).unwrap()).unwrap();

    // (column, index of its first defined value)
    for (name, first) in [("rsi", 14), ("macd", 25), ("macd_signal", 33), ("ema_200", 199), ("bb_upper", 19)] {
        let values = column_f64(&df, name).unwrap();
        assert!(
            values[..first].iter().all(|v| *v == values[first]),
            "{} warm-up rows are not back filled",
            name
        );
        assert_ne!(values[first], 0.0, "{}", name);
    }
}

#[test]
fn test_indicator_longer_than_history_is_zero() {
    let df = calculate_indicators(&generate_test_dataframe(150, 5).unwrap()).unwrap();
    assert_eq!(df.height(), 150);

    let ema_200 = column_f64(&df, "ema_200").unwrap();
    assert!(ema_200.iter().all(|v| *v == 0.0));
    let ema_50 = column_f64(&df, "ema_50").unwrap();
    assert!(ema_50.iter().all(|v| *v > 0.0));
}

#[test]
fn test_monotonic_rows_give_expected_shape() {
    let df = feature_frame(&generate_monotonic_dataframe(300).unwrap());
    let features = feature_columns();
    let (x, y) = prepare_sequences(&df, SEQUENCE_LENGTH, TARGET_COLUMN, &features).unwrap();

    assert_eq!(x.dim(), (240, 60, features.len()));
    assert_eq!(features.len(), 21);
    assert_eq!(y.len(), 240);
}

#[test]
fn test_first_sample_and_targets_line_up_with_rows() {
    let df = feature_frame(&generate_monotonic_dataframe(100).unwrap());
    let features = feature_columns();
    let (x, y) = prepare_sequences(&df, 20, TARGET_COLUMN, &features).unwrap();
    let matrix = feature_matrix(&df, &features).unwrap();

    for t in 0..20 {
        for f in 0..features.len() {
            assert_eq!(x[[0, t, f]], matrix[[t, f]]);
        }
    }
    // close = 100 + row
    assert_eq!(y[0], 120.0);
    assert_eq!(y[y.len() - 1], 199.0);
}

#[test]
fn test_sentiment_is_broadcast_to_every_row() {
    let df = feature_frame(&generate_monotonic_dataframe(50).unwrap());
    let compound = column_f64(&df, "sentiment_compound").unwrap();
    assert_eq!(compound.len(), 50);
    assert!(compound.iter().all(|v| *v == 0.25));
}

#[test]
fn test_scale_then_inverse_restores_values() {
    let df = feature_frame(&generate_test_dataframe(220, 5).unwrap());
    let features = feature_columns();
    let (scaled, scaler) = scale(&df, &features).unwrap();

    for name in &features {
        let values = column_f64(&scaled, name).unwrap();
        assert!(values.iter().all(|v| (-1e-9..=1.0 + 1e-9).contains(v)), "{} out of range", name);
    }

    let restored = scaler.inverse_scale(&scaled.select(features.clone()).unwrap()).unwrap();
    for name in &features {
        let original = column_f64(&df, name).unwrap();
        let back = column_f64(&restored, name).unwrap();
        for (a, b) in original.iter().zip(back.iter()) {
            assert!((a - b).abs() <= 1e-6 * a.abs().max(1.0), "{}: {} vs {}", name, a, b);
        }
    }
}

#[test]
fn test_inverse_scale_rejects_other_layout() {
    let df = feature_frame(&generate_test_dataframe(220, 5).unwrap());
    let features = feature_columns();
    let (scaled, scaler) = scale(&df, &features).unwrap();
    let err = scaler.inverse_scale(&scaled.select(["close"]).unwrap()).unwrap_err();
    assert_eq!(err.code(), "SHAPE_MISMATCH");
}

#[test]
fn test_sequence_edge_cases() {
    let df = feature_frame(&generate_monotonic_dataframe(30).unwrap());
    let features = feature_columns();

    let too_long = prepare_sequences(&df, 30, TARGET_COLUMN, &features).unwrap_err();
    assert_eq!(too_long.code(), "VALIDATION_ERROR");
    let missing_target = prepare_sequences(&df, 5, "price", &features).unwrap_err();
    assert_eq!(missing_target.code(), "VALIDATION_ERROR");
    let missing_feature = prepare_sequences(&df, 5, TARGET_COLUMN, &["close", "vwap"]).unwrap_err();
    assert_eq!(missing_feature.code(), "VALIDATION_ERROR");

    let window = last_window(&df, 10, &features).unwrap();
    assert_eq!(window.dim(), (1, 10, 21));
    assert_eq!(window[[0, 9, 0]], 129.0);
}
