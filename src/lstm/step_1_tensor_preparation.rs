// External crates
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use log::debug;
use ndarray::{s, Array1, Array2, Array3};
use polars::prelude::*;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

// Internal modules
use crate::error::{PredictorError, Result};
use crate::util::pre_processor::column_f64;

/// Fitted min/max of one column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnRange {
    pub name: String,
    pub min: f64,
    pub max: f64,
}

impl ColumnRange {
    /// Width used for scaling; a constant column uses 1 so `value - min` round trips
    fn range(&self) -> f64 {
        let range = self.max - self.min;
        if range.abs() < f64::EPSILON {
            1.0
        } else {
            range
        }
    }

    pub fn scale_value(&self, value: f64) -> f64 {
        (value - self.min) / self.range()
    }

    pub fn inverse_value(&self, value: f64) -> f64 {
        value * self.range() + self.min
    }
}

/// Per-column min-max scaler mapping fitted data onto [0, 1]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    pub columns: Vec<ColumnRange>,
}

impl MinMaxScaler {
    /// Fits min and max of each named column
    pub fn fit(df: &DataFrame, columns: &[&str]) -> Result<Self> {
        if columns.is_empty() {
            return Err(PredictorError::validation("no columns to scale"));
        }
        let mut ranges = Vec::with_capacity(columns.len());
        for &name in columns {
            let values = column_f64(df, name)?;
            let finite = values.iter().copied().filter(|v| v.is_finite());
            let (min, max) = finite.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(v), hi.max(v))
            });
            if !min.is_finite() || !max.is_finite() {
                return Err(PredictorError::validation(format!(
                    "column '{}' has no finite values to fit",
                    name
                )));
            }
            ranges.push(ColumnRange {
                name: name.to_string(),
                min,
                max,
            });
        }
        Ok(Self { columns: ranges })
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&ColumnRange> {
        self.columns.iter().find(|c| c.name == name)
    }

    fn require_column(&self, name: &str) -> Result<&ColumnRange> {
        self.column(name).ok_or_else(|| {
            PredictorError::shape_mismatch(
                format!("a column fitted by the scaler ({:?})", self.column_names()),
                name,
            )
        })
    }

    /// Applies the fitted scaling to every fitted column; other columns are untouched
    pub fn transform(&self, df: &DataFrame) -> Result<DataFrame> {
        let mut out = df.clone();
        for range in &self.columns {
            if df.column(&range.name).is_err() {
                return Err(PredictorError::shape_mismatch(
                    format!("column '{}'", range.name),
                    "column missing from data",
                ));
            }
            let scaled: Vec<f64> = column_f64(df, &range.name)?
                .into_iter()
                .map(|v| range.scale_value(v))
                .collect();
            out.with_column(Series::new(range.name.as_str().into(), scaled))?;
        }
        Ok(out)
    }

    /// Inverts scaled data; the frame must hold exactly the fitted columns in order
    pub fn inverse_scale(&self, df: &DataFrame) -> Result<DataFrame> {
        let actual: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|n| n.to_string())
            .collect();
        let expected: Vec<String> = self.columns.iter().map(|c| c.name.clone()).collect();
        if actual != expected {
            return Err(PredictorError::shape_mismatch(
                format!("{:?}", expected),
                format!("{:?}", actual),
            ));
        }

        let mut out = df.clone();
        for range in &self.columns {
            let restored: Vec<f64> = column_f64(df, &range.name)?
                .into_iter()
                .map(|v| range.inverse_value(v))
                .collect();
            out.with_column(Series::new(range.name.as_str().into(), restored))?;
        }
        Ok(out)
    }

    /// Inverts values of a single fitted column, e.g. model outputs for the target
    pub fn inverse_scale_column(&self, name: &str, values: &[f64]) -> Result<Vec<f64>> {
        let range = self.require_column(name)?;
        Ok(values.iter().map(|&v| range.inverse_value(v)).collect())
    }

    /// Scales raw values of a single fitted column
    pub fn scale_column(&self, name: &str, values: &[f64]) -> Result<Vec<f64>> {
        let range = self.require_column(name)?;
        Ok(values.iter().map(|&v| range.scale_value(v)).collect())
    }
}

/// Fits a min-max scaler over `columns` and returns the scaled frame with it
///
/// # Arguments
///
/// * `df` - Feature frame
/// * `columns` - Columns to fit and transform; others pass through unchanged
///
/// # Returns
///
/// Returns the transformed frame and the fitted scaler
pub fn scale(df: &DataFrame, columns: &[&str]) -> Result<(DataFrame, MinMaxScaler)> {
    let scaler = MinMaxScaler::fit(df, columns)?;
    let scaled = scaler.transform(df)?;
    Ok((scaled, scaler))
}

/// Reads the feature columns into a row-major `(rows, features)` matrix
pub fn feature_matrix(df: &DataFrame, feature_columns: &[&str]) -> Result<Array2<f64>> {
    let rows = df.height();
    let mut matrix = Array2::<f64>::zeros((rows, feature_columns.len()));
    for (j, &name) in feature_columns.iter().enumerate() {
        if df.column(name).is_err() {
            return Err(PredictorError::validation(format!(
                "feature column '{}' not found",
                name
            )));
        }
        let values = column_f64(df, name)?;
        if let Some(row) = values.iter().position(|v| !v.is_finite()) {
            return Err(PredictorError::validation(format!(
                "feature column '{}' has a missing value at row {}",
                name, row
            )));
        }
        matrix.column_mut(j).assign(&Array1::from(values));
    }
    Ok(matrix)
}

/// Builds sliding-window samples for sequence training
///
/// Sample `i` holds rows `[i, i + sequence_length)` of the feature columns and
/// its label is the target at row `i + sequence_length`; the stride is 1.
///
/// # Arguments
///
/// * `df` - Scaled feature frame
/// * `sequence_length` - Number of time steps in each sequence
/// * `target_column` - Column whose next value is predicted
/// * `feature_columns` - Input columns, in model order
///
/// # Returns
///
/// Returns `X` with shape `(samples, sequence_length, features)` and `y` with
/// shape `(samples,)`, where `samples = rows - sequence_length`
pub fn prepare_sequences(
    df: &DataFrame,
    sequence_length: usize,
    target_column: &str,
    feature_columns: &[&str],
) -> Result<(Array3<f64>, Array1<f64>)> {
    let n_rows = df.height();
    if n_rows == 0 {
        return Err(PredictorError::validation("cannot build sequences from empty data"));
    }
    if sequence_length == 0 {
        return Err(PredictorError::validation("sequence length must be positive"));
    }
    if df.column(target_column).is_err() {
        return Err(PredictorError::validation(format!(
            "target column '{}' not found",
            target_column
        )));
    }
    if feature_columns.is_empty() {
        return Err(PredictorError::validation("no feature columns given"));
    }
    if sequence_length >= n_rows {
        return Err(PredictorError::validation(format!(
            "need more than {} rows for sequence length {}, got {}",
            sequence_length, sequence_length, n_rows
        )));
    }

    let matrix = feature_matrix(df, feature_columns)?;
    let target = column_f64(df, target_column)?;
    let n_features = feature_columns.len();
    let n_samples = n_rows - sequence_length;
    let sample_len = sequence_length * n_features;

    // Each sample is an independent copy of a contiguous block of rows
    let mut x = vec![0.0f64; n_samples * sample_len];
    x.par_chunks_mut(sample_len)
        .enumerate()
        .for_each(|(i, chunk)| {
            let window = matrix.slice(s![i..i + sequence_length, ..]);
            for (dst, src) in chunk.iter_mut().zip(window.iter()) {
                *dst = *src;
            }
        });

    let y: Vec<f64> = (0..n_samples).map(|i| target[i + sequence_length]).collect();
    if let Some(i) = y.iter().position(|v| !v.is_finite()) {
        return Err(PredictorError::validation(format!(
            "target column '{}' has a missing value at row {}",
            target_column,
            i + sequence_length
        )));
    }

    let x = Array3::from_shape_vec((n_samples, sequence_length, n_features), x)
        .map_err(|e| PredictorError::Internal(format!("sequence buffer: {}", e)))?;
    debug!("Prepared sequences: X {:?}, y {}", x.dim(), y.len());
    Ok((x, Array1::from(y)))
}

/// The most recent `sequence_length` rows as a single `(1, L, F)` input
pub fn last_window(
    df: &DataFrame,
    sequence_length: usize,
    feature_columns: &[&str],
) -> Result<Array3<f64>> {
    if sequence_length == 0 || df.height() < sequence_length {
        return Err(PredictorError::validation(format!(
            "need at least {} rows for an input window, got {}",
            sequence_length,
            df.height()
        )));
    }
    let tail = df.slice((df.height() - sequence_length) as i64, sequence_length);
    let matrix = feature_matrix(&tail, feature_columns)?;
    matrix
        .into_shape_with_order((1, sequence_length, feature_columns.len()))
        .map_err(|e| PredictorError::Internal(format!("window buffer: {}", e)))
}

/// Converts a `(samples, L, F)` array into a float tensor
pub fn to_input_tensor<B: Backend>(x: &Array3<f64>, device: &B::Device) -> Tensor<B, 3> {
    let (samples, steps, features) = x.dim();
    let buffer: Vec<f32> = x.iter().map(|&v| v as f32).collect();
    Tensor::<B, 1>::from_floats(buffer.as_slice(), device).reshape([samples, steps, features])
}

/// Converts labels into a `(samples, 1)` target tensor
pub fn to_target_tensor<B: Backend>(y: &Array1<f64>, device: &B::Device) -> Tensor<B, 2> {
    let samples = y.len();
    let buffer: Vec<f32> = y.iter().map(|&v| v as f32).collect();
    Tensor::<B, 1>::from_floats(buffer.as_slice(), device).reshape([samples, 1])
}
