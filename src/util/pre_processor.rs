// External crates
use log::{debug, warn};
use polars::prelude::*;

// Local modules
use crate::constants::REQUIRED_PRICE_COLUMNS;
use crate::error::{PredictorError, Result};

/// Validates and normalises a raw price frame before feature engineering
///
/// Checks that every required price column is present, casts the numeric
/// columns to `Float64` and the timestamp to `Int64` (epoch milliseconds),
/// sorts by timestamp when the rows are out of order and rejects duplicate
/// timestamps or missing price values.
///
/// # Arguments
///
/// * `df` - Raw price ticks
///
/// # Returns
///
/// Returns the cleaned DataFrame, ordered by strictly increasing timestamp
pub fn prepare_price_frame(df: &DataFrame) -> Result<DataFrame> {
    if df.height() == 0 {
        return Err(PredictorError::validation("price data is empty"));
    }

    let missing: Vec<&str> = REQUIRED_PRICE_COLUMNS
        .iter()
        .copied()
        .filter(|name| df.column(name).is_err())
        .collect();
    if !missing.is_empty() {
        return Err(PredictorError::validation(format!(
            "missing required columns: {}",
            missing.join(", ")
        )));
    }

    let mut df = df.clone();
    let timestamp = df.column("timestamp")?.cast(&DataType::Int64)?;
    df.with_column(timestamp)?;
    for name in ["open", "close", "high", "low", "volume"] {
        if df.column(name).is_err() {
            continue;
        }
        let casted = df.column(name)?.cast(&DataType::Float64)?;
        df.with_column(casted)?;
    }

    // Sort only when needed so already-ordered frames keep their layout
    let timestamps = column_i64(&df, "timestamp")?;
    if timestamps.windows(2).any(|w| w[1] < w[0]) {
        debug!("Price frame out of order, sorting by timestamp");
        df = df.sort(vec!["timestamp"], SortMultipleOptions::default())?;
    }

    let timestamps = column_i64(&df, "timestamp")?;
    if let Some(pair) = timestamps.windows(2).find(|w| w[0] == w[1]) {
        return Err(PredictorError::validation(format!(
            "duplicate timestamp {} in price data",
            pair[0]
        )));
    }

    let gaps = count_missing(&df, &REQUIRED_PRICE_COLUMNS[1..])?;
    if gaps > 0 {
        return Err(PredictorError::validation(format!(
            "price data contains {} missing values",
            gaps
        )));
    }

    Ok(df)
}

/// Reads a column as `f64` values; nulls become NaN
pub fn column_f64(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    let column = df.column(name)?.cast(&DataType::Float64)?;
    let values = column
        .f64()?
        .into_iter()
        .map(|v| v.unwrap_or(f64::NAN))
        .collect();
    Ok(values)
}

/// Reads a column as `i64` values; nulls are rejected
pub fn column_i64(df: &DataFrame, name: &str) -> Result<Vec<i64>> {
    let column = df.column(name)?.cast(&DataType::Int64)?;
    column
        .i64()?
        .into_iter()
        .map(|v| {
            v.ok_or_else(|| PredictorError::validation(format!("column '{}' contains nulls", name)))
        })
        .collect()
}

/// Counts null or NaN cells across the given columns
pub fn count_missing(df: &DataFrame, columns: &[&str]) -> Result<usize> {
    let mut total = 0;
    for &name in columns {
        total += column_f64(df, name)?
            .iter()
            .filter(|v| !v.is_finite())
            .count();
    }
    Ok(total)
}

/// Fills undefined values: forward fill, then backward fill, then zero
///
/// A series with no defined value at all comes back as all zeros.
pub fn fill_undefined(values: &[Option<f64>]) -> Vec<f64> {
    let forward = forward_fill(values);
    let filled = backward_fill(&forward);
    let undefined = filled.iter().filter(|v| v.is_none()).count();
    if undefined > 0 {
        warn!(
            "Series has no defined values ({} rows), filling with 0.0",
            undefined
        );
    }
    filled.into_iter().map(|v| v.unwrap_or(0.0)).collect()
}

/// Forward fill, replacing undefined values with the last defined value
fn forward_fill(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut last_valid = None;
    values
        .iter()
        .map(|v| match v {
            Some(x) if x.is_finite() => {
                last_valid = Some(*x);
                Some(*x)
            }
            _ => last_valid,
        })
        .collect()
}

/// Backward fill, replacing undefined values with the next defined value
fn backward_fill(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut filled = vec![None; values.len()];
    let mut next_valid = None;
    for i in (0..values.len()).rev() {
        match values[i] {
            Some(x) if x.is_finite() => {
                next_valid = Some(x);
                filled[i] = Some(x);
            }
            _ => filled[i] = next_valid,
        }
    }
    filled
}
