// External crates
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use log::{debug, info};
use polars::prelude::*;
use std::fs::File;
use std::path::Path;

// Local modules
use crate::error::{PredictorError, Result};

/// Maps common spellings of price columns onto the standard names
fn standard_column_name(column_name: &str) -> Option<&'static str> {
    let name = match column_name.to_lowercase().as_str() {
        "open" | "o" | "op" | "openprice" | "open_price" => "open",
        "high" | "h" | "highprice" | "high_price" | "max" => "high",
        "low" | "l" | "lowprice" | "low_price" | "min" => "low",
        "close" | "c" | "cl" | "closeprice" | "close_price" | "price" => "close",
        "volume" | "vol" | "v" | "volumes" => "volume",
        "timestamp" | "time" | "date" | "t" | "datetime" | "dt" | "open_time" => "timestamp",
        _ => return None,
    };
    Some(name)
}

/// Renames price columns to `timestamp, open, high, low, close, volume`
///
/// Matching is case-insensitive and accepts common abbreviations. Columns
/// that do not map to a price field are left alone.
pub fn standardize_columns(df: &mut DataFrame) -> Result<()> {
    let renames: Vec<(String, &'static str)> = df
        .get_column_names()
        .iter()
        .filter_map(|name| {
            let name = name.as_str();
            standard_column_name(name)
                .filter(|standard| *standard != name)
                .map(|standard| (name.to_string(), standard))
        })
        .collect();

    for (old_name, new_name) in renames {
        if df.column(new_name).is_ok() {
            debug!("Keeping existing '{}', ignoring '{}'", new_name, old_name);
            continue;
        }
        debug!("Renaming column '{}' to '{}'", old_name, new_name);
        df.rename(&old_name, new_name.into())?;
    }
    Ok(())
}

/// Parses a textual timestamp into epoch milliseconds
///
/// Accepts RFC 3339, `%Y-%m-%d %H:%M:%S`, `%Y-%m-%d` and plain integers.
pub fn parse_timestamp_ms(value: &str) -> Option<i64> {
    let value = value.trim();
    if let Ok(ms) = value.parse::<i64>() {
        return Some(ms);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.timestamp_millis());
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt.and_utc().timestamp_millis());
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp_millis())
}

/// Converts a textual timestamp column to `Int64` epoch milliseconds
fn normalize_timestamp_column(df: &mut DataFrame) -> Result<()> {
    let column = df.column("timestamp")?;
    if !matches!(column.dtype(), DataType::String) {
        return Ok(());
    }

    let parsed: Vec<i64> = column
        .str()?
        .into_iter()
        .enumerate()
        .map(|(row, v)| {
            v.and_then(parse_timestamp_ms).ok_or_else(|| {
                PredictorError::validation(format!("unparseable timestamp in row {}", row))
            })
        })
        .collect::<Result<_>>()?;
    df.with_column(Series::new("timestamp".into(), parsed))?;
    Ok(())
}

/// Reads a CSV file of price ticks into a DataFrame with standard column names
///
/// # Arguments
///
/// * `file_path` - Path to the CSV file
///
/// # Returns
///
/// Returns a DataFrame whose price columns are `Float64` and whose
/// timestamp is epoch milliseconds
pub fn read_price_csv<P: AsRef<Path>>(file_path: P) -> Result<DataFrame> {
    let path = file_path.as_ref();
    info!("Loading price data from: {}", path.display());

    if !path.exists() {
        return Err(PredictorError::validation(format!(
            "File not found: {}",
            path.display()
        )));
    }

    let file = File::open(path)?;
    let mut df = CsvReader::new(file).finish()?;
    standardize_columns(&mut df)?;

    if df.column("timestamp").is_ok() {
        normalize_timestamp_column(&mut df)?;
    }
    for name in ["open", "high", "low", "close", "volume"] {
        if df.column(name).is_ok() {
            let casted = df.column(name)?.cast(&DataType::Float64)?;
            df.with_column(casted)?;
        }
    }

    debug!("Columns after standardisation: {:?}", df.get_column_names());
    Ok(df)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_timestamp_formats() {
        assert_eq!(parse_timestamp_ms("1700000000000"), Some(1_700_000_000_000));
        assert_eq!(parse_timestamp_ms("1970-01-01 00:00:01"), Some(1_000));
        assert_eq!(parse_timestamp_ms("1970-01-02"), Some(86_400_000));
        assert_eq!(parse_timestamp_ms("2024-01-01T00:00:00Z"), Some(1_704_067_200_000));
        assert_eq!(parse_timestamp_ms("yesterday"), None);
    }

    #[test]
    fn test_read_csv_standardizes_columns() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "Date,Open,High,Low,Close,Vol").unwrap();
        writeln!(file, "2024-01-01 00:00:00,1.0,2.0,0.5,1.5,10").unwrap();
        writeln!(file, "2024-01-01 01:00:00,1.5,2.5,1.0,2.0,12").unwrap();

        let df = read_price_csv(file.path()).unwrap();
        for name in ["timestamp", "open", "high", "low", "close", "volume"] {
            assert!(df.column(name).is_ok(), "missing column {}", name);
        }
        assert_eq!(df.column("volume").unwrap().dtype(), &DataType::Float64);
        assert_eq!(df.column("timestamp").unwrap().dtype(), &DataType::Int64);
    }

    #[test]
    fn test_missing_file_is_validation_error() {
        let err = read_price_csv("definitely/not/here.csv").unwrap_err();
        assert!(matches!(err, PredictorError::Validation(_)));
    }
}
