// External crates
use log::debug;
use polars::prelude::*;
use ta::indicators::{
    BollingerBands, ExponentialMovingAverage, MovingAverageConvergenceDivergence,
    OnBalanceVolume, RelativeStrengthIndex,
};
use ta::{Close, Next, Volume};

// Local modules
use crate::constants::{
    BOLLINGER_PERIOD, BOLLINGER_STD_DEV, EMA_PERIODS, MACD_FAST, MACD_SIGNAL, MACD_SLOW,
    MOMENTUM_PERIOD, RSI_PERIOD, SENTIMENT_COLUMNS, TECHNICAL_INDICATORS,
};
use crate::error::{PredictorError, Result};
use crate::sentiment::SentimentVector;
use crate::util::pre_processor::{column_f64, fill_undefined, prepare_price_frame};

/// Close and volume of one tick, the input On-Balance-Volume consumes
struct VolumeTick {
    close: f64,
    volume: f64,
}

impl Close for VolumeTick {
    fn close(&self) -> f64 {
        self.close
    }
}

impl Volume for VolumeTick {
    fn volume(&self) -> f64 {
        self.volume
    }
}

fn indicator_error(name: &str, err: ta::errors::TaError) -> PredictorError {
    PredictorError::Internal(format!("failed to configure {}: {:?}", name, err))
}

/// Masks the first `warmup` values, which the indicator cannot define yet
fn mask_warmup(values: Vec<f64>, warmup: usize) -> Vec<Option<f64>> {
    values
        .into_iter()
        .enumerate()
        .map(|(i, v)| if i < warmup { None } else { Some(v) })
        .collect()
}

/// Calculates Relative Strength Index; the first `period` rows are undefined
pub fn calculate_rsi(close: &[f64], period: usize) -> Result<Vec<Option<f64>>> {
    let mut rsi = RelativeStrengthIndex::new(period).map_err(|e| indicator_error("RSI", e))?;
    let values = close.iter().map(|&c| rsi.next(c)).collect();
    Ok(mask_warmup(values, period))
}

/// Calculates MACD line, signal line and histogram
///
/// The line is undefined for the first `slow - 1` rows, signal and histogram
/// for the first `slow + signal - 2` rows.
pub fn calculate_macd(
    close: &[f64],
    fast: usize,
    slow: usize,
    signal: usize,
) -> Result<(Vec<Option<f64>>, Vec<Option<f64>>, Vec<Option<f64>>)> {
    let mut macd = MovingAverageConvergenceDivergence::new(fast, slow, signal)
        .map_err(|e| indicator_error("MACD", e))?;

    let mut line = Vec::with_capacity(close.len());
    let mut signal_line = Vec::with_capacity(close.len());
    let mut histogram = Vec::with_capacity(close.len());
    for &c in close {
        let out = macd.next(c);
        line.push(out.macd);
        signal_line.push(out.signal);
        histogram.push(out.histogram);
    }

    let line_warmup = slow.saturating_sub(1);
    let signal_warmup = slow + signal - 2;
    Ok((
        mask_warmup(line, line_warmup),
        mask_warmup(signal_line, signal_warmup),
        mask_warmup(histogram, signal_warmup),
    ))
}

/// Calculates Exponential Moving Average; the first `period - 1` rows are undefined
pub fn calculate_ema(close: &[f64], period: usize) -> Result<Vec<Option<f64>>> {
    let mut ema = ExponentialMovingAverage::new(period).map_err(|e| indicator_error("EMA", e))?;
    let values = close.iter().map(|&c| ema.next(c)).collect();
    Ok(mask_warmup(values, period.saturating_sub(1)))
}

/// Calculates Bollinger Bands as (upper, middle, lower)
pub fn calculate_bollinger_bands(
    close: &[f64],
    period: usize,
    num_std: f64,
) -> Result<(Vec<Option<f64>>, Vec<Option<f64>>, Vec<Option<f64>>)> {
    let mut bb = BollingerBands::new(period, num_std)
        .map_err(|e| indicator_error("Bollinger Bands", e))?;

    let mut upper = Vec::with_capacity(close.len());
    let mut middle = Vec::with_capacity(close.len());
    let mut lower = Vec::with_capacity(close.len());
    for &c in close {
        let out = bb.next(c);
        upper.push(out.upper);
        middle.push(out.average);
        lower.push(out.lower);
    }

    let warmup = period.saturating_sub(1);
    Ok((
        mask_warmup(upper, warmup),
        mask_warmup(middle, warmup),
        mask_warmup(lower, warmup),
    ))
}

/// Calculates On-Balance-Volume; defined from the first row
pub fn calculate_obv(close: &[f64], volume: &[f64]) -> Vec<Option<f64>> {
    let mut obv = OnBalanceVolume::default();
    close
        .iter()
        .zip(volume.iter())
        .map(|(&close, &volume)| Some(obv.next(&VolumeTick { close, volume })))
        .collect()
}

/// Calculates momentum `close[t] - close[t - period]`
pub fn calculate_momentum(close: &[f64], period: usize) -> Vec<Option<f64>> {
    (0..close.len())
        .map(|i| {
            if i < period {
                None
            } else {
                Some(close[i] - close[i - period])
            }
        })
        .collect()
}

/// Adds every technical indicator column to a price frame
///
/// The frame is validated and ordered first (see
/// [`prepare_price_frame`]). Undefined warm-up values are forward filled,
/// then back filled; an indicator with no defined value at all is zero.
/// Rows are never dropped.
///
/// # Arguments
///
/// * `df` - Price ticks with `timestamp, close, high, low, volume`
///
/// # Returns
///
/// Returns the price frame with the indicator columns appended in
/// [`TECHNICAL_INDICATORS`] order
pub fn calculate_indicators(df: &DataFrame) -> Result<DataFrame> {
    let mut df = prepare_price_frame(df)?;
    let close = column_f64(&df, "close")?;
    let volume = column_f64(&df, "volume")?;

    let rsi = calculate_rsi(&close, RSI_PERIOD)?;
    let (macd, macd_signal, macd_hist) = calculate_macd(&close, MACD_FAST, MACD_SLOW, MACD_SIGNAL)?;
    let mut emas = Vec::with_capacity(EMA_PERIODS.len());
    for period in EMA_PERIODS {
        emas.push(calculate_ema(&close, period)?);
    }
    let (bb_upper, bb_middle, bb_lower) =
        calculate_bollinger_bands(&close, BOLLINGER_PERIOD, BOLLINGER_STD_DEV)?;
    let obv = calculate_obv(&close, &volume);
    let mom = calculate_momentum(&close, MOMENTUM_PERIOD);

    let mut raw = vec![rsi, macd, macd_signal, macd_hist];
    raw.extend(emas);
    raw.extend([bb_upper, bb_middle, bb_lower, obv, mom]);

    for (name, values) in TECHNICAL_INDICATORS.iter().zip(raw.iter()) {
        let filled = fill_undefined(values);
        df.with_column(Series::new((*name).into(), filled))?;
    }

    debug!(
        "Calculated {} indicators over {} rows",
        TECHNICAL_INDICATORS.len(),
        df.height()
    );
    Ok(df)
}

/// Indicator column names, in the order they are appended
pub fn feature_columns() -> Vec<&'static str> {
    TECHNICAL_INDICATORS.to_vec()
}

/// Broadcasts one sentiment vector into the four sentiment columns
pub fn add_sentiment_columns(df: &DataFrame, sentiment: &SentimentVector) -> Result<DataFrame> {
    let mut df = df.clone();
    let n = df.height();
    let values = [
        sentiment.compound,
        sentiment.positive,
        sentiment.negative,
        sentiment.neutral,
    ];
    for (name, value) in SENTIMENT_COLUMNS.iter().zip(values) {
        df.with_column(Series::new((*name).into(), vec![value; n]))?;
    }
    Ok(df)
}

/// Price, indicator and sentiment columns for the latest row, keyed by name
pub fn latest_values(df: &DataFrame, columns: &[&str]) -> Result<Vec<(String, f64)>> {
    if df.height() == 0 {
        return Err(PredictorError::validation("no rows available"));
    }
    let last = df.height() - 1;
    columns
        .iter()
        .map(|&name| {
            let values = column_f64(df, name)?;
            Ok((name.to_string(), values[last]))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_momentum_warmup_and_values() {
        let close: Vec<f64> = (0..15).map(|i| i as f64 * 2.0).collect();
        let mom = calculate_momentum(&close, 10);
        assert!(mom[..10].iter().all(|v| v.is_none()));
        assert_eq!(mom[10], Some(20.0));
        assert_eq!(mom[14], Some(20.0));
    }

    #[test]
    fn test_warmup_lengths() {
        let close: Vec<f64> = (0..60).map(|i| 100.0 + (i as f64).sin()).collect();

        let rsi = calculate_rsi(&close, 14).unwrap();
        assert_eq!(rsi.iter().take_while(|v| v.is_none()).count(), 14);

        let (line, signal, hist) = calculate_macd(&close, 12, 26, 9).unwrap();
        assert_eq!(line.iter().take_while(|v| v.is_none()).count(), 25);
        assert_eq!(signal.iter().take_while(|v| v.is_none()).count(), 33);
        assert_eq!(hist.iter().take_while(|v| v.is_none()).count(), 33);

        let ema = calculate_ema(&close, 9).unwrap();
        assert_eq!(ema.iter().take_while(|v| v.is_none()).count(), 8);

        let (upper, _, _) = calculate_bollinger_bands(&close, 20, 2.0).unwrap();
        assert_eq!(upper.iter().take_while(|v| v.is_none()).count(), 19);
    }

    #[test]
    fn test_obv_accumulates_signed_volume() {
        let close = vec![10.0, 11.0, 10.5, 10.5];
        let volume = vec![100.0, 50.0, 20.0, 70.0];
        let obv: Vec<f64> = calculate_obv(&close, &volume)
            .into_iter()
            .map(|v| v.unwrap())
            .collect();
        assert_eq!(obv[2] - obv[1], -20.0);
        assert_eq!(obv[3], obv[2]);
        assert_eq!(obv[1] - obv[0], 50.0);
    }

    #[test]
    fn test_bollinger_ordering() {
        let close: Vec<f64> = (0..40).map(|i| 50.0 + (i % 7) as f64).collect();
        let (upper, middle, lower) = calculate_bollinger_bands(&close, 20, 2.0).unwrap();
        for i in 19..40 {
            let (u, m, l) = (upper[i].unwrap(), middle[i].unwrap(), lower[i].unwrap());
            assert!(u >= m && m >= l);
        }
    }
}
