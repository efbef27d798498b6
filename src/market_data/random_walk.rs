// External crates
use async_trait::async_trait;
use chrono::{DurationRound, TimeDelta, Utc};
use polars::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;

// Local modules
use super::{ticks_to_frame, PriceSource, PriceTick};
use crate::error::{PredictorError, Result};

const HOUR_MS: i64 = 3_600_000;

/// Parameters of the simulated feed
#[derive(Debug, Clone)]
pub struct RandomWalkParams {
    pub start_price: f64,
    /// Standard deviation of the hourly log return
    pub volatility: f64,
    pub volume_mean: f64,
    pub volume_std: f64,
}

impl Default for RandomWalkParams {
    fn default() -> Self {
        Self {
            start_price: 50_000.0,
            volatility: 0.02,
            volume_mean: 1_000_000.0,
            volume_std: 100_000.0,
        }
    }
}

/// Standard normal sample via Box-Muller
fn standard_normal<R: Rng>(rng: &mut R) -> f64 {
    let u1: f64 = rng.random::<f64>().max(f64::MIN_POSITIVE);
    let u2: f64 = rng.random::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// Generates `hours` hourly ticks ending at `end_ms`
///
/// Close follows a geometric random walk; high and low bracket the close by
/// at most one volatility unit.
pub fn generate_ticks<R: Rng>(
    rng: &mut R,
    hours: usize,
    end_ms: i64,
    params: &RandomWalkParams,
) -> Vec<PriceTick> {
    let first_ms = end_ms - (hours.saturating_sub(1) as i64) * HOUR_MS;
    let mut log_price = params.start_price.ln();
    let mut previous_close = params.start_price;
    let mut ticks = Vec::with_capacity(hours);

    for i in 0..hours {
        log_price += standard_normal(rng) * params.volatility;
        let close = log_price.exp();
        let high = close * rng.random_range(1.0..=1.0 + params.volatility);
        let low = close * rng.random_range(1.0 - params.volatility..=1.0);
        let volume = (params.volume_mean + standard_normal(rng) * params.volume_std).abs();

        ticks.push(PriceTick {
            timestamp: first_ms + i as i64 * HOUR_MS,
            open: previous_close,
            high: high.max(low),
            low,
            close,
            volume,
        });
        previous_close = close;
    }
    ticks
}

/// Simulated hourly BTC feed, seedable for reproducible runs
pub struct RandomWalkSource {
    rng: Mutex<StdRng>,
    params: RandomWalkParams,
}

impl RandomWalkSource {
    pub fn new(seed: Option<u64>) -> Self {
        Self::with_params(seed, RandomWalkParams::default())
    }

    pub fn with_params(seed: Option<u64>, params: RandomWalkParams) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            rng: Mutex::new(rng),
            params,
        }
    }

    /// Synchronous variant used by tests and the CLI
    pub fn generate(&self, hours: usize) -> Result<DataFrame> {
        let end = Utc::now()
            .duration_trunc(TimeDelta::hours(1))
            .map_err(|e| PredictorError::Internal(e.to_string()))?;
        let mut rng = self
            .rng
            .lock()
            .map_err(|_| PredictorError::Internal("random walk state poisoned".into()))?;
        let ticks = generate_ticks(&mut *rng, hours, end.timestamp_millis(), &self.params);
        ticks_to_frame(&ticks)
    }
}

#[async_trait]
impl PriceSource for RandomWalkSource {
    fn name(&self) -> &str {
        "random_walk"
    }

    async fn fetch(&self, hours: usize) -> Result<DataFrame> {
        self.generate(hours)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticks_are_hourly_and_consistent() {
        let mut rng = StdRng::seed_from_u64(7);
        let ticks = generate_ticks(&mut rng, 48, 1_700_000_000_000, &RandomWalkParams::default());
        assert_eq!(ticks.len(), 48);
        assert_eq!(ticks.last().unwrap().timestamp, 1_700_000_000_000);
        for pair in ticks.windows(2) {
            assert_eq!(pair[1].timestamp - pair[0].timestamp, HOUR_MS);
        }
        for t in &ticks {
            assert!(t.high >= t.low);
            assert!(t.close > 0.0 && t.volume >= 0.0);
        }
    }

    #[test]
    fn test_same_seed_same_series() {
        let a = generate_ticks(&mut StdRng::seed_from_u64(1), 10, 0, &RandomWalkParams::default());
        let b = generate_ticks(&mut StdRng::seed_from_u64(1), 10, 0, &RandomWalkParams::default());
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_fetch_returns_requested_rows() {
        let source = RandomWalkSource::new(Some(3));
        let df = source.fetch(24).await.unwrap();
        assert_eq!(df.height(), 24);
        assert!(df.column("close").is_ok());
    }
}
