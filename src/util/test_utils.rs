// External imports
use polars::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

// Internal imports
use crate::error::Result;
use crate::market_data::random_walk::{generate_ticks, RandomWalkParams};
use crate::market_data::{ticks_to_frame, PriceTick};

const HOUR_MS: i64 = 3_600_000;
const BASE_TIMESTAMP_MS: i64 = 1_704_067_200_000; // 2024-01-01T00:00:00Z

/// Seeded random-walk price frame with `num_rows` hourly ticks
pub fn generate_test_dataframe(num_rows: usize, seed: u64) -> Result<DataFrame> {
    let mut rng = StdRng::seed_from_u64(seed);
    let end = BASE_TIMESTAMP_MS + (num_rows as i64) * HOUR_MS;
    let ticks = generate_ticks(&mut rng, num_rows, end, &RandomWalkParams::default());
    ticks_to_frame(&ticks)
}

/// Strictly increasing prices: close = 100 + i
pub fn generate_monotonic_dataframe(num_rows: usize) -> Result<DataFrame> {
    let ticks: Vec<PriceTick> = (0..num_rows)
        .map(|i| {
            let close = 100.0 + i as f64;
            PriceTick {
                timestamp: BASE_TIMESTAMP_MS + i as i64 * HOUR_MS,
                open: close - 0.5,
                high: close + 1.0,
                low: close - 1.0,
                close,
                volume: 1_000.0 + (i % 5) as f64 * 10.0,
            }
        })
        .collect();
    ticks_to_frame(&ticks)
}
