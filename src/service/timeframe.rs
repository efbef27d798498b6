use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::PredictorError;

/// Prediction horizon accepted by the predict endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "4h")]
    FourHours,
    #[serde(rename = "24h")]
    OneDay,
    #[serde(rename = "7d")]
    OneWeek,
}

impl Timeframe {
    pub const ALL: [Timeframe; 4] = [
        Timeframe::OneHour,
        Timeframe::FourHours,
        Timeframe::OneDay,
        Timeframe::OneWeek,
    ];

    /// Number of hourly steps forecast for this horizon
    pub fn steps(self) -> usize {
        match self {
            Timeframe::OneHour => 1,
            Timeframe::FourHours => 4,
            Timeframe::OneDay => 24,
            Timeframe::OneWeek => 168,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Timeframe::OneHour => "1h",
            Timeframe::FourHours => "4h",
            Timeframe::OneDay => "24h",
            Timeframe::OneWeek => "7d",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = PredictorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Timeframe::ALL
            .into_iter()
            .find(|tf| tf.as_str() == s.trim())
            .ok_or_else(|| {
                PredictorError::validation(format!(
                    "invalid timeframe '{}', expected one of 1h, 4h, 24h, 7d",
                    s
                ))
            })
    }
}
