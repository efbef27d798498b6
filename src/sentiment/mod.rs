//! News sentiment: article sources, lexicon scoring and aggregation.

pub mod aggregator;
pub mod analyzer;
pub mod news_client;

use serde::{Deserialize, Serialize};

pub use aggregator::SentimentAggregator;
pub use analyzer::{SentimentScorer, VaderScorer};
pub use news_client::{NewsApiClient, NewsArticle, NewsSource, StaticNewsSource};

/// Aggregate sentiment over a window of articles
///
/// `compound` lies in [-1, 1]; the other fields in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SentimentVector {
    pub compound: f64,
    pub positive: f64,
    pub negative: f64,
    pub neutral: f64,
}

impl SentimentVector {
    /// All-zero vector used when no articles are available
    pub fn neutral() -> Self {
        Self::default()
    }
}
