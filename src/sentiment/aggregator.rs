// External crates
use log::{info, warn};
use std::sync::Arc;

// Local modules
use super::{NewsArticle, NewsSource, SentimentScorer, SentimentVector};
use crate::error::Result;

/// Reduces per-article lexicon scores to one sentiment vector
pub struct SentimentAggregator {
    source: Arc<dyn NewsSource>,
    scorer: Arc<dyn SentimentScorer>,
}

impl SentimentAggregator {
    pub fn new(source: Arc<dyn NewsSource>, scorer: Arc<dyn SentimentScorer>) -> Self {
        Self { source, scorer }
    }

    /// Fetches the last `window_days` of articles and averages their scores
    ///
    /// Source failures surface as `ExternalService` errors; callers decide
    /// whether to fall back to [`SentimentVector::neutral`].
    pub async fn aggregate(&self, window_days: u32) -> Result<SentimentVector> {
        let articles = self.source.fetch_articles(window_days).await?;
        info!("Scoring {} news articles", articles.len());
        Ok(aggregate_articles(&articles, self.scorer.as_ref()))
    }

    /// Like [`aggregate`](Self::aggregate) but degrades to neutral sentiment
    pub async fn aggregate_or_neutral(&self, window_days: u32) -> SentimentVector {
        match self.aggregate(window_days).await {
            Ok(sentiment) => sentiment,
            Err(e) => {
                warn!("Sentiment unavailable, using neutral values: {}", e);
                SentimentVector::neutral()
            }
        }
    }
}

/// Arithmetic mean of each score field; an empty list gives all zeros
pub fn aggregate_articles(articles: &[NewsArticle], scorer: &dyn SentimentScorer) -> SentimentVector {
    if articles.is_empty() {
        return SentimentVector::neutral();
    }

    let mut total = SentimentVector::default();
    for article in articles {
        let s = scorer.score(&article.text());
        total.compound += s.compound;
        total.positive += s.positive;
        total.negative += s.negative;
        total.neutral += s.neutral;
    }

    let n = articles.len() as f64;
    SentimentVector {
        compound: total.compound / n,
        positive: total.positive / n,
        negative: total.negative / n,
        neutral: total.neutral / n,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sentiment::StaticNewsSource;

    /// Scores by text length so averages are easy to check by hand
    struct LengthScorer;

    impl SentimentScorer for LengthScorer {
        fn score(&self, text: &str) -> SentimentVector {
            let len = text.len() as f64;
            SentimentVector {
                compound: len / 10.0,
                positive: 0.5,
                negative: 0.25,
                neutral: 0.25,
            }
        }
    }

    #[test]
    fn test_empty_articles_are_all_zero() {
        let s = aggregate_articles(&[], &LengthScorer);
        assert_eq!(s, SentimentVector { compound: 0.0, positive: 0.0, negative: 0.0, neutral: 0.0 });
    }

    #[test]
    fn test_mean_per_field() {
        // "a b" has length 3, "abcd efg" has length 8
        let articles = vec![NewsArticle::new("a", "b"), NewsArticle::new("abcd", "efg")];
        let s = aggregate_articles(&articles, &LengthScorer);
        assert!((s.compound - 0.55).abs() < 1e-12);
        assert_eq!(s.positive, 0.5);
        assert_eq!(s.negative, 0.25);
    }

    #[tokio::test]
    async fn test_aggregate_from_source() {
        let source = Arc::new(StaticNewsSource::new(vec![NewsArticle::new("abcd", "e")]));
        let aggregator = SentimentAggregator::new(source, Arc::new(LengthScorer));
        let s = aggregator.aggregate(1).await.unwrap();
        assert!((s.compound - 0.6).abs() < 1e-12);
    }
}
