// External crates
use vader_sentiment::SentimentIntensityAnalyzer;

// Local modules
use super::SentimentVector;

/// Scores a single piece of text
pub trait SentimentScorer: Send + Sync {
    fn score(&self, text: &str) -> SentimentVector;
}

/// Lexicon scorer backed by the VADER rule set
pub struct VaderScorer {
    analyzer: SentimentIntensityAnalyzer<'static>,
}

impl VaderScorer {
    pub fn new() -> Self {
        Self {
            analyzer: SentimentIntensityAnalyzer::new(),
        }
    }
}

impl Default for VaderScorer {
    fn default() -> Self {
        Self::new()
    }
}

impl SentimentScorer for VaderScorer {
    fn score(&self, text: &str) -> SentimentVector {
        let scores = self.analyzer.polarity_scores(text);
        let field = |key: &str| scores.get(key).copied().unwrap_or(0.0);
        SentimentVector {
            compound: field("compound"),
            positive: field("pos"),
            negative: field("neg"),
            neutral: field("neu"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positive_and_negative_text() {
        let scorer = VaderScorer::new();
        let good = scorer.score("Bitcoin surges to a great new high, investors are happy");
        let bad = scorer.score("Bitcoin crashes, terrible losses and panic");
        assert!(good.compound > 0.0);
        assert!(bad.compound < 0.0);
    }

    #[test]
    fn test_scores_within_bounds() {
        let scorer = VaderScorer::new();
        let s = scorer.score("Market analysts predict bitcoin price movement");
        assert!((-1.0..=1.0).contains(&s.compound));
        for v in [s.positive, s.negative, s.neutral] {
            assert!((0.0..=1.0).contains(&v));
        }
    }
}
