// External crates
use async_trait::async_trait;
use chrono::{Duration, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use std::time::Duration as StdDuration;

// Local modules
use crate::error::{PredictorError, Result};

const NEWS_API_URL: &str = "https://newsapi.org/v2/everything";
const NEWS_QUERY: &str = "bitcoin OR cryptocurrency";
const SERVICE: &str = "news";

/// One news article as returned by the news feed
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsArticle {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub published_at: Option<String>,
}

impl NewsArticle {
    pub fn new(title: &str, description: &str) -> Self {
        Self {
            title: Some(title.to_string()),
            description: Some(description.to_string()),
            ..Default::default()
        }
    }

    /// Text that gets scored: title and description joined by a space
    pub fn text(&self) -> String {
        format!(
            "{} {}",
            self.title.as_deref().unwrap_or(""),
            self.description.as_deref().unwrap_or("")
        )
    }
}

/// Source of news articles covering the last `days` days
#[async_trait]
pub trait NewsSource: Send + Sync {
    async fn fetch_articles(&self, days: u32) -> Result<Vec<NewsArticle>>;
}

#[derive(Debug, Deserialize)]
struct NewsApiResponse {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    articles: Vec<NewsArticle>,
}

/// NewsAPI `/v2/everything` client
pub struct NewsApiClient {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
}

impl NewsApiClient {
    pub fn new(api_key: Option<String>, timeout_secs: u64) -> Result<Self> {
        Self::with_base_url(api_key, timeout_secs, NEWS_API_URL)
    }

    pub fn with_base_url(api_key: Option<String>, timeout_secs: u64, base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(StdDuration::from_secs(timeout_secs))
            .build()
            .map_err(|e| PredictorError::external(SERVICE, e))?;
        Ok(Self {
            client,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            base_url: base_url.to_string(),
        })
    }
}

#[async_trait]
impl NewsSource for NewsApiClient {
    async fn fetch_articles(&self, days: u32) -> Result<Vec<NewsArticle>> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| PredictorError::external(SERVICE, "NEWS_API_KEY is not configured"))?;

        let end = Utc::now();
        let start = end - Duration::days(i64::from(days.max(1)));
        let from = start.format("%Y-%m-%d").to_string();
        let to = end.format("%Y-%m-%d").to_string();

        debug!("Fetching news from {} to {}", from, to);
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("q", NEWS_QUERY),
                ("from", from.as_str()),
                ("to", to.as_str()),
                ("language", "en"),
                ("sortBy", "publishedAt"),
                ("apiKey", api_key),
            ])
            .send()
            .await
            .map_err(|e| PredictorError::external(SERVICE, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PredictorError::external(
                SERVICE,
                format!("news feed returned HTTP {}", status),
            ));
        }

        let body: NewsApiResponse = response
            .json()
            .await
            .map_err(|e| PredictorError::external(SERVICE, format!("malformed payload: {}", e)))?;
        if body.status != "ok" {
            return Err(PredictorError::external(
                SERVICE,
                body.message.unwrap_or_else(|| format!("status '{}'", body.status)),
            ));
        }

        Ok(body.articles)
    }
}

/// In-memory article list, for development and tests
#[derive(Debug, Clone, Default)]
pub struct StaticNewsSource {
    articles: Vec<NewsArticle>,
}

impl StaticNewsSource {
    pub fn new(articles: Vec<NewsArticle>) -> Self {
        Self { articles }
    }

    /// Development feed cycling through a fixed set of crypto headlines
    pub fn sample(num_articles: usize) -> Self {
        const HEADLINES: [(&str, &str); 10] = [
            ("Bitcoin Surges to New All-Time High", "Strong buying lifts the market"),
            ("Major Company Adds Bitcoin to Balance Sheet", "Treasury diversification continues"),
            ("Cryptocurrency Market Shows Strong Recovery", "Traders regain confidence"),
            ("Bitcoin Mining Difficulty Increases", "Network security keeps growing"),
            ("New Cryptocurrency Regulations Proposed", "Lawmakers debate the rules"),
            ("Market Analysts Predict Bitcoin Price Movement", "Volatility expected this week"),
            ("Institutional Interest in Bitcoin Grows", "Funds report steady inflows"),
            ("Bitcoin Network Hash Rate Reaches Record Level", "Miners expand capacity"),
            ("Major Exchange Lists New Cryptocurrency Pairs", "More trading options for users"),
            ("Bitcoin Adoption Continues to Rise Globally", "Payments usage climbs"),
        ];
        let articles = (0..num_articles)
            .map(|i| {
                let (title, description) = HEADLINES[i % HEADLINES.len()];
                NewsArticle::new(title, description)
            })
            .collect();
        Self::new(articles)
    }
}

#[async_trait]
impl NewsSource for StaticNewsSource {
    async fn fetch_articles(&self, _days: u32) -> Result<Vec<NewsArticle>> {
        Ok(self.articles.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_article_text_joins_title_and_description() {
        let article = NewsArticle::new("Bitcoin rallies", "Buyers return");
        assert_eq!(article.text(), "Bitcoin rallies Buyers return");

        let bare = NewsArticle {
            title: Some("Only a title".into()),
            ..Default::default()
        };
        assert_eq!(bare.text(), "Only a title ");
    }

    #[tokio::test]
    async fn test_sample_feed_cycles_headlines() {
        let articles = StaticNewsSource::sample(12).fetch_articles(1).await.unwrap();
        assert_eq!(articles.len(), 12);
        assert_eq!(articles[0].text(), articles[10].text());
        assert!(articles.iter().all(|a| a.title.is_some() && a.description.is_some()));
    }

    #[test]
    fn test_payload_parses_camel_case() {
        let json = r#"{"status":"ok","totalResults":1,"articles":[
            {"title":"t","description":null,"publishedAt":"2024-01-01T00:00:00Z"}]}"#;
        let body: NewsApiResponse = serde_json::from_str(json).unwrap();
        assert_eq!(body.articles.len(), 1);
        assert_eq!(body.articles[0].published_at.as_deref(), Some("2024-01-01T00:00:00Z"));
    }

    #[tokio::test]
    async fn test_missing_key_is_external_error() {
        let client = NewsApiClient::new(None, 1).unwrap();
        let err = client.fetch_articles(1).await.unwrap_err();
        assert_eq!(err.code(), "EXTERNAL_SERVICE_ERROR");
    }

    #[tokio::test]
    async fn test_unreachable_feed_is_external_error() {
        let client =
            NewsApiClient::with_base_url(Some("key".into()), 1, "http://127.0.0.1:9/v2/everything")
                .unwrap();
        let err = client.fetch_articles(1).await.unwrap_err();
        assert!(matches!(err, PredictorError::ExternalService { .. }));
    }
}
