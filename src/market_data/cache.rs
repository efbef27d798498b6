// External crates
use async_trait::async_trait;
use log::warn;
use polars::prelude::*;
use std::sync::{Arc, Mutex};
use std::time::Duration;

// Local modules
use super::PriceSource;
use crate::error::{PredictorError, Result};

/// Wraps a price source with a timeout and a last-known-good fallback
///
/// Successful fetches are remembered; when the inner source fails or times
/// out, the most recent cached frame (trimmed to the requested length) is
/// served instead. Without a cached frame, or when it holds fewer rows than
/// requested, the fetch fails as an external service error.
pub struct CachedPriceSource {
    inner: Arc<dyn PriceSource>,
    timeout: Duration,
    last_good: Mutex<Option<DataFrame>>,
}

impl CachedPriceSource {
    pub fn new(inner: Arc<dyn PriceSource>, timeout: Duration) -> Self {
        Self {
            inner,
            timeout,
            last_good: Mutex::new(None),
        }
    }

    fn cached(&self) -> Option<DataFrame> {
        self.last_good.lock().ok().and_then(|guard| guard.clone())
    }

    fn remember(&self, df: &DataFrame) {
        if let Ok(mut guard) = self.last_good.lock() {
            *guard = Some(df.clone());
        }
    }
}

#[async_trait]
impl PriceSource for CachedPriceSource {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn fetch(&self, hours: usize) -> Result<DataFrame> {
        let outcome = match tokio::time::timeout(self.timeout, self.inner.fetch(hours)).await {
            Ok(result) => result,
            Err(_) => Err(PredictorError::external(
                self.inner.name(),
                format!("timed out after {:?}", self.timeout),
            )),
        };

        match outcome {
            Ok(df) => {
                self.remember(&df);
                Ok(df)
            }
            Err(e) => match self.cached() {
                Some(df) if df.height() < hours => {
                    warn!(
                        "Price source '{}' failed and the cache holds only {} of {} rows",
                        self.inner.name(),
                        df.height(),
                        hours
                    );
                    Err(PredictorError::external(
                        self.inner.name(),
                        format!("{}; cached history has {} of {} rows", e, df.height(), hours),
                    ))
                }
                Some(df) => {
                    warn!(
                        "Price source '{}' failed ({}), serving cached data",
                        self.inner.name(),
                        e
                    );
                    let height = df.height();
                    Ok(df.slice(height.saturating_sub(hours) as i64, hours))
                }
                None => Err(e),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::RandomWalkSource;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Succeeds until switched off
    struct FlakySource {
        inner: RandomWalkSource,
        healthy: AtomicBool,
    }

    #[async_trait]
    impl PriceSource for FlakySource {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn fetch(&self, hours: usize) -> Result<DataFrame> {
            if self.healthy.load(Ordering::SeqCst) {
                self.inner.fetch(hours).await
            } else {
                Err(PredictorError::external("flaky", "down"))
            }
        }
    }

    #[tokio::test]
    async fn test_falls_back_to_last_good_frame() {
        let flaky = Arc::new(FlakySource {
            inner: RandomWalkSource::new(Some(11)),
            healthy: AtomicBool::new(true),
        });
        let cached = CachedPriceSource::new(flaky.clone(), Duration::from_secs(5));

        let fresh = cached.fetch(30).await.unwrap();
        flaky.healthy.store(false, Ordering::SeqCst);
        let fallback = cached.fetch(10).await.unwrap();

        assert_eq!(fallback.height(), 10);
        assert!(fallback.equals(&fresh.slice(20, 10)));
    }

    #[tokio::test]
    async fn test_short_cache_is_not_served() {
        let flaky = Arc::new(FlakySource {
            inner: RandomWalkSource::new(Some(11)),
            healthy: AtomicBool::new(true),
        });
        let cached = CachedPriceSource::new(flaky.clone(), Duration::from_secs(5));

        cached.fetch(30).await.unwrap();
        flaky.healthy.store(false, Ordering::SeqCst);
        let err = cached.fetch(90).await.unwrap_err();
        assert_eq!(err.code(), "EXTERNAL_SERVICE_ERROR");
        assert!(err.to_string().contains("30 of 90 rows"), "{}", err);

        assert_eq!(cached.fetch(30).await.unwrap().height(), 30);
    }

    #[tokio::test]
    async fn test_error_without_cache() {
        let flaky = Arc::new(FlakySource {
            inner: RandomWalkSource::new(Some(11)),
            healthy: AtomicBool::new(false),
        });
        let cached = CachedPriceSource::new(flaky, Duration::from_secs(5));
        let err = cached.fetch(10).await.unwrap_err();
        assert_eq!(err.code(), "EXTERNAL_SERVICE_ERROR");
    }
}
