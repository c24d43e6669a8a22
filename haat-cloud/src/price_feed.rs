//! Kalimati market price proxy
//!
//! Upstream responses are cached for 5 minutes. When the upstream fails, the
//! last value is served marked `stale`; with nothing cached the call fails.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use shared::error::AppError;
use shared::util::now_millis;
use tokio::sync::RwLock;
use tokio::time::Instant;

const CACHE_TTL: Duration = Duration::from_secs(300);
const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(10);
const KALIMATI_KEY: &str = "kalimati";

struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

/// Keyed cache whose entries outlive their TTL so they can be served stale
#[derive(Clone)]
pub struct TtlCache<V> {
    entries: Arc<RwLock<HashMap<String, CacheEntry<V>>>>,
    ttl: Duration,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    /// Value if present and not yet expired
    pub async fn get_fresh(&self, key: &str) -> Option<V> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|e| e.expires_at > Instant::now())
            .map(|e| e.value.clone())
    }

    /// Value regardless of age
    pub async fn get_stale(&self, key: &str) -> Option<V> {
        self.entries.read().await.get(key).map(|e| e.value.clone())
    }

    pub async fn insert(&self, key: impl Into<String>, value: V) {
        let mut entries = self.entries.write().await;
        entries.insert(
            key.into(),
            CacheEntry {
                value,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceSnapshot {
    pub prices: Value,
    pub fetched_at: i64,
    pub stale: bool,
}

#[derive(Clone)]
pub struct PriceFeed {
    http: reqwest::Client,
    url: String,
    cache: TtlCache<(Value, i64)>,
}

impl PriceFeed {
    pub fn new(http: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
            cache: TtlCache::new(CACHE_TTL),
        }
    }

    async fn fetch_upstream(&self) -> Result<Value, reqwest::Error> {
        self.http
            .get(&self.url)
            .timeout(UPSTREAM_TIMEOUT)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }

    pub async fn kalimati(&self) -> Result<PriceSnapshot, AppError> {
        if let Some((prices, fetched_at)) = self.cache.get_fresh(KALIMATI_KEY).await {
            return Ok(PriceSnapshot {
                prices,
                fetched_at,
                stale: false,
            });
        }

        match self.fetch_upstream().await {
            Ok(prices) => {
                let fetched_at = now_millis();
                self.cache
                    .insert(KALIMATI_KEY, (prices.clone(), fetched_at))
                    .await;
                Ok(PriceSnapshot {
                    prices,
                    fetched_at,
                    stale: false,
                })
            }
            Err(e) => {
                tracing::warn!(error = %e, "Kalimati price fetch failed");
                let (prices, fetched_at) = self
                    .cache
                    .get_stale(KALIMATI_KEY)
                    .await
                    .ok_or_else(|| AppError::upstream("Market price service unavailable"))?;
                Ok(PriceSnapshot {
                    prices,
                    fetched_at,
                    stale: true,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shared::error::ErrorCode;

    #[tokio::test(start_paused = true)]
    async fn test_entry_goes_stale_after_ttl() {
        let cache = TtlCache::new(Duration::from_secs(300));
        cache.insert("k", 7).await;
        assert_eq!(cache.get_fresh("k").await, Some(7));

        tokio::time::advance(Duration::from_secs(301)).await;
        assert_eq!(cache.get_fresh("k").await, None);
        assert_eq!(cache.get_stale("k").await, Some(7));
        assert_eq!(cache.get_stale("other").await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_insert_refreshes_expiry() {
        let cache = TtlCache::new(Duration::from_secs(10));
        cache.insert("k", 1).await;
        tokio::time::advance(Duration::from_secs(8)).await;
        cache.insert("k", 2).await;
        tokio::time::advance(Duration::from_secs(8)).await;
        assert_eq!(cache.get_fresh("k").await, Some(2));
    }

    // A relative URL fails inside reqwest before any network I/O
    fn broken_feed() -> PriceFeed {
        PriceFeed::new(reqwest::Client::new(), "not-a-url")
    }

    #[tokio::test]
    async fn test_upstream_error_without_cache_is_bad_gateway() {
        let err = broken_feed().kalimati().await.unwrap_err();
        assert_eq!(err.code, ErrorCode::UpstreamError);
        assert_eq!(err.http_status(), http::StatusCode::BAD_GATEWAY);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_cache_skips_upstream() {
        let feed = broken_feed();
        feed.cache
            .insert(KALIMATI_KEY, (json!([{"commodity": "Tomato"}]), 1))
            .await;
        let snapshot = feed.kalimati().await.unwrap();
        assert!(!snapshot.stale);
        assert_eq!(snapshot.prices[0]["commodity"], "Tomato");
    }

    #[tokio::test(start_paused = true)]
    async fn test_upstream_error_serves_stale_value() {
        let feed = broken_feed();
        feed.cache
            .insert(KALIMATI_KEY, (json!({"prices": []}), 42))
            .await;
        tokio::time::advance(CACHE_TTL + Duration::from_secs(1)).await;

        let snapshot = feed.kalimati().await.unwrap();
        assert!(snapshot.stale);
        assert_eq!(snapshot.fetched_at, 42);
    }
}
