//! Resolution of rotating per-operation identifiers.
//!
//! Lookup order is: fresh cache entry, shipped fallback table, then a single
//! deduplicated refresh from the client bundles followed by one more cache
//! lookup.

mod cache;
mod constants;
mod scraper;

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info};

pub use cache::{QueryIdCache, QueryIdCacheEntry};
pub use constants::{
    fallback_query_id, target_operations, API_BASE, DEFAULT_TTL, DISCOVERY_PAGES,
    FALLBACK_QUERY_IDS,
};
pub use scraper::{
    extract_bundle_urls, extract_operations, is_valid_query_id, BundleScraper,
    OperationDiscovery, ScrapeError, DEFAULT_BUNDLE_CONCURRENCY,
};

/// Where a resolved identifier came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryIdSource {
    FreshCache,
    StaleCache,
    Fallback,
}

impl QueryIdSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FreshCache => "cache",
            Self::StaleCache => "stale cache",
            Self::Fallback => "built-in",
        }
    }
}

/// Identifier status for one known operation.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryIdStatus {
    pub operation: String,
    pub id: String,
    pub source: QueryIdSource,
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("no identifier available for operation {0}")]
pub struct QueryIdNotFound(pub String);

/// Maps operation names to their current identifiers.
pub struct QueryIdResolver {
    cache: RwLock<QueryIdCache>,
    discovery: Arc<dyn OperationDiscovery>,
    ttl: Duration,
    refresh_lock: Mutex<()>,
    generation: AtomicU64,
    last_discovered: AtomicUsize,
}

impl QueryIdResolver {
    pub fn new(cache: QueryIdCache, discovery: Arc<dyn OperationDiscovery>) -> Self {
        Self {
            cache: RwLock::new(cache),
            discovery,
            ttl: DEFAULT_TTL,
            refresh_lock: Mutex::new(()),
            generation: AtomicU64::new(0),
            last_discovered: AtomicUsize::new(0),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    fn fresh_cached(&self, operation: &str) -> Option<String> {
        let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
        cache.fresh(operation, self.ttl).map(str::to_string)
    }

    /// Resolve the identifier for an operation.
    pub async fn resolve(&self, operation: &str) -> Result<String, QueryIdNotFound> {
        if let Some(id) = self.fresh_cached(operation) {
            return Ok(id);
        }
        if let Some(id) = fallback_query_id(operation) {
            return Ok(id.to_string());
        }

        debug!("No identifier for {}, refreshing", operation);
        self.refresh().await;

        self.fresh_cached(operation)
            .ok_or_else(|| QueryIdNotFound(operation.to_string()))
    }

    /// Rediscover identifiers and merge them into the cache.
    ///
    /// Callers arriving while a refresh is running wait for it and share its
    /// result instead of scraping again. Returns the number of operations
    /// discovered by the refresh.
    pub async fn refresh(&self) -> usize {
        let observed = self.generation.load(Ordering::SeqCst);
        let _guard = self.refresh_lock.lock().await;
        if self.generation.load(Ordering::SeqCst) != observed {
            debug!("Joined an in-flight identifier refresh");
            return self.last_discovered.load(Ordering::SeqCst);
        }

        let discovered = self.discovery.discover().await;
        let count = discovered.len();
        if count > 0 {
            let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
            cache.merge(discovered.iter(), Utc::now());
            cache.persist();
        }
        info!("Identifier refresh discovered {} operations", count);

        self.last_discovered.store(count, Ordering::SeqCst);
        self.generation.fetch_add(1, Ordering::SeqCst);
        count
    }

    /// Current identifier and its origin for every known operation.
    pub fn status(&self) -> Vec<QueryIdStatus> {
        let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
        let now = Utc::now();

        target_operations()
            .into_iter()
            .filter_map(|operation| {
                let cached = cache.get(operation);
                match (cached, fallback_query_id(operation)) {
                    (Some(entry), _) if entry.is_fresh(self.ttl, now) => Some(QueryIdStatus {
                        operation: operation.to_string(),
                        id: entry.id.clone(),
                        source: QueryIdSource::FreshCache,
                    }),
                    (_, Some(id)) => Some(QueryIdStatus {
                        operation: operation.to_string(),
                        id: id.to_string(),
                        source: QueryIdSource::Fallback,
                    }),
                    (Some(entry), None) => Some(QueryIdStatus {
                        operation: operation.to_string(),
                        id: entry.id.clone(),
                        source: QueryIdSource::StaleCache,
                    }),
                    (None, None) => None,
                }
            })
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;

    /// Discovery fake returning a fixed map and counting calls.
    pub struct FixedDiscovery {
        pub found: HashMap<String, String>,
        pub calls: AtomicUsize,
        pub delay: Duration,
    }

    impl FixedDiscovery {
        pub fn new(found: &[(&str, &str)]) -> Self {
            Self {
                found: found
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl OperationDiscovery for FixedDiscovery {
        async fn discover(&self) -> HashMap<String, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.found.clone()
        }
    }

    fn stale_entry(id: &str) -> QueryIdCacheEntry {
        QueryIdCacheEntry {
            id: id.to_string(),
            fetched_at: Utc::now() - chrono::Duration::hours(25),
        }
    }

    #[tokio::test]
    async fn test_fresh_cache_wins() {
        let discovery = Arc::new(FixedDiscovery::new(&[]));
        let mut cache = QueryIdCache::in_memory();
        cache.insert(
            "Likes",
            QueryIdCacheEntry {
                id: "cached".to_string(),
                fetched_at: Utc::now(),
            },
        );
        let resolver = QueryIdResolver::new(cache, discovery.clone());
        assert_eq!(resolver.resolve("Likes").await.unwrap(), "cached");
        assert_eq!(discovery.calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_cache_uses_fallback_without_refresh() {
        let discovery = Arc::new(FixedDiscovery::new(&[("Likes", "Z")]));
        let resolver = QueryIdResolver::new(QueryIdCache::in_memory(), discovery.clone());
        assert_eq!(
            resolver.resolve("Likes").await.unwrap(),
            fallback_query_id("Likes").unwrap()
        );
        assert_eq!(discovery.calls(), 0);
    }

    #[tokio::test]
    async fn test_stale_entry_without_fallback_refreshes_once() {
        let discovery = Arc::new(FixedDiscovery::new(&[("HomeLatestTimeline", "Y")]));
        let mut cache = QueryIdCache::in_memory();
        cache.insert("HomeLatestTimeline", stale_entry("X"));
        let resolver = QueryIdResolver::new(cache, discovery.clone());

        assert_eq!(resolver.resolve("HomeLatestTimeline").await.unwrap(), "Y");
        assert_eq!(discovery.calls(), 1);
    }

    #[tokio::test]
    async fn test_unknown_operation_fails_after_one_refresh() {
        let discovery = Arc::new(FixedDiscovery::new(&[]));
        let resolver = QueryIdResolver::new(QueryIdCache::in_memory(), discovery.clone());
        let err = resolver.resolve("Nonexistent").await.unwrap_err();
        assert_eq!(err.0, "Nonexistent");
        assert_eq!(discovery.calls(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_refreshes_are_deduplicated() {
        let mut discovery = FixedDiscovery::new(&[("HomeLatestTimeline", "Y")]);
        discovery.delay = Duration::from_millis(50);
        let discovery = Arc::new(discovery);
        let resolver = Arc::new(QueryIdResolver::new(
            QueryIdCache::in_memory(),
            discovery.clone(),
        ));

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let resolver = resolver.clone();
                tokio::spawn(async move { resolver.resolve("HomeLatestTimeline").await })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "Y");
        }
        assert_eq!(discovery.calls(), 1);
    }

    #[tokio::test]
    async fn test_status_reports_sources() {
        let discovery = Arc::new(FixedDiscovery::new(&[]));
        let mut cache = QueryIdCache::in_memory();
        cache.insert("HomeLatestTimeline", stale_entry("H"));
        let resolver = QueryIdResolver::new(cache, discovery);

        let status = resolver.status();
        let home = status
            .iter()
            .find(|s| s.operation == "HomeLatestTimeline")
            .unwrap();
        assert_eq!(home.source, QueryIdSource::StaleCache);
        let likes = status.iter().find(|s| s.operation == "Likes").unwrap();
        assert_eq!(likes.source, QueryIdSource::Fallback);
    }
}
