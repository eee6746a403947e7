//! Client-side freshness cache for the site's content collections.
//!
//! Each collection is persisted as two entries of a [`KeyValueStore`]: the
//! items as one JSON array and the time of the last successful fetch as an
//! RFC 3339 string. A load serves the persisted items while they are younger
//! than the collection's threshold and refetches them otherwise.
//!
//! Loads of the same collection are serialized. A caller that waited for
//! another caller's refresh sees the fresh items and does not fetch again.

mod site;
mod source;
mod store;

pub use site::*;
pub use source::*;
pub use store::*;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use dashmap::DashMap;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    /// Network failure, timeout, or an error status from the backend
    #[error("content source unavailable: {0}")]
    Transport(String),
    /// The backend answered OK with a body that is not the expected collection
    #[error("malformed collection payload: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("cache storage failed: {0}")]
    Store(String),
}

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[cfg(test)]
#[derive(Debug)]
pub struct ManualClock {
    now: std::sync::Mutex<DateTime<Utc>>,
}

#[cfg(test)]
impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: std::sync::Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|p| p.into_inner());
        *now += chrono::Duration::from_std(by).unwrap_or_else(|_| chrono::Duration::zero());
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|p| p.into_inner()) = to;
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// How one collection is stored, fetched and aged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionSpec {
    /// Store key of the JSON item array
    pub key: String,
    /// Store key of the last refresh timestamp
    pub timestamp_key: String,
    /// Backend path the collection is fetched from
    pub endpoint: String,
    /// Maximum age before the items are refetched
    pub threshold: Duration,
}

impl CollectionSpec {
    pub fn new(
        key: impl Into<String>,
        timestamp_key: impl Into<String>,
        endpoint: impl Into<String>,
        threshold: Duration,
    ) -> Self {
        Self {
            key: key.into(),
            timestamp_key: timestamp_key.into(),
            endpoint: endpoint.into(),
            threshold,
        }
    }

    pub fn services(threshold: Duration) -> Self {
        Self::new("services", "lastUpdatedServices", "/api/services", threshold)
    }

    pub fn projects(threshold: Duration) -> Self {
        Self::new("projects", "lastUpdated", "/api/projects", threshold)
    }

    pub fn with_threshold(mut self, threshold: Duration) -> Self {
        self.threshold = threshold;
        self
    }
}

struct Persisted<T> {
    items: Vec<T>,
    refreshed_at: DateTime<Utc>,
}

pub struct ContentCache<S, F> {
    store: S,
    source: F,
    clock: Arc<dyn Clock>,
    locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
}

impl<S: KeyValueStore, F: ContentSource> ContentCache<S, F> {
    pub fn new(store: S, source: F) -> Self {
        Self::with_clock(store, source, Arc::new(SystemClock))
    }

    pub fn with_clock(store: S, source: F, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            source,
            clock,
            locks: DashMap::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    #[cfg(test)]
    pub fn source(&self) -> &F {
        &self.source
    }

    /// Return the collection's items, refetching them when missing or stale.
    pub async fn load<T>(&self, spec: &CollectionSpec) -> Result<Vec<T>, CacheError>
    where
        T: Serialize + DeserializeOwned + Send,
    {
        let lock = self.lock_for(&spec.key);
        let _guard = lock.lock().await;

        match self.read_persisted::<T>(spec) {
            None => {
                tracing::debug!(collection = %spec.key, "nothing cached, fetching");
                self.refresh_locked(spec, Vec::new()).await
            }
            Some(persisted) if self.is_fresh(persisted.refreshed_at, spec.threshold) => {
                tracing::debug!(collection = %spec.key, "serving cached items");
                Ok(persisted.items)
            }
            Some(persisted) => {
                tracing::debug!(collection = %spec.key, "cached items are stale, refetching");
                self.refresh_locked(spec, persisted.items).await
            }
        }
    }

    /// Fetch the collection now. `fallback` is returned when the backend has no content.
    pub async fn refresh<T>(&self, spec: &CollectionSpec, fallback: Vec<T>) -> Result<Vec<T>, CacheError>
    where
        T: Serialize + DeserializeOwned + Send,
    {
        let lock = self.lock_for(&spec.key);
        let _guard = lock.lock().await;
        self.refresh_locked(spec, fallback).await
    }

    /// Time of the last successful refresh, if one is persisted.
    pub fn last_refreshed_at(&self, spec: &CollectionSpec) -> Option<DateTime<Utc>> {
        self.store
            .get(&spec.timestamp_key)
            .and_then(|raw| parse_timestamp(&raw))
    }

    async fn refresh_locked<T>(&self, spec: &CollectionSpec, fallback: Vec<T>) -> Result<Vec<T>, CacheError>
    where
        T: Serialize + DeserializeOwned + Send,
    {
        let response = match self.source.fetch(&spec.endpoint).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(collection = %spec.key, "refresh failed: {}", e);
                return Err(e);
            }
        };

        match response {
            FetchResponse::Content(body) => {
                let items: Vec<T> = serde_json::from_str(&body).map_err(|e| {
                    tracing::warn!(collection = %spec.key, "refresh returned malformed items: {}", e);
                    CacheError::Decode(e)
                })?;
                let blob = serde_json::to_string(&items)?;
                let refreshed_at = self
                    .clock
                    .now()
                    .to_rfc3339_opts(SecondsFormat::Millis, true);

                // Items first: a failure between the writes leaves an old timestamp,
                // which only causes an extra refetch.
                self.store.set(&spec.key, &blob)?;
                self.store.set(&spec.timestamp_key, &refreshed_at)?;
                tracing::debug!(collection = %spec.key, count = items.len(), "cache refreshed");
                Ok(items)
            }
            FetchResponse::NoContent => {
                tracing::debug!(collection = %spec.key, "no content, keeping previous items");
                Ok(fallback)
            }
        }
    }

    fn read_persisted<T: DeserializeOwned>(&self, spec: &CollectionSpec) -> Option<Persisted<T>> {
        let raw_items = self.store.get(&spec.key)?;
        let refreshed_at = self.last_refreshed_at(spec)?;

        match serde_json::from_str(&raw_items) {
            Ok(items) => Some(Persisted {
                items,
                refreshed_at,
            }),
            Err(e) => {
                tracing::warn!(collection = %spec.key, "ignoring unreadable cached items: {}", e);
                None
            }
        }
    }

    fn is_fresh(&self, refreshed_at: DateTime<Utc>, threshold: Duration) -> bool {
        // A timestamp in the future fails to_std and counts as stale
        (self.clock.now() - refreshed_at)
            .to_std()
            .map(|age| age < threshold)
            .unwrap_or(false)
    }

    fn lock_for(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.locks.entry(key.to_string()).or_default().clone()
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Service;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Scripted source: serves `response` (or fails) and counts calls.
    struct FakeSource {
        response: Mutex<Result<FetchResponse, String>>,
        calls: AtomicUsize,
        delay: Duration,
    }

    impl FakeSource {
        fn ok(body: &str) -> Self {
            Self {
                response: Mutex::new(Ok(FetchResponse::Content(body.to_string()))),
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn respond(&self, response: Result<FetchResponse, String>) {
            *self.response.lock().unwrap() = response;
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ContentSource for FakeSource {
        async fn fetch(&self, _endpoint: &str) -> Result<FetchResponse, CacheError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.response
                .lock()
                .unwrap()
                .clone()
                .map_err(CacheError::Transport)
        }
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn cache(source: FakeSource) -> (ContentCache<MemoryStore, FakeSource>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(start()));
        let cache = ContentCache::with_clock(MemoryStore::new(), source, clock.clone());
        (cache, clock)
    }

    fn spec() -> CollectionSpec {
        CollectionSpec::services(Duration::from_secs(30))
    }

    const WEB: &str = r#"[{"name":"Web Development","description":"Sites"}]"#;
    const DATA: &str = r#"[{"name":"Data Science","description":"Models"},{"name":"DevOps","description":"Pipelines"}]"#;

    #[tokio::test]
    async fn test_first_load_fetches_and_persists() {
        let (cache, _clock) = cache(FakeSource::ok(WEB));

        let items: Vec<Service> = cache.load(&spec()).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "Web Development");
        assert_eq!(cache.source().calls(), 1);

        assert!(cache.store().get("services").is_some());
        assert_eq!(
            cache.store().get("lastUpdatedServices").as_deref(),
            Some("2024-05-01T12:00:00.000Z")
        );
    }

    #[tokio::test]
    async fn test_fresh_entry_is_served_without_fetching() {
        let (cache, clock) = cache(FakeSource::ok(WEB));
        let _: Vec<Service> = cache.load(&spec()).await.unwrap();

        for age in [0u64, 1, 15, 29] {
            clock.set(start() + chrono::Duration::seconds(age as i64));
            let items: Vec<Service> = cache.load(&spec()).await.unwrap();
            assert_eq!(items.len(), 1);
        }
        assert_eq!(cache.source().calls(), 1);
    }

    #[tokio::test]
    async fn test_stale_entry_is_refetched_once_per_load() {
        let (cache, clock) = cache(FakeSource::ok(WEB));
        let _: Vec<Service> = cache.load(&spec()).await.unwrap();

        cache.source().respond(Ok(FetchResponse::Content(DATA.to_string())));
        clock.advance(Duration::from_secs(30));

        let items: Vec<Service> = cache.load(&spec()).await.unwrap();
        assert_eq!(cache.source().calls(), 2);
        let names: Vec<&str> = items.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Data Science", "DevOps"]);
        assert_eq!(cache.last_refreshed_at(&spec()), Some(start() + chrono::Duration::seconds(30)));
    }

    #[tokio::test]
    async fn test_successful_refresh_replaces_items_entirely() {
        let (cache, clock) = cache(FakeSource::ok(DATA));
        let _: Vec<Service> = cache.load(&spec()).await.unwrap();

        cache.source().respond(Ok(FetchResponse::Content(WEB.to_string())));
        clock.advance(Duration::from_secs(60));
        let _: Vec<Service> = cache.load(&spec()).await.unwrap();

        let persisted: Vec<Service> =
            serde_json::from_str(&cache.store().get("services").unwrap()).unwrap();
        assert_eq!(persisted.len(), 1);
        assert_eq!(persisted[0].name, "Web Development");
    }

    #[tokio::test]
    async fn test_no_content_keeps_items_and_timestamp() {
        let (cache, clock) = cache(FakeSource::ok(WEB));
        let _: Vec<Service> = cache.load(&spec()).await.unwrap();
        let stamp_before = cache.store().get("lastUpdatedServices");

        cache.source().respond(Ok(FetchResponse::NoContent));
        clock.advance(Duration::from_secs(45));

        let items: Vec<Service> = cache.load(&spec()).await.unwrap();
        assert_eq!(items[0].name, "Web Development");
        assert_eq!(cache.store().get("lastUpdatedServices"), stamp_before);
        assert_eq!(cache.store().get("services").as_deref().map(|s| s.contains("Web")), Some(true));

        // Still stale, so the next load asks again
        let _: Vec<Service> = cache.load(&spec()).await.unwrap();
        assert_eq!(cache.source().calls(), 3);
    }

    #[tokio::test]
    async fn test_no_content_without_cache_is_empty() {
        let source = FakeSource::ok(WEB);
        source.respond(Ok(FetchResponse::NoContent));
        let (cache, _clock) = cache(source);

        let items: Vec<Service> = cache.load(&spec()).await.unwrap();
        assert!(items.is_empty());
        assert_eq!(cache.store().get("services"), None);
        assert_eq!(cache.store().get("lastUpdatedServices"), None);
    }

    #[tokio::test]
    async fn test_transport_error_leaves_state_untouched() {
        let (cache, clock) = cache(FakeSource::ok(WEB));
        let _: Vec<Service> = cache.load(&spec()).await.unwrap();
        let items_before = cache.store().get("services");
        let stamp_before = cache.store().get("lastUpdatedServices");

        cache.source().respond(Err("connection refused".to_string()));
        clock.advance(Duration::from_secs(31));

        let result: Result<Vec<Service>, _> = cache.load(&spec()).await;
        assert!(matches!(result, Err(CacheError::Transport(_))));
        assert_eq!(cache.store().get("services"), items_before);
        assert_eq!(cache.store().get("lastUpdatedServices"), stamp_before);
    }

    #[tokio::test]
    async fn test_malformed_body_is_an_error_and_not_persisted() {
        let source = FakeSource::ok("{\"oops\": true}");
        let (cache, _clock) = cache(source);

        let result: Result<Vec<Service>, _> = cache.load(&spec()).await;
        assert!(matches!(result, Err(CacheError::Decode(_))));
        assert_eq!(cache.store().get("services"), None);
    }

    #[tokio::test]
    async fn test_future_timestamp_counts_as_stale() {
        let (cache, _clock) = cache(FakeSource::ok(WEB));
        cache.store().set("services", "[]").unwrap();
        cache
            .store()
            .set("lastUpdatedServices", "2999-01-01T00:00:00.000Z")
            .unwrap();

        let items: Vec<Service> = cache.load(&spec()).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(cache.source().calls(), 1);
    }

    #[tokio::test]
    async fn test_unreadable_persisted_state_is_treated_as_absent() {
        let (cache, _clock) = cache(FakeSource::ok(WEB));
        cache.store().set("services", "not json").unwrap();
        cache
            .store()
            .set("lastUpdatedServices", "2024-05-01T12:00:00.000Z")
            .unwrap();

        let items: Vec<Service> = cache.load(&spec()).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(cache.source().calls(), 1);
    }

    #[tokio::test]
    async fn test_thresholds_are_per_collection() {
        let (cache, clock) = cache(FakeSource::ok(WEB));
        let short = CollectionSpec::services(Duration::from_secs(30));
        let long = CollectionSpec::projects(Duration::from_secs(1)).with_threshold(Duration::from_secs(3600));

        let _: Vec<Service> = cache.load(&short).await.unwrap();
        let _: Vec<Service> = cache.load(&long).await.unwrap();
        assert_eq!(cache.source().calls(), 2);

        clock.advance(Duration::from_secs(120));
        let _: Vec<Service> = cache.load(&short).await.unwrap();
        let _: Vec<Service> = cache.load(&long).await.unwrap();
        assert_eq!(cache.source().calls(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_loads_share_one_fetch() {
        let source = FakeSource::ok(WEB).with_delay(Duration::from_millis(50));
        let (cache, _clock) = cache(source);
        let cache = Arc::new(cache);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.load::<Service>(&spec()).await })
            })
            .collect();

        for handle in handles {
            let items = handle.await.unwrap().unwrap();
            assert_eq!(items.len(), 1);
        }
        assert_eq!(cache.source().calls(), 1);
    }
}
