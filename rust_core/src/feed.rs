//! Feed boundary: where book snapshots come from.
//!
//! This module provides:
//! - [`OddsFeed`]: one book's snapshot source
//! - [`FeedRegistry`]: concurrent collection of one cycle's snapshots
//! - [`SnapshotCache`] / [`CachedFeed`]: time-based snapshot reuse with an injected [`Clock`]
//! - [`ReferenceFeed`]: raw reference payloads run through the normalizer
//!
//! Network clients live outside this crate and plug in by implementing
//! [`OddsFeed`] or [`RawFeedSource`].

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

use crate::normalize::{MarketNormalizer, RawFeed};
use crate::snapshot::{BookData, BookSnapshot};
use crate::types::Sport;

/// Default snapshot reuse window
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);

// ============================================================================
// Clock
// ============================================================================

/// Time source for anything that ages data.
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
#[derive(Debug)]
pub struct ManualClock {
    now: RwLock<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let step = chrono::Duration::from_std(by).unwrap_or(chrono::Duration::zero());
        *self.now.write() += step;
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.write() = now;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read()
    }
}

// ============================================================================
// Feeds
// ============================================================================

/// One book's snapshot source.
#[async_trait]
pub trait OddsFeed: Send + Sync {
    /// Book name used in views and output records
    fn name(&self) -> &str;

    /// Fetch the book's current snapshot, live or pregame
    async fn fetch(&self, live: bool) -> Result<BookSnapshot>;
}

#[async_trait]
impl<T: OddsFeed + ?Sized> OddsFeed for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn fetch(&self, live: bool) -> Result<BookSnapshot> {
        (**self).fetch(live).await
    }
}

/// Raw reference payload source (HTTP client, file replay, ...).
#[async_trait]
pub trait RawFeedSource: Send + Sync {
    async fn fetch_raw(&self, sport: Sport, live: bool) -> Result<RawFeed>;
}

/// Reference book feed: raw payload in, normalized snapshot out.
pub struct ReferenceFeed<S> {
    name: String,
    source: S,
    normalizer: MarketNormalizer,
    clock: Arc<dyn Clock>,
}

impl<S: RawFeedSource> ReferenceFeed<S> {
    pub fn new(name: impl Into<String>, source: S, normalizer: MarketNormalizer, clock: Arc<dyn Clock>) -> Self {
        Self {
            name: name.into(),
            source,
            normalizer,
            clock,
        }
    }
}

#[async_trait]
impl<S: RawFeedSource> OddsFeed for ReferenceFeed<S> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, live: bool) -> Result<BookSnapshot> {
        let raw = self.source.fetch_raw(self.normalizer.sport(), live).await?;
        let snapshot = self.normalizer.normalize_feed(&raw, self.clock.now());
        debug!(
            book = %self.name,
            raw_events = raw.events.len(),
            events = snapshot.len(),
            "normalized reference feed"
        );
        Ok(snapshot)
    }
}

// ============================================================================
// Cache
// ============================================================================

#[derive(Debug, Clone)]
struct CacheEntry {
    fetched_at: DateTime<Utc>,
    snapshot: BookSnapshot,
}

/// Last fetched snapshot per mode, reused while younger than `ttl`.
pub struct SnapshotCache {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entries: RwLock<HashMap<bool, CacheEntry>>,
}

impl SnapshotCache {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached snapshot for the mode, if still fresh.
    pub fn get(&self, live: bool) -> Option<BookSnapshot> {
        let entries = self.entries.read();
        let entry = entries.get(&live)?;
        let age = (self.clock.now() - entry.fetched_at).to_std().unwrap_or(Duration::ZERO);
        if age < self.ttl {
            Some(entry.snapshot.clone())
        } else {
            None
        }
    }

    pub fn put(&self, live: bool, snapshot: BookSnapshot) {
        self.entries.write().insert(
            live,
            CacheEntry {
                fetched_at: self.clock.now(),
                snapshot,
            },
        );
    }

    pub fn invalidate(&self) {
        self.entries.write().clear();
    }
}

/// Any feed, fronted by a [`SnapshotCache`].
pub struct CachedFeed<F> {
    inner: F,
    cache: SnapshotCache,
}

impl<F: OddsFeed> CachedFeed<F> {
    pub fn new(inner: F, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner,
            cache: SnapshotCache::new(ttl, clock),
        }
    }

    pub fn cache(&self) -> &SnapshotCache {
        &self.cache
    }
}

#[async_trait]
impl<F: OddsFeed> OddsFeed for CachedFeed<F> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn fetch(&self, live: bool) -> Result<BookSnapshot> {
        if let Some(snapshot) = self.cache.get(live) {
            debug!(book = %self.inner.name(), live, "serving cached snapshot");
            return Ok(snapshot);
        }
        let snapshot = self.inner.fetch(live).await?;
        self.cache.put(live, snapshot.clone());
        Ok(snapshot)
    }
}

// ============================================================================
// Registry
// ============================================================================

/// The books polled each cycle.
#[derive(Default)]
pub struct FeedRegistry {
    feeds: Vec<Arc<dyn OddsFeed>>,
}

impl FeedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, feed: Arc<dyn OddsFeed>) {
        info!("Registering feed: {}", feed.name());
        self.feeds.push(feed);
    }

    pub fn names(&self) -> Vec<String> {
        self.feeds.iter().map(|f| f.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.feeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.feeds.is_empty()
    }

    /// Fetch every feed concurrently.
    ///
    /// Failed feeds are logged and left out; the rest come back in
    /// registration order.
    pub async fn collect_cycle(&self, live: bool) -> Vec<BookData> {
        let fetches = self.feeds.iter().map(|feed| async move {
            let started = Instant::now();
            let result = feed.fetch(live).await;
            (feed.name(), result, started.elapsed())
        });

        let mut books = Vec::with_capacity(self.feeds.len());
        for (name, result, elapsed) in join_all(fetches).await {
            match result {
                Ok(events) => {
                    info!(
                        book = name,
                        events = events.len(),
                        "Feed {} took {:.2} seconds",
                        name,
                        elapsed.as_secs_f64()
                    );
                    books.push(BookData::new(name, events));
                }
                Err(e) => {
                    error!("Error fetching data from {} - {:#}", name, e);
                }
            }
        }
        books
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NormalizerConfig;
    use crate::snapshot::EventSnapshot;
    use anyhow::anyhow;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StaticFeed {
        name: String,
        games: Vec<&'static str>,
        calls: AtomicUsize,
        delay: Duration,
    }

    impl StaticFeed {
        fn new(name: &str, games: Vec<&'static str>, delay_ms: u64) -> Self {
            Self {
                name: name.to_string(),
                games,
                calls: AtomicUsize::new(0),
                delay: Duration::from_millis(delay_ms),
            }
        }
    }

    #[async_trait]
    impl OddsFeed for StaticFeed {
        fn name(&self) -> &str {
            &self.name
        }

        async fn fetch(&self, _live: bool) -> Result<BookSnapshot> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(self
                .games
                .iter()
                .map(|g| (g.to_string(), EventSnapshot::default()))
                .collect())
        }
    }

    struct FailingFeed;

    #[async_trait]
    impl OddsFeed for FailingFeed {
        fn name(&self) -> &str {
            "broken"
        }

        async fn fetch(&self, _live: bool) -> Result<BookSnapshot> {
            Err(anyhow!("connection reset"))
        }
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 4, 20, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_collect_cycle_keeps_order_and_drops_failures() {
        let mut registry = FeedRegistry::new();
        registry.register(Arc::new(StaticFeed::new("slow", vec!["A @ B"], 30)));
        registry.register(Arc::new(FailingFeed));
        registry.register(Arc::new(StaticFeed::new("fast", vec!["A @ B", "C @ D"], 0)));

        let books = registry.collect_cycle(true).await;
        assert_eq!(books.len(), 2);
        assert_eq!(books[0].book, "slow");
        assert_eq!(books[1].book, "fast");
        assert_eq!(books[1].events.len(), 2);
        assert_eq!(registry.names(), vec!["slow", "broken", "fast"]);
    }

    #[tokio::test]
    async fn test_cached_feed_respects_ttl() {
        let clock = Arc::new(ManualClock::new(start()));
        let inner = Arc::new(StaticFeed::new("bol", vec!["A @ B"], 0));
        let feed = CachedFeed::new(inner.clone(), DEFAULT_CACHE_TTL, clock.clone());

        feed.fetch(false).await.unwrap();
        feed.fetch(false).await.unwrap();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);

        // Live and pregame are cached separately
        feed.fetch(true).await.unwrap();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);

        clock.advance(Duration::from_secs(59));
        feed.fetch(false).await.unwrap();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);

        clock.advance(Duration::from_secs(1));
        feed.fetch(false).await.unwrap();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);

        feed.cache().invalidate();
        assert!(feed.cache().get(false).is_none());
    }

    struct FixedSource(serde_json::Value);

    #[async_trait]
    impl RawFeedSource for FixedSource {
        async fn fetch_raw(&self, sport: Sport, _live: bool) -> Result<RawFeed> {
            assert_eq!(sport, Sport::Basketball);
            Ok(serde_json::from_value(self.0.clone())?)
        }
    }

    #[tokio::test]
    async fn test_reference_feed_normalizes_with_clock() {
        let raw = serde_json::json!({
            "events": [{
                "event_id": 7, "home": "Boston Celtics", "away": "Miami Heat",
                "starts": "2024-01-05T00:10:00",
                "periods": {"num_0": {"cutoff": "2024-01-05T00:10:00",
                                      "money_line": {"home": 1.5, "away": 2.7}}}
            }]
        });
        let clock = Arc::new(ManualClock::new(start()));
        let feed = ReferenceFeed::new(
            "pin",
            FixedSource(raw),
            MarketNormalizer::new(Sport::Basketball, NormalizerConfig::default()),
            clock.clone(),
        );

        let snapshot = feed.fetch(false).await.unwrap();
        assert!(snapshot.contains_key("Miami Heat @ Boston Celtics"));

        // Past the cutoff nothing is tradeable
        clock.set(Utc.with_ymd_and_hms(2024, 1, 5, 1, 0, 0).unwrap());
        assert!(feed.fetch(false).await.unwrap().is_empty());
    }
}
