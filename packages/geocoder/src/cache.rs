//! TTL-bounded geocode cache.
//!
//! Entries expire a fixed TTL after insertion. Expired entries are ignored
//! (and dropped) on read and removed in bulk by [`GeocodeCache::sweep`],
//! which [`spawn_sweeper`] runs periodically. Time comes from an injected
//! [`Clock`] so expiry can be tested without sleeping.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use blotter_incident_models::Coordinate;
use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::RwLock;

/// A cached lookup outcome.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CachedValue {
    /// The service resolved the query.
    Found(Coordinate),
    /// The service answered but had no match.
    NotFound,
}

impl CachedValue {
    /// The coordinate, if one was found.
    #[must_use]
    pub const fn coordinate(self) -> Option<Coordinate> {
        match self {
            Self::Found(c) => Some(c),
            Self::NotFound => None,
        }
    }
}

impl From<Option<Coordinate>> for CachedValue {
    fn from(value: Option<Coordinate>) -> Self {
        value.map_or(Self::NotFound, Self::Found)
    }
}

/// Source of the current time.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    /// Creates a clock stopped at `start`.
    #[must_use]
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            millis: AtomicI64::new(start.timestamp_millis()),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        let by = i64::try_from(by.as_millis()).unwrap_or(i64::MAX);
        self.millis.fetch_add(by, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.millis.load(Ordering::SeqCst)).unwrap_or_default()
    }
}

/// Key/value store for geocode outcomes.
#[async_trait]
pub trait GeocodeCache: Send + Sync {
    /// Returns the live entry for `key`, if any.
    async fn get(&self, key: &str) -> Option<CachedValue>;

    /// Stores `value` under `key`, replacing any previous entry and
    /// restarting its TTL.
    async fn set(&self, key: &str, value: CachedValue);

    /// Removes expired entries and returns how many were removed.
    async fn sweep(&self) -> usize;

    /// Number of stored entries, expired or not.
    async fn len(&self) -> usize;

    /// Whether the cache holds no entries.
    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    value: CachedValue,
    expires_at: DateTime<Utc>,
}

/// In-process [`GeocodeCache`]. Not persisted across restarts.
#[derive(Debug)]
pub struct MemoryGeocodeCache {
    entries: RwLock<HashMap<String, Entry>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl MemoryGeocodeCache {
    /// Creates a cache on the system clock.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    /// Creates a cache on the given clock.
    #[must_use]
    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            clock,
        }
    }

    fn expiry_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        TimeDelta::from_std(self.ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

#[async_trait]
impl GeocodeCache for MemoryGeocodeCache {
    async fn get(&self, key: &str) -> Option<CachedValue> {
        let now = self.clock.now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                None => return None,
                Some(entry) if entry.expires_at > now => return Some(entry.value),
                Some(_) => {}
            }
        }

        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|e| e.expires_at <= now) {
            entries.remove(key);
        }
        None
    }

    async fn set(&self, key: &str, value: CachedValue) {
        let expires_at = self.expiry_from(self.clock.now());
        self.entries
            .write()
            .await
            .insert(key.to_string(), Entry { value, expires_at });
    }

    async fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }

    async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

/// Runs [`GeocodeCache::sweep`] every `interval` until the returned handle
/// is aborted.
pub fn spawn_sweeper(
    cache: Arc<dyn GeocodeCache>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // First tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = cache.sweep().await;
            if removed > 0 {
                log::debug!("Swept {removed} expired geocode entries");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    fn cache_at_epoch() -> (Arc<ManualClock>, MemoryGeocodeCache) {
        let clock = Arc::new(ManualClock::new(DateTime::<Utc>::UNIX_EPOCH));
        let cache = MemoryGeocodeCache::with_clock(DAY, clock.clone());
        (clock, cache)
    }

    #[tokio::test]
    async fn stores_found_and_not_found() {
        let (_clock, cache) = cache_at_epoch();
        let here = Coordinate::new(42.1, -75.9);

        cache.set("a", CachedValue::Found(here)).await;
        cache.set("b", CachedValue::NotFound).await;

        assert_eq!(cache.get("a").await, Some(CachedValue::Found(here)));
        assert_eq!(cache.get("b").await, Some(CachedValue::NotFound));
        assert_eq!(cache.get("c").await, None);
        assert_eq!(cache.len().await, 2);
    }

    #[tokio::test]
    async fn entries_expire_after_ttl() {
        let (clock, cache) = cache_at_epoch();
        cache.set("a", CachedValue::NotFound).await;

        clock.advance(DAY - Duration::from_secs(1));
        assert!(cache.get("a").await.is_some());

        clock.advance(Duration::from_secs(1));
        assert!(cache.get("a").await.is_none());
        // Expired read also drops the entry.
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn set_restarts_ttl() {
        let (clock, cache) = cache_at_epoch();
        cache.set("a", CachedValue::NotFound).await;
        clock.advance(DAY / 2);
        cache.set("a", CachedValue::Found(Coordinate::new(1.0, 1.0))).await;
        clock.advance(DAY / 2 + Duration::from_secs(1));
        assert!(cache.get("a").await.is_some());
    }

    #[tokio::test]
    async fn sweep_removes_only_expired() {
        let (clock, cache) = cache_at_epoch();
        cache.set("old", CachedValue::NotFound).await;
        clock.advance(DAY / 2);
        cache.set("new", CachedValue::NotFound).await;
        clock.advance(DAY / 2);

        assert_eq!(cache.sweep().await, 1);
        assert_eq!(cache.len().await, 1);
        assert!(cache.get("new").await.is_some());
    }

    #[test]
    fn cached_value_from_option() {
        assert_eq!(CachedValue::from(None), CachedValue::NotFound);
        let c = Coordinate::new(1.0, 2.0);
        assert_eq!(CachedValue::from(Some(c)).coordinate(), Some(c));
    }
}
