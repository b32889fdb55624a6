//! Named write-through cache with TTL and stampede-safe loading.
//!
//! Exposes `get(name, key, loader)`, `put(name, key, value, ttl)`, and
//! `invalidate(name, key)`. Named caches are pre-declared — ASN,
//! `GeoLocation`, `LocationHistory` are the three this crate's own
//! consumers use, but [`CacheLayer`] itself is generic over any cloneable
//! value and indexed by an arbitrary `name` string so new callers can
//! declare their own.
//!
//! Stampede safety: a per-`(name, key)` load lock (modeled on
//! [`crate::ratelimit::sliding_window`]'s per-key mutex) ensures the
//! `loader` runs at most once concurrently for a missing key — other
//! callers block on the same lock and observe its result.

use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::error::Result;

struct Entry {
    value: Arc<dyn Any + Send + Sync>,
    inserted_at: Instant,
    ttl: Duration,
}

impl Entry {
    fn is_stale(&self, now: Instant) -> bool {
        now.duration_since(self.inserted_at) > self.ttl
    }
}

/// A named, TTL-bound, stampede-safe write-through cache.
///
/// Negative results are never cached: a loader that returns `Err` leaves
/// no entry behind, so the next call retries.
#[derive(Clone, Default)]
pub struct CacheLayer {
    entries: Arc<DashMap<(String, String), Entry>>,
    load_locks: Arc<DashMap<(String, String), Arc<Mutex<()>>>>,
}

impl CacheLayer {
    /// Create an empty cache layer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn load_lock(&self, name: &str, key: &str) -> Arc<Mutex<()>> {
        self.load_locks
            .entry((name.to_string(), key.to_string()))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Fetch `name`/`key`, invoking `loader` on a miss or stale entry.
    ///
    /// At most one concurrent caller per `(name, key)` runs `loader`; the
    /// rest wait on the same in-flight load and observe its outcome. A
    /// loader failure is not cached — the next call retries from scratch.
    ///
    /// # Errors
    ///
    /// Propagates whatever `loader` returns.
    pub async fn get<T, F, Fut>(&self, name: &str, key: &str, ttl: Duration, loader: F) -> Result<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let cache_key = (name.to_string(), key.to_string());
        let now = Instant::now();

        if let Some(entry) = self.entries.get(&cache_key) {
            if !entry.is_stale(now) {
                if let Some(value) = entry.value.downcast_ref::<T>() {
                    metrics::counter!("cache_hit", "cache" => name.to_string()).increment(1);
                    return Ok(value.clone());
                }
            }
        }

        let lock = self.load_lock(name, key);
        let _guard = lock.lock().await;

        // Re-check: another caller may have populated the entry while we
        // waited for the load lock.
        if let Some(entry) = self.entries.get(&cache_key) {
            if !entry.is_stale(Instant::now()) {
                if let Some(value) = entry.value.downcast_ref::<T>() {
                    metrics::counter!("cache_hit", "cache" => name.to_string()).increment(1);
                    return Ok(value.clone());
                }
            }
        }

        metrics::counter!("cache_miss", "cache" => name.to_string()).increment(1);
        let value = loader().await?;
        self.entries.insert(
            cache_key,
            Entry {
                value: Arc::new(value.clone()),
                inserted_at: Instant::now(),
                ttl,
            },
        );
        Ok(value)
    }

    /// Write a value directly, bypassing any loader.
    pub fn put<T>(&self, name: &str, key: &str, value: T, ttl: Duration)
    where
        T: Send + Sync + 'static,
    {
        self.entries.insert(
            (name.to_string(), key.to_string()),
            Entry {
                value: Arc::new(value),
                inserted_at: Instant::now(),
                ttl,
            },
        );
    }

    /// Drop an entry, forcing the next `get` to reload.
    pub fn invalidate(&self, name: &str, key: &str) {
        self.entries.remove(&(name.to_string(), key.to_string()));
    }

    /// Remove entries whose TTL has elapsed. Returns the number removed.
    ///
    /// Called by the stale sweeper; distinct from the `AsnEntry`
    /// durable-store sweep, which this cache is a layer in front of, not
    /// a replacement for.
    pub fn sweep_stale(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_stale(now));
        before - self.entries.len()
    }

    /// Number of live entries, for tests and diagnostics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache currently holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Names of the caches this crate's own consumers pre-declare.
pub mod names {
    /// ASN-by-IP cache, fed by [`crate::geo::asn::AsnResolver`].
    pub const ASN: &str = "asn";
    /// `GeoLocation`-by-IP cache, fed by [`crate::geo::location::GeoResolver`].
    pub const GEO_LOCATION: &str = "geo_location";
    /// Per-user `LocationHistory` cache, fed by [`crate::geo::history`].
    pub const LOCATION_HISTORY: &str = "location_history";
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RiskError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_loader_runs_once_on_miss_then_hits_cache() {
        let cache = CacheLayer::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&calls);
        let value = cache
            .get("t", "k", Duration::from_secs(60), || async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(42_i32)
            })
            .await
            .expect("loader succeeds");
        assert_eq!(value, 42);

        let c = Arc::clone(&calls);
        let value = cache
            .get("t", "k", Duration::from_secs(60), || async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(99_i32)
            })
            .await
            .expect("cached read succeeds");
        assert_eq!(value, 42, "second call should hit the cache, not the loader");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_loads_are_not_cached() {
        let cache = CacheLayer::new();
        let first: Result<i32> = cache
            .get("t", "k", Duration::from_secs(60), || async {
                Err(RiskError::ExternalUnavailable("down".to_string()))
            })
            .await;
        assert!(first.is_err());

        let second = cache
            .get("t", "k", Duration::from_secs(60), || async { Ok(7_i32) })
            .await
            .expect("retry after failure succeeds");
        assert_eq!(second, 7);
    }

    #[tokio::test]
    async fn test_stale_entries_are_reloaded() {
        let cache = CacheLayer::new();
        cache
            .get("t", "k", Duration::from_millis(10), || async { Ok(1_i32) })
            .await
            .expect("first load succeeds");
        tokio::time::sleep(Duration::from_millis(30)).await;
        let value = cache
            .get("t", "k", Duration::from_secs(60), || async { Ok(2_i32) })
            .await
            .expect("reload succeeds");
        assert_eq!(value, 2);
    }

    #[tokio::test]
    async fn test_invalidate_forces_reload() {
        let cache = CacheLayer::new();
        cache
            .get("t", "k", Duration::from_secs(60), || async { Ok(1_i32) })
            .await
            .expect("first load succeeds");
        cache.invalidate("t", "k");
        let value = cache
            .get("t", "k", Duration::from_secs(60), || async { Ok(2_i32) })
            .await
            .expect("reload succeeds");
        assert_eq!(value, 2);
    }

    #[tokio::test]
    async fn test_concurrent_misses_load_exactly_once() {
        let cache = Arc::new(CacheLayer::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..20 {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                cache
                    .get("t", "stampede", Duration::from_secs(60), || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok(5_i32)
                    })
                    .await
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap_or(Ok(0)).unwrap_or(0), 5);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_sweep_removes_only_stale_entries() {
        let cache = CacheLayer::new();
        cache.put("t", "fresh", 1_i32, Duration::from_secs(60));
        cache.put("t", "stale", 2_i32, Duration::from_millis(1));
        tokio::time::sleep(Duration::from_millis(20)).await;
        let removed = cache.sweep_stale();
        assert_eq!(removed, 1);
        assert_eq!(cache.len(), 1);
    }
}
