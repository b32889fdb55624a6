//! Sliding-window rate limiter, preferred for production deployments.
//!
//! Modeled on a sorted set keyed by `key`, members scored by timestamp:
//! on acquire, evict members older than `now - window`, count what
//! remains, and if under the limit insert `now` — all atomically. A real
//! deployment backs this with a single server-side script against Redis
//! or similar; [`SlidingWindowStore`] is the seam that swap happens at.
//! [`InMemorySlidingWindowStore`] is the in-process default (and what the
//! unit tests below exercise): a per-key mutex around a timestamp vector
//! gives the same atomicity guarantee without a network hop.

use super::{RateLimitDecision, RateLimiter};
use crate::error::Result;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Backing store abstraction for the sliding-window algorithm.
///
/// Implementations must perform evict-expired + count + conditionally
/// insert as one atomic unit per key, so admission decisions stay
/// linearizable under the chosen backend.
pub trait SlidingWindowStore: Send + Sync {
    /// Evict entries older than `now - window`, then: if the remaining
    /// count is `< limit`, record `now` and return `true`; otherwise
    /// return `false` without recording.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::RiskError::RateLimiterUnavailable`] if the backend
    /// cannot be reached.
    fn evict_count_and_maybe_insert(
        &self,
        key: &str,
        now: Instant,
        window: Duration,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<bool>> + Send;

    /// Drop all recorded entries for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::RiskError::RateLimiterUnavailable`] if the backend
    /// cannot be reached.
    fn clear(&self, key: &str) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// In-process sliding-window store: one mutex-guarded timestamp vector per
/// key. Stands in for a Redis sorted set in tests and single-process
/// deployments.
#[derive(Clone, Default)]
pub struct InMemorySlidingWindowStore {
    buckets: Arc<DashMap<String, Arc<Mutex<Vec<Instant>>>>>,
}

impl InMemorySlidingWindowStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SlidingWindowStore for InMemorySlidingWindowStore {
    async fn evict_count_and_maybe_insert(
        &self,
        key: &str,
        now: Instant,
        window: Duration,
        limit: u32,
    ) -> Result<bool> {
        let bucket = self
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Vec::new())))
            .clone();
        let mut timestamps = bucket.lock().await;
        timestamps.retain(|&ts| now.duration_since(ts) <= window);

        if timestamps.len() as u64 >= u64::from(limit) {
            return Ok(false);
        }
        timestamps.push(now);
        Ok(true)
    }

    async fn clear(&self, key: &str) -> Result<()> {
        self.buckets.remove(key);
        Ok(())
    }
}

/// Sliding-window rate limiter backed by a [`SlidingWindowStore`].
#[derive(Clone)]
pub struct SlidingWindowRateLimiter<S: SlidingWindowStore> {
    store: S,
}

impl<S: SlidingWindowStore> SlidingWindowRateLimiter<S> {
    /// Wrap a backing store.
    #[must_use]
    pub const fn new(store: S) -> Self {
        Self { store }
    }
}

impl SlidingWindowRateLimiter<InMemorySlidingWindowStore> {
    /// Convenience constructor for the in-process default store.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(InMemorySlidingWindowStore::new())
    }
}

impl<S: SlidingWindowStore> RateLimiter for SlidingWindowRateLimiter<S> {
    async fn try_acquire(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
    ) -> Result<RateLimitDecision> {
        let now = Instant::now();
        let admitted = self
            .store
            .evict_count_and_maybe_insert(key, now, window, limit)
            .await?;

        if admitted {
            metrics::counter!("ratelimit_sliding_window_admitted").increment(1);
            Ok(RateLimitDecision::allow())
        } else {
            metrics::counter!("ratelimit_sliding_window_denied").increment(1);
            Ok(RateLimitDecision::deny(window))
        }
    }

    async fn reset(&self, key: &str) -> Result<()> {
        self.store.clear(key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_admits_within_limit_and_denies_over() {
        let limiter = SlidingWindowRateLimiter::in_memory();
        for i in 0..5 {
            let decision = limiter
                .try_acquire("u1", 5, Duration::from_secs(60))
                .await
                .expect("in-memory store never errors");
            assert!(decision.allowed, "attempt {i} should be admitted");
        }
        let decision = limiter
            .try_acquire("u1", 5, Duration::from_secs(60))
            .await
            .expect("in-memory store never errors");
        assert!(!decision.allowed);
    }

    #[tokio::test]
    async fn test_window_expiry_admits_again() {
        let limiter = SlidingWindowRateLimiter::in_memory();
        for _ in 0..3 {
            limiter
                .try_acquire("u2", 3, Duration::from_millis(50))
                .await
                .expect("in-memory store never errors");
        }
        assert!(
            !limiter
                .try_acquire("u2", 3, Duration::from_millis(50))
                .await
                .expect("in-memory store never errors")
                .allowed
        );
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(
            limiter
                .try_acquire("u2", 3, Duration::from_millis(50))
                .await
                .expect("in-memory store never errors")
                .allowed
        );
    }

    #[tokio::test]
    async fn test_reset_clears_recorded_attempts() {
        let limiter = SlidingWindowRateLimiter::in_memory();
        for _ in 0..5 {
            limiter
                .try_acquire("u3", 5, Duration::from_secs(60))
                .await
                .expect("in-memory store never errors");
        }
        limiter.reset("u3").await.expect("reset never errors");
        assert!(
            limiter
                .try_acquire("u3", 5, Duration::from_secs(60))
                .await
                .expect("in-memory store never errors")
                .allowed
        );
    }

    #[tokio::test]
    async fn test_concurrent_callers_never_exceed_limit() {
        let limiter = Arc::new(SlidingWindowRateLimiter::in_memory());
        let mut handles = Vec::new();
        for _ in 0..50 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move {
                limiter
                    .try_acquire("shared", 10, Duration::from_secs(60))
                    .await
                    .expect("in-memory store never errors")
                    .allowed
            }));
        }
        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap_or(false) {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 10);
    }
}
