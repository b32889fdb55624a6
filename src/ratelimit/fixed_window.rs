//! In-process fixed-window rate limiter.
//!
//! Per-key counter reset when the window has elapsed since it started.
//! Mutation happens under a per-key entry in a concurrent map; a periodic
//! purge keeps the map from growing unbounded when it is driven by
//! high-cardinality keys (e.g. caller IP).

use super::{RateLimitDecision, RateLimiter};
use crate::error::Result;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

struct Window {
    count: u32,
    started_at: Instant,
}

/// In-process fixed-window limiter.
///
/// Appropriate for a single-process deployment or as a first line of
/// defense in front of [`super::SlidingWindowRateLimiter`]. Always
/// available (no network round trip), so it never returns
/// [`crate::error::RiskError::RateLimiterUnavailable`] in practice — the method still
/// returns `Result` to satisfy the shared [`RateLimiter`] contract.
#[derive(Clone)]
pub struct FixedWindowRateLimiter {
    windows: Arc<DashMap<String, Window>>,
    purge_threshold: usize,
    ops_since_purge: Arc<AtomicUsize>,
}

impl FixedWindowRateLimiter {
    /// Create a new limiter that purges expired keys once the map holds
    /// more than `purge_threshold` distinct keys (default 10,000).
    #[must_use]
    pub fn new(purge_threshold: usize) -> Self {
        Self {
            windows: Arc::new(DashMap::new()),
            purge_threshold,
            ops_since_purge: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn maybe_purge(&self, window: Duration) {
        if self.windows.len() <= self.purge_threshold {
            return;
        }
        let ops = self.ops_since_purge.fetch_add(1, Ordering::Relaxed);
        // Only one in every `purge_threshold` callers pays for the sweep.
        if ops % self.purge_threshold.max(1) != 0 {
            return;
        }
        let now = Instant::now();
        self.windows
            .retain(|_, w| now.duration_since(w.started_at) <= window);
        metrics::gauge!("ratelimit_fixed_window_keys").set(self.windows.len() as f64);
    }
}

impl Default for FixedWindowRateLimiter {
    fn default() -> Self {
        Self::new(10_000)
    }
}

impl RateLimiter for FixedWindowRateLimiter {
    async fn try_acquire(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
    ) -> Result<RateLimitDecision> {
        self.maybe_purge(window);

        let now = Instant::now();
        let mut entry = self.windows.entry(key.to_string()).or_insert_with(|| Window {
            count: 0,
            started_at: now,
        });

        if now.duration_since(entry.started_at) > window {
            entry.count = 0;
            entry.started_at = now;
        }

        if entry.count >= limit {
            let elapsed = now.duration_since(entry.started_at);
            let retry_after = window.saturating_sub(elapsed);
            metrics::counter!("ratelimit_fixed_window_denied").increment(1);
            return Ok(RateLimitDecision::deny(retry_after));
        }

        entry.count += 1;
        metrics::counter!("ratelimit_fixed_window_admitted").increment(1);
        Ok(RateLimitDecision::allow())
    }

    async fn reset(&self, key: &str) -> Result<()> {
        self.windows.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_admits_up_to_limit() {
        let limiter = FixedWindowRateLimiter::default();
        for _ in 0..5 {
            let decision = limiter
                .try_acquire("1.2.3.4", 5, Duration::from_secs(60))
                .await
                .unwrap_or(RateLimitDecision::deny(Duration::ZERO));
            assert!(decision.allowed);
        }
    }

    #[tokio::test]
    async fn test_denies_after_limit_reached() {
        let limiter = FixedWindowRateLimiter::default();
        for _ in 0..5 {
            limiter
                .try_acquire("1.2.3.4", 5, Duration::from_secs(60))
                .await
                .expect("in-process limiter never errors");
        }
        let decision = limiter
            .try_acquire("1.2.3.4", 5, Duration::from_secs(60))
            .await
            .expect("in-process limiter never errors");
        assert!(!decision.allowed);
    }

    #[tokio::test]
    async fn test_reset_clears_the_window() {
        let limiter = FixedWindowRateLimiter::default();
        for _ in 0..5 {
            limiter
                .try_acquire("k", 5, Duration::from_secs(60))
                .await
                .expect("in-process limiter never errors");
        }
        limiter.reset("k").await.expect("reset never errors");
        let decision = limiter
            .try_acquire("k", 5, Duration::from_secs(60))
            .await
            .expect("in-process limiter never errors");
        assert!(decision.allowed);
    }

    #[tokio::test]
    async fn test_different_keys_have_independent_windows() {
        let limiter = FixedWindowRateLimiter::default();
        for _ in 0..5 {
            limiter
                .try_acquire("a", 5, Duration::from_secs(60))
                .await
                .expect("in-process limiter never errors");
        }
        let decision = limiter
            .try_acquire("b", 5, Duration::from_secs(60))
            .await
            .expect("in-process limiter never errors");
        assert!(decision.allowed);
    }
}
