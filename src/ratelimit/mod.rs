//! Admission control keyed by caller identity.
//!
//! Two interchangeable variants behind one contract: an in-process
//! fixed-window limiter and a sliding-window limiter meant for a
//! shared/distributed backend. Both fail-closed: when the backing store
//! can't be consulted, [`RiskError::RateLimiterUnavailable`] is returned
//! rather than silently admitting the call.

pub mod fixed_window;
pub mod sliding_window;

pub use fixed_window::FixedWindowRateLimiter;
pub use sliding_window::SlidingWindowRateLimiter;

use crate::error::Result;
use std::time::Duration;

/// Outcome of a rate-limit admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Whether the call is admitted.
    pub allowed: bool,
    /// Suggested wait before retrying, when `allowed` is `false`.
    pub retry_after: Duration,
}

impl RateLimitDecision {
    /// An admitted decision with no retry hint.
    #[must_use]
    pub const fn allow() -> Self {
        Self {
            allowed: true,
            retry_after: Duration::ZERO,
        }
    }

    /// A denied decision carrying a retry hint.
    #[must_use]
    pub const fn deny(retry_after: Duration) -> Self {
        Self {
            allowed: false,
            retry_after,
        }
    }
}

/// A keyed admission-control limiter.
///
/// Implementations must be fail-closed: if the backing store cannot be
/// reached, return [`crate::error::RiskError::RateLimiterUnavailable`]
/// rather than `Ok(allow())`.
pub trait RateLimiter: Send + Sync {
    /// Check whether `key` may proceed under `limit` admissions per
    /// `window`, atomically recording the attempt when admitted.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::RiskError::RateLimiterUnavailable`] if the
    /// backing store is unreachable.
    fn try_acquire(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
    ) -> impl std::future::Future<Output = Result<RateLimitDecision>> + Send;

    /// Reset the counter for `key`. Used after a successful authentication
    /// to forgive prior failed attempts, or by administrative override.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::RiskError::RateLimiterUnavailable`] if the
    /// backing store is unreachable.
    fn reset(&self, key: &str) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// Dyn-safe wrapper around [`RateLimiter`], whose trait methods use
/// return-position `impl Future` and are therefore not themselves
/// object-safe. Components that are shared behind `Arc` and would
/// otherwise need to propagate a generic rate-limiter type parameter to
/// every caller (the ASN resolver, the device-fingerprint service) hold
/// `Arc<dyn DynRateLimiter>` instead.
pub trait DynRateLimiter: Send + Sync {
    /// Object-safe form of [`RateLimiter::try_acquire`].
    fn try_acquire(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<RateLimitDecision>> + Send + '_>>;
}

impl<T: RateLimiter> DynRateLimiter for T {
    fn try_acquire(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<RateLimitDecision>> + Send + '_>> {
        Box::pin(RateLimiter::try_acquire(self, key, limit, window))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_constructors() {
        assert!(RateLimitDecision::allow().allowed);
        assert!(!RateLimitDecision::deny(Duration::from_secs(5)).allowed);
    }
}
