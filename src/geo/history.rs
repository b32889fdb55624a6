//! Per-user `LocationHistory`: a bounded trace of recent login locations
//! the risk engine checks new logins against.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::cache::{names, CacheLayer};
use crate::error::Result;
use crate::geo::location::GeoLocation;
use crate::ids::UserId;

/// Bound on entries kept per user.
pub const HISTORY_MAX: usize = 50;

/// A single `(location, timestamp)` pair in a user's trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationHistoryEntry {
    /// Where the login came from.
    pub location: GeoLocation,
    /// When it was observed.
    pub timestamp: SystemTime,
}

/// A bounded, newest-last sequence of login locations for one user.
///
/// Eviction is oldest-first once the sequence exceeds [`HISTORY_MAX`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocationHistory {
    entries: Vec<LocationHistoryEntry>,
}

impl LocationHistory {
    /// An empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `(location, now)`, trimming the oldest entry if the cap is
    /// exceeded.
    pub fn push(&mut self, location: GeoLocation, now: SystemTime) {
        self.entries.push(LocationHistoryEntry {
            location,
            timestamp: now,
        });
        while self.entries.len() > HISTORY_MAX {
            self.entries.remove(0);
        }
    }

    /// The most recently appended entry, if any.
    #[must_use]
    pub fn last(&self) -> Option<&LocationHistoryEntry> {
        self.entries.last()
    }

    /// Convenience accessor for [`LocationHistoryEntry::location`] on the
    /// newest entry.
    #[must_use]
    pub fn last_location(&self) -> Option<&GeoLocation> {
        self.last().map(|e| &e.location)
    }

    /// Convenience accessor for [`LocationHistoryEntry::timestamp`] on the
    /// newest entry.
    #[must_use]
    pub fn last_timestamp(&self) -> Option<SystemTime> {
        self.last().map(|e| e.timestamp)
    }

    /// Number of retained entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the history is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Keyed access to per-user [`LocationHistory`], backed by
/// [`CacheLayer`] with a long TTL.
///
/// Concurrent appends for the same user serialize through a per-user
/// lock rather than a compare-and-swap retry loop — simpler to reason
/// about, and the contention here is inherently per-user, not global.
pub struct LocationHistoryStore {
    cache: Arc<CacheLayer>,
    ttl: Duration,
    user_locks: Arc<DashMap<UserId, Arc<Mutex<()>>>>,
}

impl LocationHistoryStore {
    /// Wrap a [`CacheLayer`] with the given long TTL for history entries.
    #[must_use]
    pub fn new(cache: Arc<CacheLayer>, ttl: Duration) -> Self {
        Self {
            cache,
            ttl,
            user_locks: Arc::new(DashMap::new()),
        }
    }

    fn lock_for(&self, user_id: UserId) -> Arc<Mutex<()>> {
        self.user_locks
            .entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Fetch the current history for `user_id`, creating an empty one on
    /// first access.
    ///
    /// # Errors
    ///
    /// Never fails in practice — the loader always succeeds — but
    /// returns `Result` to match [`CacheLayer::get`]'s contract.
    pub async fn get(&self, user_id: UserId) -> Result<LocationHistory> {
        self.cache
            .get(names::LOCATION_HISTORY, &user_id.to_string(), self.ttl, || async {
                Ok(LocationHistory::new())
            })
            .await
    }

    /// Append `location` at `now` for `user_id`, serialized per user.
    ///
    /// # Errors
    ///
    /// Propagates failures from the underlying [`CacheLayer`] read.
    pub async fn append(&self, user_id: UserId, location: GeoLocation, now: SystemTime) -> Result<()> {
        let lock = self.lock_for(user_id);
        let _guard = lock.lock().await;

        let mut history = self.get(user_id).await?;
        history.push(location, now);
        self.cache
            .put(names::LOCATION_HISTORY, &user_id.to_string(), history, self.ttl);
        Ok(())
    }
}
