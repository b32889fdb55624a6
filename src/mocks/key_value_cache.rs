//! In-memory [`KeyValueCache`] for tests.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::adapters::{BoxFuture, KeyValueCache, StoreError};

/// In-memory key-value cache. TTLs are accepted but not enforced — this
/// mock exists to exercise the [`KeyValueCache`] contract shape, not to
/// model expiry; [`crate::cache::CacheLayer`] owns real TTL semantics.
#[derive(Default)]
pub struct InMemoryKeyValueCache {
    entries: Mutex<HashMap<(String, String), Vec<u8>>>,
}

impl InMemoryKeyValueCache {
    /// An empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueCache for InMemoryKeyValueCache {
    fn get(&self, name: &str, key: &str) -> BoxFuture<'_, Result<Option<Vec<u8>>, StoreError>> {
        let name = name.to_string();
        let key = key.to_string();
        Box::pin(async move {
            Ok(self
                .entries
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .get(&(name, key))
                .cloned())
        })
    }

    fn put(&self, name: &str, key: &str, value: Vec<u8>, _ttl_secs: u64) -> BoxFuture<'_, Result<(), StoreError>> {
        let name = name.to_string();
        let key = key.to_string();
        Box::pin(async move {
            self.entries
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .insert((name, key), value);
            Ok(())
        })
    }

    fn invalidate(&self, name: &str, key: &str) -> BoxFuture<'_, Result<(), StoreError>> {
        let name = name.to_string();
        let key = key.to_string();
        Box::pin(async move {
            self.entries
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .remove(&(name, key));
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_then_get_roundtrips() {
        let cache = InMemoryKeyValueCache::new();
        cache.put("asn", "1.2.3.4", b"hello".to_vec(), 60).await.expect("put succeeds");
        let value = cache.get("asn", "1.2.3.4").await.expect("get succeeds");
        assert_eq!(value, Some(b"hello".to_vec()));
    }

    #[tokio::test]
    async fn test_invalidate_removes_entry() {
        let cache = InMemoryKeyValueCache::new();
        cache.put("asn", "1.2.3.4", b"hello".to_vec(), 60).await.expect("put succeeds");
        cache.invalidate("asn", "1.2.3.4").await.expect("invalidate succeeds");
        assert_eq!(cache.get("asn", "1.2.3.4").await.expect("get succeeds"), None);
    }
}
