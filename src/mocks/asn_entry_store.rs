//! In-memory [`AsnEntryStore`] for tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::SystemTime;

use crate::adapters::{AsnEntryStore, BoxFuture, StoreError};

/// In-memory `asn_entry` table, keyed by the IP's string form.
#[derive(Default)]
pub struct InMemoryAsnEntryStore {
    rows: Mutex<HashMap<String, (u32, SystemTime)>>,
}

impl InMemoryAsnEntryStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl AsnEntryStore for InMemoryAsnEntryStore {
    fn find_by_ip(&self, ip: &str) -> BoxFuture<'_, Result<Option<(u32, SystemTime)>, StoreError>> {
        let ip = ip.to_string();
        Box::pin(async move {
            Ok(self
                .rows
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .get(&ip)
                .copied())
        })
    }

    fn insert_if_absent(&self, ip: &str, asn: u32, now: SystemTime) -> BoxFuture<'_, Result<(), StoreError>> {
        let ip = ip.to_string();
        Box::pin(async move {
            self.rows
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .entry(ip)
                .or_insert((asn, now));
            Ok(())
        })
    }

    fn delete_where_older_than(&self, threshold: SystemTime) -> BoxFuture<'_, Result<usize, StoreError>> {
        Box::pin(async move {
            let mut guard = self.rows.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            let before = guard.len();
            guard.retain(|_, (_, modified)| *modified >= threshold);
            Ok(before - guard.len())
        })
    }
}
