//! In-memory [`DeviceRecordStore`] for tests and as a starting point for
//! consumers that haven't wired a real persistence layer yet.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::SystemTime;

use crate::adapters::{BoxFuture, DeviceRecordStore, StoreError};
use crate::device::record::DeviceRecord;
use crate::ids::{DeviceRecordId, UserId};

/// In-memory device record store, guarded by a single mutex — adequate
/// for tests; a real deployment's transactional boundaries are the job
/// of the PostgreSQL-backed implementation this trait exists to be
/// swapped for.
#[derive(Default)]
pub struct InMemoryDeviceRecordStore {
    records: Mutex<HashMap<DeviceRecordId, DeviceRecord>>,
}

impl InMemoryDeviceRecordStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl DeviceRecordStore for InMemoryDeviceRecordStore {
    fn find_by_id(&self, id: DeviceRecordId) -> BoxFuture<'_, Result<DeviceRecord, StoreError>> {
        Box::pin(async move {
            self.records
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .get(&id)
                .cloned()
                .ok_or(StoreError::NotFound)
        })
    }

    fn find_by_user_and_fingerprint(
        &self,
        user_id: UserId,
        fingerprint: &str,
    ) -> BoxFuture<'_, Result<Option<DeviceRecord>, StoreError>> {
        let fingerprint = fingerprint.to_string();
        Box::pin(async move {
            Ok(self
                .records
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .values()
                .find(|r| r.user_id == user_id && r.fingerprint == fingerprint)
                .cloned())
        })
    }

    fn count_active(&self, user_id: UserId) -> BoxFuture<'_, Result<usize, StoreError>> {
        Box::pin(async move {
            Ok(self
                .records
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .values()
                .filter(|r| r.user_id == user_id && r.active)
                .count())
        })
    }

    fn list_by_user(&self, user_id: UserId) -> BoxFuture<'_, Result<Vec<DeviceRecord>, StoreError>> {
        Box::pin(async move {
            Ok(self
                .records
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .values()
                .filter(|r| r.user_id == user_id)
                .cloned()
                .collect())
        })
    }

    fn insert(&self, record: DeviceRecord) -> BoxFuture<'_, Result<DeviceRecord, StoreError>> {
        Box::pin(async move {
            let mut guard = self.records.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            let duplicate = guard
                .values()
                .any(|r| r.user_id == record.user_id && r.fingerprint == record.fingerprint);
            if duplicate {
                return Err(StoreError::Duplicate);
            }
            guard.insert(record.id, record.clone());
            Ok(record)
        })
    }

    fn update(&self, record: DeviceRecord) -> BoxFuture<'_, Result<DeviceRecord, StoreError>> {
        Box::pin(async move {
            let mut guard = self.records.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            if !guard.contains_key(&record.id) {
                return Err(StoreError::NotFound);
            }
            guard.insert(record.id, record.clone());
            Ok(record)
        })
    }

    fn deactivate_all(&self, user_id: UserId, now: SystemTime) -> BoxFuture<'_, Result<usize, StoreError>> {
        Box::pin(async move {
            let mut guard = self.records.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            let mut count = 0;
            for record in guard.values_mut() {
                if record.user_id == user_id && record.active {
                    record.deactivate(now);
                    count += 1;
                }
            }
            Ok(count)
        })
    }
}
