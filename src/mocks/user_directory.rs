//! In-memory [`UserDirectory`] for tests.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::adapters::{BoxFuture, StoreError, UserDirectory, UserRecord};
use crate::ids::UserId;

/// In-memory user directory seeded explicitly via [`Self::insert`].
#[derive(Default)]
pub struct InMemoryUserDirectory {
    users: Mutex<HashMap<UserId, UserRecord>>,
}

impl InMemoryUserDirectory {
    /// An empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a user record.
    pub fn insert(&self, user: UserRecord) {
        self.users
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(user.id, user);
    }
}

impl UserDirectory for InMemoryUserDirectory {
    fn find_by_id(&self, id: UserId) -> BoxFuture<'_, Result<UserRecord, StoreError>> {
        Box::pin(async move {
            self.users
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .get(&id)
                .cloned()
                .ok_or(StoreError::NotFound)
        })
    }
}
