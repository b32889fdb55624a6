//! Identifier newtypes shared across the risk and authorization core.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier for a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub Uuid);

impl UserId {
    /// Generate a new random `UserId`.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier assigned to a `DeviceRecord` on insert.
///
/// Distinct from the fingerprint itself: the fingerprint is a function of
/// request signals, the id is the primary key of the stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceRecordId(pub Uuid);

impl DeviceRecordId {
    /// Generate a new random `DeviceRecordId`.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DeviceRecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for DeviceRecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(UserId::new(), UserId::new());
        assert_ne!(DeviceRecordId::new(), DeviceRecordId::new());
    }

    #[test]
    fn test_userid_display_roundtrips_uuid_text() {
        let id = UserId::new();
        assert_eq!(id.to_string(), id.0.to_string());
    }
}
