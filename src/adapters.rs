//! Outbound adapter interfaces.
//!
//! These traits are the seams between this crate and its external
//! collaborators: the persistence driver, the secrets/alert transport,
//! and the MaxMind database. The crate depends only on the trait;
//! concrete implementations (PostgreSQL, Redis, SMTP, the `.mmdb`
//! reader) live in the embedding application, following a "providers are
//! interfaces" split between the trait and its concrete store.
//!
//! These traits are used behind `Arc<dyn Trait>`, so methods return a
//! boxed future rather than using `async fn` directly (object safety).

use std::collections::BTreeMap;
use std::future::Future;
use std::net::IpAddr;
use std::pin::Pin;
use std::time::SystemTime;

use thiserror::Error;

use crate::device::record::DeviceRecord;
use crate::geo::location::GeoLocation;
use crate::ids::{DeviceRecordId, UserId};
use crate::risk::alert::SecurityAlert;

/// Boxed future shorthand used throughout this module's trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors surfaced by the device record store.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    /// The requested row does not exist.
    #[error("not found")]
    NotFound,
    /// The unique `(user_id, fingerprint)` index was violated.
    #[error("duplicate device record for this user and fingerprint")]
    Duplicate,
    /// The backing store could not be reached or the query failed.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// CRUD and query access to the persisted device-fingerprint table.
///
/// Implementations must honor two transactional boundaries:
/// `register`/upsert is one transaction, and `deactivate_all` is one
/// transaction that also flips the user's opt-out flag at the call site
/// (the flag itself lives on `User`, out of scope for this trait).
pub trait DeviceRecordStore: Send + Sync {
    /// Fetch a record by its primary key.
    fn find_by_id(&self, id: DeviceRecordId) -> BoxFuture<'_, Result<DeviceRecord, StoreError>>;

    /// Fetch a record by the unique `(user_id, fingerprint)` pair.
    fn find_by_user_and_fingerprint(
        &self,
        user_id: UserId,
        fingerprint: &str,
    ) -> BoxFuture<'_, Result<Option<DeviceRecord>, StoreError>>;

    /// Count active records for a user.
    fn count_active(&self, user_id: UserId) -> BoxFuture<'_, Result<usize, StoreError>>;

    /// List every record for a user, active or not (for `ListDevices`
    /// and administrative review).
    fn list_by_user(&self, user_id: UserId) -> BoxFuture<'_, Result<Vec<DeviceRecord>, StoreError>>;

    /// Insert a new record. Must fail with [`StoreError::Duplicate`] if
    /// `(user_id, fingerprint)` already exists — the upsert logic in
    /// [`crate::device::service::DeviceFingerprintService`] relies on
    /// this to decide insert vs. update.
    fn insert(&self, record: DeviceRecord) -> BoxFuture<'_, Result<DeviceRecord, StoreError>>;

    /// Replace the stored row for `record.id` with `record`.
    fn update(&self, record: DeviceRecord) -> BoxFuture<'_, Result<DeviceRecord, StoreError>>;

    /// Set `active = false, deactivated_at = now` on every active record
    /// for `user_id` in one transaction.
    fn deactivate_all(&self, user_id: UserId, now: SystemTime) -> BoxFuture<'_, Result<usize, StoreError>>;
}

/// Durable IP-to-ASN entry store.
pub trait AsnEntryStore: Send + Sync {
    /// Look up the stored ASN for `ip`, if any.
    fn find_by_ip(&self, ip: &str) -> BoxFuture<'_, Result<Option<(u32, SystemTime)>, StoreError>>;

    /// Insert `(ip, asn)` if absent; a concurrent insert for the same IP
    /// is not an error (idempotent upsert) — the value is persisted and
    /// cached only on a successful resolution.
    fn insert_if_absent(&self, ip: &str, asn: u32, now: SystemTime) -> BoxFuture<'_, Result<(), StoreError>>;

    /// Delete rows with `last_modified_at` older than `threshold`, within
    /// a single transaction. Returns the number of rows removed.
    fn delete_where_older_than(&self, threshold: SystemTime) -> BoxFuture<'_, Result<usize, StoreError>>;
}

/// A named, TTL-bound key-value cache. This is the narrower
/// outbound-facing contract a distributed backend (Redis, etc.) would
/// implement; [`crate::cache::CacheLayer`] is the richer stampede-safe
/// in-process facade built on top of it.
pub trait KeyValueCache: Send + Sync {
    /// Fetch a raw value by name/key.
    fn get(&self, name: &str, key: &str) -> BoxFuture<'_, Result<Option<Vec<u8>>, StoreError>>;

    /// Store a raw value with a TTL in seconds.
    fn put(&self, name: &str, key: &str, value: Vec<u8>, ttl_secs: u64) -> BoxFuture<'_, Result<(), StoreError>>;

    /// Remove an entry.
    fn invalidate(&self, name: &str, key: &str) -> BoxFuture<'_, Result<(), StoreError>>;
}

/// Outbound alert delivery.
pub trait AlertTransport: Send + Sync {
    /// Send a security alert. Delivery is best-effort from the caller's
    /// perspective — both the audit sink and the risk engine treat
    /// failures here as non-fatal to the calling operation.
    fn send(&self, alert: SecurityAlert) -> BoxFuture<'_, Result<(), StoreError>>;
}

/// Errors from the local MaxMind reader.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MaxMindError {
    /// No record exists for the given IP in the database.
    #[error("no record for this IP")]
    NotFound,
    /// The database file could not be read or is corrupt.
    #[error("database unavailable: {0}")]
    Unavailable(String),
}

/// Local MaxMind GeoIP2 database reader.
///
/// Synchronous by contract — the local database lookup carries a much
/// tighter timeout than the network-bound DNS/WHOIS stages, because
/// implementations wrap an mmap'd file read, not a network call.
pub trait MaxMindReader: Send + Sync {
    /// Look up the City record for `ip`.
    ///
    /// # Errors
    ///
    /// Returns [`MaxMindError::NotFound`] when the database has no entry
    /// for `ip`.
    fn city(&self, ip: IpAddr) -> Result<GeoLocation, MaxMindError>;

    /// Look up the ASN record for `ip`.
    ///
    /// # Errors
    ///
    /// Returns [`MaxMindError::NotFound`] when the database has no entry
    /// for `ip`.
    fn asn(&self, ip: IpAddr) -> Result<u32, MaxMindError>;
}

/// Free-form audit event detail bag, re-exported here since both
/// [`AlertTransport`] callers and [`crate::audit::AuditSink`] shape their
/// payloads the same way.
pub type DetailMap = BTreeMap<String, String>;

/// The narrow slice of a user record this crate actually consumes:
/// enough to reject an unknown user, honor the fingerprinting opt-out,
/// and check account-status flags before authorizing. The rest of the
/// user model (external handle, email, authority set) lives in the
/// embedding application.
#[derive(Debug, Clone, PartialEq)]
pub struct UserRecord {
    /// Stable identifier.
    pub id: UserId,
    /// Whether the user has opted in to device fingerprinting.
    pub device_fingerprinting_enabled: bool,
    /// Account-status flags.
    pub enabled: bool,
    /// See `enabled`.
    pub non_locked: bool,
}

/// Query-only user lookup, consumed read-only by
/// [`crate::device::service::DeviceFingerprintService`]: writes to the
/// user record happen elsewhere, this crate only reads.
pub trait UserDirectory: Send + Sync {
    /// Fetch a user by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for an unknown user.
    fn find_by_id(&self, id: UserId) -> BoxFuture<'_, Result<UserRecord, StoreError>>;
}
