//! In-memory implementations of every [`crate::adapters`] trait (plus
//! [`crate::audit::AuditSink`]), for tests and as a starting reference for
//! a real backend. One file per provider, each an
//! `Arc<Mutex<HashMap<..>>>`-backed struct.

pub mod alert_transport;
pub mod asn_entry_store;
pub mod audit_sink;
pub mod device_record_store;
pub mod key_value_cache;
pub mod maxmind;
pub mod user_directory;

pub use alert_transport::InMemoryAlertTransport;
pub use asn_entry_store::InMemoryAsnEntryStore;
pub use audit_sink::InMemoryAuditSink;
pub use device_record_store::InMemoryDeviceRecordStore;
pub use key_value_cache::InMemoryKeyValueCache;
pub use maxmind::StubMaxMindReader;
pub use user_directory::InMemoryUserDirectory;
