//! `DeviceFingerprintService`: the orchestration layer wiring rate
//! limiting, IP security, the user directory, the device record store,
//! and the risk engine into the public register/validate/verify/...
//! operations.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::adapters::{DeviceRecordStore, UserDirectory};
use crate::audit::{AuditEvent, AuditSink, SupervisedAuditSink};
use crate::config::DeviceFingerprintConfig;
use crate::device::fingerprint::{generate, FingerprintRequest, Platform};
use crate::device::record::{DeviceRecord, DeviceState};
use crate::error::{Result, RiskError};
use crate::ids::{DeviceRecordId, UserId};
use crate::ratelimit::{DynRateLimiter, RateLimitDecision};
use crate::risk::engine::RiskEngine;

/// Read-model row returned by `list_devices`. Not the persisted
/// [`DeviceRecord`] shape — a projection trimmed to what a
/// device-management UI needs, following the same
/// query-repository/projection split used elsewhere in this crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceView {
    /// The device record's id.
    pub id: DeviceRecordId,
    /// Human-assigned or derived device name.
    pub device_name: Option<String>,
    /// Derived platform label, when the record still has the raw
    /// `browser_info` string to classify.
    pub platform: Option<String>,
    /// Current derived state.
    pub state: DeviceState,
    /// Last time this record was used successfully.
    pub last_used_at: SystemTime,
    /// Country observed at last use.
    pub last_known_country: Option<String>,
    /// Whether this record matches the caller's current fingerprint.
    pub is_current: bool,
}

impl DeviceView {
    fn from_record(record: &DeviceRecord, current_fingerprint: &str) -> Self {
        Self {
            id: record.id,
            device_name: record.device_name.clone(),
            platform: record.browser_info.as_deref().map(|ua| Platform::classify(ua).as_str().to_string()),
            state: record.state(),
            last_used_at: record.last_used_at,
            last_known_country: record.last_known_country.clone(),
            is_current: record.fingerprint == current_fingerprint,
        }
    }
}

/// IP-level security gate consulted at the start of `register`/`validate`.
/// Modeled as an in-process policy rather than an outbound adapter
/// trait — a deployment that needs a dynamic blocklist can refresh
/// [`IpSecurityPolicy`]'s sets from whatever source it likes between
/// requests.
#[derive(Debug, Default)]
pub struct IpSecurityPolicy {
    blocklist: Mutex<HashSet<String>>,
    suspicious: Mutex<HashSet<String>>,
}

impl IpSecurityPolicy {
    /// A policy with empty blocklist/suspicion sets.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `ip` to the hard blocklist.
    pub fn block(&self, ip: impl Into<String>) {
        self.blocklist.lock().unwrap_or_else(std::sync::PoisonError::into_inner).insert(ip.into());
    }

    /// Mark `ip` as suspicious without fully blocking it.
    pub fn mark_suspicious(&self, ip: impl Into<String>) {
        self.suspicious.lock().unwrap_or_else(std::sync::PoisonError::into_inner).insert(ip.into());
    }

    /// Check `ip` against the blocklist and suspicion set: reject if the
    /// IP is on the blocklist, reject if suspicious heuristics trip, and
    /// log but do not reject on merely malformed IPs.
    ///
    /// # Errors
    ///
    /// Returns [`RiskError::IpBlocked`] or [`RiskError::IpSuspicious`].
    /// A malformed `ip` (fails to parse as an [`std::net::IpAddr`]) is
    /// logged and otherwise ignored, never rejected here.
    pub fn check(&self, ip: &str) -> Result<()> {
        if ip.parse::<std::net::IpAddr>().is_err() {
            tracing::debug!(ip, "malformed client IP, continuing without IP-based checks");
            return Ok(());
        }
        if self.blocklist.lock().unwrap_or_else(std::sync::PoisonError::into_inner).contains(ip) {
            return Err(RiskError::IpBlocked);
        }
        if self.suspicious.lock().unwrap_or_else(std::sync::PoisonError::into_inner).contains(ip) {
            return Err(RiskError::IpSuspicious);
        }
        Ok(())
    }
}

/// Orchestrates the full device-fingerprint lifecycle.
pub struct DeviceFingerprintService {
    store: Arc<dyn DeviceRecordStore>,
    users: Arc<dyn UserDirectory>,
    risk: Arc<RiskEngine>,
    audit: Arc<SupervisedAuditSink<Arc<dyn AuditSink>>>,
    ip_policy: Arc<IpSecurityPolicy>,
    rate_limiter: Arc<dyn DynRateLimiter>,
    config: DeviceFingerprintConfig,
}

impl DeviceFingerprintService {
    /// Wire the service's collaborators.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn DeviceRecordStore>,
        users: Arc<dyn UserDirectory>,
        risk: Arc<RiskEngine>,
        audit: Arc<SupervisedAuditSink<Arc<dyn AuditSink>>>,
        ip_policy: Arc<IpSecurityPolicy>,
        rate_limiter: Arc<dyn DynRateLimiter>,
        config: DeviceFingerprintConfig,
    ) -> Self {
        Self {
            store,
            users,
            risk,
            audit,
            ip_policy,
            rate_limiter,
            config,
        }
    }

    /// Generate this request's device fingerprint.
    #[must_use]
    pub fn generate(&self, req: &FingerprintRequest) -> String {
        generate(req, &self.config.salt)
    }

    async fn admit_rate_limit(&self, ip: &str) -> Result<()> {
        let decision = self
            .rate_limiter
            .try_acquire(&format!("device:{ip}"), 5, std::time::Duration::from_secs(60))
            .await?;
        match decision {
            RateLimitDecision { allowed: true, .. } => Ok(()),
            RateLimitDecision { allowed: false, retry_after } => Err(RiskError::RateLimit {
                retry_after_secs: retry_after.as_secs(),
            }),
        }
    }

    async fn require_fingerprinting_enabled(&self, user_id: UserId) -> Result<()> {
        let user = self
            .users
            .find_by_id(user_id)
            .await
            .map_err(|_| RiskError::UserNotFound)?;
        if !user.device_fingerprinting_enabled {
            return Err(RiskError::FingerprintingDisabled);
        }
        Ok(())
    }

    /// Register a device for a user from the current request's signals.
    ///
    /// # Errors
    ///
    /// [`RiskError::RateLimit`], [`RiskError::IpBlocked`],
    /// [`RiskError::IpSuspicious`], [`RiskError::UserNotFound`],
    /// [`RiskError::FingerprintingDisabled`], [`RiskError::MaxDevices`].
    pub async fn register(&self, user_id: UserId, req: &FingerprintRequest) -> Result<DeviceRecord> {
        let ip = req.client_ip().unwrap_or_default();
        self.admit_rate_limit(&ip).await?;
        self.ip_policy.check(&ip)?;
        self.require_fingerprinting_enabled(user_id).await?;

        let active_count = self
            .store
            .count_active(user_id)
            .await
            .map_err(|err| RiskError::Internal(err.to_string()))?;
        if active_count >= self.config.max_devices_per_user {
            return Err(RiskError::MaxDevices);
        }

        let fingerprint = self.generate(req);
        let now = SystemTime::now();
        let existing = self
            .store
            .find_by_user_and_fingerprint(user_id, &fingerprint)
            .await
            .map_err(|err| RiskError::Internal(err.to_string()))?;

        let (mut record, is_new) = match existing {
            Some(mut record) => {
                record.touch_success(now, Some(ip.clone()));
                (record, false)
            }
            None => (DeviceRecord::new(user_id, fingerprint, now), true),
        };

        let risk = self.risk.verify(&ip, user_id).await;
        let location = self.risk.resolve_location(&ip).await;
        record.apply_risk(location, risk.risk >= crate::risk::engine::RiskLevel::Medium);

        let saved = if is_new {
            self.store.insert(record).await.map_err(|err| RiskError::Internal(err.to_string()))?
        } else {
            self.store.update(record).await.map_err(|err| RiskError::Internal(err.to_string()))?
        };

        let action = if is_new { "NEW_DEVICE_REGISTERED" } else { "DEVICE_UPDATED" };
        self.audit
            .emit(
                AuditEvent::new(Some(user_id), action, saved.id.to_string(), now)
                    .with_ip(ip)
                    .with_detail("risk", format!("{:?}", risk.risk)),
            )
            .await;

        Ok(saved)
    }

    /// Validate an already-registered device for a request.
    ///
    /// # Errors
    ///
    /// [`RiskError::DeviceNotFound`] if no record matches;
    /// [`RiskError::DeviceInactive`] if the matching record is inactive;
    /// plus the rate-limit/IP errors from [`Self::register`].
    pub async fn validate(&self, user_id: UserId, fingerprint: &str, req: &FingerprintRequest) -> Result<DeviceRecord> {
        let ip = req.client_ip().unwrap_or_default();
        self.admit_rate_limit(&ip).await?;
        self.ip_policy.check(&ip)?;

        let mut record = self
            .store
            .find_by_user_and_fingerprint(user_id, fingerprint)
            .await
            .map_err(|err| RiskError::Internal(err.to_string()))?
            .ok_or(RiskError::DeviceNotFound)?;
        if !record.active {
            return Err(RiskError::DeviceInactive);
        }

        record.touch_success(SystemTime::now(), Some(ip.clone()));
        let saved = self.store.update(record).await.map_err(|err| RiskError::Internal(err.to_string()))?;

        self.audit
            .emit(AuditEvent::new(Some(user_id), "DEVICE_VALIDATED", saved.id.to_string(), SystemTime::now()).with_ip(ip))
            .await;
        Ok(saved)
    }

    /// Verify a token-carried fingerprint against the current request,
    /// falling back to matching any active record by the current
    /// signals.
    ///
    /// # Errors
    ///
    /// [`RiskError::DeviceMismatch`] if the current signals don't match
    /// `token_fingerprint` and don't match any active record either.
    pub async fn verify(&self, token_fingerprint: &str, req: &FingerprintRequest, user_id: UserId) -> Result<DeviceRecord> {
        let current = self.generate(req);
        if token_fingerprint == current {
            let mut record = self
                .store
                .find_by_user_and_fingerprint(user_id, &current)
                .await
                .map_err(|err| RiskError::Internal(err.to_string()))?
                .ok_or(RiskError::DeviceNotFound)?;
            record.touch_used_at(SystemTime::now());
            return self.store.update(record).await.map_err(|err| RiskError::Internal(err.to_string()));
        }

        let matched = self
            .store
            .find_by_user_and_fingerprint(user_id, &current)
            .await
            .map_err(|err| RiskError::Internal(err.to_string()))?;
        match matched {
            Some(mut record) if record.active => {
                record.touch_used_at(SystemTime::now());
                self.store.update(record).await.map_err(|err| RiskError::Internal(err.to_string()))
            }
            _ => {
                self.audit
                    .emit(AuditEvent::new(Some(user_id), "DEVICE_MISMATCH", current, SystemTime::now()))
                    .await;
                Err(RiskError::DeviceMismatch)
            }
        }
    }

    /// Mark a device trusted.
    ///
    /// # Errors
    ///
    /// [`RiskError::DeviceNotFound`] if no such record exists.
    pub async fn trust(&self, user_id: UserId, fingerprint: &str) -> Result<DeviceRecord> {
        self.flip_trust(user_id, fingerprint, true).await
    }

    /// Clear a device's trusted flag.
    ///
    /// # Errors
    ///
    /// [`RiskError::DeviceNotFound`] if no such record exists.
    pub async fn untrust(&self, user_id: UserId, fingerprint: &str) -> Result<DeviceRecord> {
        self.flip_trust(user_id, fingerprint, false).await
    }

    async fn flip_trust(&self, user_id: UserId, fingerprint: &str, trusted: bool) -> Result<DeviceRecord> {
        let mut record = self
            .store
            .find_by_user_and_fingerprint(user_id, fingerprint)
            .await
            .map_err(|err| RiskError::Internal(err.to_string()))?
            .ok_or(RiskError::DeviceNotFound)?;
        let now = SystemTime::now();
        if trusted {
            record.trust(now);
        } else {
            record.untrust(now);
        }
        let saved = self.store.update(record).await.map_err(|err| RiskError::Internal(err.to_string()))?;
        let action = if trusted { "DEVICE_TRUSTED" } else { "DEVICE_UNTRUSTED" };
        self.audit.emit(AuditEvent::new(Some(user_id), action, saved.id.to_string(), now)).await;
        Ok(saved)
    }

    /// Flag a device's latest use as suspicious, deactivating it once
    /// the configured failed-attempt threshold is reached.
    ///
    /// # Errors
    ///
    /// [`RiskError::DeviceNotFound`] if no such record exists.
    pub async fn mark_suspicious(&self, user_id: UserId, fingerprint: &str) -> Result<DeviceRecord> {
        let mut record = self
            .store
            .find_by_user_and_fingerprint(user_id, fingerprint)
            .await
            .map_err(|err| RiskError::Internal(err.to_string()))?
            .ok_or(RiskError::DeviceNotFound)?;
        let now = SystemTime::now();
        let deactivated = record.mark_suspicious(self.config.max_failed_attempts, now);
        let saved = self.store.update(record).await.map_err(|err| RiskError::Internal(err.to_string()))?;
        self.audit
            .emit(
                AuditEvent::new(Some(user_id), "DEVICE_MARKED_SUSPICIOUS", saved.id.to_string(), now)
                    .with_detail("deactivated", deactivated.to_string()),
            )
            .await;
        Ok(saved)
    }

    /// Deactivate a single device record by id.
    ///
    /// # Errors
    ///
    /// [`RiskError::DeviceNotFound`] if no such record exists, or it
    /// belongs to a different user.
    pub async fn revoke(&self, user_id: UserId, id: DeviceRecordId) -> Result<DeviceRecord> {
        let mut record = self.store.find_by_id(id).await.map_err(|_| RiskError::DeviceNotFound)?;
        if record.user_id != user_id {
            return Err(RiskError::DeviceNotFound);
        }
        let now = SystemTime::now();
        record.deactivate(now);
        let saved = self.store.update(record).await.map_err(|err| RiskError::Internal(err.to_string()))?;
        self.audit.emit(AuditEvent::new(Some(user_id), "DEVICE_REVOKED", saved.id.to_string(), now)).await;
        Ok(saved)
    }

    /// Deactivate every other active device for a user, keeping only
    /// the one matching `fingerprint`.
    ///
    /// # Errors
    ///
    /// Propagates [`crate::adapters::StoreError`] from the underlying
    /// store as [`RiskError::Internal`].
    pub async fn revoke_all_except(&self, user_id: UserId, fingerprint: &str) -> Result<usize> {
        let records = self.store.list_by_user(user_id).await.map_err(|err| RiskError::Internal(err.to_string()))?;
        let now = SystemTime::now();
        let mut revoked = 0;
        for mut record in records {
            if record.fingerprint != fingerprint && record.active {
                record.deactivate(now);
                self.store.update(record).await.map_err(|err| RiskError::Internal(err.to_string()))?;
                revoked += 1;
            }
        }
        self.audit
            .emit(
                AuditEvent::new(Some(user_id), "DEVICES_REVOKED_EXCEPT_CURRENT", fingerprint.to_string(), now)
                    .with_detail("count", revoked.to_string()),
            )
            .await;
        Ok(revoked)
    }

    /// Deactivate every active record for the user in one batch. The
    /// user-level opt-out flag itself is out of scope (lives on
    /// [`crate::adapters::UserRecord`] in the embedding application);
    /// this call only performs the device side of that transaction.
    ///
    /// # Errors
    ///
    /// Propagates [`crate::adapters::StoreError`] as [`RiskError::Internal`].
    pub async fn disable(&self, user_id: UserId) -> Result<usize> {
        let count = self
            .store
            .deactivate_all(user_id, SystemTime::now())
            .await
            .map_err(|err| RiskError::Internal(err.to_string()))?;
        self.audit
            .emit(
                AuditEvent::new(Some(user_id), "DEVICE_FINGERPRINTING_DISABLED", user_id.to_string(), SystemTime::now())
                    .with_detail("deactivated_count", count.to_string()),
            )
            .await;
        Ok(count)
    }

    /// Audit-only from this crate's perspective — the user flag flip
    /// lives in the embedding application, and previously deactivated
    /// records intentionally remain inactive.
    pub async fn enable(&self, user_id: UserId) {
        self.audit
            .emit(AuditEvent::new(
                Some(user_id),
                "DEVICE_FINGERPRINTING_ENABLED",
                user_id.to_string(),
                SystemTime::now(),
            ))
            .await;
    }

    /// List a user's devices as [`DeviceView`] rows.
    ///
    /// # Errors
    ///
    /// Propagates [`crate::adapters::StoreError`] as [`RiskError::Internal`].
    pub async fn list_devices(&self, user_id: UserId, current_fingerprint: &str) -> Result<Vec<DeviceView>> {
        let records = self.store.list_by_user(user_id).await.map_err(|err| RiskError::Internal(err.to_string()))?;
        Ok(records.iter().map(|r| DeviceView::from_record(r, current_fingerprint)).collect())
    }
}
