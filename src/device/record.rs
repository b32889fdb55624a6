//! `DeviceRecord` and its state machine.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::geo::location::GeoLocation;
use crate::ids::{DeviceRecordId, UserId};

/// The three states a [`DeviceRecord`] can be in.
/// Not stored directly — derived from `active`/`trusted` so the
/// invariant `trusted ⇒ active` can't drift out of sync with a
/// separately-stored enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceState {
    /// `active = true, trusted = false`.
    ActiveUntrusted,
    /// `active = true, trusted = true`.
    ActiveTrusted,
    /// `active = false`. Terminal until a fresh `Register` for the same
    /// fingerprint creates a new record.
    Inactive,
}

/// A registered device for a user.
///
/// Invariants enforced by every mutating method in this module, never
/// by the caller poking fields directly:
/// 1. `active ⇒ deactivated_at = None`; `¬active ⇒ deactivated_at = Some`.
/// 2. `trusted ⇒ active`.
/// 3. `failed_attempts ∈ [0, max_failed_attempts]`; reaching the bound
///    deactivates the record.
/// 4. `update_count` is strictly monotonic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Assigned on insert.
    pub id: DeviceRecordId,
    /// Owning user.
    pub user_id: UserId,
    /// Unique per `(user_id, fingerprint)`.
    pub fingerprint: String,

    /// Whether the record currently counts toward the user's device
    /// limit and can authenticate.
    pub active: bool,
    /// Whether the device has been explicitly trusted.
    pub trusted: bool,
    /// Consecutive failed validation attempts since the last success.
    pub failed_attempts: u32,
    /// When the record was deactivated, if it is inactive.
    pub deactivated_at: Option<SystemTime>,

    /// Last time this record was used successfully.
    pub last_used_at: SystemTime,
    /// IP observed at last use.
    pub last_known_ip: Option<String>,
    /// Country observed at last use.
    pub last_known_country: Option<String>,
    /// Most recent resolved location.
    pub location: Option<GeoLocation>,
    /// Raw `User-Agent` or similar descriptive string.
    pub browser_info: Option<String>,
    /// Human-assigned or derived device name.
    pub device_name: Option<String>,
    /// Where this record was created from (e.g. "password_login",
    /// "passkey", "magic_link").
    pub source: Option<String>,
    /// Strictly monotonic per-record update counter.
    pub update_count: u64,
}

impl DeviceRecord {
    /// Construct a new record in the `ActiveUntrusted` state.
    #[must_use]
    pub fn new(user_id: UserId, fingerprint: String, now: SystemTime) -> Self {
        Self {
            id: DeviceRecordId::new(),
            user_id,
            fingerprint,
            active: true,
            trusted: false,
            failed_attempts: 0,
            deactivated_at: None,
            last_used_at: now,
            last_known_ip: None,
            last_known_country: None,
            location: None,
            browser_info: None,
            device_name: None,
            source: None,
            update_count: 0,
        }
    }

    /// Current derived state.
    #[must_use]
    pub fn state(&self) -> DeviceState {
        match (self.active, self.trusted) {
            (false, _) => DeviceState::Inactive,
            (true, true) => DeviceState::ActiveTrusted,
            (true, false) => DeviceState::ActiveUntrusted,
        }
    }

    fn bump_update_count(&mut self) {
        self.update_count += 1;
    }

    /// Record a successful use: reset failed attempts, touch telemetry,
    /// bump `update_count`.
    pub fn touch_success(&mut self, now: SystemTime, ip: Option<String>) {
        self.last_used_at = now;
        if ip.is_some() {
            self.last_known_ip = ip;
        }
        self.failed_attempts = 0;
        self.bump_update_count();
    }

    /// Touch `last_used_at` only, without resetting failed attempts —
    /// used by the trust/untrust/verify fallback path.
    pub fn touch_used_at(&mut self, now: SystemTime) {
        self.last_used_at = now;
        self.bump_update_count();
    }

    /// Enrich telemetry from a risk evaluation: sets
    /// `location`/`last_known_country`, and untrusts the device when
    /// risk is at least medium.
    pub fn apply_risk(&mut self, location: GeoLocation, risk_at_least_medium: bool) {
        self.last_known_country = Some(location.country_code.clone());
        self.location = Some(location);
        if risk_at_least_medium {
            self.trusted = false;
        }
    }

    /// Mark the device trusted. Implies `active = true` by invariant 2 —
    /// trusting an inactive device is a caller error the service layer
    /// rejects before reaching here.
    pub fn trust(&mut self, now: SystemTime) {
        self.trusted = true;
        self.touch_used_at(now);
    }

    /// Clear the trusted flag.
    pub fn untrust(&mut self, now: SystemTime) {
        self.trusted = false;
        self.touch_used_at(now);
    }

    /// Increment `failed_attempts`; deactivate once `max_failed_attempts`
    /// is reached. Returns `true` if this call deactivated the record.
    pub fn mark_suspicious(&mut self, max_failed_attempts: u32, now: SystemTime) -> bool {
        self.failed_attempts = (self.failed_attempts + 1).min(max_failed_attempts);
        if self.failed_attempts >= max_failed_attempts {
            self.deactivate(now);
            true
        } else {
            false
        }
    }

    /// Deactivate the record — either an explicit revoke/disable, or
    /// the `mark_suspicious` threshold transition. Idempotent.
    pub fn deactivate(&mut self, now: SystemTime) {
        if self.active {
            self.active = false;
            self.trusted = false;
            self.deactivated_at = Some(now);
            self.bump_update_count();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_record() -> DeviceRecord {
        DeviceRecord::new(UserId::new(), "fp1".to_string(), SystemTime::now())
    }

    #[test]
    fn test_new_record_is_active_untrusted() {
        let record = new_record();
        assert_eq!(record.state(), DeviceState::ActiveUntrusted);
        assert!(record.active);
        assert!(!record.trusted);
        assert_eq!(record.deactivated_at, None);
    }

    #[test]
    fn test_trust_requires_no_explicit_active_flip_but_implies_invariant() {
        let mut record = new_record();
        record.trust(SystemTime::now());
        assert_eq!(record.state(), DeviceState::ActiveTrusted);
        assert!(record.active);
    }

    #[test]
    fn test_mark_suspicious_deactivates_at_threshold() {
        let mut record = new_record();
        record.trust(SystemTime::now());
        assert!(!record.mark_suspicious(3, SystemTime::now()));
        assert!(!record.mark_suspicious(3, SystemTime::now()));
        assert!(record.mark_suspicious(3, SystemTime::now()));
        assert_eq!(record.state(), DeviceState::Inactive);
        assert!(!record.trusted, "deactivation must also clear trusted (invariant 2)");
        assert!(record.deactivated_at.is_some());
    }

    #[test]
    fn test_failed_attempts_never_exceeds_max() {
        let mut record = new_record();
        for _ in 0..10 {
            record.mark_suspicious(3, SystemTime::now());
        }
        assert!(record.failed_attempts <= 3);
    }

    #[test]
    fn test_deactivate_is_idempotent() {
        let mut record = new_record();
        record.deactivate(SystemTime::now());
        let first = record.deactivated_at;
        let count_after_first = record.update_count;
        record.deactivate(SystemTime::now());
        assert_eq!(record.deactivated_at, first);
        assert_eq!(record.update_count, count_after_first);
    }

    #[test]
    fn test_touch_success_resets_failed_attempts_and_bumps_count() {
        let mut record = new_record();
        record.mark_suspicious(5, SystemTime::now());
        let before = record.update_count;
        record.touch_success(SystemTime::now(), Some("1.2.3.4".to_string()));
        assert_eq!(record.failed_attempts, 0);
        assert_eq!(record.last_known_ip.as_deref(), Some("1.2.3.4"));
        assert!(record.update_count > before);
    }

    #[test]
    fn test_apply_risk_untrusts_on_medium_or_higher() {
        let mut record = new_record();
        record.trust(SystemTime::now());
        record.apply_risk(GeoLocation::unknown(), true);
        assert!(!record.trusted);
    }

    #[test]
    fn test_update_count_is_strictly_monotonic() {
        let mut record = new_record();
        let mut last = record.update_count;
        record.touch_success(SystemTime::now(), None);
        assert!(record.update_count > last);
        last = record.update_count;
        record.trust(SystemTime::now());
        assert!(record.update_count > last);
    }
}
