//! `SecurityAlert`: the structured event emitted to the alert sink when
//! a login trips a risk condition, modeled as its own value type rather
//! than a log line so transports can filter and route on its fields.

use std::collections::BTreeMap;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::ids::UserId;

/// Severity of a [`SecurityAlert`], mirroring [`crate::risk::engine::RiskLevel`]
/// but kept distinct: an alert's severity is fixed at emission time and
/// does not retroactively change with later checks in the same evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AlertSeverity {
    /// Informational, no action implied.
    Low,
    /// Worth review; device trust may be downgraded.
    Medium,
    /// Requires attention; typically paired with a deny or step-up.
    High,
}

/// The kind of condition that triggered a [`SecurityAlert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertKind {
    /// Two logins for the same user, too far apart to be the same
    /// traveler, in too short a time.
    ImpossibleTravel,
    /// Login origin ASN is a known VPN/proxy/hosting provider.
    VpnAsn,
    /// Secondary reputation check backing up [`Self::VpnAsn`].
    VpnReputation,
    /// Login origin country is on the configured high-risk list.
    CountryRisk,
    /// Risk evaluation hit an internal error; evaluation never fails
    /// outright, it falls back to high risk and emits this alert instead.
    InternalError,
}

/// A structured security event sent to [`crate::adapters::AlertTransport`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityAlert {
    /// What triggered the alert.
    pub kind: AlertKind,
    /// The user the alert concerns.
    pub user_id: UserId,
    /// Severity at emission time.
    pub severity: AlertSeverity,
    /// When the alert was generated.
    pub at: SystemTime,
    /// Free-form details: distance/speed/Δt/from/to for impossible
    /// travel, asn for VPN, country code for country risk.
    pub details: BTreeMap<String, String>,
}

impl SecurityAlert {
    /// Build an alert with no details; use [`Self::with_detail`] to add
    /// them fluently.
    #[must_use]
    pub fn new(kind: AlertKind, user_id: UserId, severity: AlertSeverity, at: SystemTime) -> Self {
        Self {
            kind,
            user_id,
            severity,
            at,
            details: BTreeMap::new(),
        }
    }

    /// Attach a detail key/value, returning `self` for chaining.
    #[must_use]
    pub fn with_detail(mut self, key: &str, value: impl Into<String>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }
}
