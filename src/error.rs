//! Error taxonomy for the risk engine, device fingerprint, and authorization core.

use thiserror::Error;

/// Result type alias used throughout this crate.
pub type Result<T> = std::result::Result<T, RiskError>;

/// Comprehensive error taxonomy, organized by category.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RiskError {
    // ═══════════════════════════════════════════════════════════
    // Input validation
    // ═══════════════════════════════════════════════════════════
    /// Required input was null, blank, or otherwise malformed.
    #[error("bad input: {0}")]
    BadInput(String),

    // ═══════════════════════════════════════════════════════════
    // Identity lookups
    // ═══════════════════════════════════════════════════════════
    /// The referenced user does not exist.
    #[error("user not found")]
    UserNotFound,

    /// No device record matches the given id or fingerprint.
    #[error("device not found")]
    DeviceNotFound,

    /// The device record exists but is deactivated.
    #[error("device is inactive")]
    DeviceInactive,

    /// The token-carried fingerprint does not match the current request and
    /// no active record for the user matches the current fingerprint either.
    #[error("device fingerprint mismatch")]
    DeviceMismatch,

    /// The user has opted out of device fingerprinting entirely.
    #[error("device fingerprinting disabled for user")]
    FingerprintingDisabled,

    /// The user already has the maximum number of active device records.
    #[error("user has reached the maximum number of devices")]
    MaxDevices,

    // ═══════════════════════════════════════════════════════════
    // IP / network security
    // ═══════════════════════════════════════════════════════════
    /// Caller IP is on the blocklist.
    #[error("IP address is blocked")]
    IpBlocked,

    /// Caller IP tripped a suspicion heuristic.
    #[error("IP address is suspicious")]
    IpSuspicious,

    /// Caller IP could not be parsed at all.
    #[error("IP address is invalid")]
    IpInvalid,

    // ═══════════════════════════════════════════════════════════
    // Rate limiting
    // ═══════════════════════════════════════════════════════════
    /// The rate limiter denied the request.
    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimit {
        /// Suggested wait, in seconds, before the caller retries.
        retry_after_secs: u64,
    },

    /// The rate limiter's backing store is unreachable; fail-closed.
    #[error("rate limiter backend unavailable")]
    RateLimiterUnavailable,

    // ═══════════════════════════════════════════════════════════
    // Downstream / external
    // ═══════════════════════════════════════════════════════════
    /// A downstream dependency (ASN resolver, WHOIS, durable store) exhausted
    /// its retries. Where acceptable, callers should treat this as "unknown"
    /// rather than propagating a hard failure.
    #[error("external dependency unavailable: {0}")]
    ExternalUnavailable(String),

    // ═══════════════════════════════════════════════════════════
    // Authorization
    // ═══════════════════════════════════════════════════════════
    /// The subject lacks the authority required for the operation.
    #[error("insufficient permissions: requires {required}")]
    InsufficientPermissions {
        /// Human-readable description of the missing authority.
        required: String,
    },

    /// A proposed role assignment was rejected.
    #[error("invalid role assignment: {reason}")]
    InvalidAssignment {
        /// Why the assignment was rejected.
        reason: String,
    },

    // ═══════════════════════════════════════════════════════════
    // System
    // ═══════════════════════════════════════════════════════════
    /// An unexpected internal failure. Fail-closed; never exposed verbatim.
    #[error("internal error: {0}")]
    Internal(String),
}

impl RiskError {
    /// Returns `true` when the operation should be recorded to the audit
    /// sink under the "reject, audit" policy.
    #[must_use]
    pub const fn is_audited(&self) -> bool {
        matches!(
            self,
            Self::DeviceMismatch
                | Self::MaxDevices
                | Self::IpBlocked
                | Self::IpSuspicious
                | Self::RateLimit { .. }
                | Self::Internal(_)
        )
    }

    /// Returns `true` if this error stems from caller input rather than
    /// system state — useful for deciding log level and client messaging.
    #[must_use]
    pub const fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::BadInput(_)
                | Self::UserNotFound
                | Self::DeviceNotFound
                | Self::IpInvalid
                | Self::InvalidAssignment { .. }
        )
    }

    /// Returns `true` if this error itself signals a possible security event
    /// (as opposed to routine not-found/validation failures).
    #[must_use]
    pub const fn is_security_issue(&self) -> bool {
        matches!(
            self,
            Self::DeviceMismatch
                | Self::IpBlocked
                | Self::IpSuspicious
                | Self::RateLimit { .. }
        )
    }
}
