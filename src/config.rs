//! Configuration for the risk engine, device fingerprint, and rate limiter.
//!
//! Values should be supplied by the embedding application, not hardcoded —
//! the `Default` impls below exist for tests and local development only.

/// Device-fingerprint subsystem configuration.
///
/// Keys: `device.fingerprint.salt`, `device.max-per-user`,
/// `device.max-failed-attempts`.
#[derive(Debug, Clone)]
pub struct DeviceFingerprintConfig {
    /// Mixed into the fingerprint hash (`device.fingerprint.salt`).
    pub salt: String,

    /// Upper bound on active devices per user (`device.max-per-user`).
    ///
    /// Default: 5.
    pub max_devices_per_user: usize,

    /// Failed-attempt count at which a device record is deactivated
    /// (`device.max-failed-attempts`).
    ///
    /// Default: 5.
    pub max_failed_attempts: u32,
}

impl DeviceFingerprintConfig {
    /// Create a new configuration with the given salt and sensible defaults
    /// for the remaining fields.
    #[must_use]
    pub const fn new(salt: String) -> Self {
        Self {
            salt,
            max_devices_per_user: 5,
            max_failed_attempts: 5,
        }
    }

    /// Set the maximum number of active devices per user.
    #[must_use]
    pub const fn with_max_devices_per_user(mut self, max: usize) -> Self {
        self.max_devices_per_user = max;
        self
    }

    /// Set the failed-attempt threshold that deactivates a device.
    #[must_use]
    pub const fn with_max_failed_attempts(mut self, max: u32) -> Self {
        self.max_failed_attempts = max;
        self
    }
}

impl Default for DeviceFingerprintConfig {
    fn default() -> Self {
        Self::new("dev-insecure-salt-change-me".to_string())
    }
}

/// Rate-limiter configuration.
///
/// Keys: `ratelimit.window`, `ratelimit.limit`. Default policy is the
/// caller-IP device-registration policy: 5 per 60s.
#[derive(Debug, Clone, Copy)]
pub struct RateLimiterConfig {
    /// Maximum admitted calls per window.
    pub limit: u32,

    /// Window duration, in seconds.
    pub window_secs: u64,

    /// In-process fixed-window variant: purge the key map once it exceeds
    /// this many distinct keys.
    pub purge_threshold: usize,
}

impl RateLimiterConfig {
    /// Create a new configuration.
    #[must_use]
    pub const fn new(limit: u32, window_secs: u64) -> Self {
        Self {
            limit,
            window_secs,
            purge_threshold: 10_000,
        }
    }

    /// Set the in-process map purge threshold.
    #[must_use]
    pub const fn with_purge_threshold(mut self, threshold: usize) -> Self {
        self.purge_threshold = threshold;
        self
    }
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self::new(5, 60)
    }
}

/// ASN resolver configuration.
///
/// Keys: `asn.stale-threshold`, `asn.cleanup.cron`, `asn.external.rate`,
/// `whois.server`.
#[derive(Debug, Clone)]
pub struct AsnConfig {
    /// Durable `AsnEntry` rows older than this are stale and swept
    /// (`asn.stale-threshold`). Default: 30 days.
    pub stale_threshold_secs: u64,

    /// Cron expression for the scheduled sweeper (`asn.cleanup.cron`).
    /// Interpreted by the embedding application's scheduler; this crate
    /// only stores the string and exposes the sweep operation to call.
    pub cleanup_cron: String,

    /// Token-bucket rate, in requests per second, guarding the external
    /// resolver chain (`asn.external.rate`). Default: 10/s.
    pub external_rate_per_sec: u32,

    /// WHOIS server to query over TCP/43 (`whois.server`).
    pub whois_server: String,

    /// Per-stage timeouts, in milliseconds: DNS, WHOIS, local DB lookup.
    pub dns_timeout_ms: u64,
    /// See `dns_timeout_ms`.
    pub whois_timeout_ms: u64,
    /// See `dns_timeout_ms`.
    pub db_timeout_ms: u64,
}

impl Default for AsnConfig {
    fn default() -> Self {
        Self {
            stale_threshold_secs: 30 * 24 * 3600,
            cleanup_cron: "0 0 3 * * *".to_string(),
            external_rate_per_sec: 10,
            whois_server: "whois.radb.net".to_string(),
            dns_timeout_ms: 1_000,
            whois_timeout_ms: 3_000,
            db_timeout_ms: 100,
        }
    }
}

/// Geo/risk-engine configuration.
///
/// Keys: `geo.time-window-hours`, `geo.impossible-speed-kmh`,
/// `geo.suspicious-distance-km`, `geo.high-risk-countries`,
/// `geo.known-vpn-asns`, `geo.vpn-reputation-threshold`.
#[derive(Debug, Clone)]
pub struct GeoConfig {
    /// Impossible-travel lookback window, in hours. Default: 24.
    pub time_window_hours: i64,

    /// Speed, in km/h, above which travel is flagged impossible.
    /// Default: 1100.
    pub impossible_speed_kmh: f64,

    /// Reserved knob: distance, in km, that would make a
    /// close-in-time-but-far login medium risk. Not currently consulted by
    /// any check — kept for a future rule rather than invented behavior
    /// around it.
    pub suspicious_distance_km: f64,

    /// ISO 3166-1 alpha-2 country codes treated as high risk.
    pub high_risk_countries: Vec<String>,

    /// ASNs known to belong to VPN/proxy operators.
    pub known_vpn_asns: Vec<u32>,

    /// Reputation score (0.0-1.0, lower is worse) below which an ASN is
    /// treated as medium risk via the optional secondary VPN check.
    pub vpn_reputation_threshold: f64,
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            time_window_hours: 24,
            impossible_speed_kmh: 1100.0,
            suspicious_distance_km: 800.0,
            high_risk_countries: Vec::new(),
            known_vpn_asns: Vec::new(),
            vpn_reputation_threshold: 0.3,
        }
    }
}

/// Aggregate configuration for the whole crate.
#[derive(Debug, Clone, Default)]
pub struct RiskConfig {
    /// Device fingerprint subsystem configuration.
    pub device: DeviceFingerprintConfig,
    /// Rate limiter configuration (device-registration policy).
    pub rate_limiter: RateLimiterConfig,
    /// ASN resolver configuration.
    pub asn: AsnConfig,
    /// Geo/risk-engine configuration.
    pub geo: GeoConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_fingerprint_builder() {
        let cfg = DeviceFingerprintConfig::new("S".to_string())
            .with_max_devices_per_user(3)
            .with_max_failed_attempts(2);
        assert_eq!(cfg.salt, "S");
        assert_eq!(cfg.max_devices_per_user, 3);
        assert_eq!(cfg.max_failed_attempts, 2);
    }

    #[test]
    fn test_rate_limiter_default_policy() {
        let cfg = RateLimiterConfig::default();
        assert_eq!(cfg.limit, 5);
        assert_eq!(cfg.window_secs, 60);
    }

    #[test]
    fn test_geo_default_constants() {
        let cfg = GeoConfig::default();
        assert_eq!(cfg.time_window_hours, 24);
        assert!((cfg.impossible_speed_kmh - 1100.0).abs() < f64::EPSILON);
    }
}
