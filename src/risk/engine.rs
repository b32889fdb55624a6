//! `RiskEngine`: combines geo/ASN resolution and location history
//! against policy tables to produce a [`RiskResult`].

use std::sync::Arc;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::adapters::AlertTransport;
use crate::config::GeoConfig;
use crate::geo::history::LocationHistoryStore;
use crate::geo::location::GeoResolver;
use crate::ids::UserId;
use crate::risk::alert::{AlertKind, AlertSeverity, SecurityAlert};
use crate::risk::haversine::distance_km;

/// Risk level: `Low | Medium | High`. Ordered so a `max` join is a
/// plain comparison — the running result only ever climbs, never
/// drops, and `High` absorbs everything once reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskLevel {
    /// Proceed normally.
    Low,
    /// Step-up possible; device trust may be downgraded.
    Medium,
    /// Deny or require strong reauthentication.
    High,
}

/// The public result of a [`RiskEngine::verify`] call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskResult {
    /// Overall joined risk level.
    pub risk: RiskLevel,
    /// Human-readable alert codes accumulated across checks.
    pub alerts: Vec<String>,
}

impl RiskResult {
    fn low() -> Self {
        Self {
            risk: RiskLevel::Low,
            alerts: Vec::new(),
        }
    }

    /// Join `level` into the running result and append `alert_code`.
    fn raise(&mut self, level: RiskLevel, alert_code: impl Into<String>) {
        self.risk = self.risk.max(level);
        self.alerts.push(alert_code.into());
    }
}

/// Combines [`GeoResolver`], [`LocationHistoryStore`], and policy tables
/// into the synchronous, advisory risk check run on every login.
pub struct RiskEngine {
    geo_resolver: Arc<GeoResolver>,
    history: Arc<LocationHistoryStore>,
    alerts: Arc<dyn AlertTransport>,
    config: GeoConfig,
}

impl RiskEngine {
    /// Wire the engine's collaborators.
    #[must_use]
    pub fn new(
        geo_resolver: Arc<GeoResolver>,
        history: Arc<LocationHistoryStore>,
        alerts: Arc<dyn AlertTransport>,
        config: GeoConfig,
    ) -> Self {
        Self {
            geo_resolver,
            history,
            alerts,
            config,
        }
    }

    /// Resolve `ip` to a [`crate::geo::location::GeoLocation`] via the
    /// same resolver `verify` uses internally. Exposed so
    /// [`crate::device::service::DeviceFingerprintService::register`] can
    /// enrich a [`crate::device::record::DeviceRecord`] with the location
    /// behind a risk check without duplicating the resolver wiring.
    pub async fn resolve_location(&self, ip: &str) -> crate::geo::location::GeoLocation {
        self.geo_resolver.lookup(ip).await
    }

    /// Run the full check: impossible travel, VPN, country risk, then
    /// append the new location to history regardless of outcome, even
    /// when the result is `High`.
    ///
    /// Never fails: on an internal error (e.g. history store
    /// unavailable) it returns `High` with an `internal_error` alert
    /// rather than propagating the failure to the caller.
    pub async fn verify(&self, ip: &str, user_id: UserId) -> RiskResult {
        let location = self.geo_resolver.lookup(ip).await;

        if location.is_unknown() {
            return RiskResult {
                risk: RiskLevel::Medium,
                alerts: vec!["location_unknown".to_string()],
            };
        }

        let history = match self.history.get(user_id).await {
            Ok(history) => history,
            Err(err) => {
                tracing::error!(error = %err, "location history unavailable during risk check");
                return self.internal_error_result(user_id).await;
            }
        };

        let mut result = RiskResult::low();
        self.check_impossible_travel(&mut result, &location, &history, user_id).await;
        self.check_vpn_risk(&mut result, &location, user_id).await;
        self.check_country_risk(&mut result, &location, user_id);

        if let Err(err) = self.history.append(user_id, location, SystemTime::now()).await {
            tracing::warn!(error = %err, "failed to append location history after risk check");
        }

        result
    }

    async fn internal_error_result(&self, user_id: UserId) -> RiskResult {
        let alert = SecurityAlert::new(AlertKind::InternalError, user_id, AlertSeverity::High, SystemTime::now());
        self.dispatch(alert).await;
        RiskResult {
            risk: RiskLevel::High,
            alerts: vec!["internal_error".to_string()],
        }
    }

    async fn check_impossible_travel(
        &self,
        result: &mut RiskResult,
        location: &crate::geo::location::GeoLocation,
        history: &crate::geo::history::LocationHistory,
        user_id: UserId,
    ) {
        let Some(last) = history.last() else {
            return;
        };
        if !last.location.has_coordinates() || !location.has_coordinates() {
            return;
        }

        let Ok(elapsed) = SystemTime::now().duration_since(last.timestamp) else {
            return;
        };
        let time_window = std::time::Duration::from_secs(u64::try_from(self.config.time_window_hours.max(0)).unwrap_or(0) * 3600);
        if elapsed > time_window {
            return;
        }

        let (Some(lat1), Some(lon1)) = (last.location.latitude, last.location.longitude) else {
            return;
        };
        let (Some(lat2), Some(lon2)) = (location.latitude, location.longitude) else {
            return;
        };

        let distance = distance_km(lat1, lon1, lat2, lon2);
        let speed_kmh = if elapsed.as_secs_f64() <= 1.0 {
            f64::INFINITY
        } else {
            distance / (elapsed.as_secs_f64() / 3600.0)
        };

        if speed_kmh > self.config.impossible_speed_kmh {
            result.raise(RiskLevel::High, "impossible_travel");
            let alert = SecurityAlert::new(AlertKind::ImpossibleTravel, user_id, AlertSeverity::High, SystemTime::now())
                .with_detail("distance_km", format!("{distance:.1}"))
                .with_detail("speed_kmh", format!("{speed_kmh:.1}"))
                .with_detail("elapsed_secs", format!("{:.1}", elapsed.as_secs_f64()))
                .with_detail("from_country", last.location.country_code.clone())
                .with_detail("to_country", location.country_code.clone())
                .with_detail(
                    "from_city",
                    last.location.city.clone().unwrap_or_else(|| "unknown".to_string()),
                )
                .with_detail(
                    "to_city",
                    location.city.clone().unwrap_or_else(|| "unknown".to_string()),
                );
            self.dispatch(alert).await;
        }
    }

    async fn check_vpn_risk(&self, result: &mut RiskResult, location: &crate::geo::location::GeoLocation, user_id: UserId) {
        let Some(asn) = location.asn else {
            return;
        };
        if self.config.known_vpn_asns.contains(&asn) {
            result.raise(RiskLevel::Medium, format!("vpn_asn:{asn}"));
            let alert = SecurityAlert::new(AlertKind::VpnAsn, user_id, AlertSeverity::Medium, SystemTime::now())
                .with_detail("asn", asn.to_string());
            self.dispatch(alert).await;
        }
    }

    fn check_country_risk(&self, result: &mut RiskResult, location: &crate::geo::location::GeoLocation, _user_id: UserId) {
        if self.config.high_risk_countries.contains(&location.country_code) {
            result.raise(RiskLevel::Medium, format!("country_risk:{}", location.country_code));
        }
    }

    async fn dispatch(&self, alert: SecurityAlert) {
        if let Err(err) = self.alerts.send(alert).await {
            metrics::counter!("alert_delivery_failed").increment(1);
            tracing::warn!(error = %err, "failed to deliver security alert");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{MaxMindError, MaxMindReader};
    use crate::cache::CacheLayer;
    use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
    use crate::config::AsnConfig;
    use crate::geo::asn::AsnResolver;
    use crate::mocks::alert_transport::InMemoryAlertTransport;
    use crate::mocks::asn_entry_store::InMemoryAsnEntryStore;
    use crate::ratelimit::SlidingWindowRateLimiter;
    use std::net::IpAddr;
    use std::time::Duration;

    struct StaticMaxMind(std::sync::Mutex<std::collections::HashMap<String, GeoLoc>>);
    type GeoLoc = crate::geo::location::GeoLocation;

    impl MaxMindReader for StaticMaxMind {
        fn city(&self, ip: IpAddr) -> Result<GeoLoc, MaxMindError> {
            self.0
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .get(&ip.to_string())
                .cloned()
                .ok_or(MaxMindError::NotFound)
        }

        fn asn(&self, _ip: IpAddr) -> Result<u32, MaxMindError> {
            Err(MaxMindError::NotFound)
        }
    }

    fn engine(locations: Vec<(&str, GeoLoc)>, config: GeoConfig) -> (RiskEngine, Arc<InMemoryAlertTransport>) {
        let mut map = std::collections::HashMap::new();
        for (ip, loc) in locations {
            map.insert(ip.to_string(), loc);
        }
        let maxmind = Arc::new(StaticMaxMind(std::sync::Mutex::new(map)));
        let asn_resolver = Arc::new(AsnResolver::new(
            Arc::new(CacheLayer::new()),
            Arc::new(InMemoryAsnEntryStore::new()),
            maxmind.clone(),
            SlidingWindowRateLimiter::in_memory(),
            CircuitBreaker::new(CircuitBreakerConfig::default()),
            AsnConfig::default(),
        ));
        let geo_resolver = Arc::new(GeoResolver::new(maxmind, asn_resolver));
        let history = Arc::new(LocationHistoryStore::new(Arc::new(CacheLayer::new()), Duration::from_secs(86400)));
        let alerts = Arc::new(InMemoryAlertTransport::new());
        (
            RiskEngine::new(geo_resolver, history, alerts.clone(), config),
            alerts,
        )
    }

    fn loc(country: &str, lat: f64, lon: f64) -> GeoLoc {
        GeoLoc {
            country_code: country.to_string(),
            country_name: None,
            city: Some(format!("{country}-city")),
            postal_code: None,
            latitude: Some(lat),
            longitude: Some(lon),
            time_zone: None,
            subdivision_code: None,
            subdivision_name: None,
            asn: None,
        }
    }

    #[tokio::test]
    async fn test_unknown_location_is_medium_risk() {
        let (engine, _alerts) = engine(vec![], GeoConfig::default());
        let result = engine.verify("not-an-ip", UserId::new()).await;
        assert_eq!(result.risk, RiskLevel::Medium);
        assert!(result.alerts.contains(&"location_unknown".to_string()));
    }

    #[tokio::test]
    async fn test_impossible_travel_is_flagged_high_with_alert() {
        let (engine, alerts) = engine(
            vec![
                ("1.1.1.1", loc("BR", -23.55, -46.63)),
                ("2.2.2.2", loc("JP", 35.68, 139.69)),
            ],
            GeoConfig::default(),
        );
        let user = UserId::new();
        let first = engine.verify("1.1.1.1", user).await;
        assert_eq!(first.risk, RiskLevel::Low);

        let second = engine.verify("2.2.2.2", user).await;
        assert_eq!(second.risk, RiskLevel::High);
        assert!(second.alerts.iter().any(|a| a == "impossible_travel"));
        assert_eq!(alerts.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_stale_history_skips_impossible_travel() {
        let mut config = GeoConfig::default();
        config.time_window_hours = 0;
        let (engine, _alerts) = engine(
            vec![
                ("1.1.1.1", loc("BR", -23.55, -46.63)),
                ("2.2.2.2", loc("JP", 35.68, 139.69)),
            ],
            config,
        );
        let user = UserId::new();
        engine.verify("1.1.1.1", user).await;
        let second = engine.verify("2.2.2.2", user).await;
        assert_eq!(second.risk, RiskLevel::Low);
    }

    #[tokio::test]
    async fn test_known_vpn_asn_raises_medium() {
        let mut config = GeoConfig::default();
        config.known_vpn_asns = vec![64512];
        let mut vpn_location = loc("US", 37.0, -122.0);
        vpn_location.asn = Some(64512);
        let (engine, alerts) = engine(vec![("3.3.3.3", vpn_location)], config);
        let result = engine.verify("3.3.3.3", UserId::new()).await;
        assert_eq!(result.risk, RiskLevel::Medium);
        assert!(result.alerts.iter().any(|a| a.starts_with("vpn_asn:")));
        assert_eq!(alerts.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_high_risk_country_raises_medium() {
        let mut config = GeoConfig::default();
        config.high_risk_countries = vec!["KP".to_string()];
        let (engine, _alerts) = engine(vec![("4.4.4.4", loc("KP", 39.0, 125.0))], config);
        let result = engine.verify("4.4.4.4", UserId::new()).await;
        assert_eq!(result.risk, RiskLevel::Medium);
        assert!(result.alerts.iter().any(|a| a.starts_with("country_risk:")));
    }

    #[tokio::test]
    async fn test_history_is_appended_even_when_high() {
        let (engine, _alerts) = engine(
            vec![
                ("1.1.1.1", loc("BR", -23.55, -46.63)),
                ("2.2.2.2", loc("JP", 35.68, 139.69)),
            ],
            GeoConfig::default(),
        );
        let user = UserId::new();
        engine.verify("1.1.1.1", user).await;
        engine.verify("2.2.2.2", user).await;
        let history = engine.history.get(user).await.expect("history available");
        assert_eq!(history.len(), 2);
    }
}
