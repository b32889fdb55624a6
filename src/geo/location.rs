//! `GeoLocation` value type and `GeoResolver`.

use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::adapters::MaxMindReader;
use crate::geo::asn::AsnResolver;

/// Sentinel country code used by [`GeoLocation::UNKNOWN`].
pub const UNKNOWN_COUNTRY_CODE: &str = "XX";

/// An immutable location value resolved from an IP address.
///
/// Invariant: either `{country_code, latitude, longitude}` are all
/// present, or this is [`GeoLocation::unknown`] with `country_code =
/// "XX"` and every other field empty. Enrichment (attaching an `asn`)
/// produces a new value — nothing here is ever mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    /// ISO 3166-1 alpha-2 country code.
    pub country_code: String,
    /// Full country name.
    pub country_name: Option<String>,
    /// City name.
    pub city: Option<String>,
    /// Postal code.
    pub postal_code: Option<String>,
    /// Latitude in decimal degrees.
    pub latitude: Option<f64>,
    /// Longitude in decimal degrees.
    pub longitude: Option<f64>,
    /// IANA time zone name.
    pub time_zone: Option<String>,
    /// First-level subdivision code (state/province).
    pub subdivision_code: Option<String>,
    /// First-level subdivision name.
    pub subdivision_name: Option<String>,
    /// Autonomous system number, when resolvable.
    pub asn: Option<u32>,
}

impl GeoLocation {
    /// The sentinel value for an IP that could not be resolved.
    #[must_use]
    pub fn unknown() -> Self {
        Self {
            country_code: UNKNOWN_COUNTRY_CODE.to_string(),
            country_name: None,
            city: None,
            postal_code: None,
            latitude: None,
            longitude: None,
            time_zone: None,
            subdivision_code: None,
            subdivision_name: None,
            asn: None,
        }
    }

    /// Whether this is the [`GeoLocation::unknown`] sentinel.
    #[must_use]
    pub fn is_unknown(&self) -> bool {
        self.country_code == UNKNOWN_COUNTRY_CODE && self.latitude.is_none() && self.longitude.is_none()
    }

    /// Whether this location carries coordinates usable for distance math.
    #[must_use]
    pub const fn has_coordinates(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some()
    }

    /// Return a copy of this location with `asn` set, leaving `self`
    /// untouched.
    #[must_use]
    pub fn with_asn(&self, asn: u32) -> Self {
        Self {
            asn: Some(asn),
            ..self.clone()
        }
    }
}

/// Resolves an IP address to a [`GeoLocation`] via a local MaxMind City
/// database, opportunistically enriched with an ASN.
///
/// Parses `ip`; invalid strings yield `UNKNOWN` rather than an error. If
/// the resulting value has no `asn` but the IP is resolvable, enrichment
/// calls [`AsnResolver`] opportunistically — failures to enrich are
/// swallowed and `asn` remains null.
pub struct GeoResolver {
    maxmind: Arc<dyn MaxMindReader>,
    asn_resolver: Arc<AsnResolver>,
}

impl GeoResolver {
    /// Construct a resolver over the given MaxMind reader and ASN pipeline.
    #[must_use]
    pub fn new(maxmind: Arc<dyn MaxMindReader>, asn_resolver: Arc<AsnResolver>) -> Self {
        Self {
            maxmind,
            asn_resolver,
        }
    }

    /// Resolve `ip` to a [`GeoLocation`], enriching with ASN when possible.
    ///
    /// Never fails: an invalid IP string or a database miss both yield
    /// [`GeoLocation::unknown`].
    pub async fn lookup(&self, ip: &str) -> GeoLocation {
        let Ok(parsed) = IpAddr::from_str(ip) else {
            tracing::debug!(ip, "geo lookup: unparseable IP, returning UNKNOWN");
            return GeoLocation::unknown();
        };

        let location = match self.maxmind.city(parsed) {
            Ok(record) => record,
            Err(err) => {
                tracing::debug!(ip = %parsed, error = %err, "geo lookup: no City record, returning UNKNOWN");
                return GeoLocation::unknown();
            }
        };

        if location.asn.is_some() {
            return location;
        }

        match self.asn_resolver.lookup_asn(&parsed.to_string()).await {
            Ok(asn) => location.with_asn(asn),
            Err(err) => {
                tracing::debug!(ip = %parsed, error = %err, "asn enrichment failed, leaving asn null");
                location
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MaxMindError;
    use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
    use crate::config::AsnConfig;
    use crate::mocks::asn_entry_store::InMemoryAsnEntryStore;
    use crate::ratelimit::SlidingWindowRateLimiter;

    struct StubMaxMind {
        city: Option<GeoLocation>,
    }

    impl MaxMindReader for StubMaxMind {
        fn city(&self, _ip: IpAddr) -> Result<GeoLocation, MaxMindError> {
            self.city.clone().ok_or(MaxMindError::NotFound)
        }

        fn asn(&self, _ip: IpAddr) -> Result<u32, MaxMindError> {
            Err(MaxMindError::NotFound)
        }
    }

    fn resolver(city: Option<GeoLocation>) -> GeoResolver {
        let asn = Arc::new(AsnResolver::new(
            Arc::new(crate::cache::CacheLayer::new()),
            Arc::new(InMemoryAsnEntryStore::new()),
            Arc::new(StubMaxMind { city: None }),
            SlidingWindowRateLimiter::in_memory(),
            CircuitBreaker::new(CircuitBreakerConfig::default()),
            AsnConfig::default(),
        ));
        GeoResolver::new(Arc::new(StubMaxMind { city }), asn)
    }

    #[tokio::test]
    async fn test_invalid_ip_yields_unknown() {
        let resolver = resolver(None);
        let loc = resolver.lookup("not-an-ip").await;
        assert!(loc.is_unknown());
    }

    #[tokio::test]
    async fn test_missing_record_yields_unknown() {
        let resolver = resolver(None);
        let loc = resolver.lookup("8.8.8.8").await;
        assert!(loc.is_unknown());
    }

    #[tokio::test]
    async fn test_found_record_is_returned_with_asn_enrichment_attempted() {
        let sao_paulo = GeoLocation {
            country_code: "BR".to_string(),
            country_name: Some("Brazil".to_string()),
            city: Some("Sao Paulo".to_string()),
            postal_code: None,
            latitude: Some(-23.55),
            longitude: Some(-46.63),
            time_zone: Some("America/Sao_Paulo".to_string()),
            subdivision_code: None,
            subdivision_name: None,
            asn: None,
        };
        let resolver = resolver(Some(sao_paulo.clone()));
        let loc = resolver.lookup("200.1.2.3").await;
        assert_eq!(loc.country_code, "BR");
        assert_eq!(loc.latitude, sao_paulo.latitude);
        // The stub ASN resolver chain has no provider configured, so
        // enrichment fails and is swallowed rather than propagated.
        assert!(loc.asn.is_none());
    }

    #[test]
    fn test_with_asn_does_not_mutate_original() {
        let loc = GeoLocation::unknown();
        let enriched = loc.with_asn(15169);
        assert!(loc.asn.is_none());
        assert_eq!(enriched.asn, Some(15169));
    }
}
