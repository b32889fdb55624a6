//! Stub [`MaxMindReader`] for tests — no real `.mmdb` file involved.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Mutex;

use crate::adapters::{MaxMindError, MaxMindReader};
use crate::geo::location::GeoLocation;

/// A `MaxMindReader` backed by a fixed in-memory table, for tests that
/// need deterministic City/ASN lookups without a real database file.
#[derive(Default)]
pub struct StubMaxMindReader {
    cities: Mutex<HashMap<IpAddr, GeoLocation>>,
    asns: Mutex<HashMap<IpAddr, u32>>,
}

impl StubMaxMindReader {
    /// A reader with no entries — every lookup misses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a City record for `ip`.
    #[must_use]
    pub fn with_city(self, ip: IpAddr, location: GeoLocation) -> Self {
        self.cities
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(ip, location);
        self
    }

    /// Register an ASN record for `ip`.
    #[must_use]
    pub fn with_asn(self, ip: IpAddr, asn: u32) -> Self {
        self.asns.lock().unwrap_or_else(std::sync::PoisonError::into_inner).insert(ip, asn);
        self
    }
}

impl MaxMindReader for StubMaxMindReader {
    fn city(&self, ip: IpAddr) -> Result<GeoLocation, MaxMindError> {
        self.cities
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&ip)
            .cloned()
            .ok_or(MaxMindError::NotFound)
    }

    fn asn(&self, ip: IpAddr) -> Result<u32, MaxMindError> {
        self.asns
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&ip)
            .copied()
            .ok_or(MaxMindError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unregistered_ip_misses() {
        let reader = StubMaxMindReader::new();
        assert_eq!(reader.city("8.8.8.8".parse().unwrap()), Err(MaxMindError::NotFound));
    }

    #[test]
    fn test_registered_asn_is_returned() {
        let ip: IpAddr = "8.8.8.8".parse().unwrap();
        let reader = StubMaxMindReader::new().with_asn(ip, 15169);
        assert_eq!(reader.asn(ip), Ok(15169));
    }
}
