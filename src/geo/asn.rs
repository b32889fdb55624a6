//! ASN resolution pipeline.
//!
//! Ordered pipeline: in-process cache → durable store → external
//! resolver chain (local GeoIP2 ASN database, reverse-DNS against
//! `origin.asn.cymru.com`, WHOIS over TCP/43), each external stage
//! short-circuiting on first success. The chain is wrapped by a
//! token-bucket rate limiter, bounded retry with exponential backoff,
//! and an optional circuit breaker — composed once at construction
//! rather than through inheritance, so the ordering lives in
//! configuration.

use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use regex::Regex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::adapters::{AsnEntryStore, MaxMindReader};
use crate::cache::{names, CacheLayer};
use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerError};
use crate::config::AsnConfig;
use crate::error::{Result, RiskError};
use crate::ratelimit::{DynRateLimiter, RateLimiter};

/// Resolves IP addresses to ASNs through the cache → store → external
/// pipeline.
pub struct AsnResolver {
    cache: Arc<CacheLayer>,
    store: Arc<dyn AsnEntryStore>,
    maxmind: Arc<dyn MaxMindReader>,
    rate_limiter: Arc<dyn DynRateLimiter>,
    circuit_breaker: CircuitBreaker,
    config: AsnConfig,
}

impl AsnResolver {
    /// Build a resolver from its collaborators.
    #[must_use]
    pub fn new(
        cache: Arc<CacheLayer>,
        store: Arc<dyn AsnEntryStore>,
        maxmind: Arc<dyn MaxMindReader>,
        rate_limiter: impl RateLimiter + 'static,
        circuit_breaker: CircuitBreaker,
        config: AsnConfig,
    ) -> Self {
        Self {
            cache,
            store,
            maxmind,
            rate_limiter: Arc::new(rate_limiter),
            circuit_breaker,
            config,
        }
    }

    /// Resolve `ip` to an ASN via the cache → store → external chain.
    ///
    /// # Errors
    ///
    /// Returns [`RiskError::ExternalUnavailable`] when every stage of the
    /// external chain is exhausted (rate-limited, circuit open, or all
    /// three lookups failed). Failures are never cached — the next call
    /// retries from scratch.
    pub async fn lookup_asn(&self, ip: &str) -> Result<u32> {
        let cache_ttl = Duration::from_secs(3600);
        let store = Arc::clone(&self.store);
        let ip_owned = ip.to_string();

        let cached_or_stored = self
            .cache
            .get(names::ASN, ip, cache_ttl, move || {
                let store = Arc::clone(&store);
                let ip = ip_owned.clone();
                async move {
                    if let Some((asn, _)) = store
                        .find_by_ip(&ip)
                        .await
                        .map_err(|e| RiskError::ExternalUnavailable(format!("asn entry store: {e}")))?
                    {
                        return Ok(asn);
                    }
                    self_lookup_placeholder(&ip)
                }
            })
            .await;

        match cached_or_stored {
            Ok(asn) => Ok(asn),
            Err(_) => self.lookup_via_external_chain(ip).await,
        }
    }

    async fn lookup_via_external_chain(&self, ip: &str) -> Result<u32> {
        let decision = self
            .rate_limiter
            .try_acquire("asn_external", self.config.external_rate_per_sec, Duration::from_secs(1))
            .await?;
        if !decision.allowed {
            metrics::counter!("asn_external_rate_limited").increment(1);
            return Err(RiskError::ExternalUnavailable("external ASN rate limit exceeded".to_string()));
        }

        let parsed: IpAddr = ip
            .parse()
            .map_err(|_| RiskError::BadInput(format!("invalid IP for ASN lookup: {ip}")))?;

        let maxmind = Arc::clone(&self.maxmind);
        let config = self.config.clone();
        let ip_for_breaker = ip.to_string();

        let result = self
            .circuit_breaker
            .call(move || {
                let maxmind = Arc::clone(&maxmind);
                let config = config.clone();
                let ip = ip_for_breaker.clone();
                async move { resolve_with_retry(&maxmind, parsed, &ip, &config).await }
            })
            .await;

        let asn = match result {
            Ok(asn) => asn,
            Err(CircuitBreakerError::Open) => {
                metrics::counter!("asn_external_circuit_open").increment(1);
                return Err(RiskError::ExternalUnavailable("ASN resolver circuit breaker open".to_string()));
            }
            Err(CircuitBreakerError::Inner(err)) => return Err(err),
        };

        self.store
            .insert_if_absent(ip, asn, SystemTime::now())
            .await
            .map_err(|e| RiskError::ExternalUnavailable(format!("asn entry store: {e}")))?;
        self.cache.put(names::ASN, ip, asn, Duration::from_secs(3600));
        metrics::counter!("asn_external_resolved").increment(1);
        Ok(asn)
    }

    /// Delete stale `AsnEntry` rows. Intended to be invoked by a
    /// scheduled task on `config.cleanup_cron`; the crate only performs
    /// the deletion, not the scheduling.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn sweep_stale(&self) -> Result<usize> {
        let threshold = SystemTime::now() - Duration::from_secs(self.config.stale_threshold_secs);
        let removed = self
            .store
            .delete_where_older_than(threshold)
            .await
            .map_err(|e| RiskError::ExternalUnavailable(format!("asn entry store: {e}")))?;
        tracing::info!(removed, "asn stale sweep complete");
        Ok(removed)
    }
}

/// The cache loader above needs a marker to distinguish "store miss,
/// fall through to external chain" from "store reachable but genuinely
/// has no row" — both return `Ok(None)`/absence, not an error, so we
/// surface a sentinel error the outer `or_else` recognizes and replaces
/// with the external-chain result.
fn self_lookup_placeholder(ip: &str) -> Result<u32> {
    Err(RiskError::ExternalUnavailable(format!("no cached or stored ASN for {ip}")))
}

async fn resolve_with_retry(
    maxmind: &Arc<dyn MaxMindReader>,
    ip: IpAddr,
    ip_str: &str,
    config: &AsnConfig,
) -> Result<u32> {
    const MAX_ATTEMPTS: u32 = 3;
    let mut last_err = RiskError::ExternalUnavailable("no external ASN stages attempted".to_string());

    for attempt in 0..MAX_ATTEMPTS {
        if attempt > 0 {
            let backoff = Duration::from_millis(100 * 2u64.pow(attempt - 1));
            tokio::time::sleep(backoff).await;
        }

        match resolve_chain_once(maxmind, ip, ip_str, config).await {
            Ok(asn) => return Ok(asn),
            Err(err) => last_err = err,
        }
    }

    Err(last_err)
}

async fn resolve_chain_once(
    maxmind: &Arc<dyn MaxMindReader>,
    ip: IpAddr,
    ip_str: &str,
    config: &AsnConfig,
) -> Result<u32> {
    let maxmind_for_blocking = Arc::clone(maxmind);
    let db_lookup = tokio::task::spawn_blocking(move || maxmind_for_blocking.asn(ip));
    if let Ok(Ok(Ok(asn))) = timeout(Duration::from_millis(config.db_timeout_ms), db_lookup).await {
        metrics::counter!("asn_stage_resolved", "stage" => "geoip2").increment(1);
        return Ok(asn);
    }

    if let Ok(Ok(asn)) = timeout(Duration::from_millis(config.dns_timeout_ms), reverse_dns_asn(ip_str)).await {
        metrics::counter!("asn_stage_resolved", "stage" => "dns").increment(1);
        return Ok(asn);
    }

    if let Ok(Ok(asn)) = timeout(
        Duration::from_millis(config.whois_timeout_ms),
        whois_asn(ip_str, &config.whois_server),
    )
    .await
    {
        metrics::counter!("asn_stage_resolved", "stage" => "whois").increment(1);
        return Ok(asn);
    }

    Err(RiskError::ExternalUnavailable(format!("all ASN stages failed for {ip_str}")))
}

/// Reverse-DNS lookup in the `origin.asn.cymru.com` zone. The TXT
/// response has the shape `"ASN | prefix | country | registry | date"`;
/// only the first field is taken.
async fn reverse_dns_asn(ip: &str) -> Result<u32> {
    let parsed: IpAddr = ip
        .parse()
        .map_err(|_| RiskError::BadInput(format!("invalid IP: {ip}")))?;
    let query_name = cymru_query_name(parsed);

    let resolver = hickory_resolver::TokioAsyncResolver::tokio_from_system_conf()
        .map_err(|e| RiskError::ExternalUnavailable(format!("dns resolver init: {e}")))?;
    let response = resolver
        .txt_lookup(query_name)
        .await
        .map_err(|e| RiskError::ExternalUnavailable(format!("cymru txt lookup: {e}")))?;

    for record in response.iter() {
        let text = record.to_string();
        if let Some(first_field) = text.split('|').next() {
            if let Ok(asn) = first_field.trim().parse::<u32>() {
                return Ok(asn);
            }
        }
    }

    Err(RiskError::ExternalUnavailable("cymru response had no parseable ASN field".to_string()))
}

fn cymru_query_name(ip: IpAddr) -> String {
    match ip {
        IpAddr::V4(v4) => {
            let octets = v4.octets();
            format!(
                "{}.{}.{}.{}.origin.asn.cymru.com.",
                octets[3], octets[2], octets[1], octets[0]
            )
        }
        IpAddr::V6(v6) => {
            let nibbles: String = v6
                .octets()
                .iter()
                .rev()
                .flat_map(|byte| vec![byte & 0x0f, byte >> 4])
                .map(|nibble| format!("{nibble:x}."))
                .collect();
            format!("{nibbles}origin6.asn.cymru.com.")
        }
    }
}

/// WHOIS over TCP/43: scan the response for a line matching
/// `/origin:\s*AS(\d+)/i`.
async fn whois_asn(ip: &str, server: &str) -> Result<u32> {
    let mut stream = TcpStream::connect((server, 43))
        .await
        .map_err(|e| RiskError::ExternalUnavailable(format!("whois connect: {e}")))?;

    stream
        .write_all(format!("{ip}\r\n").as_bytes())
        .await
        .map_err(|e| RiskError::ExternalUnavailable(format!("whois write: {e}")))?;

    let mut response = String::new();
    stream
        .read_to_string(&mut response)
        .await
        .map_err(|e| RiskError::ExternalUnavailable(format!("whois read: {e}")))?;

    let re = Regex::new(r"(?i)origin:\s*AS(\d+)")
        .map_err(|e| RiskError::Internal(format!("invalid whois regex: {e}")))?;
    re.captures(&response)
        .and_then(|caps| caps.get(1))
        .and_then(|m| u32::from_str(m.as_str()).ok())
        .ok_or_else(|| RiskError::ExternalUnavailable("whois response had no origin ASN".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::asn_entry_store::InMemoryAsnEntryStore;
    use crate::ratelimit::SlidingWindowRateLimiter;

    struct StubMaxMind {
        asn: Option<u32>,
    }

    impl MaxMindReader for StubMaxMind {
        fn city(&self, _ip: IpAddr) -> Result<crate::geo::location::GeoLocation, crate::adapters::MaxMindError> {
            Err(crate::adapters::MaxMindError::NotFound)
        }

        fn asn(&self, _ip: IpAddr) -> Result<u32, crate::adapters::MaxMindError> {
            self.asn.ok_or(crate::adapters::MaxMindError::NotFound)
        }
    }

    fn resolver(asn: Option<u32>) -> AsnResolver {
        AsnResolver::new(
            Arc::new(CacheLayer::new()),
            Arc::new(InMemoryAsnEntryStore::new()),
            Arc::new(StubMaxMind { asn }),
            SlidingWindowRateLimiter::in_memory(),
            CircuitBreaker::new(crate::circuit_breaker::CircuitBreakerConfig::default()),
            AsnConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_resolves_via_local_database_stage() {
        let resolver = resolver(Some(15169));
        let asn = resolver.lookup_asn("8.8.8.8").await.expect("resolves via geoip2 stage");
        assert_eq!(asn, 15169);
    }

    #[tokio::test]
    async fn test_second_call_hits_cache_without_external_chain() {
        let resolver = resolver(Some(15169));
        let first = resolver.lookup_asn("8.8.8.8").await.expect("first lookup succeeds");
        assert_eq!(first, 15169);
        let second = resolver.lookup_asn("8.8.8.8").await.expect("second lookup hits cache");
        assert_eq!(second, 15169);
    }

    #[tokio::test]
    async fn test_invalid_ip_does_not_panic_and_errors() {
        let resolver = resolver(None);
        let result = resolver.lookup_asn("not-an-ip").await;
        assert!(result.is_err());
    }

    #[test]
    fn test_cymru_query_name_reverses_octets() {
        let ip: IpAddr = "8.8.8.8".parse().expect("valid IPv4");
        assert_eq!(cymru_query_name(ip), "8.8.8.8.origin.asn.cymru.com.");
    }
}
