//! Stable fingerprint generation.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// The fixed priority list of headers scanned for the client IP.
/// `X-Forwarded-For` is handled specially: only its first hop is taken
/// (see [`FingerprintRequest::client_ip`]).
const IP_HEADER_PRIORITY: &[&str] = &["x-forwarded-for", "x-real-ip", "cf-connecting-ip", "true-client-ip"];

/// The request signals [`generate`] collects, independent of whatever
/// HTTP framework sits above this crate. The embedding application's
/// HTTP layer is responsible for populating this from the actual
/// request.
#[derive(Debug, Clone, Default)]
pub struct FingerprintRequest {
    /// Lower-cased header name → raw value, exactly as received.
    /// [`generate`] looks up `user-agent`, `accept-language`, `accept`,
    /// `accept-encoding`, `sec-fetch-site`, `sec-fetch-mode`,
    /// `sec-ch-ua-platform`, and the IP headers by key from this map.
    pub headers: std::collections::BTreeMap<String, String>,
    /// Transport-layer peer address, used when no IP header yields a
    /// usable value (fallback to the transport peer address).
    pub peer_addr: Option<String>,
}

impl FingerprintRequest {
    /// Look up a header case-insensitively (stored lower-cased already;
    /// this normalizes the query side too).
    fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str).filter(|v| is_usable(v))
    }

    /// Resolve the client IP by scanning [`IP_HEADER_PRIORITY`] in order,
    /// taking the first hop of `X-Forwarded-For`, then falling back to
    /// [`Self::peer_addr`].
    #[must_use]
    pub fn client_ip(&self) -> Option<String> {
        for header in IP_HEADER_PRIORITY {
            if let Some(value) = self.header(header) {
                let candidate = if *header == "x-forwarded-for" {
                    value.split(',').next().unwrap_or(value).trim()
                } else {
                    value.trim()
                };
                if is_usable(candidate) {
                    return Some(candidate.to_string());
                }
            }
        }
        self.peer_addr.as_deref().filter(|v| is_usable(v)).map(str::to_string)
    }
}

fn is_usable(value: &str) -> bool {
    let trimmed = value.trim();
    !trimmed.is_empty() && !trimmed.eq_ignore_ascii_case("unknown")
}

/// Coarse client platform, derived from a substring scan of the
/// `User-Agent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// User-Agent contains "windows".
    Windows,
    /// User-Agent contains "mac".
    MacOs,
    /// User-Agent contains "linux".
    Linux,
    /// User-Agent contains "android".
    Android,
    /// User-Agent contains "iphone", "ipad", or "ios".
    Ios,
    /// None of the above matched.
    Other,
}

impl Platform {
    /// Classify a `User-Agent` string.
    #[must_use]
    pub fn classify(user_agent: &str) -> Self {
        let ua = user_agent.to_ascii_lowercase();
        if ua.contains("windows") {
            Self::Windows
        } else if ua.contains("mac") {
            Self::MacOs
        } else if ua.contains("android") {
            Self::Android
        } else if ua.contains("iphone") || ua.contains("ipad") || ua.contains("ios") {
            Self::Ios
        } else if ua.contains("linux") {
            Self::Linux
        } else {
            Self::Other
        }
    }

    /// Stable string form used as a fingerprint signal value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Windows => "Windows",
            Self::MacOs => "macOS",
            Self::Linux => "Linux",
            Self::Android => "Android",
            Self::Ios => "iOS",
            Self::Other => "Other",
        }
    }
}

/// Generate the stable device fingerprint for a request.
///
/// Collects client IP, User-Agent, Accept-Language, derived `Platform`,
/// Accept, Accept-Encoding, Sec-Fetch-Site, Sec-Fetch-Mode,
/// Sec-Ch-Ua-Platform; drops blank values; sorts the remaining
/// `key:value` pairs by key; joins with `|`; appends `salt`; hashes with
/// SHA-256; encodes the digest URL-safe base64 without padding.
///
/// Deterministic: identical request signals always produce identical
/// output. If no signals were collected at all, returns `"fallback_" +
/// random UUID`, which is intentionally never stable and never matches
/// a stored record.
#[must_use]
pub fn generate(req: &FingerprintRequest, salt: &str) -> String {
    let mut signals: Vec<(&str, String)> = Vec::new();

    if let Some(ip) = req.client_ip() {
        signals.push(("ip", ip));
    }
    if let Some(ua) = req.header("user-agent") {
        signals.push(("user_agent", ua.to_string()));
        signals.push(("platform", Platform::classify(ua).as_str().to_string()));
    }
    for header in [
        "accept-language",
        "accept",
        "accept-encoding",
        "sec-fetch-site",
        "sec-fetch-mode",
        "sec-ch-ua-platform",
    ] {
        if let Some(value) = req.header(header) {
            signals.push((header, value.to_string()));
        }
    }

    if signals.is_empty() {
        return format!("fallback_{}", Uuid::new_v4());
    }

    signals.sort_by(|a, b| a.0.cmp(b.0));
    let mut joined = signals
        .into_iter()
        .map(|(k, v)| format!("{k}:{v}"))
        .collect::<Vec<_>>()
        .join("|");
    joined.push_str(salt);

    let digest = Sha256::digest(joined.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(pairs: &[(&str, &str)], ip: Option<&str>) -> FingerprintRequest {
        let mut headers = std::collections::BTreeMap::new();
        for (k, v) in pairs {
            headers.insert((*k).to_string(), (*v).to_string());
        }
        FingerprintRequest {
            headers,
            peer_addr: ip.map(str::to_string),
        }
    }

    #[test]
    fn test_identical_signals_produce_identical_fingerprint() {
        let request = req(
            &[
                ("user-agent", "Mozilla/5.0 (Windows NT 10.0)"),
                ("accept-language", "en-US"),
                ("accept", "*/*"),
            ],
            Some("203.0.113.7"),
        );
        let first = generate(&request, "S");
        let second = generate(&request, "S");
        assert_eq!(first, second, "identical signals must produce byte-exact output");
    }

    #[test]
    fn test_differing_non_collected_headers_do_not_change_fingerprint() {
        let mut a = req(&[("user-agent", "UA"), ("accept-language", "en-US")], Some("1.2.3.4"));
        let mut b = a.clone();
        a.headers.insert("x-request-id".to_string(), "abc".to_string());
        b.headers.insert("x-request-id".to_string(), "xyz".to_string());
        assert_eq!(generate(&a, "salt"), generate(&b, "salt"));
    }

    #[test]
    fn test_no_signals_yields_random_fallback() {
        let empty = FingerprintRequest::default();
        let a = generate(&empty, "salt");
        let b = generate(&empty, "salt");
        assert!(a.starts_with("fallback_"));
        assert!(b.starts_with("fallback_"));
        assert_ne!(a, b, "fallback must not be stable/matchable");
    }

    #[test]
    fn test_x_forwarded_for_takes_first_hop() {
        let request = req(&[("x-forwarded-for", "9.9.9.9, 10.0.0.1")], None);
        assert_eq!(request.client_ip().as_deref(), Some("9.9.9.9"));
    }

    #[test]
    fn test_unknown_header_value_is_treated_as_blank() {
        let request = req(&[("x-forwarded-for", "unknown")], Some("5.5.5.5"));
        assert_eq!(request.client_ip().as_deref(), Some("5.5.5.5"));
    }

    #[test]
    fn test_platform_classification() {
        assert_eq!(Platform::classify("Mozilla Windows NT"), Platform::Windows);
        assert_eq!(Platform::classify("Macintosh; Intel Mac OS X"), Platform::MacOs);
        assert_eq!(Platform::classify("X11; Linux x86_64"), Platform::Linux);
        assert_eq!(Platform::classify("Android 13"), Platform::Android);
        assert_eq!(Platform::classify("iPhone OS 17"), Platform::Ios);
        assert_eq!(Platform::classify("SomeBot/1.0"), Platform::Other);
    }

    #[test]
    fn test_salt_changes_the_digest() {
        let request = req(&[("user-agent", "UA")], Some("1.2.3.4"));
        assert_ne!(generate(&request, "salt-a"), generate(&request, "salt-b"));
    }
}
