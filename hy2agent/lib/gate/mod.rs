//! Access control for the agent API.
//!
//! Every request is evaluated against the [`AccessPolicy`] before any handler runs. The checks
//! run in a fixed order and the first denial wins:
//!
//! 1. A source IP on the blacklist is rejected.
//! 2. If any whitelist entry exists, the source IP or the `Host` header must match one of them.
//!    An empty whitelist admits every origin (fail-open).
//! 3. The `X-API-Key` header must be present and equal to the stored key.
//!
//! Domain entries match the host exactly or, as `*.suffix`, any host that ends in `.suffix`.
//! Matching is case-sensitive and never resolves names.

use std::{fmt, net::IpAddr};

use subtle::ConstantTimeEq;

use crate::config::AccessPolicy;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The header that carries the shared API key.
pub const API_KEY_HEADER: &str = "x-api-key";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The origin and credentials of an inbound request.
#[derive(Debug, Clone, Default)]
pub struct AccessRequest<'a> {
    /// The peer address of the connection.
    pub source_ip: Option<IpAddr>,

    /// The `Host` header, possibly with a port.
    pub host: Option<&'a str>,

    /// The claimed API key.
    pub api_key: Option<&'a str>,
}

/// The outcome of evaluating a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The request may proceed.
    Allow,

    /// The request is rejected.
    Deny(DenyReason),
}

/// Why a request was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// The source IP is blacklisted.
    Blacklisted,

    /// A whitelist exists and the origin is not on it.
    NotWhitelisted,

    /// No API key was presented.
    MissingKey,

    /// The presented API key does not match.
    InvalidKey,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl DenyReason {
    /// Returns true for credential failures, as opposed to origin-based denials.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, DenyReason::MissingKey | DenyReason::InvalidKey)
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Evaluates `request` against `policy`.
pub fn evaluate(policy: &AccessPolicy, request: &AccessRequest<'_>) -> Decision {
    let source_ip = request.source_ip.map(|ip| ip.to_canonical().to_string());

    if let Some(ip) = &source_ip {
        if policy.get_ip_blacklist().contains(ip) {
            return Decision::Deny(DenyReason::Blacklisted);
        }
    }

    if !policy.whitelist_is_empty() && !is_whitelisted(policy, source_ip.as_deref(), request.host)
    {
        return Decision::Deny(DenyReason::NotWhitelisted);
    }

    match request.api_key {
        None | Some("") => Decision::Deny(DenyReason::MissingKey),
        Some(claimed) if keys_match(claimed, policy.get_api_key()) => Decision::Allow,
        Some(_) => Decision::Deny(DenyReason::InvalidKey),
    }
}

/// Returns true if `host` matches the domain whitelist entry `pattern`.
pub fn domain_matches(pattern: &str, host: &str) -> bool {
    match pattern.strip_prefix("*.") {
        Some(suffix) => host
            .strip_suffix(suffix)
            .is_some_and(|head| head.len() > 1 && head.ends_with('.')),
        None => pattern == host,
    }
}

/// Strips an optional port from a `Host` header value.
pub fn strip_port(host: &str) -> &str {
    if let Some(rest) = host.strip_prefix('[') {
        // [v6]:port
        return rest.split_once(']').map_or(host, |(addr, _)| addr);
    }

    match host.rsplit_once(':') {
        // A bare IPv6 address has more than one colon and no port
        Some((name, port)) if !name.contains(':') && port.chars().all(|c| c.is_ascii_digit()) => {
            name
        }
        _ => host,
    }
}

fn is_whitelisted(policy: &AccessPolicy, source_ip: Option<&str>, host: Option<&str>) -> bool {
    if let Some(ip) = source_ip {
        if policy.get_ip_whitelist().contains(ip) {
            return true;
        }
    }

    let Some(host) = host.map(strip_port).filter(|h| !h.is_empty()) else {
        return false;
    };

    policy
        .get_domain_whitelist()
        .iter()
        .any(|pattern| domain_matches(pattern, host))
}

fn keys_match(claimed: &str, stored: &str) -> bool {
    bool::from(claimed.as_bytes().ct_eq(stored.as_bytes()))
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            DenyReason::Blacklisted => "access denied: source is blacklisted",
            DenyReason::NotWhitelisted => "access denied: source is not in whitelist",
            DenyReason::MissingKey => "no API key provided",
            DenyReason::InvalidKey => "invalid API key",
        };

        write!(f, "{}", message)
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "0123456789abcdef";

    fn request<'a>(ip: &str, host: Option<&'a str>, key: Option<&'a str>) -> AccessRequest<'a> {
        AccessRequest {
            source_ip: Some(ip.parse().unwrap()),
            host,
            api_key: key,
        }
    }

    #[test]
    fn test_non_whitelisted_ip_is_denied() {
        let policy = AccessPolicy::new(KEY).with_ip_whitelist(["10.0.0.1", "10.0.0.2"]);

        for ip in ["10.0.0.3", "192.168.1.1", "::1"] {
            assert_eq!(
                evaluate(&policy, &request(ip, None, Some(KEY))),
                Decision::Deny(DenyReason::NotWhitelisted),
                "{ip} should be denied"
            );
        }

        assert_eq!(
            evaluate(&policy, &request("10.0.0.2", None, Some(KEY))),
            Decision::Allow
        );
    }

    #[test]
    fn test_blacklist_precedes_whitelist() {
        let policy = AccessPolicy::new(KEY)
            .with_ip_whitelist(["10.0.0.1"])
            .with_ip_blacklist(["10.0.0.1"]);

        assert_eq!(
            evaluate(&policy, &request("10.0.0.1", None, Some(KEY))),
            Decision::Deny(DenyReason::Blacklisted)
        );

        // Also when the domain whitelist would admit the host
        let policy = AccessPolicy::new(KEY)
            .with_domain_whitelist(["agent.example.com"])
            .with_ip_blacklist(["10.0.0.1"]);

        assert_eq!(
            evaluate(
                &policy,
                &request("10.0.0.1", Some("agent.example.com"), Some(KEY))
            ),
            Decision::Deny(DenyReason::Blacklisted)
        );
    }

    #[test]
    fn test_empty_whitelist_admits_everyone() {
        let policy = AccessPolicy::new(KEY);

        assert_eq!(
            evaluate(&policy, &request("203.0.113.9", None, Some(KEY))),
            Decision::Allow
        );
    }

    #[test]
    fn test_origin_checks_run_before_key_check() {
        let policy = AccessPolicy::new(KEY).with_ip_whitelist(["10.0.0.1"]);

        assert_eq!(
            evaluate(&policy, &request("10.0.0.9", None, None)),
            Decision::Deny(DenyReason::NotWhitelisted)
        );
    }

    #[test]
    fn test_api_key_required() {
        let policy = AccessPolicy::new(KEY);

        assert_eq!(
            evaluate(&policy, &request("10.0.0.1", None, None)),
            Decision::Deny(DenyReason::MissingKey)
        );
        assert_eq!(
            evaluate(&policy, &request("10.0.0.1", None, Some(""))),
            Decision::Deny(DenyReason::MissingKey)
        );
        assert_eq!(
            evaluate(&policy, &request("10.0.0.1", None, Some("0123456789abcdeF"))),
            Decision::Deny(DenyReason::InvalidKey)
        );
        assert_eq!(
            evaluate(&policy, &request("10.0.0.1", None, Some("0123"))),
            Decision::Deny(DenyReason::InvalidKey)
        );
    }

    #[test]
    fn test_domain_whitelist_admits_matching_host() {
        let policy = AccessPolicy::new(KEY).with_domain_whitelist(["*.example.com"]);

        assert_eq!(
            evaluate(
                &policy,
                &request("10.0.0.1", Some("panel.example.com:8443"), Some(KEY))
            ),
            Decision::Allow
        );
        assert_eq!(
            evaluate(&policy, &request("10.0.0.1", Some("example.com"), Some(KEY))),
            Decision::Deny(DenyReason::NotWhitelisted)
        );
        assert_eq!(
            evaluate(&policy, &request("10.0.0.1", None, Some(KEY))),
            Decision::Deny(DenyReason::NotWhitelisted)
        );
    }

    #[test]
    fn test_wildcard_domain_matching() {
        assert!(domain_matches("*.example.com", "a.example.com"));
        assert!(domain_matches("*.example.com", "foo.bar.example.com"));
        assert!(!domain_matches("*.example.com", "example.com"));
        assert!(!domain_matches("*.example.com", "notexample.com"));
        assert!(!domain_matches("*.example.com", ".example.com"));
        assert!(!domain_matches("*.example.com", "a.Example.com"));

        assert!(domain_matches("agent.example.com", "agent.example.com"));
        assert!(!domain_matches("agent.example.com", "x.agent.example.com"));
    }

    #[test]
    fn test_ipv4_mapped_source_matches_v4_entry() {
        let policy = AccessPolicy::new(KEY).with_ip_whitelist(["10.0.0.1"]);

        assert_eq!(
            evaluate(&policy, &request("::ffff:10.0.0.1", None, Some(KEY))),
            Decision::Allow
        );
    }

    #[test]
    fn test_strip_port() {
        assert_eq!(strip_port("example.com"), "example.com");
        assert_eq!(strip_port("example.com:8080"), "example.com");
        assert_eq!(strip_port("[::1]:8080"), "::1");
        assert_eq!(strip_port("::1"), "::1");
    }
}
