//! Rate limit key derivation.

use std::fmt;

const UNKNOWN_IP: &str = "unknown";

/// Scope of a quota: an identity at an address, or an address alone.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey(String);

impl RateLimitKey {
    /// Builds the key for a caller.
    ///
    /// `u:<identity>:ip:<ip>` when the identity is known, `ip:<ip>` otherwise. A
    /// missing or empty address becomes `unknown`, so anonymous callers without an
    /// address share one bucket instead of going unscoped.
    pub fn build(identity: Option<&str>, ip: Option<&str>) -> Self {
        let ip = ip.map(str::trim).filter(|ip| !ip.is_empty()).unwrap_or(UNKNOWN_IP);

        match identity.filter(|identity| !identity.is_empty()) {
            Some(identity) => Self(format!("u:{identity}:ip:{ip}")),
            None => Self(format!("ip:{ip}")),
        }
    }

    /// The key as stored, without any tier prefix.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
