//! Rate limiting configuration structures.

use std::{collections::BTreeMap, time::Duration};

use duration_str::{deserialize_duration, deserialize_option_duration};
use serde::Deserialize;

use crate::{RouteConfig, Tier};

/// Rate limiting configuration for the server.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Whether rate limiting is enabled.
    pub enabled: bool,
    /// Primary storage backend. The fallback is always in process memory.
    pub storage: StorageConfig,
    /// Quota overrides, keyed by tier name. Tiers not listed keep their built-in quota.
    pub tiers: BTreeMap<Tier, TierQuota>,
    /// Path fragments used to classify requests into tiers.
    pub routes: RouteConfig,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            storage: StorageConfig::default(),
            tiers: BTreeMap::new(),
            routes: RouteConfig::default(),
        }
    }
}

/// Quota for a single tier.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TierQuota {
    /// Operations allowed per window.
    pub points: u32,
    /// Length of the window.
    #[serde(deserialize_with = "deserialize_duration")]
    pub duration: Duration,
    /// Punitive window applied once the quota is exceeded.
    #[serde(default, deserialize_with = "deserialize_option_duration")]
    pub block_duration: Option<Duration>,
    /// Namespace prepended to every key of the tier.
    #[serde(default)]
    pub key_prefix: Option<String>,
}

/// Storage backend configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Process memory only. Counters are not shared between instances.
    #[default]
    Memory,
    /// Redis, shared by every instance.
    Redis(Box<RedisConfig>),
}

/// Redis storage configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RedisConfig {
    /// Redis connection URL (redis:// or rediss:// for TLS).
    pub url: String,
    /// Connection pool configuration.
    #[serde(default)]
    pub pool: RedisPoolConfig,
    /// TLS configuration.
    pub tls: Option<RedisTlsConfig>,
    /// Key prefix for all rate limit keys.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// Upper bound for a single consume round trip, connection checkout included.
    #[serde(default = "default_response_timeout", deserialize_with = "deserialize_duration")]
    pub response_timeout: Duration,
    /// Retry policy for failed round trips.
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_key_prefix() -> String {
    "turnstile:".to_string()
}

fn default_response_timeout() -> Duration {
    Duration::from_millis(250)
}

/// Bounded retry policy for the primary store.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    /// Total number of attempts, the first one included.
    pub attempts: u32,
    /// Delay before the second attempt. Doubles for every following attempt.
    #[serde(deserialize_with = "deserialize_duration")]
    pub backoff: Duration,
    /// Cap for the delay between attempts.
    #[serde(deserialize_with = "deserialize_duration")]
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 2,
            backoff: Duration::from_millis(25),
            max_backoff: Duration::from_millis(100),
        }
    }
}

/// Redis connection pool configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RedisPoolConfig {
    /// Maximum number of connections.
    pub max_size: Option<usize>,
    /// Timeout for creating connections.
    #[serde(default, deserialize_with = "deserialize_option_duration")]
    pub timeout_create: Option<Duration>,
    /// Timeout for waiting for a connection.
    #[serde(default, deserialize_with = "deserialize_option_duration")]
    pub timeout_wait: Option<Duration>,
    /// Timeout for recycling a connection.
    #[serde(default, deserialize_with = "deserialize_option_duration")]
    pub timeout_recycle: Option<Duration>,
}

impl Default for RedisPoolConfig {
    fn default() -> Self {
        Self {
            max_size: Some(16),
            timeout_create: Some(Duration::from_millis(500)),
            timeout_wait: Some(Duration::from_millis(250)),
            timeout_recycle: Some(Duration::from_millis(250)),
        }
    }
}

/// Redis TLS configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RedisTlsConfig {
    /// Path to CA certificate file.
    pub ca_cert_path: Option<String>,
    /// Path to client certificate file (for mutual TLS).
    pub client_cert_path: Option<String>,
    /// Path to client key file (for mutual TLS).
    pub client_key_path: Option<String>,
}
