//! Turnstile configuration structures to map the turnstile.toml configuration.

#![deny(missing_docs)]

mod client_identification;
mod loader;
mod rate_limit;
mod routes;
mod telemetry;
mod tier;

use std::{borrow::Cow, net::SocketAddr, path::Path};

pub use client_identification::ClientIdentificationConfig;
pub use rate_limit::*;
pub use routes::RouteConfig;
pub use telemetry::{OtlpConfig, OtlpProtocol, TelemetryConfig};
pub use tier::{Tier, UnknownTier};

use serde::Deserialize;

/// Main configuration structure for the Turnstile application.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// HTTP server configuration settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Admission control settings.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// Metrics export settings.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl Config {
    /// Load configuration from a file path.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
        loader::load(path)
    }

    /// Validates quota and storage values that serde cannot check on its own.
    pub fn validate(&self) -> anyhow::Result<Vec<String>> {
        loader::validate(self)
    }
}

/// HTTP server configuration settings.
#[derive(Default, Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// The socket address the server should listen on.
    pub listen_address: Option<SocketAddr>,
    /// Health endpoint configuration.
    #[serde(default)]
    pub health: HealthConfig,
    /// Forward-auth admission endpoint configuration.
    #[serde(default)]
    pub admission: AdmissionEndpointConfig,
    /// How to resolve the caller's identity and address.
    #[serde(default)]
    pub client_identification: ClientIdentificationConfig,
}

/// Health endpoint configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HealthConfig {
    /// Whether the health endpoint is enabled.
    pub enabled: bool,
    /// The path for the health endpoint.
    pub path: Cow<'static, str>,
}

impl Default for HealthConfig {
    fn default() -> Self {
        HealthConfig {
            enabled: true,
            path: Cow::Borrowed("/health"),
        }
    }
}

/// Forward-auth admission endpoint.
///
/// A reverse proxy describes the original request in `X-Forwarded-Method` and
/// `X-Forwarded-Uri` and gets back an admission decision.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AdmissionEndpointConfig {
    /// Whether the endpoint is exposed.
    pub enabled: bool,
    /// The path of the endpoint.
    pub path: Cow<'static, str>,
}

impl Default for AdmissionEndpointConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: Cow::Borrowed("/admission"),
        }
    }
}
