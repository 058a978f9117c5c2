//! Metrics export settings.

use std::{collections::BTreeMap, time::Duration};

use duration_str::deserialize_duration;
use serde::Deserialize;
use url::Url;

/// Telemetry configuration for admission metrics.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct TelemetryConfig {
    /// Service name reported with every metric. Defaults to `turnstile`.
    service_name: Option<String>,
    /// Extra resource attributes.
    resource_attributes: BTreeMap<String, String>,
    /// OTLP push exporter.
    otlp: OtlpConfig,
}

impl TelemetryConfig {
    /// The configured service name.
    pub fn service_name(&self) -> Option<&str> {
        self.service_name.as_deref()
    }

    /// Extra resource attributes.
    pub fn resource_attributes(&self) -> &BTreeMap<String, String> {
        &self.resource_attributes
    }

    /// The OTLP exporter, if one is enabled.
    pub fn metrics_otlp_config(&self) -> Option<&OtlpConfig> {
        Some(&self.otlp).filter(|otlp| otlp.enabled)
    }
}

/// OTLP metric exporter.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OtlpConfig {
    /// Whether metrics are pushed at all.
    pub enabled: bool,
    /// Collector endpoint. The collector default port of the protocol when unset.
    pub endpoint: Option<Url>,
    /// Wire protocol.
    pub protocol: OtlpProtocol,
    /// Timeout of one export call.
    #[serde(deserialize_with = "deserialize_duration")]
    pub timeout: Duration,
    /// Delay between two exports.
    #[serde(deserialize_with = "deserialize_duration")]
    pub export_interval: Duration,
}

impl OtlpConfig {
    /// The endpoint metrics are pushed to.
    pub fn endpoint(&self) -> String {
        match (&self.endpoint, self.protocol) {
            (Some(url), _) => url.to_string(),
            (None, OtlpProtocol::Grpc) => "http://localhost:4317".to_string(),
            (None, OtlpProtocol::Http) => "http://localhost:4318/v1/metrics".to_string(),
        }
    }
}

impl Default for OtlpConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: None,
            protocol: OtlpProtocol::default(),
            timeout: Duration::from_secs(10),
            export_interval: Duration::from_secs(5),
        }
    }
}

/// OTLP wire protocol.
#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OtlpProtocol {
    /// gRPC.
    #[default]
    Grpc,
    /// HTTP with protobuf payloads.
    Http,
}
