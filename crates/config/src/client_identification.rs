//! Client identification configuration.

use serde::Deserialize;

/// Where the server reads the caller's identity and address from.
///
/// Authentication itself happens upstream; the authenticating proxy or layer is
/// expected to put the resolved identity into `identity_header`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientIdentificationConfig {
    /// Header carrying the authenticated identity.
    pub identity_header: String,
    /// Headers trusted to carry the client address, in order of preference.
    /// For comma separated lists the first entry is used.
    pub trusted_ip_headers: Vec<String>,
}

impl Default for ClientIdentificationConfig {
    fn default() -> Self {
        Self {
            identity_header: "x-user-id".to_string(),
            trusted_ip_headers: vec!["x-forwarded-for".to_string(), "x-real-ip".to_string()],
        }
    }
}
