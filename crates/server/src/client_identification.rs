//! Resolves the caller's identity and address from a request.

use std::net::{IpAddr, SocketAddr};

use anyhow::Context;
use axum::extract::ConnectInfo;
use config::ClientIdentificationConfig;
use http::{HeaderMap, HeaderName, Request};
use rate_limit::ClientContext;

#[derive(Debug, Clone)]
pub(crate) struct ClientResolver {
    identity_header: HeaderName,
    trusted_ip_headers: Vec<HeaderName>,
}

impl ClientResolver {
    pub(crate) fn new(config: &ClientIdentificationConfig) -> anyhow::Result<Self> {
        let identity_header = HeaderName::try_from(config.identity_header.as_str())
            .with_context(|| format!("Invalid identity header '{}'", config.identity_header))?;

        let trusted_ip_headers = config
            .trusted_ip_headers
            .iter()
            .map(|name| HeaderName::try_from(name.as_str()).with_context(|| format!("Invalid IP header '{name}'")))
            .collect::<anyhow::Result<_>>()?;

        Ok(Self {
            identity_header,
            trusted_ip_headers,
        })
    }

    /// Identity from the identity header, address from the first trusted header that
    /// parses, else the peer address.
    pub(crate) fn resolve<B>(&self, req: &Request<B>) -> ClientContext {
        let identity = req
            .headers()
            .get(&self.identity_header)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|identity| !identity.is_empty())
            .map(str::to_string);

        let ip = self.forwarded_ip(req.headers()).or_else(|| {
            req.extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip())
        });

        ClientContext::new(identity, ip)
    }

    fn forwarded_ip(&self, headers: &HeaderMap) -> Option<IpAddr> {
        self.trusted_ip_headers.iter().find_map(|name| {
            let value = headers.get(name)?.to_str().ok()?;

            // Take the first hop of the chain
            value.split(',').next()?.trim().parse().ok()
        })
    }
}
