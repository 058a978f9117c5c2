//! Caller identity carried through a request.
//!
//! The network layer sets the context for the duration of a request, so handlers can
//! admit further operations through [`RateLimitManager::admit`](crate::RateLimitManager::admit)
//! without passing the caller around.

use std::{future::Future, net::IpAddr};

use crate::key::RateLimitKey;

tokio::task_local! {
    static CLIENT_CONTEXT: ClientContext;
}

/// Who is performing an operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientContext {
    identity: Option<String>,
    ip: Option<IpAddr>,
}

impl ClientContext {
    /// Context of a caller with the given identity and address.
    pub fn new(identity: Option<String>, ip: Option<IpAddr>) -> Self {
        Self {
            identity: identity.filter(|identity| !identity.is_empty()),
            ip,
        }
    }

    /// Anonymous caller at an unknown address.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Authenticated identity, if any.
    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    /// The rate limit key scoping this caller's quotas.
    pub fn key(&self) -> RateLimitKey {
        let ip = self.ip.map(|ip| ip.to_string());
        RateLimitKey::build(self.identity(), ip.as_deref())
    }

    /// Run `future` with this context as the current one.
    pub async fn scope<F>(self, future: F) -> F::Output
    where
        F: Future,
    {
        CLIENT_CONTEXT.scope(self, future).await
    }

    /// The context of the running request, or the anonymous context outside of one.
    pub fn current() -> Self {
        CLIENT_CONTEXT.try_with(Clone::clone).unwrap_or_else(|_| {
            log::debug!("No client context in scope, admitting as anonymous");
            Self::anonymous()
        })
    }
}
