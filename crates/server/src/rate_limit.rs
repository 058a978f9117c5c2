//! Network adapter: admits every request through the rate limit manager.

use std::{
    fmt::Display,
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use axum::body::Body;
use config::ClientIdentificationConfig;
use http::{Request, Response};
use rate_limit::{Operation, RateLimitManager};
use tower::Layer;

use crate::{client_identification::ClientResolver, response};

/// Tower layer classifying each request into a tier and consuming one point of it.
///
/// Admitted requests are forwarded with `X-RateLimit-*` headers added to the response,
/// rejected ones are answered with 429. Handlers behind the layer find the manager in
/// the request extensions, and [`RateLimitManager::admit`] inside them charges the
/// same caller.
#[derive(Clone)]
pub struct RateLimitLayer {
    manager: Arc<RateLimitManager>,
    resolver: Arc<ClientResolver>,
}

impl RateLimitLayer {
    /// Create the layer. Fails if the configured header names are invalid.
    pub fn new(manager: Arc<RateLimitManager>, identification: &ClientIdentificationConfig) -> anyhow::Result<Self> {
        Ok(Self {
            manager,
            resolver: Arc::new(ClientResolver::new(identification)?),
        })
    }
}

impl<Service> Layer<Service> for RateLimitLayer
where
    Service: Send + Clone,
{
    type Service = RateLimitService<Service>;

    fn layer(&self, next: Service) -> Self::Service {
        RateLimitService {
            next,
            manager: self.manager.clone(),
            resolver: self.resolver.clone(),
        }
    }
}

/// Service produced by [`RateLimitLayer`].
#[derive(Clone)]
pub struct RateLimitService<Service> {
    next: Service,
    manager: Arc<RateLimitManager>,
    resolver: Arc<ClientResolver>,
}

impl<Service, ReqBody> tower::Service<Request<ReqBody>> for RateLimitService<Service>
where
    Service: tower::Service<Request<ReqBody>, Response = Response<Body>> + Send + Clone + 'static,
    Service::Future: Send,
    Service::Error: Display + 'static,
    ReqBody: http_body::Body + Send + 'static,
{
    type Response = Response<Body>;
    type Error = Service::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response<Body>, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.next.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        let mut next = self.next.clone();
        let manager = self.manager.clone();
        let resolver = self.resolver.clone();

        Box::pin(async move {
            let context = resolver.resolve(&req);

            if !manager.is_enabled() {
                let tier = manager.classify(&Operation::new(req.method(), req.uri()));

                req.extensions_mut().insert(tier);
                req.extensions_mut().insert(manager);

                return context.scope(next.call(req)).await;
            }

            let (tier, verdict) = {
                let operation = Operation::new(req.method(), req.uri());
                manager.check_operation(&operation, &context).await
            };

            let admission = match verdict.into_result() {
                Ok(admission) => admission,
                Err(exceeded) => {
                    log::debug!(
                        "Rejected {} {} on tier {tier} for '{}'",
                        req.method(),
                        req.uri().path(),
                        context.key()
                    );

                    return Ok(response::rejection(&exceeded));
                }
            };

            req.extensions_mut().insert(tier);
            req.extensions_mut().insert(manager);

            let mut response = context.scope(next.call(req)).await?;
            response::insert_admission_headers(response.headers_mut(), &admission);

            Ok(response)
        })
    }
}
