//! Turnstile server library.
//!
//! Serves the admission controller for the binary and the integration tests, and
//! exposes [`RateLimitLayer`] for services embedding it in their own router.

#![deny(missing_docs)]

mod admission;
mod client_identification;
mod health;
mod rate_limit;
mod response;

use std::{net::SocketAddr, sync::Arc};

use ::rate_limit::RateLimitManager;
use admission::AdmissionState;
use anyhow::anyhow;
use axum::{Router, routing::get};
use client_identification::ClientResolver;
use config::Config;
use tokio::net::TcpListener;

pub use self::rate_limit::{RateLimitLayer, RateLimitService};

/// Configuration for serving Turnstile.
pub struct ServeConfig {
    /// The socket address (IP and port) the server will bind to.
    pub listen_address: SocketAddr,
    /// The deserialized Turnstile TOML configuration.
    pub config: Config,
    /// Routes to protect with the rate limit layer. Empty for a pure forward-auth
    /// deployment.
    pub application: Router,
}

/// Builds the full router: `application` behind the rate limit layer, plus the
/// admission and health endpoints, which are not rate limited themselves.
pub fn router(config: &Config, manager: Arc<RateLimitManager>, application: Router) -> anyhow::Result<Router> {
    let identification = &config.server.client_identification;

    let mut app = application.layer(RateLimitLayer::new(manager.clone(), identification)?);

    if config.server.admission.enabled {
        let state = AdmissionState {
            manager,
            resolver: Arc::new(ClientResolver::new(identification)?),
        };

        app = app.route(
            &config.server.admission.path,
            get(admission::admission).with_state(state),
        );
    }

    if config.server.health.enabled {
        app = app.route(&config.server.health.path, get(health::health));
    }

    Ok(app)
}

/// Starts and runs the Turnstile server with the provided configuration.
pub async fn serve(
    ServeConfig {
        listen_address,
        config,
        application,
    }: ServeConfig,
) -> anyhow::Result<()> {
    if !config.rate_limit.enabled {
        log::warn!("Rate limiting is disabled, every request will be admitted");
    }

    let manager = Arc::new(RateLimitManager::new(&config.rate_limit).await?);
    let app = router(&config, manager, application)?;

    let listener = TcpListener::bind(listen_address)
        .await
        .map_err(|e| anyhow!("Failed to bind to {listen_address}: {e}"))?;

    if config.server.admission.enabled {
        log::info!(
            "Admission endpoint available at: http://{listen_address}{}",
            config.server.admission.path
        );
    }

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow!("Failed to start HTTP server: {e}"))?;

    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => log::info!("Received shutdown signal, draining connections"),
        Err(e) => {
            log::error!("Failed to listen for shutdown signal: {e}");
            std::future::pending::<()>().await;
        }
    }
}
