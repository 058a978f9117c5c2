use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use args::Args;
use axum::Router;
use clap::Parser;
use config::{Config, Tier};
use rate_limit::{Classifier, TierRegistry};
use server::ServeConfig;

mod args;
mod logger;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = args.config()?;

    if args.check {
        return check(&config);
    }

    logger::init(&args);

    let _telemetry = telemetry::init(&config.telemetry).await?;

    if let Err(e) = server::serve(serve_config(&args, config)).await {
        log::error!("Server failed to start: {e}");
        std::process::exit(1);
    }

    Ok(())
}

/// Standalone deployments only answer forward-auth requests, so no application
/// routes are mounted.
fn serve_config(args: &Args, config: Config) -> ServeConfig {
    let listen_address = args
        .listen_address
        .or(config.server.listen_address)
        .unwrap_or(SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(127, 0, 0, 1), 6000)));

    ServeConfig {
        listen_address,
        config,
        application: Router::new(),
    }
}

/// Reports what a server started with `config` would enforce.
fn check(config: &Config) -> anyhow::Result<()> {
    for warning in config.validate()? {
        println!("warning: {warning}");
    }

    Classifier::from_config(&config.rate_limit.routes)?;

    let registry = TierRegistry::from_overrides(&config.rate_limit.tiers);

    println!("{:<32} {:>6} {:>8} {:>8}", "tier", "points", "window", "block");

    for tier in Tier::ALL {
        let quota = registry.get(tier);
        let window = format!("{}s", quota.duration.as_secs());
        let block = quota.block().map(|block| format!("{}s", block.as_secs()));

        println!(
            "{:<32} {:>6} {:>8} {:>8}",
            tier.as_str(),
            quota.points,
            window,
            block.as_deref().unwrap_or("-"),
        );
    }

    Ok(())
}
