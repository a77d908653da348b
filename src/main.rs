use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use token_aggregator::api::build_sources;
use token_aggregator::app::Services;
use token_aggregator::cli::Cli;
use token_aggregator::config::Config;
use token_aggregator::logging;
use token_aggregator::utils::MemoryStore;
use token_aggregator::web;

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = dotenv::dotenv() {
        eprintln!("No .env loaded: {}", e);
    }
    let cli = Cli::parse();

    let config_path = cli.config_path();
    let mut config = Config::load_or_default(&config_path)
        .with_context(|| format!("Failed to load configuration from {:?}", config_path))?;
    config
        .apply_env_overrides()
        .context("Invalid environment override")?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    let log_file = config.logging.file.as_ref().map(PathBuf::from);
    logging::init(cli.debug, log_file.as_deref()).context("Failed to initialize logging")?;
    info!("Starting token aggregator...");

    let sources = build_sources(&config)?;
    let services = Services::build(&config, sources, Arc::new(MemoryStore::new()))?;
    info!("Services initialized.");

    if config.broadcaster.enabled {
        services.broadcaster.start().await;
    } else {
        warn!("Diff broadcaster disabled by configuration");
    }

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", config.server.host, config.server.port))?;

    let (bound, server) = warp::serve(web::routes(services.state.clone()))
        .try_bind_with_graceful_shutdown(addr, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutdown signal received");
        })
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Listening on http://{}", bound);
    server.await;

    services.broadcaster.stop().await;
    info!("Token aggregator stopped.");
    Ok(())
}
