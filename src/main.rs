//! Portfolio API gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────────────┐
//!                     │                       GATEWAY                        │
//!                     │                                                      │
//!   Client Request    │  ┌─────────┐   ┌──────────┐   ┌────────┐   ┌──────┐  │
//!   ──────────────────┼─▶│  http   │──▶│ routing  │──▶│security│──▶│ auth │  │
//!                     │  │ server  │   │  table   │   │ limiter│   │verify│  │
//!                     │  └─────────┘   └──────────┘   └────────┘   └──┬───┘  │
//!                     │                                              │      │
//!                     │                                              ▼      │
//!   Client Response   │  ┌─────────┐                          ┌──────────┐  │
//!   ◀─────────────────┼──│response │◀─────────────────────────│ upstream │◀─┼── Backend
//!                     │  │ / error │                          │ forwarder│  │   Service
//!                     │  └─────────┘                          └──────────┘  │
//!                     │                                                      │
//!                     │  config · observability · lifecycle (cross-cutting)  │
//!                     └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use portfolio_gateway::config::load_config;
use portfolio_gateway::lifecycle::{spawn_signal_handler, GatewayComponents, Shutdown};
use portfolio_gateway::observability::{logging, metrics};
use portfolio_gateway::HttpServer;

#[derive(Parser)]
#[command(name = "portfolio-gateway")]
#[command(about = "API gateway for the portfolio services", long_about = None)]
struct Args {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,

    /// Validate the configuration and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = load_config(args.config.as_deref())?;
    if args.check {
        println!("Configuration OK: {} routes", config.routes.len());
        return Ok(());
    }

    logging::init_logging(&config.observability).map_err(|e| e.to_string())?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "portfolio-gateway starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        routes = config.routes.len(),
        rate_limit_store = ?config.rate_limit.store,
        jwks = %config.auth.jwks_endpoint(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let components = GatewayComponents::from_config(&config).await?;

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Arc::new(Shutdown::new());
    spawn_signal_handler(shutdown.clone());

    let server = HttpServer::new(&config, components);
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
