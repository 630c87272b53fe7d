//! Chain Gateway
//!
//! Exposes a blockchain CLI over HTTP.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http server ──▶ command (resolve binary, translate options)
//!                                         │
//!                          ┌──────────────┴──────────────┐
//!                          ▼                             ▼
//!                    simple path                   multisig pipeline
//!                  (one invocation)     generate → sign×N → multisign → broadcast
//!                          │                    (artifact store scratch files)
//!                          └──────────────┬──────────────┘
//!                                         ▼
//!                                   exec (child process)
//!                                         │
//!     Client Response                     ▼
//!     ◀────────────── JSON trace ◀── audit log (JSONL, one record per request)
//! ```

use clap::Parser;
use std::path::PathBuf;
use tokio::net::TcpListener;

use chain_gateway::config::{load_config, GatewayConfig};
use chain_gateway::http::HttpServer;
use chain_gateway::lifecycle::{signals, Shutdown};
use chain_gateway::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "chain-gateway")]
#[command(about = "HTTP gateway for a blockchain command-line client", version)]
struct Args {
    /// Path to a TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };

    logging::init_logging(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "chain-gateway starting");

    tracing::info!(
        bind_address = %config.listener.bind_address,
        artifacts = %config.artifacts.directory.display(),
        audit_log = %config.audit.path.display(),
        simple_timeout_secs = ?config.process.simple_timeout_secs,
        "Configuration loaded"
    );

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    tokio::spawn(signals::listen(shutdown.clone()));

    let server = HttpServer::new(config)?;
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
