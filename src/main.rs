//! Resilient Service Gateway
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────────────┐
//!                      │                   SERVICE GATEWAY                     │
//!                      │                                                       │
//!  GET /operations     │  ┌────────┐   ┌─────────┐   ┌─────────┐   ┌────────┐ │
//!  ────────────────────┼─▶│  http  │──▶│ gateway │──▶│ circuit │──▶│ down-  │─┼──▶ audit
//!  ◀───────────────────┼──│ server │◀──│+fallback│◀──│ breaker │◀──│ stream │◀┼─── service
//!                      │  └────────┘   └─────────┘   └────┬────┘   └────────┘ │
//!                      │                                  │ status           │
//!                      │                                  ▼                  │
//!  ws /eventbus/*      │  ┌────────┐   ┌──────────────┐  ┌─────┐             │
//!  ◀──────────────────▶┼─▶│websock.│◀─▶│ multiplexer  │◀▶│ bus │◀──── internal│
//!                      │  └────────┘   │ +permissions │  └─────┘    publishers│
//!                      │               └──────────────┘                      │
//!                      │  config · discovery · lifecycle · observability      │
//!                      └──────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use clap::Parser;
use tokio::net::TcpListener;

use service_gateway::admin::serve_admin;
use service_gateway::config::{load_config, GatewayConfig};
use service_gateway::lifecycle::{signals::spawn_signal_handler, Shutdown, StartupError};
use service_gateway::net::load_tls_config;
use service_gateway::observability::{logging::init_logging, metrics::init_metrics};
use service_gateway::HttpServer;

#[derive(Parser)]
#[command(name = "service-gateway", version)]
#[command(about = "Resilient service gateway with an event bus bridge", long_about = None)]
struct Args {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path).map_err(StartupError::from)?,
        None => GatewayConfig::default(),
    };

    init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "service-gateway starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        operations_path = %config.gateway.operations_path,
        bridge_path = %config.bridge.path,
        config_file = ?args.config,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    spawn_signal_handler(shutdown.clone());

    let server = HttpServer::new(config.clone(), shutdown.clone())?;

    let admin = if config.admin.enabled {
        let listener = bind(&config.admin.bind_address).await?;
        let state = server.state().clone();
        let api_key = config.admin.api_key.clone();
        Some(tokio::spawn(async move { serve_admin(listener, state, &api_key).await }))
    } else {
        None
    };

    match &config.listener.tls {
        Some(tls) => {
            let addr: SocketAddr = config.listener.bind_address.parse()?;
            let tls = load_tls_config(Path::new(&tls.cert_path), Path::new(&tls.key_path))
                .await
                .map_err(StartupError::Tls)?;
            server.run_tls(addr, tls).await?;
        }
        None => {
            let listener = bind(&config.listener.bind_address).await?;
            tracing::info!(address = %listener.local_addr()?, "Listening for connections");
            server.run(listener).await?;
        }
    }

    shutdown.trigger();
    if let Some(admin) = admin {
        admin.await??;
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn bind(address: &str) -> Result<TcpListener, StartupError> {
    TcpListener::bind(address).await.map_err(|source| StartupError::Bind {
        address: address.to_string(),
        source,
    })
}
