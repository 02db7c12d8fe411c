// Provider bridge binary
//
// Serves the configured tool providers over HTTP until SIGINT or SIGTERM.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use provider_bridge::{BridgeConfig, start_server};

#[derive(Parser)]
#[command(version, about = "HTTP bridge for line-delimited JSON-RPC tool providers")]
struct Args {
    /// Configuration file (TOML)
    #[arg(long, short, env = "BRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address, overriding the configuration file and PORT
    #[arg(long, env = "BRIDGE_LISTEN")]
    listen: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => BridgeConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => {
            log::warn!("No configuration file given; no providers are available");
            BridgeConfig::default()
        }
    };
    config.apply_env_overrides()?;
    if let Some(listen) = args.listen {
        config.server.listen = listen;
    }

    let handle = start_server(config).await?;
    shutdown_signal().await;
    handle.shutdown().await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                log::error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => log::info!("Received Ctrl+C"),
        () = terminate => log::info!("Received SIGTERM"),
    }
}
