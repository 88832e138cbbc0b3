use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use tokio::signal;
use tracing::{info, warn};

use steer::config::Config;
use steer::proxy::ProxyServer;

#[derive(Parser)]
#[command(name = "steer")]
#[command(about = "A lightweight HTTP layer-7 load balancer")]
struct Args {
    #[arg(short, long, default_value = "config/config.toml")]
    config: String,

    /// Override the ingress bind address from configuration
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration; invalid configuration aborts startup with a
    // diagnostic naming the offending field
    let config = Config::from_file_with_env(&args.config).await?;

    // Initialize tracing
    let level = if args.verbose {
        "debug".to_string()
    } else {
        config.logging.level.clone()
    };
    tracing_subscriber::fmt()
        .with_env_filter(format!("steer={}", level))
        .init();

    info!("Starting steer load balancer");
    info!("Loaded configuration from {}", args.config);

    let mut server = ProxyServer::new(&config);
    if let Some(bind) = args.bind {
        server = server.with_bind_addr(bind);
    }

    server.start().await?;

    // Run until interrupted, then drain
    signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C signal handler");
    warn!("Received CTRL+C, shutting down gracefully...");

    server.close().await;

    info!("Steer shutdown complete");
    Ok(())
}
