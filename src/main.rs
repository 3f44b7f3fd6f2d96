//! Main entry point for the LAN Forward Proxy

use anyhow::Context;
use clap::Parser;
use lan_forward_proxy::{
    cli::ServerArgs,
    init_logger_with_config, log_info,
    runtime::{create_runtime, shutdown_signal},
    ProxyConfig, ProxyServer,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "lan-forward-proxy")]
#[command(about = "A concurrent HTTP/CONNECT forward proxy for the local network")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// YAML configuration file (defaults to ./config.yml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(flatten)]
    server: ServerArgs,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = ProxyConfig::load_config(cli.config.as_deref())?;
    cli.server.apply_to(&mut config);
    if cli.verbose {
        config.log_level = "debug".to_string();
    }
    config.validate().context("Invalid configuration")?;

    // Keep the guard alive so the log file is flushed on exit
    let _log_guard = init_logger_with_config(&config.log_level, &config.logging)?;

    let runtime = create_runtime(&config.runtime)?;
    runtime.block_on(run(config))
}

async fn run(config: ProxyConfig) -> anyhow::Result<()> {
    log_info!("🚀 Starting LAN Forward Proxy v{}", env!("CARGO_PKG_VERSION"));

    let server = ProxyServer::new(config)
        .start()
        .await
        .context("Failed to start proxy server")?;

    shutdown_signal().await;
    log_info!("Shutdown signal received, stopping new connections...");
    server.stop().await;

    Ok(())
}
