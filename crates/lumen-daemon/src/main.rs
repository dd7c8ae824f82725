//! Lumen Daemon - Main entry point
//!
//! Runs the device control server, the per-device heartbeat sessions, and the
//! accessory REST API.

mod api;
mod config;
mod control;
mod error;
mod manager;
mod server;
mod session;
mod state;
mod sync;
#[cfg(test)]
mod testutil;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "lumend")]
#[command(about = "Home lighting hub: device sessions, heartbeat, and state sync")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "lumen.toml")]
    config: PathBuf,

    /// Bind address for the device control server
    #[arg(long)]
    control_bind: Option<String>,

    /// Bind address for the accessory REST API
    #[arg(long)]
    api_bind: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Print each configured device's checksum and exit
    #[arg(long)]
    print_checksums: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Lumen v{}", env!("CARGO_PKG_VERSION"));

    let mut config = config::load_config(&args.config)?;

    if let Some(bind) = args.control_bind {
        config.daemon.control_bind = bind;
    }
    if let Some(bind) = args.api_bind {
        config.daemon.api_bind = bind;
    }

    if args.print_checksums {
        for device in &config.devices {
            println!("{}  {} ({})", lumen_core::checksum::compute(device), device.mac, device.n);
        }
        return Ok(());
    }

    info!(
        devices = config.devices.len(),
        interval_secs = config.daemon.update_interval_secs,
        "Configuration loaded"
    );

    let state = state::AppState::new(config)?;
    server::run(state).await?;

    Ok(())
}
