//! Patchwarden gateway binary
//!
//! # Usage
//! ```bash
//! patchwarden-gateway [--config gateway.toml] [--port 8787] [--host 127.0.0.1] [--verbose]
//! ```
//!
//! The webhook secret is read from the config file or from
//! `PATCHWARDEN_WEBHOOK_SECRET` (a `.env` file is honoured).

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use patchwarden_gateway::{Gateway, GatewayConfig};

/// Patchwarden Gateway - guarded webhook automation for repositories
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML or JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides the config file)
    #[arg(short, long)]
    port: Option<u16>,

    /// Host to bind to (overrides the config file)
    #[arg(long)]
    host: Option<String>,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Accept unsigned deliveries. Local testing only.
    #[arg(long)]
    insecure_test_mode: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(args.verbose)
        .init();

    let mut config = match &args.config {
        Some(path) => GatewayConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => GatewayConfig::default(),
    }
    .apply_env();
    if let Some(host) = args.host {
        config = config.with_host(host);
    }
    if let Some(port) = args.port {
        config = config.with_port(port);
    }
    if args.insecure_test_mode {
        config = config.with_test_mode(true);
    }

    let gateway = Gateway::from_config(config).context("starting gateway")?;
    gateway.start().await?;

    Ok(())
}
