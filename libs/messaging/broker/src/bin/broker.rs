//! MAL broker binary
//!
//! Usage:
//!   mal-broker --config config/broker.toml
//!   mal-broker --port 2024 --log-level debug
//!   MALTCP_TRANSPORT__PORT=2024 mal-broker

use anyhow::{Context, Result};
use broker::{Broker, BrokerConfig};
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "mal-broker")]
#[command(about = "MAL/TCP publish/subscribe broker")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen port, overriding the configuration
    #[arg(short, long)]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG wins when set
    #[arg(short, long)]
    log_level: Option<String>,

    /// Enable JSON logging format
    #[arg(long)]
    json_logs: bool,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = BrokerConfig::load(args.config.as_deref())
        .with_context(|| format!("Failed to load configuration from {:?}", args.config))?;
    if let Some(port) = args.port {
        config.transport.port = port;
    }

    if args.print_config {
        println!("{}", toml_config(&config)?);
        return Ok(());
    }

    init_logging(&args, config.transport.debug);

    info!("Starting MAL broker");
    let broker = Broker::start(config).await.map_err(|e| {
        error!("Failed to start broker: {}", e);
        e
    })?;
    info!(uri = %broker.uri(), "Accepting subscriptions");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to install CTRL+C signal handler")?;
    info!("Received shutdown signal");

    broker.shutdown().await;
    Ok(())
}

fn toml_config(config: &BrokerConfig) -> Result<String> {
    let transport = config.transport.to_toml()?;
    Ok(format!(
        "endpoint = \"{}\"\n\n[transport]\n{}",
        config.endpoint, transport
    ))
}

/// Level from RUST_LOG, else the CLI flag, else the config debug toggle
fn init_logging(args: &Args, debug: bool) {
    let fallback = args
        .log_level
        .clone()
        .unwrap_or_else(|| if debug { "debug" } else { "info" }.to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    if args.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
