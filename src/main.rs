//! e2e-mock-kit - standalone mock server

use anyhow::Result;
use clap::Parser;
use e2e_mock_kit::{MockServer, MockServerConfig};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(
    name = "e2e-mock-kit",
    about = "Standalone mock HTTP server for end-to-end test suites",
    version
)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "mock-server.yaml")]
    config: PathBuf,

    /// Override the configured host
    #[arg(long)]
    host: Option<String>,

    /// Override the configured port
    #[arg(short, long)]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'L', long, default_value = "info")]
    log_level: Level,

    /// Print default configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if args.print_config {
        let default_config = include_str!("../demos/default-config.yaml");
        println!("{}", default_config);
        return Ok(());
    }

    let mut config = if args.config.exists() {
        info!(path = ?args.config, "Loading configuration");
        MockServerConfig::from_file(&args.config)?
    } else if args.validate {
        anyhow::bail!("Configuration file not found: {:?}", args.config);
    } else {
        info!("Using default configuration (no routes)");
        MockServerConfig::default()
    };

    if args.validate {
        config.validate()?;
        println!(
            "Configuration is valid ({} routes defined)",
            config.routes.len()
        );
        return Ok(());
    }

    if let Some(host) = args.host {
        config.settings.host = host;
    }
    if let Some(port) = args.port {
        config.settings.port = port;
    }

    let server = MockServer::from_config(config)?;
    let addr = server.start().await?;
    info!(address = %addr, "Mock server ready, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    let handled = server.request_count();
    server.cleanup().await;
    println!("Handled {} requests", handled);

    Ok(())
}
