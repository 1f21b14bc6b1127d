mod acceptor;
mod client;
mod config;
mod lnrpc;
mod policy;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use log::{error, info, warn};

use crate::client::{GrpcLndClient, LndClient};
use crate::config::Config;

#[derive(Parser)]
#[command(
    name = "lnd-gatekeeper",
    version,
    about = "Policy gate for LND's channel acceptor"
)]
struct Cli {
    /// Path to the gatekeeper.toml config file
    #[arg(short, long, default_value = "gatekeeper.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the channel acceptor daemon (default)
    Daemon,
    /// Validate the configuration file and exit
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::load(&cli.config)?;

    // Initialize logging
    env_logger::Builder::new()
        .filter_level(
            config
                .general
                .log_level
                .parse()
                .unwrap_or(log::LevelFilter::Info),
        )
        .format_timestamp_secs()
        .init();

    info!("lnd-gatekeeper v{} starting", env!("CARGO_PKG_VERSION"));

    match cli.command.unwrap_or(Commands::Daemon) {
        Commands::Daemon => run_daemon(config).await,
        Commands::CheckConfig => {
            println!(
                "Configuration OK: {} policies loaded from {}",
                config.policies.len(),
                cli.config.display()
            );
            Ok(())
        }
    }
}

async fn run_daemon(config: Config) -> anyhow::Result<()> {
    if config.general.monitor_only {
        warn!("MONITOR MODE: decisions are logged but every request is accepted");
    }
    if config.policies.is_empty() {
        warn!("No policies configured -- every channel request will be accepted");
    }

    let client = GrpcLndClient::connect(&config).await?;

    // Startup connectivity check
    match client.get_info().await {
        Ok(node) => {
            info!(
                "Connected to lnd node {} ({}) at height {}",
                node.identity_pubkey, node.alias, node.block_height
            );
        }
        Err(e) => {
            error!("Cannot reach lnd: {:#}. Aborting.", e);
            return Err(e);
        }
    }

    acceptor::run(&config, &client).await
}
