//! Nimbus CLI
//!
//! Synthesizes, deploys and releases the Nimbus service topology.

mod commands;
mod config;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::Config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "nimbus")]
#[command(about = "Nimbus deployment topology CLI", long_about = None)]
struct Cli {
    /// AWS account the stacks are bound to
    #[arg(long, env = "NIMBUS_ACCOUNT", default_value = "039612877479")]
    account: String,

    /// AWS region the stacks are bound to
    #[arg(long, env = "NIMBUS_REGION", default_value = "us-east-1")]
    region: String,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "nimbus_cli=info,nimbus_deployer=info,nimbus_stacks=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = Config {
        account: cli.account,
        region: cli.region,
    };

    handle_command(cli.command, &config).await
}
