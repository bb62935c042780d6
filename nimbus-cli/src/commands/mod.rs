//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod deploy;
mod list;
mod release;
mod synth;

use deploy::Target;

use anyhow::Result;
use clap::Subcommand;
use std::path::PathBuf;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// List stacks in deployment order
    List,
    /// Write CloudFormation templates and the assembly manifest
    Synth {
        /// Output directory
        #[arg(short, long, env = "NIMBUS_OUT_DIR", default_value = "cdk.out")]
        out: PathBuf,
    },
    /// Deploy every stack of the topology
    Deploy {
        /// Control plane to deploy against
        #[arg(short, long, value_enum, default_value = "local")]
        target: Target,

        /// Maximum number of stacks deployed at once
        #[arg(short, long)]
        concurrency: Option<usize>,
    },
    /// Run the release pipeline against a local simulation
    Release {
        /// Candidate pool never passes health checks
        #[arg(long)]
        fail_health: bool,

        /// Candidate fails after it starts serving traffic
        #[arg(long)]
        fail_after_cutover: bool,

        /// Leave traffic on the candidate when it fails
        #[arg(long)]
        no_rollback: bool,
    },
}

/// Handle a CLI command
///
/// # Arguments
/// * `command` - The command to execute
/// * `config` - The CLI configuration
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::List => list::list_stacks(config),
        Commands::Synth { out } => synth::synth_assembly(config, &out),
        Commands::Deploy {
            target,
            concurrency,
        } => deploy::deploy_topology(config, target, concurrency).await,
        Commands::Release {
            fail_health,
            fail_after_cutover,
            no_rollback,
        } => {
            let options = release::ReleaseOptions {
                fail_health,
                fail_after_cutover,
                auto_rollback: !no_rollback,
            };
            release::run_release(config, options).await
        }
    }
}
