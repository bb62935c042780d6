//! Deploy command
//!
//! Deploys the topology wave by wave and prints the per-stack outcome.

use anyhow::{Result, bail};
use clap::ValueEnum;
use colored::*;
use nimbus_deployer::{
    CloudFormationControlPlane, ControlPlane, DeployerConfig, Deployer, DeploymentReport,
    InMemoryControlPlane, StackStatus,
};
use std::sync::Arc;
use tracing::info;

use crate::config::Config;

/// Where stacks are reconciled
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Target {
    /// In-memory control plane
    Local,
    /// AWS CloudFormation
    Aws,
}

pub async fn deploy_topology(
    config: &Config,
    target: Target,
    concurrency: Option<usize>,
) -> Result<()> {
    let topology = config.topology()?;

    let mut deployer_config = DeployerConfig::from_env();
    if let Some(max) = concurrency {
        deployer_config = deployer_config.with_max_parallel_stacks(max);
    }
    deployer_config.validate()?;
    info!(
        ?target,
        max_parallel_stacks = deployer_config.max_parallel_stacks,
        "Deploying topology"
    );

    let control_plane: Arc<dyn ControlPlane> = match target {
        Target::Local => Arc::new(InMemoryControlPlane::new()),
        Target::Aws => {
            Arc::new(CloudFormationControlPlane::new(topology.env(), &deployer_config).await)
        }
    };

    println!(
        "{}",
        format!("Deploying {} stack(s) to {}", topology.stacks().len(), topology.env()).bold()
    );

    let report = Deployer::new(control_plane, &deployer_config)
        .deploy(&topology)
        .await?;

    print_report(&report);
    ensure_succeeded(&report)
}

/// Print one line per stack in deployment order
pub fn print_report(report: &DeploymentReport) {
    println!();
    println!("  Run: {}", report.run_id.to_string().dimmed());
    for stack in &report.stacks {
        let status = match &stack.status {
            StackStatus::Created => "created".green(),
            StackStatus::Updated => "updated".green(),
            StackStatus::Unchanged => "unchanged".dimmed(),
            StackStatus::Failed { .. } => "failed".red().bold(),
            StackStatus::Skipped { .. } => "skipped".yellow(),
        };
        println!(
            "  {} {:<20} {}",
            "▸".cyan(),
            stack.id.as_str(),
            status
        );
        match &stack.status {
            StackStatus::Failed { reason } => println!("      {}", reason.red()),
            StackStatus::Skipped { blocked_by } => {
                println!("      {}", format!("blocked by {}", blocked_by).dimmed())
            }
            _ => {}
        }
    }
    println!(
        "  Took {}s",
        (report.finished_at - report.started_at).num_seconds()
    );
}

pub fn ensure_succeeded(report: &DeploymentReport) -> Result<()> {
    if report.succeeded() {
        println!("{}", "✓ All stacks deployed".green().bold());
        return Ok(());
    }

    let failed = report.failed().count();
    let skipped = report.skipped().count();
    bail!(
        "{} stack(s) failed, {} stack(s) skipped",
        failed,
        skipped
    )
}
