//! Release command
//!
//! Provisions the topology into the in-memory control plane, uploads a
//! source bundle and runs the pipeline with local actions.

use anyhow::{Result, bail};
use colored::*;
use nimbus_deployer::release::{
    ExecutionStatus, LocalActions, PipelineRunner, RolloutController, RolloutOutcome,
    SimulatedProbe, StageStatus, TrafficState,
};
use nimbus_deployer::{DeployerConfig, Deployer, InMemoryControlPlane, RolloutConfig};
use nimbus_stacks::TopologyConfig;
use std::sync::Arc;

use super::deploy;
use crate::config::Config;

pub struct ReleaseOptions {
    pub fail_health: bool,
    pub fail_after_cutover: bool,
    pub auto_rollback: bool,
}

pub async fn run_release(config: &Config, options: ReleaseOptions) -> Result<()> {
    let topology = config.topology()?;
    let settings = TopologyConfig::default();

    let deployer_config = DeployerConfig::from_env();
    deployer_config.validate()?;

    let control_plane = Arc::new(InMemoryControlPlane::new());
    let report = Deployer::new(control_plane.clone(), &deployer_config)
        .deploy(&topology)
        .await?;
    deploy::ensure_succeeded(&report)?;

    let rollout = RolloutConfig::new().with_auto_rollback(options.auto_rollback && topology.auto_rollback());
    rollout.validate()?;

    let probe = SimulatedProbe {
        fail_health: options.fail_health,
        fail_after_cutover: options.fail_after_cutover,
    };
    let replicas = settings.desired_count as usize;
    let actions = Arc::new(
        LocalActions::new(
            control_plane.exports(),
            TrafficState::new(&settings.image_tag, replicas),
            RolloutController::new(rollout),
            Arc::new(probe),
        )
        .with_image_repository(format!(
            "{}.dkr.ecr.{}.amazonaws.com/{}",
            topology.env().account,
            topology.env().region,
            settings.repository_name()
        ))
        .with_container(settings.service.as_str(), settings.container_port)
        .with_desired_count(replicas),
    );
    actions.put_object(
        &settings.prefixed("cicd"),
        &settings.source_key,
        "bundled application sources",
    );

    let execution = PipelineRunner::new(actions.clone())
        .run(topology.pipeline())
        .await;

    println!();
    println!(
        "{}",
        format!("Pipeline {}", execution.pipeline).bold()
    );
    println!("  Execution: {}", execution.id.to_string().dimmed());
    for stage in &execution.stages {
        let status = match &stage.status {
            StageStatus::Succeeded => "succeeded".green(),
            StageStatus::Failed(_) => "failed".red().bold(),
            StageStatus::NotRun => "not run".dimmed(),
        };
        println!("  {} {:<8} {}", "▸".cyan(), stage.name, status);
    }

    for report in actions.rollouts() {
        println!();
        println!(
            "{}",
            format!(
                "Rollout of {} ({} → {})",
                report.revision, report.previous, report.candidate
            )
            .bold()
        );
        for event in &report.events {
            println!(
                "  {} {:<18} {}",
                event.at.format("%H:%M:%S").to_string().dimmed(),
                event.phase.to_string().cyan(),
                event.message
            );
        }
        let outcome = match &report.outcome {
            RolloutOutcome::Succeeded => "succeeded".green().bold(),
            RolloutOutcome::Failed(_) => "failed".red().bold(),
            RolloutOutcome::RolledBack(_) => "rolled back".yellow().bold(),
        };
        println!("  Outcome: {}", outcome);
    }

    let traffic = actions.traffic().await;
    println!();
    println!(
        "  Listener: {} serving {}",
        traffic.production().to_string().cyan(),
        traffic.serving_revision().unwrap_or("nothing")
    );

    match execution.status {
        ExecutionStatus::Succeeded => {
            println!("{}", "✓ Release succeeded".green().bold());
            Ok(())
        }
        ExecutionStatus::Failed { stage, reason } => {
            bail!("Release failed in stage {}: {}", stage, reason)
        }
    }
}
