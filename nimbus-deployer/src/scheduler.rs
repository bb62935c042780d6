//! Wave scheduler
//!
//! Deploys a topology wave by wave. Stacks of one wave run concurrently up
//! to `max_parallel_stacks`; a stack whose dependency did not deploy is
//! skipped, and everything already provisioned stays in place.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use nimbus_core::StackId;
use nimbus_stacks::Topology;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::DeployerConfig;
use crate::control_plane::{ChangeKind, ControlPlane, StackDeployment, StackOutcome};
use crate::error::Result;

/// Final status of one stack in a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StackStatus {
    Created,
    Updated,
    Unchanged,
    Failed { reason: String },
    /// Not attempted because a dependency did not deploy
    Skipped { blocked_by: StackId },
}

impl StackStatus {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            StackStatus::Created | StackStatus::Updated | StackStatus::Unchanged
        )
    }
}

impl From<ChangeKind> for StackStatus {
    fn from(change: ChangeKind) -> Self {
        match change {
            ChangeKind::Created => StackStatus::Created,
            ChangeKind::Updated => StackStatus::Updated,
            ChangeKind::Unchanged => StackStatus::Unchanged,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackReport {
    pub id: StackId,
    pub wave: usize,
    pub status: StackStatus,
    pub exports: BTreeMap<String, String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Result of one deployment run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Stacks in deployment order
    pub stacks: Vec<StackReport>,
}

impl DeploymentReport {
    pub fn succeeded(&self) -> bool {
        self.stacks.iter().all(|s| s.status.is_success())
    }

    pub fn stack(&self, id: &str) -> Option<&StackReport> {
        self.stacks.iter().find(|s| s.id.as_str() == id)
    }

    pub fn failed(&self) -> impl Iterator<Item = &StackReport> {
        self.stacks
            .iter()
            .filter(|s| matches!(s.status, StackStatus::Failed { .. }))
    }

    pub fn skipped(&self) -> impl Iterator<Item = &StackReport> {
        self.stacks
            .iter()
            .filter(|s| matches!(s.status, StackStatus::Skipped { .. }))
    }
}

/// Deploys topologies through a control plane
pub struct Deployer {
    control_plane: Arc<dyn ControlPlane>,
    semaphore: Arc<Semaphore>,
}

impl Deployer {
    /// A `max_parallel_stacks` of 0 is treated as 1 so waves always make progress
    pub fn new(control_plane: Arc<dyn ControlPlane>, config: &DeployerConfig) -> Self {
        Self {
            control_plane,
            semaphore: Arc::new(Semaphore::new(config.max_parallel_stacks.max(1))),
        }
    }

    /// Deploys every stack of the topology
    ///
    /// Only assembly errors are returned as `Err`; stack failures are
    /// reported per stack.
    pub async fn deploy(&self, topology: &Topology) -> Result<DeploymentReport> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let waves = topology.waves()?;

        info!(%run_id, env = %topology.env(), waves = waves.len(), "Starting deployment");

        let mut reports: BTreeMap<StackId, StackReport> = BTreeMap::new();

        for (wave_idx, wave) in waves.iter().enumerate() {
            info!(%run_id, wave = wave_idx, stacks = wave.len(), "Starting wave");

            let mut tasks = JoinSet::new();

            for stack in wave {
                if let Some(blocked_by) = blocking_dependency(stack.dependencies(), &reports) {
                    warn!(stack = %stack.id(), %blocked_by, "Skipping stack");
                    reports.insert(
                        stack.id().clone(),
                        StackReport {
                            id: stack.id().clone(),
                            wave: wave_idx,
                            status: StackStatus::Skipped { blocked_by },
                            exports: BTreeMap::new(),
                            started_at: None,
                            finished_at: None,
                        },
                    );
                    continue;
                }

                let deployment = StackDeployment::from_stack(stack)?;
                let control_plane = Arc::clone(&self.control_plane);
                let semaphore = Arc::clone(&self.semaphore);

                tasks.spawn(async move {
                    let _permit = semaphore.acquire_owned().await;
                    let started_at = Utc::now();
                    let result = control_plane.deploy_stack(&deployment).await;
                    (deployment.id, started_at, Utc::now(), result)
                });
            }

            while let Some(joined) = tasks.join_next().await {
                let (id, started, finished, result) = match joined {
                    Ok(done) => done,
                    Err(e) => {
                        error!("Stack deployment task panicked: {}", e);
                        continue;
                    }
                };

                let (status, exports) = match result {
                    Ok(StackOutcome { change, exports }) => {
                        info!(stack = %id, change = %change, "Stack deployed");
                        (StackStatus::from(change), exports)
                    }
                    Err(e) => {
                        error!(stack = %id, error = %e, "Stack failed");
                        (
                            StackStatus::Failed {
                                reason: e.to_string(),
                            },
                            BTreeMap::new(),
                        )
                    }
                };

                reports.insert(
                    id.clone(),
                    StackReport {
                        id,
                        wave: wave_idx,
                        status,
                        exports,
                        started_at: Some(started),
                        finished_at: Some(finished),
                    },
                );
            }

            // A panicked task leaves no report; record it as failed
            for stack in wave {
                reports.entry(stack.id().clone()).or_insert_with(|| StackReport {
                    id: stack.id().clone(),
                    wave: wave_idx,
                    status: StackStatus::Failed {
                        reason: "deployment task panicked".to_string(),
                    },
                    exports: BTreeMap::new(),
                    started_at: None,
                    finished_at: None,
                });
            }
        }

        let stacks: Vec<StackReport> = topology
            .deployment_order()?
            .into_iter()
            .filter_map(|stack| reports.remove(stack.id()))
            .collect();

        let report = DeploymentReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            stacks,
        };

        if report.succeeded() {
            info!(%run_id, "Deployment succeeded");
        } else {
            warn!(
                %run_id,
                failed = report.failed().count(),
                skipped = report.skipped().count(),
                "Deployment finished with failures"
            );
        }

        Ok(report)
    }
}

/// The failed stack that blocks a stack with these dependencies, if any
fn blocking_dependency<'a>(
    dependencies: impl IntoIterator<Item = &'a StackId>,
    reports: &BTreeMap<StackId, StackReport>,
) -> Option<StackId> {
    dependencies.into_iter().find_map(|dependency| {
        match reports.get(dependency).map(|r| &r.status) {
            Some(StackStatus::Failed { .. }) => Some(dependency.clone()),
            Some(StackStatus::Skipped { blocked_by }) => Some(blocked_by.clone()),
            _ => None,
        }
    })
}
