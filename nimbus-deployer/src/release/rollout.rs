//! Blue/green rollout controller
//!
//! Two pools sit behind one listener. A rollout registers the new revision
//! in the idle pool, waits for it to pass health checks, repoints the
//! listener in one step, bakes, and only then drains the previous pool.
//! The listener always points at exactly one pool.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::RolloutConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolColor {
    Blue,
    Green,
}

impl PoolColor {
    pub fn other(&self) -> PoolColor {
        match self {
            PoolColor::Blue => PoolColor::Green,
            PoolColor::Green => PoolColor::Blue,
        }
    }
}

impl std::fmt::Display for PoolColor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PoolColor::Blue => write!(f, "blue"),
            PoolColor::Green => write!(f, "green"),
        }
    }
}

/// A task registered in a pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replica {
    pub id: Uuid,
    pub revision: String,
}

impl Replica {
    pub fn new(revision: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            revision: revision.to_string(),
        }
    }
}

/// Which pool receives production traffic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerState {
    pub production: PoolColor,
}

/// Listener plus the replicas registered in each pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficState {
    pub listener: ListenerState,
    pools: BTreeMap<PoolColor, Vec<Replica>>,
}

impl TrafficState {
    /// Blue serves `replicas` tasks of `revision`, green is empty
    pub fn new(revision: &str, replicas: usize) -> Self {
        let mut pools = BTreeMap::new();
        pools.insert(
            PoolColor::Blue,
            (0..replicas).map(|_| Replica::new(revision)).collect(),
        );
        pools.insert(PoolColor::Green, Vec::new());

        Self {
            listener: ListenerState {
                production: PoolColor::Blue,
            },
            pools,
        }
    }

    pub fn production(&self) -> PoolColor {
        self.listener.production
    }

    pub fn replicas(&self, pool: PoolColor) -> &[Replica] {
        self.pools.get(&pool).map(Vec::as_slice).unwrap_or_default()
    }

    /// Revision behind the listener, if the production pool is populated
    pub fn serving_revision(&self) -> Option<&str> {
        self.replicas(self.production())
            .first()
            .map(|r| r.revision.as_str())
    }

    fn register(&mut self, pool: PoolColor, revision: &str, count: usize) {
        let replicas = self.pools.entry(pool).or_default();
        replicas.extend((0..count).map(|_| Replica::new(revision)));
    }

    fn deregister_all(&mut self, pool: PoolColor) -> usize {
        self.pools
            .get_mut(&pool)
            .map(|replicas| replicas.drain(..).count())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProbePhase {
    /// Candidate is registered but not serving
    PreCutover,
    /// Candidate is serving production traffic
    Bake,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Unhealthy(String),
}

/// Health checks against a pool
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn check(&self, pool: PoolColor, replicas: &[Replica], phase: ProbePhase) -> HealthStatus;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RolloutPhase {
    ProvisionCandidate,
    AwaitHealth,
    CutOver,
    Bake,
    DrainPrevious,
    Succeeded,
    RollingBack,
    RolledBack,
    Failed,
}

impl std::fmt::Display for RolloutPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RolloutEvent {
    pub at: DateTime<Utc>,
    pub phase: RolloutPhase,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RolloutOutcome {
    Succeeded,
    /// Candidate never served, or served without rollback
    Failed(String),
    /// Candidate served, failed, and traffic went back to the previous pool
    RolledBack(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RolloutReport {
    pub id: Uuid,
    pub revision: String,
    pub previous: PoolColor,
    pub candidate: PoolColor,
    pub outcome: RolloutOutcome,
    pub events: Vec<RolloutEvent>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RolloutReport {
    pub fn succeeded(&self) -> bool {
        self.outcome == RolloutOutcome::Succeeded
    }

    pub fn phases(&self) -> Vec<RolloutPhase> {
        self.events.iter().map(|e| e.phase).collect()
    }
}

pub struct RolloutController {
    config: RolloutConfig,
}

struct Recorder {
    id: Uuid,
    events: Vec<RolloutEvent>,
}

impl Recorder {
    fn record(&mut self, phase: RolloutPhase, message: String) {
        match phase {
            RolloutPhase::Failed | RolloutPhase::RollingBack | RolloutPhase::RolledBack => {
                warn!(rollout = %self.id, %phase, "{}", message)
            }
            _ => info!(rollout = %self.id, %phase, "{}", message),
        }
        self.events.push(RolloutEvent {
            at: Utc::now(),
            phase,
            message,
        });
    }
}

impl RolloutController {
    pub fn new(config: RolloutConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RolloutConfig {
        &self.config
    }

    /// Rolls `revision` out to the idle pool with `desired` replicas
    ///
    /// # Arguments
    /// * `state` - Listener and pool registrations, updated in place
    /// * `revision` - Revision the candidate replicas run
    /// * `desired` - Number of candidate replicas
    /// * `probe` - Health checks for the candidate pool
    pub async fn run(
        &self,
        state: &mut TrafficState,
        revision: &str,
        desired: usize,
        probe: &dyn HealthProbe,
    ) -> RolloutReport {
        let started_at = Utc::now();
        let previous = state.production();
        let candidate = previous.other();
        let mut recorder = Recorder {
            id: Uuid::new_v4(),
            events: Vec::new(),
        };

        let outcome = self
            .execute(state, revision, desired, probe, previous, candidate, &mut recorder)
            .await;

        RolloutReport {
            id: recorder.id,
            revision: revision.to_string(),
            previous,
            candidate,
            outcome,
            events: recorder.events,
            started_at,
            finished_at: Utc::now(),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn execute(
        &self,
        state: &mut TrafficState,
        revision: &str,
        desired: usize,
        probe: &dyn HealthProbe,
        previous: PoolColor,
        candidate: PoolColor,
        recorder: &mut Recorder,
    ) -> RolloutOutcome {
        if desired == 0 {
            let reason = "desired replica count must be greater than 0".to_string();
            recorder.record(RolloutPhase::Failed, reason.clone());
            return RolloutOutcome::Failed(reason);
        }

        let stale = state.deregister_all(candidate);
        state.register(candidate, revision, desired);
        recorder.record(
            RolloutPhase::ProvisionCandidate,
            format!(
                "Registered {} replica(s) of {} in {} pool ({} stale removed)",
                desired, revision, candidate, stale
            ),
        );

        let mut healthy = false;
        let mut last_reason = String::new();
        for attempt in 1..=self.config.health_attempts {
            match probe
                .check(candidate, state.replicas(candidate), ProbePhase::PreCutover)
                .await
            {
                HealthStatus::Healthy => {
                    recorder.record(
                        RolloutPhase::AwaitHealth,
                        format!("{} pool healthy on attempt {}", candidate, attempt),
                    );
                    healthy = true;
                    break;
                }
                HealthStatus::Unhealthy(reason) => {
                    recorder.record(
                        RolloutPhase::AwaitHealth,
                        format!(
                            "{} pool unhealthy on attempt {}/{}: {}",
                            candidate, attempt, self.config.health_attempts, reason
                        ),
                    );
                    last_reason = reason;
                    if attempt < self.config.health_attempts {
                        tokio::time::sleep(self.config.health_interval).await;
                    }
                }
            }
        }

        if !healthy {
            let removed = state.deregister_all(candidate);
            let reason = format!(
                "{} pool failed health checks: {}",
                candidate, last_reason
            );
            recorder.record(
                RolloutPhase::Failed,
                format!(
                    "{}; deregistered {} replica(s), {} pool keeps serving",
                    reason, removed, previous
                ),
            );
            return RolloutOutcome::Failed(reason);
        }

        state.listener.production = candidate;
        recorder.record(
            RolloutPhase::CutOver,
            format!("Listener moved from {} to {}", previous, candidate),
        );

        for check in 1..=self.config.bake_checks {
            if let HealthStatus::Unhealthy(reason) = probe
                .check(candidate, state.replicas(candidate), ProbePhase::Bake)
                .await
            {
                let reason = format!(
                    "{} pool failed bake check {}: {}",
                    candidate, check, reason
                );

                if !self.config.auto_rollback {
                    recorder.record(
                        RolloutPhase::Failed,
                        format!("{}; auto-rollback disabled, listener stays on {}", reason, candidate),
                    );
                    return RolloutOutcome::Failed(reason);
                }

                recorder.record(RolloutPhase::RollingBack, reason.clone());
                state.listener.production = previous;
                let removed = state.deregister_all(candidate);
                recorder.record(
                    RolloutPhase::RolledBack,
                    format!(
                        "Listener restored to {}; deregistered {} replica(s) from {}",
                        previous, removed, candidate
                    ),
                );
                return RolloutOutcome::RolledBack(reason);
            }

            recorder.record(
                RolloutPhase::Bake,
                format!("Bake check {}/{} passed", check, self.config.bake_checks),
            );
            if check < self.config.bake_checks {
                tokio::time::sleep(self.config.health_interval).await;
            }
        }

        let drained = state.deregister_all(previous);
        recorder.record(
            RolloutPhase::DrainPrevious,
            format!("Drained {} replica(s) from {}", drained, previous),
        );

        recorder.record(
            RolloutPhase::Succeeded,
            format!("{} serving {}", candidate, revision),
        );
        RolloutOutcome::Succeeded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Replays scripted results per phase; healthy once a script runs out
    struct ScriptedProbe {
        pre: Mutex<Vec<HealthStatus>>,
        bake: Mutex<Vec<HealthStatus>>,
        serving_at_bake: Mutex<Vec<PoolColor>>,
    }

    impl ScriptedProbe {
        fn new(pre: Vec<HealthStatus>, bake: Vec<HealthStatus>) -> Self {
            Self {
                pre: Mutex::new(pre),
                bake: Mutex::new(bake),
                serving_at_bake: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl HealthProbe for ScriptedProbe {
        async fn check(&self, pool: PoolColor, _replicas: &[Replica], phase: ProbePhase) -> HealthStatus {
            let script = match phase {
                ProbePhase::PreCutover => &self.pre,
                ProbePhase::Bake => {
                    self.serving_at_bake.lock().unwrap().push(pool);
                    &self.bake
                }
            };
            let mut script = script.lock().unwrap();
            if script.is_empty() {
                HealthStatus::Healthy
            } else {
                script.remove(0)
            }
        }
    }

    fn unhealthy() -> HealthStatus {
        HealthStatus::Unhealthy("503 from /api/v1/health-check".to_string())
    }

    fn controller(auto_rollback: bool) -> RolloutController {
        RolloutController::new(RolloutConfig::immediate().with_auto_rollback(auto_rollback))
    }

    #[tokio::test]
    async fn test_successful_rollout_switches_pools() {
        let mut state = TrafficState::new("v1", 2);
        let probe = ScriptedProbe::new(vec![unhealthy()], vec![]);

        let report = controller(true).run(&mut state, "v2", 2, &probe).await;

        assert!(report.succeeded());
        assert_eq!(state.production(), PoolColor::Green);
        assert_eq!(state.serving_revision(), Some("v2"));
        assert!(state.replicas(PoolColor::Blue).is_empty());
        assert_eq!(state.replicas(PoolColor::Green).len(), 2);
        assert_eq!(
            report.phases(),
            vec![
                RolloutPhase::ProvisionCandidate,
                RolloutPhase::AwaitHealth,
                RolloutPhase::AwaitHealth,
                RolloutPhase::CutOver,
                RolloutPhase::Bake,
                RolloutPhase::Bake,
                RolloutPhase::DrainPrevious,
                RolloutPhase::Succeeded,
            ]
        );
    }

    #[tokio::test]
    async fn test_unhealthy_candidate_never_serves() {
        let mut state = TrafficState::new("v1", 1);
        let probe = ScriptedProbe::new(vec![unhealthy(), unhealthy(), unhealthy()], vec![]);

        let report = controller(true).run(&mut state, "v2", 1, &probe).await;

        assert!(matches!(report.outcome, RolloutOutcome::Failed(_)));
        assert_eq!(state.production(), PoolColor::Blue);
        assert_eq!(state.serving_revision(), Some("v1"));
        assert!(state.replicas(PoolColor::Green).is_empty());
        assert!(!report.phases().contains(&RolloutPhase::CutOver));
        assert!(probe.serving_at_bake.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_post_cutover_failure_rolls_back() {
        let mut state = TrafficState::new("v1", 1);
        let probe = ScriptedProbe::new(vec![], vec![unhealthy()]);

        let report = controller(true).run(&mut state, "v2", 1, &probe).await;

        assert!(matches!(report.outcome, RolloutOutcome::RolledBack(_)));
        assert_eq!(state.production(), PoolColor::Blue);
        assert_eq!(state.serving_revision(), Some("v1"));
        assert!(state.replicas(PoolColor::Green).is_empty());
        assert_eq!(*probe.serving_at_bake.lock().unwrap(), vec![PoolColor::Green]);
    }

    #[tokio::test]
    async fn test_post_cutover_failure_without_rollback() {
        let mut state = TrafficState::new("v1", 1);
        let probe = ScriptedProbe::new(vec![], vec![unhealthy()]);

        let report = controller(false).run(&mut state, "v2", 1, &probe).await;

        assert!(matches!(report.outcome, RolloutOutcome::Failed(_)));
        assert_eq!(state.production(), PoolColor::Green);
        // Previous pool was never drained
        assert_eq!(state.replicas(PoolColor::Blue).len(), 1);
    }

    #[tokio::test]
    async fn test_consecutive_rollouts_alternate_pools() {
        let mut state = TrafficState::new("v1", 1);
        let probe = ScriptedProbe::new(vec![], vec![]);
        let controller = controller(true);

        let first = controller.run(&mut state, "v2", 1, &probe).await;
        let second = controller.run(&mut state, "v3", 1, &probe).await;

        assert_eq!(first.candidate, PoolColor::Green);
        assert_eq!(second.candidate, PoolColor::Blue);
        assert_eq!(state.production(), PoolColor::Blue);
        assert_eq!(state.serving_revision(), Some("v3"));
    }

    #[tokio::test]
    async fn test_zero_replicas_rejected() {
        let mut state = TrafficState::new("v1", 1);
        let probe = ScriptedProbe::new(vec![], vec![]);

        let report = controller(true).run(&mut state, "v2", 0, &probe).await;

        assert!(matches!(report.outcome, RolloutOutcome::Failed(_)));
        assert_eq!(state.serving_revision(), Some("v1"));
    }
}
