//! Local release path
//!
//! - `rollout`: blue/green traffic switching with health gating
//! - `pipeline`: stage-by-stage execution of a pipeline declaration
//! - `local`: in-process action executor and health probe

pub mod local;
pub mod pipeline;
pub mod rollout;

pub use local::{LocalActions, SimulatedProbe};
pub use pipeline::{
    ActionExecutor, Artifact, ExecutionStatus, PipelineExecution, PipelineRunner, StageRecord,
    StageStatus,
};
pub use rollout::{
    HealthProbe, HealthStatus, ListenerState, PoolColor, ProbePhase, Replica, RolloutController,
    RolloutEvent, RolloutOutcome, RolloutPhase, RolloutReport, TrafficState,
};
