//! Core data model: the typed entities the State Store owns, plus the global state
//! fields that do not belong to any single entity (armed mode, risk threshold,
//! hourly counters).

pub mod agent;
pub mod approval;
pub mod artifact;
pub mod circuit_breaker;
pub mod ids;
pub mod mission;
pub mod task;

pub use agent::{Agent, AgentStatus, SpawnMode};
pub use approval::{Approval, ApprovalStatus};
pub use artifact::{Artifact, ArtifactAppend, ArtifactMode, ArtifactType, Provenance, Producer};
pub use circuit_breaker::CircuitBreaker;
pub use ids::{AgentId, ApprovalId, ArtifactId, MissionId, TaskId};
pub use mission::{
    is_valid_mission_transition, ExecutionAuthority, ExecutionMode, Mission, MissionClass,
    MissionContract, MissionStatus, RiskLevel, ToolGlob, TriggerSource,
};
pub use task::{is_valid_task_transition, Task, TaskStatus, TaskType};

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Global, mission-independent control-plane state.
///
/// Hourly counters are a rolling 1-hour window (a pruned timestamp deque), not an
/// aligned clock hour — see the open-question decision recorded in DESIGN.md.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GlobalState {
    pub armed_mode: bool,
    pub risk_threshold: RiskLevel,
    #[serde(default)]
    pub spawn_timestamps: VecDeque<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub artifact_timestamps: VecDeque<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub mutation_timestamps: VecDeque<chrono::DateTime<chrono::Utc>>,
    pub global_breaker: CircuitBreaker,
}

impl Default for RiskLevel {
    fn default() -> Self {
        RiskLevel::Medium
    }
}
