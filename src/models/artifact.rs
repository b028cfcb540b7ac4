use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::ids::{AgentId, ArtifactId, MissionId, TaskId};

/// Mutability mode. `Immutable` artifacts can never be changed after creation;
/// `AppendOnly` artifacts accept payload merges and file appends only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactMode {
    Immutable,
    AppendOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactType {
    GitDiff,
    VerificationReport,
    ApprovalRecord,
    AgentRecipe,
    PreFlightSnapshot,
    Bootstrap,
    Violation,
    ChangePlan,
    RuntimeLog,
    BuildLog,
    ConsoleError,
    CircuitBreakerTrip,
    FailureReport,
    SignalReport,
    PolicyMatchReport,
    RateLimitEvent,
    ExecutionViolation,
}

impl ArtifactType {
    pub fn mode(self) -> ArtifactMode {
        use ArtifactType::*;
        match self {
            RuntimeLog | BuildLog | ConsoleError => ArtifactMode::AppendOnly,
            _ => ArtifactMode::Immutable,
        }
    }

    /// The wire (snake_case) name, as `requiredArtifacts` entries and API
    /// payloads use it. Derived from the actual serde representation rather
    /// than `Debug` so it never drifts from what gets deserialized.
    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactType::GitDiff => "git_diff",
            ArtifactType::VerificationReport => "verification_report",
            ArtifactType::ApprovalRecord => "approval_record",
            ArtifactType::AgentRecipe => "agent_recipe",
            ArtifactType::PreFlightSnapshot => "pre_flight_snapshot",
            ArtifactType::Bootstrap => "bootstrap",
            ArtifactType::Violation => "violation",
            ArtifactType::ChangePlan => "change_plan",
            ArtifactType::RuntimeLog => "runtime_log",
            ArtifactType::BuildLog => "build_log",
            ArtifactType::ConsoleError => "console_error",
            ArtifactType::CircuitBreakerTrip => "circuit_breaker_trip",
            ArtifactType::FailureReport => "failure_report",
            ArtifactType::SignalReport => "signal_report",
            ArtifactType::PolicyMatchReport => "policy_match_report",
            ArtifactType::RateLimitEvent => "rate_limit_event",
            ArtifactType::ExecutionViolation => "execution_violation",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Producer {
    Agent,
    Watchdog,
    System,
    Human,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provenance {
    pub producer: Producer,
    pub agent_id: Option<AgentId>,
    pub worktree: Option<String>,
    pub commit_hash: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub id: ArtifactId,
    pub mission_id: MissionId,
    pub task_id: Option<TaskId>,
    pub artifact_type: ArtifactType,
    pub artifact_mode: ArtifactMode,
    pub label: String,
    pub payload: HashMap<String, serde_json::Value>,
    pub files: Vec<String>,
    pub provenance: Provenance,
    pub created_at: DateTime<Utc>,
    pub state_version: u64,
}

impl Artifact {
    pub fn new(
        mission_id: MissionId,
        task_id: Option<TaskId>,
        artifact_type: ArtifactType,
        label: String,
        payload: HashMap<String, serde_json::Value>,
        files: Vec<String>,
        provenance: Provenance,
    ) -> Self {
        Self {
            id: ArtifactId::generate(),
            mission_id,
            task_id,
            artifact_mode: artifact_type.mode(),
            artifact_type,
            label,
            payload,
            files,
            provenance,
            created_at: Utc::now(),
            state_version: 1,
        }
    }
}

/// A patch applied to an append-only artifact: payload keys are merged (never
/// overwriting an existing key with a different value) and files are appended.
#[derive(Debug, Clone, Default)]
pub struct ArtifactAppend {
    pub payload: HashMap<String, serde_json::Value>,
    pub files: Vec<String>,
}
