use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{AgentId, ArtifactId, MissionId, TaskId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionClass {
    Exploration,
    Implementation,
    Maintenance,
    Destructive,
    Continuous,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionStatus {
    Queued,
    Running,
    Blocked,
    NeedsReview,
    Complete,
    Failed,
    Locked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
}

impl std::str::FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "low" => Ok(RiskLevel::Low),
            "medium" => Ok(RiskLevel::Medium),
            "high" => Ok(RiskLevel::High),
            other => Err(format!("unknown risk level: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExecutionAuthority {
    ClaudeCode,
    Desktop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionMode {
    RecipeOnly,
    ImmediateOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    Manual,
    Watchdog,
    Scheduled,
}

/// An allowed-tools entry: either the wildcard `*` or a dotted prefix like `agent.*`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToolGlob(pub String);

impl ToolGlob {
    pub fn matches(&self, tool: &str) -> bool {
        if self.0 == "*" {
            return true;
        }
        if let Some(prefix) = self.0.strip_suffix(".*") {
            return tool == prefix || tool.starts_with(&format!("{prefix}."));
        }
        self.0 == tool
    }
}

/// The immutable part of a mission's contract, fixed at creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissionContract {
    pub required_artifacts: Vec<String>,
    pub verification_checks: Vec<String>,
    pub risk_level: RiskLevel,
    pub allowed_tools: Vec<ToolGlob>,
    pub completion_gate: String,
    pub max_estimated_cost: Option<f64>,
    pub max_cost_per_hour: Option<f64>,
    pub trigger_source: TriggerSource,
    pub execution_authority: ExecutionAuthority,
    pub execution_mode: ExecutionMode,
    pub bootstrap_artifact_id: Option<ArtifactId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mission {
    pub id: MissionId,
    pub name: String,
    pub description: String,
    pub mission_class: MissionClass,

    pub status: MissionStatus,
    pub blocked_reason: Option<String>,
    pub locked_reason: Option<String>,

    pub contract: MissionContract,

    pub task_ids: Vec<TaskId>,
    pub artifact_ids: Vec<ArtifactId>,
    pub agent_ids: Vec<AgentId>,

    pub failure_count: u32,
    pub immediate_exec_count: u32,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub cooldown_until: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,

    pub state_version: u64,
}

impl Mission {
    pub fn new(name: String, description: String, mission_class: MissionClass, contract: MissionContract) -> Self {
        let now = Utc::now();
        Self {
            id: MissionId::generate(),
            name,
            description,
            mission_class,
            status: MissionStatus::Queued,
            blocked_reason: None,
            locked_reason: None,
            contract,
            task_ids: Vec::new(),
            artifact_ids: Vec::new(),
            agent_ids: Vec::new(),
            failure_count: 0,
            immediate_exec_count: 0,
            last_failure_at: None,
            cooldown_until: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
            state_version: 1,
        }
    }

    pub fn is_destructive(&self) -> bool {
        self.mission_class == MissionClass::Destructive
    }

    pub fn is_locked(&self) -> bool {
        self.status == MissionStatus::Locked
    }

    /// Resolves `allowedTools` wildcard semantics (`*`, `group.*`, exact match).
    pub fn allows_tool(&self, tool: &str) -> bool {
        self.contract.allowed_tools.iter().any(|g| g.matches(tool))
    }
}

/// Allowed mission status transitions per the lifecycle in the data model.
pub fn is_valid_mission_transition(from: MissionStatus, to: MissionStatus) -> bool {
    use MissionStatus::*;
    if from == to {
        return false;
    }
    match (from, to) {
        (Queued, Running) => true,
        (Queued, Locked) => true,
        (Running, Blocked) => true,
        (Blocked, Running) => true,
        (Running, NeedsReview) => true,
        (Blocked, NeedsReview) => true,
        (NeedsReview, Complete) => true,
        (NeedsReview, Failed) => true,
        (NeedsReview, Blocked) => true,
        (Running, Complete) => true,
        (Running, Failed) => true,
        (Blocked, Failed) => true,
        (_, Locked) => true,
        (Locked, Blocked) => true,
        (Locked, Queued) => true,
        _ => false,
    }
}
