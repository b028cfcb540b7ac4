use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{AgentId, ArtifactId, MissionId, TaskId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Work,
    Verification,
    Finalization,
}

impl TaskType {
    /// Ordering used as the execution-order tie-break: verification < work < finalization.
    pub fn priority(self) -> u8 {
        match self {
            TaskType::Verification => 0,
            TaskType::Work => 1,
            TaskType::Finalization => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Ready,
    Running,
    Complete,
    Failed,
    Blocked,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub mission_id: MissionId,
    pub title: String,
    pub description: String,
    pub task_type: TaskType,

    pub status: TaskStatus,
    pub blocked_reason: Option<String>,

    pub deps: Vec<TaskId>,
    pub required_artifacts: Vec<String>,
    pub artifact_ids: Vec<ArtifactId>,

    pub assigned_agent: Option<AgentId>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    pub state_version: u64,
}

impl Task {
    pub fn new(
        mission_id: MissionId,
        title: String,
        description: String,
        task_type: TaskType,
        deps: Vec<TaskId>,
        required_artifacts: Vec<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: TaskId::generate(),
            mission_id,
            title,
            description,
            task_type,
            status: TaskStatus::Pending,
            blocked_reason: None,
            deps,
            required_artifacts,
            artifact_ids: Vec::new(),
            assigned_agent: None,
            created_at: now,
            updated_at: now,
            state_version: 1,
        }
    }
}

/// Allowed task status transitions per the lifecycle in the data model.
pub fn is_valid_task_transition(from: TaskStatus, to: TaskStatus) -> bool {
    use TaskStatus::*;
    if from == to {
        return false;
    }
    match (from, to) {
        (Pending, Ready) => true,
        (Ready, Running) => true,
        (Running, Complete) => true,
        (Running, Failed) => true,
        (Failed, Ready) => true,
        (_, Blocked) => true,
        (Blocked, Ready) => true,
        (Blocked, Pending) => true,
        _ => false,
    }
}
