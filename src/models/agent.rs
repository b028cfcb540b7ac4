use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{AgentId, MissionId, TaskId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Spawning,
    Running,
    Stale,
    Dead,
    Complete,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpawnMode {
    Recipe,
    Immediate,
}

/// Record of a delegated worker process. The state store owns this record; the
/// external worker process it describes is referenced by `pid`/`worktree` but never
/// owned here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub mission_id: MissionId,
    pub task_id: Option<TaskId>,
    pub status: AgentStatus,
    pub worktree: String,
    pub pid: Option<u32>,
    pub last_heartbeat: DateTime<Utc>,
    pub exit_code: Option<i32>,
    pub error: Option<String>,
    pub mode: SpawnMode,
    pub state_version: u64,
}

impl Agent {
    pub fn new(mission_id: MissionId, task_id: Option<TaskId>, worktree: String, mode: SpawnMode) -> Self {
        Self {
            id: AgentId::generate(),
            mission_id,
            task_id,
            status: AgentStatus::Spawning,
            worktree,
            pid: None,
            last_heartbeat: Utc::now(),
            exit_code: None,
            error: None,
            mode,
            state_version: 1,
        }
    }

    /// Derives the stale/dead status for a heartbeat interval of `n` seconds, per the
    /// rule: no beat for 2n -> stale, no beat for 5n -> dead.
    pub fn heartbeat_status(&self, now: DateTime<Utc>, heartbeat_interval_secs: i64) -> Option<AgentStatus> {
        if matches!(self.status, AgentStatus::Complete | AgentStatus::Failed | AgentStatus::Dead) {
            return None;
        }
        let elapsed = (now - self.last_heartbeat).num_seconds();
        if elapsed >= heartbeat_interval_secs * 5 {
            Some(AgentStatus::Dead)
        } else if elapsed >= heartbeat_interval_secs * 2 {
            Some(AgentStatus::Stale)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn heartbeat_thresholds_match_2n_and_5n() {
        let mut agent = Agent::new(MissionId::generate(), None, "/tmp/wt".into(), SpawnMode::Immediate);
        agent.status = AgentStatus::Running;
        let now = agent.last_heartbeat + Duration::seconds(61);
        assert_eq!(agent.heartbeat_status(now, 30), Some(AgentStatus::Stale));

        let now = agent.last_heartbeat + Duration::seconds(151);
        assert_eq!(agent.heartbeat_status(now, 30), Some(AgentStatus::Dead));

        let now = agent.last_heartbeat + Duration::seconds(10);
        assert_eq!(agent.heartbeat_status(now, 30), None);
    }

    #[test]
    fn terminal_statuses_never_reclassified() {
        let mut agent = Agent::new(MissionId::generate(), None, "/tmp/wt".into(), SpawnMode::Recipe);
        agent.status = AgentStatus::Complete;
        let now = agent.last_heartbeat + Duration::seconds(10_000);
        assert_eq!(agent.heartbeat_status(now, 30), None);
    }
}
