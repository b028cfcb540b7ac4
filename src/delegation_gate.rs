//! Component H: execution-authority enforcement. Runs before the gate engine on
//! every tool call, since authority to even attempt a tool is a coarser check
//! than the tool-permission gate inside it.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{MissionControlError, Result};
use crate::models::{ArtifactType, ExecutionAuthority, ExecutionMode, Mission, Producer, Provenance, TaskId, TaskStatus};
use crate::state::StateStore;

/// The caller identity presented with every tool call, distinct from the
/// mission's `executionAuthority` contract field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Caller {
    ClaudeCode,
    Desktop,
    Watchdog,
}

/// Tools a `DESKTOP` caller may invoke regardless of mission authority: read-only
/// surfaces plus the narrow agent-lifecycle and provider-health set.
const DESKTOP_ALLOWED_PREFIXES: &[&str] = &[
    "mission.get",
    "mission.list",
    "mission.get_progress",
    "mission.get_artifacts",
    "approval.",
    "state.get",
    "task.get",
    "task.list",
    "agent.spawn",
    "agent.get",
    "agent.list",
    "agent.heartbeat",
    "provider.health",
];

/// Tools that execute work on behalf of a mission and therefore require the
/// mission's own `executionAuthority` to be `CLAUDE_CODE`.
const EXECUTION_TOOLS: &[&str] = &[
    "artifact.create_git_diff",
    "task.update_status",
    "selfheal.apply",
];

fn matches_any_prefix(tool: &str, prefixes: &[&str]) -> bool {
    prefixes.iter().any(|p| tool == *p || tool.starts_with(p))
}

pub struct DelegationGate {
    store: std::sync::Arc<StateStore>,
}

impl DelegationGate {
    pub fn new(store: std::sync::Arc<StateStore>) -> Self {
        Self { store }
    }

    /// Enforces caller identity, mission authority, and mode lock. On rejection,
    /// records an immutable `execution_violation` artifact and (if `task_id` is
    /// present) blocks that task, per the contract.
    pub async fn check(
        &self,
        caller: Caller,
        tool: &str,
        mission: &Mission,
        task_id: Option<&TaskId>,
    ) -> Result<()> {
        if let Err(err) = self.decide(caller, tool, mission) {
            self.record_violation(mission, tool, caller, &err, task_id).await?;
            return Err(err);
        }
        Ok(())
    }

    fn decide(&self, caller: Caller, tool: &str, mission: &Mission) -> Result<()> {
        if caller == Caller::Desktop && !matches_any_prefix(tool, DESKTOP_ALLOWED_PREFIXES) {
            return Err(MissionControlError::ExecutionViolation {
                attempted_tool: tool.to_string(),
                required_authority: "CLAUDE_CODE".into(),
            });
        }

        if mission.contract.execution_authority == ExecutionAuthority::ClaudeCode
            && caller != Caller::ClaudeCode
            && matches_any_prefix(tool, EXECUTION_TOOLS)
        {
            return Err(MissionControlError::ExecutionViolation {
                attempted_tool: tool.to_string(),
                required_authority: "CLAUDE_CODE".into(),
            });
        }

        match mission.contract.execution_mode {
            ExecutionMode::RecipeOnly if tool == "agent.spawn_immediate" => {
                return Err(MissionControlError::ModeLockViolation {
                    attempted_tool: tool.to_string(),
                })
            }
            ExecutionMode::ImmediateOnly if tool == "agent.spawn" => {
                return Err(MissionControlError::ModeLockViolation {
                    attempted_tool: tool.to_string(),
                })
            }
            _ => {}
        }

        Ok(())
    }

    async fn record_violation(
        &self,
        mission: &Mission,
        tool: &str,
        caller: Caller,
        err: &MissionControlError,
        task_id: Option<&TaskId>,
    ) -> Result<()> {
        let required_authority = match err {
            MissionControlError::ExecutionViolation { required_authority, .. } => required_authority.clone(),
            _ => "CLAUDE_CODE".into(),
        };

        let mut payload = HashMap::new();
        payload.insert("attemptedAction".to_string(), serde_json::json!(tool));
        payload.insert("attemptedBy".to_string(), serde_json::json!(format!("{caller:?}")));
        payload.insert("requiredAuthority".to_string(), serde_json::json!(required_authority));
        payload.insert("toolAttempted".to_string(), serde_json::json!(tool));
        payload.insert("timestamp".to_string(), serde_json::json!(chrono::Utc::now()));
        payload.insert("blocked".to_string(), serde_json::json!(true));

        self.store
            .add_artifact(crate::models::Artifact::new(
                mission.id.clone(),
                task_id.cloned(),
                ArtifactType::ExecutionViolation,
                format!("execution violation: {tool}"),
                payload,
                vec![],
                Provenance {
                    producer: Producer::System,
                    agent_id: None,
                    worktree: None,
                    commit_hash: None,
                },
            ))
            .await?;

        if let Some(task_id) = task_id {
            self.store
                .update_task(task_id, "delegation_gate.block_task", |task| {
                    task.status = TaskStatus::Blocked;
                    task.blocked_reason = Some("EXECUTION_VIOLATION".into());
                    Ok(())
                })
                .await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::*;
    use tempfile::tempdir;

    fn contract(authority: ExecutionAuthority, mode: ExecutionMode) -> MissionContract {
        MissionContract {
            required_artifacts: vec![],
            verification_checks: vec![],
            risk_level: RiskLevel::Low,
            allowed_tools: vec![ToolGlob("*".into())],
            completion_gate: "artifacts".into(),
            max_estimated_cost: None,
            max_cost_per_hour: None,
            trigger_source: TriggerSource::Manual,
            execution_authority: authority,
            execution_mode: mode,
            bootstrap_artifact_id: None,
        }
    }

    #[tokio::test]
    async fn recipe_only_mode_blocks_immediate_spawn_and_records_violation() {
        let dir = tempdir().unwrap();
        let store = std::sync::Arc::new(StateStore::open(dir.path()).await.unwrap());
        let gate = DelegationGate::new(store.clone());

        let mission = Mission::new(
            "m".into(),
            "d".into(),
            MissionClass::Implementation,
            contract(ExecutionAuthority::ClaudeCode, ExecutionMode::RecipeOnly),
        );
        store.create_mission(mission.clone()).await.unwrap();

        let err = gate
            .check(Caller::Desktop, "agent.spawn_immediate", &mission, None)
            .await
            .unwrap_err();
        assert!(matches!(err, MissionControlError::ModeLockViolation { .. }));

        let artifacts = store.list_artifacts_for_mission(&mission.id).await;
        assert!(artifacts.iter().any(|a| a.artifact_type == ArtifactType::ExecutionViolation));
    }

    #[tokio::test]
    async fn desktop_caller_outside_allowed_set_is_rejected() {
        let dir = tempdir().unwrap();
        let store = std::sync::Arc::new(StateStore::open(dir.path()).await.unwrap());
        let gate = DelegationGate::new(store.clone());
        let mission = Mission::new(
            "m".into(),
            "d".into(),
            MissionClass::Implementation,
            contract(ExecutionAuthority::ClaudeCode, ExecutionMode::ImmediateOnly),
        );
        store.create_mission(mission.clone()).await.unwrap();

        let err = gate.check(Caller::Desktop, "task.update_status", &mission, None).await.unwrap_err();
        assert!(matches!(err, MissionControlError::ExecutionViolation { .. }));
    }

    #[tokio::test]
    async fn claude_code_caller_is_unrestricted_at_this_layer() {
        let dir = tempdir().unwrap();
        let store = std::sync::Arc::new(StateStore::open(dir.path()).await.unwrap());
        let gate = DelegationGate::new(store.clone());
        let mission = Mission::new(
            "m".into(),
            "d".into(),
            MissionClass::Implementation,
            contract(ExecutionAuthority::ClaudeCode, ExecutionMode::ImmediateOnly),
        );
        store.create_mission(mission.clone()).await.unwrap();

        assert!(gate.check(Caller::ClaudeCode, "task.update_status", &mission, None).await.is_ok());
    }
}
