//! Component I: hybrid execution. Recipe generation (no worker started) and
//! immediate spawn (worker started via `tokio::process::Command`), grounded in the
//! donor's per-session workspace isolation in `claude_code/cli_client.rs`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use crate::circuit_breaker;
use crate::constants::{GLOBAL_SPAWN_PER_HOUR, MISSION_COOLDOWN_SECS, MISSION_IMMEDIATE_EXEC_LIMIT};
use crate::error::{MissionControlError, Result};
use crate::models::{Agent, AgentId, AgentStatus, ArtifactType, Mission, MissionStatus, Producer, Provenance, SpawnMode, TaskId};
use crate::state::StateStore;

/// Contents of an immutable `agent_recipe` artifact: an instruction for how to
/// spawn an agent, without starting anything.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecipe {
    pub model: String,
    pub prompt: String,
    pub worktree: String,
    pub branch: String,
    pub allowed_tools: Vec<String>,
    pub required_artifacts: Vec<String>,
    pub risk_level: crate::models::RiskLevel,
    pub estimated_cost: f64,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

pub struct HybridExecutor {
    store: Arc<StateStore>,
    state_root: PathBuf,
}

impl HybridExecutor {
    pub fn new(store: Arc<StateStore>, state_root: PathBuf) -> Self {
        Self { store, state_root }
    }

    /// `spawn_agent` (recipe mode): writes an immutable `agent_recipe` artifact.
    /// Never starts a worker process.
    pub async fn spawn_agent(
        &self,
        mission: &Mission,
        task_id: Option<TaskId>,
        recipe: AgentRecipe,
    ) -> Result<crate::models::ArtifactId> {
        let payload = serde_json::to_value(&recipe)
            .map_err(MissionControlError::Serialization)?
            .as_object()
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .collect::<HashMap<_, _>>();

        let artifact = self
            .store
            .add_artifact(crate::models::Artifact::new(
                mission.id.clone(),
                task_id,
                ArtifactType::AgentRecipe,
                format!("agent recipe for {}", mission.id),
                payload,
                vec![],
                Provenance {
                    producer: Producer::System,
                    agent_id: None,
                    worktree: Some(recipe.worktree.clone()),
                    commit_hash: None,
                },
            ))
            .await?;
        Ok(artifact.id)
    }

    /// `spawn_agent_immediate`: every pre-flight check from the contract, in
    /// order, then a worktree allocation, agent record, `pre_flight_snapshot`
    /// artifact, and worker process launch.
    pub async fn spawn_agent_immediate(
        &self,
        mission: &Mission,
        task_id: Option<TaskId>,
        worker_binary: &str,
    ) -> Result<AgentId> {
        let global = self.store.global_state().await;

        if !global.armed_mode || mission.contract.risk_level > global.risk_threshold {
            return Err(MissionControlError::ToolNotAllowed {
                tool: "agent.spawn_immediate".into(),
            });
        }
        if mission.is_locked() || global.global_breaker.tripped {
            return Err(MissionControlError::MissionLocked {
                mission_id: mission.id.to_string(),
            });
        }
        if let Some(cooldown_until) = mission.cooldown_until {
            if chrono::Utc::now() < cooldown_until {
                return self.fail_preflight(mission, "cooldown_active").await;
            }
        }
        if mission.immediate_exec_count >= MISSION_IMMEDIATE_EXEC_LIMIT {
            return self.fail_preflight(mission, "immediate_exec_limit_reached").await;
        }
        if self.store.hourly_spawn_count().await >= GLOBAL_SPAWN_PER_HOUR {
            return self.fail_preflight(mission, "global_spawn_ceiling_reached").await;
        }
        if mission.contract.required_artifacts.is_empty() {
            return self.fail_preflight(mission, "no_required_artifacts_defined").await;
        }

        self.store.write_labeled_snapshot("pre_spawn").await?;

        let agent_id = AgentId::generate();
        let worktree = self.state_root.join("state").join("storage").join("worktrees").join(agent_id.as_str());
        tokio::fs::create_dir_all(&worktree).await?;

        let mut agent = Agent::new(
            mission.id.clone(),
            task_id.clone(),
            worktree.to_string_lossy().to_string(),
            SpawnMode::Immediate,
        );
        agent.id = agent_id.clone();

        let spawned = tokio::process::Command::new(worker_binary)
            .arg(worktree.to_string_lossy().to_string())
            .stdout(Stdio::piped())
            .stdin(Stdio::null())
            .spawn();

        match spawned {
            Ok(mut child) => {
                agent.pid = child.id();
                if let Some(stdout) = child.stdout.take() {
                    let mut lines = BufReader::new(stdout).lines();
                    if let Ok(Some(first_line)) = lines.next_line().await {
                        info!(agent_id = %agent_id, handshake = %first_line, "worker handshake received");
                    }
                }
            }
            Err(err) => {
                warn!(agent_id = %agent_id, error = %err, "failed to launch worker process");
                return self.fail_preflight(mission, "worker_launch_failed").await;
            }
        }

        self.store.register_agent(agent).await?;
        self.store.record_spawn().await;
        circuit_breaker::record_immediate_exec(&self.store, &mission.id).await?;

        let mut payload = HashMap::new();
        payload.insert("missionId".to_string(), serde_json::json!(mission.id));
        self.store
            .add_artifact(crate::models::Artifact::new(
                mission.id.clone(),
                task_id,
                ArtifactType::PreFlightSnapshot,
                format!("pre-flight snapshot for {}", agent_id),
                payload,
                vec![],
                Provenance {
                    producer: Producer::System,
                    agent_id: Some(agent_id.clone()),
                    worktree: Some(worktree.to_string_lossy().to_string()),
                    commit_hash: None,
                },
            ))
            .await?;

        Ok(agent_id)
    }

    async fn fail_preflight(&self, mission: &Mission, reason: &str) -> Result<AgentId> {
        self.store
            .update_mission(&mission.id, "execution.preflight_failed", |mission| {
                mission.status = MissionStatus::Blocked;
                mission.blocked_reason = Some(reason.to_string());
                Ok(())
            })
            .await?;

        let mut payload = HashMap::new();
        payload.insert("reason".to_string(), serde_json::json!(reason));
        self.store
            .add_artifact(crate::models::Artifact::new(
                mission.id.clone(),
                None,
                ArtifactType::FailureReport,
                format!("pre-flight check failed: {reason}"),
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

        Err(MissionControlError::Validation {
            message: format!("pre-flight check failed: {reason}"),
        })
    }

    /// Heartbeat processing: applies the 2N/5N stale/dead rule and resets the
    /// dead agent's task back to `ready`.
    pub async fn apply_heartbeat_transitions(&self, heartbeat_interval_secs: i64) -> Result<()> {
        let now = chrono::Utc::now();
        for agent in self.store.list_agents().await {
            let Some(new_status) = agent.heartbeat_status(now, heartbeat_interval_secs) else {
                continue;
            };
            self.store
                .update_agent(&agent.id, "execution.heartbeat_transition", |agent| {
                    agent.status = new_status;
                    Ok(())
                })
                .await?;

            if new_status == AgentStatus::Dead {
                if let Some(task_id) = &agent.task_id {
                    self.store
                        .update_task(task_id, "execution.reset_dead_agent_task", |task| {
                            task.status = crate::models::TaskStatus::Ready;
                            Ok(())
                        })
                        .await?;
                }
                let mut payload = HashMap::new();
                payload.insert("agentId".to_string(), serde_json::json!(agent.id));
                self.store
                    .add_artifact(crate::models::Artifact::new(
                        agent.mission_id.clone(),
                        agent.task_id.clone(),
                        ArtifactType::SignalReport,
                        format!("agent {} went dead", agent.id),
                        payload,
                        vec![],
                        Provenance {
                            producer: Producer::Watchdog,
                            agent_id: Some(agent.id.clone()),
                            worktree: None,
                            commit_hash: None,
                        },
                    ))
                    .await?;
            }
        }
        Ok(())
    }
}
