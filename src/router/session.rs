//! Per-session call counters and the resume-on-reconnect algorithm. Session
//! state here is a thin bookkeeping layer over the state store; it holds no
//! entity data of its own, so a crash loses nothing but call-count metrics.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::Result;
use crate::models::{AgentStatus, MissionId, MissionStatus, TaskStatus};
use crate::state::StateStore;

use super::ToolCall;

#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionStats {
    pub tool_calls: u64,
    pub files_touched: u64,
}

pub struct SessionTracker {
    stats: Mutex<HashMap<String, SessionStats>>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self {
            stats: Mutex::new(HashMap::new()),
        }
    }

    fn session_key(call: &ToolCall) -> String {
        call.context
            .mission_id
            .as_ref()
            .map(|id| id.to_string())
            .unwrap_or_else(|| "no-mission".to_string())
    }

    pub async fn record_call(&self, call: &ToolCall) {
        let key = Self::session_key(call);
        let mut stats = self.stats.lock().await;
        stats.entry(key).or_default().tool_calls += 1;
    }

    /// A handoff packet: serialized session state, enough to resubscribe to a
    /// mission's event stream without replaying everything the router already did.
    pub async fn handoff_packet(&self, mission_id: &MissionId) -> SessionStats {
        self.stats.lock().await.get(mission_id.as_str()).cloned().unwrap_or_default()
    }
}

impl Default for SessionTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs on router/control-plane restart: for each active mission, reconciles
/// its last task/agent against the heartbeat-dead threshold, never restarting
/// a mission from scratch.
pub async fn resume_on_reconnect(store: &Arc<StateStore>, heartbeat_interval_secs: i64) -> Result<()> {
    let now = chrono::Utc::now();
    for mission in store.list_missions().await {
        if !matches!(mission.status, MissionStatus::Running | MissionStatus::Blocked | MissionStatus::NeedsReview) {
            continue;
        }

        let tasks = store.list_tasks_for_mission(&mission.id).await;
        let agents = store.list_agents().await;
        let mission_agents: Vec<_> = agents.iter().filter(|a| a.mission_id == mission.id).collect();

        let last_active_task = tasks
            .iter()
            .filter(|t| matches!(t.status, TaskStatus::Ready | TaskStatus::Running))
            .max_by_key(|t| t.updated_at);
        let last_active_agent = mission_agents
            .iter()
            .filter(|a| matches!(a.status, AgentStatus::Running | AgentStatus::Stale))
            .max_by_key(|a| a.last_heartbeat);

        if let Some(agent) = last_active_agent {
            let elapsed = (now - agent.last_heartbeat).num_seconds();
            if elapsed < heartbeat_interval_secs * 5 {
                info!(mission_id = %mission.id, agent_id = %agent.id, "resuming: agent still within heartbeat window");
                continue;
            }
            warn!(mission_id = %mission.id, agent_id = %agent.id, "resuming: agent heartbeat stale past dead threshold");
            store
                .update_agent(&agent.id, "router.resume_mark_dead", |agent| {
                    agent.status = AgentStatus::Dead;
                    Ok(())
                })
                .await?;
            if let Some(task_id) = &agent.task_id {
                store
                    .update_task(task_id, "router.resume_reset_task", |task| {
                        task.status = TaskStatus::Ready;
                        Ok(())
                    })
                    .await?;
            }
            continue;
        }

        let failed_without_self_heal = tasks.iter().find(|t| t.status == TaskStatus::Failed);
        if let Some(task) = failed_without_self_heal {
            let breaker_closed = !mission.is_locked();
            if breaker_closed {
                info!(mission_id = %mission.id, task_id = %task.id, "resuming: resetting failed task to ready");
                store
                    .update_task(&task.id, "router.resume_reset_failed", |task| {
                        task.status = TaskStatus::Ready;
                        Ok(())
                    })
                    .await?;
                continue;
            }
        }

        if last_active_task.is_some() {
            continue;
        }

        warn!(mission_id = %mission.id, "resuming: nothing determinable, marking needs_review");
        store
            .update_mission(&mission.id, "router.resume_ambiguous", |mission| {
                mission.status = MissionStatus::NeedsReview;
                mission.blocked_reason = Some("AMBIGUOUS_RESUME".into());
                Ok(())
            })
            .await?;
    }
    Ok(())
}
