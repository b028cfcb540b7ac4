//! Component B: the State Store. Single owner of all entities, exposing a
//! transactional mutation API — each public mutation either succeeds (snapshot save
//! + subscriber broadcast) or fails with a typed error leaving state unchanged.
//!
//! Concurrency follows the donor's `SessionManager`/`atomic_state` idiom: every
//! collection is an `Arc<RwLock<HashMap<Id, Entity>>>` for lock-free-feeling reads,
//! and all mutations funnel through a single `write_lane` mutex so only one logical
//! writer is ever active, acquiring the per-collection locks it needs in a fixed
//! order (missions, tasks, artifacts, agents, approvals, global) to avoid deadlocks.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};

use crate::constants;
use crate::error::{MissionControlError, Result};
use crate::models::*;
use crate::state::events::StateEvent;
use crate::state::persistence::{AuditOutcome, AuditRecord, Persistence};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub missions: HashMap<String, Mission>,
    pub tasks: HashMap<String, Task>,
    pub artifacts: HashMap<String, Artifact>,
    pub agents: HashMap<String, Agent>,
    pub approvals: HashMap<String, Approval>,
    pub global: GlobalState,
    pub version: u64,
    pub last_updated: chrono::DateTime<Utc>,
}

pub struct StateStore {
    missions: Arc<RwLock<HashMap<String, Mission>>>,
    tasks: Arc<RwLock<HashMap<String, Task>>>,
    artifacts: Arc<RwLock<HashMap<String, Artifact>>>,
    agents: Arc<RwLock<HashMap<String, Agent>>>,
    approvals: Arc<RwLock<HashMap<String, Approval>>>,
    global: Arc<RwLock<GlobalState>>,
    version: Arc<RwLock<u64>>,
    write_lane: Mutex<()>,
    persistence: Persistence,
    events: broadcast::Sender<StateEvent>,
}

impl StateStore {
    /// Loads a persisted snapshot if one exists, otherwise starts empty.
    pub async fn open(state_root: impl Into<std::path::PathBuf>) -> Result<Self> {
        let persistence = Persistence::new(state_root)?;
        let loaded = persistence.load_main_snapshot()?;
        let (tx, _rx) = broadcast::channel(1024);

        let store = match loaded {
            Some(snapshot) => Self {
                missions: Arc::new(RwLock::new(snapshot.missions)),
                tasks: Arc::new(RwLock::new(snapshot.tasks)),
                artifacts: Arc::new(RwLock::new(snapshot.artifacts)),
                agents: Arc::new(RwLock::new(snapshot.agents)),
                approvals: Arc::new(RwLock::new(snapshot.approvals)),
                global: Arc::new(RwLock::new(snapshot.global)),
                version: Arc::new(RwLock::new(snapshot.version)),
                write_lane: Mutex::new(()),
                persistence,
                events: tx,
            },
            None => Self {
                missions: Arc::new(RwLock::new(HashMap::new())),
                tasks: Arc::new(RwLock::new(HashMap::new())),
                artifacts: Arc::new(RwLock::new(HashMap::new())),
                agents: Arc::new(RwLock::new(HashMap::new())),
                approvals: Arc::new(RwLock::new(HashMap::new())),
                global: Arc::new(RwLock::new(GlobalState::default())),
                version: Arc::new(RwLock::new(0)),
                write_lane: Mutex::new(()),
                persistence,
                events: tx,
            },
        };
        Ok(store)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateEvent> {
        self.events.subscribe()
    }

    fn publish(&self, event: StateEvent) {
        // Errors in a subscriber (or no subscribers at all) must never roll back the
        // transaction that already committed.
        let _ = self.events.send(event);
    }

    async fn snapshot_locked(&self) -> StateSnapshot {
        StateSnapshot {
            missions: self.missions.read().await.clone(),
            tasks: self.tasks.read().await.clone(),
            artifacts: self.artifacts.read().await.clone(),
            agents: self.agents.read().await.clone(),
            approvals: self.approvals.read().await.clone(),
            global: self.global.read().await.clone(),
            version: *self.version.read().await,
            last_updated: Utc::now(),
        }
    }

    /// Deep-copied read snapshot of the whole state, for readers.
    pub async fn snapshot(&self) -> StateSnapshot {
        self.snapshot_locked().await
    }

    async fn persist_and_audit(&self, action: &str, actor: &str, outcome: AuditOutcome) -> Result<()> {
        let snapshot = self.snapshot_locked().await;
        self.persistence.save_main_snapshot(&snapshot)?;
        let armed_mode = snapshot.global.armed_mode;
        self.persistence.append_audit(&AuditRecord {
            timestamp: Utc::now(),
            action: action.to_string(),
            actor: actor.to_string(),
            armed_mode,
            approved_by: None,
            params_hash: format!("{:x}", md5_like_hash(action)),
            before_snapshot_id: None,
            result_artifact_id: None,
            outcome,
        })?;
        Ok(())
    }

    /// Writes a retained labeled snapshot; called by callers (gate engine, hybrid
    /// execution, breaker) before high-stakes operations per §4.A.
    pub async fn write_labeled_snapshot(&self, label: &str) -> Result<()> {
        let snapshot = self.snapshot_locked().await;
        self.persistence.write_labeled_snapshot(&snapshot, label)?;
        Ok(())
    }

    // ---- Mission mutations ----

    pub async fn create_mission(&self, mission: Mission) -> Result<Mission> {
        let _guard = self.write_lane.lock().await;
        {
            let mut missions = self.missions.write().await;
            missions.insert(mission.id.to_string(), mission.clone());
        }
        self.bump_version().await;
        self.record_mutation().await;
        self.persist_and_audit("mission.create", "operator", AuditOutcome::Success)
            .await?;
        self.publish(StateEvent::MissionChanged(Box::new(mission.clone())));
        Ok(mission)
    }

    pub async fn get_mission(&self, id: &MissionId) -> Option<Mission> {
        self.missions.read().await.get(id.as_str()).cloned()
    }

    pub async fn list_missions(&self) -> Vec<Mission> {
        self.missions.read().await.values().cloned().collect()
    }

    /// Generic mission mutation used by every other component (gate engine, breaker,
    /// watchdog, self-heal) so there is exactly one place that bumps
    /// `_stateVersion`, persists, and audits.
    pub async fn update_mission<F>(&self, id: &MissionId, action: &str, mutator: F) -> Result<Mission>
    where
        F: FnOnce(&mut Mission) -> Result<()>,
    {
        let _guard = self.write_lane.lock().await;
        let mission = {
            let mut missions = self.missions.write().await;
            let mission = missions
                .get_mut(id.as_str())
                .ok_or_else(|| MissionControlError::NotFound {
                    kind: "mission",
                    id: id.to_string(),
                })?;
            mutator(mission)?;
            mission.updated_at = Utc::now();
            mission.state_version += 1;
            mission.clone()
        };
        self.bump_version().await;
        self.record_mutation().await;
        self.persist_and_audit(action, "operator", AuditOutcome::Success)
            .await?;
        self.publish(StateEvent::MissionChanged(Box::new(mission.clone())));
        Ok(mission)
    }

    // ---- Task mutations ----

    pub async fn create_task(&self, task: Task) -> Result<Task> {
        let _guard = self.write_lane.lock().await;
        {
            let mut tasks = self.tasks.write().await;
            tasks.insert(task.id.to_string(), task.clone());
        }
        {
            let mut missions = self.missions.write().await;
            if let Some(mission) = missions.get_mut(task.mission_id.as_str()) {
                mission.task_ids.push(task.id.clone());
                mission.state_version += 1;
            }
        }
        self.bump_version().await;
        self.record_mutation().await;
        self.persist_and_audit("task.create", "operator", AuditOutcome::Success)
            .await?;
        self.publish(StateEvent::TaskChanged(Box::new(task.clone())));
        Ok(task)
    }

    pub async fn get_task(&self, id: &TaskId) -> Option<Task> {
        self.tasks.read().await.get(id.as_str()).cloned()
    }

    pub async fn list_tasks_for_mission(&self, mission_id: &MissionId) -> Vec<Task> {
        self.tasks
            .read()
            .await
            .values()
            .filter(|t| &t.mission_id == mission_id)
            .cloned()
            .collect()
    }

    pub async fn update_task<F>(&self, id: &TaskId, action: &str, mutator: F) -> Result<Task>
    where
        F: FnOnce(&mut Task) -> Result<()>,
    {
        let _guard = self.write_lane.lock().await;
        let task = {
            let mut tasks = self.tasks.write().await;
            let task = tasks
                .get_mut(id.as_str())
                .ok_or_else(|| MissionControlError::NotFound {
                    kind: "task",
                    id: id.to_string(),
                })?;
            mutator(task)?;
            task.updated_at = Utc::now();
            task.state_version += 1;
            task.clone()
        };
        self.bump_version().await;
        self.record_mutation().await;
        self.persist_and_audit(action, "operator", AuditOutcome::Success)
            .await?;
        self.publish(StateEvent::TaskChanged(Box::new(task.clone())));
        Ok(task)
    }

    // ---- Artifact mutations ----

    /// Creating an artifact always appends it to the owning mission's
    /// `artifactIds` and (if present) task's `artifactIds`.
    pub async fn add_artifact(&self, artifact: Artifact) -> Result<Artifact> {
        let _guard = self.write_lane.lock().await;
        {
            let mut artifacts = self.artifacts.write().await;
            artifacts.insert(artifact.id.to_string(), artifact.clone());
        }
        {
            let mut missions = self.missions.write().await;
            if let Some(mission) = missions.get_mut(artifact.mission_id.as_str()) {
                mission.artifact_ids.push(artifact.id.clone());
                mission.state_version += 1;
            }
        }
        if let Some(task_id) = &artifact.task_id {
            let mut tasks = self.tasks.write().await;
            if let Some(task) = tasks.get_mut(task_id.as_str()) {
                task.artifact_ids.push(artifact.id.clone());
                task.state_version += 1;
            }
        }
        self.bump_version().await;
        self.record_artifact_created().await;
        self.record_mutation().await;
        self.persist_and_audit("artifact.create", "operator", AuditOutcome::Success)
            .await?;
        self.publish(StateEvent::ArtifactChanged(Box::new(artifact.clone())));
        Ok(artifact)
    }

    pub async fn get_artifact(&self, id: &ArtifactId) -> Option<Artifact> {
        self.artifacts.read().await.get(id.as_str()).cloned()
    }

    pub async fn list_artifacts_for_mission(&self, mission_id: &MissionId) -> Vec<Artifact> {
        self.artifacts
            .read()
            .await
            .values()
            .filter(|a| &a.mission_id == mission_id)
            .cloned()
            .collect()
    }

    /// `updateArtifact`: only legal for append-only artifacts; validated by the
    /// caller via [`crate::validators::validate_artifact_update`] before this is
    /// invoked, but re-checked here since the state store is the last line of
    /// defense for invariant 3.
    pub async fn append_artifact(&self, id: &ArtifactId, patch: ArtifactAppend) -> Result<Artifact> {
        let _guard = self.write_lane.lock().await;
        let artifact = {
            let mut artifacts = self.artifacts.write().await;
            let artifact = artifacts
                .get_mut(id.as_str())
                .ok_or_else(|| MissionControlError::NotFound {
                    kind: "artifact",
                    id: id.to_string(),
                })?;
            crate::validators::validate_artifact_update(artifact, &patch)?;
            for (key, value) in patch.payload {
                artifact.payload.entry(key).or_insert(value);
            }
            artifact.files.extend(patch.files);
            artifact.state_version += 1;
            artifact.clone()
        };
        self.bump_version().await;
        self.record_mutation().await;
        self.persist_and_audit("artifact.append", "operator", AuditOutcome::Success)
            .await?;
        self.publish(StateEvent::ArtifactChanged(Box::new(artifact.clone())));
        Ok(artifact)
    }

    // ---- Agent mutations ----

    pub async fn register_agent(&self, agent: Agent) -> Result<Agent> {
        let _guard = self.write_lane.lock().await;
        {
            let mut agents = self.agents.write().await;
            agents.insert(agent.id.to_string(), agent.clone());
        }
        {
            let mut missions = self.missions.write().await;
            if let Some(mission) = missions.get_mut(agent.mission_id.as_str()) {
                mission.agent_ids.push(agent.id.clone());
                mission.state_version += 1;
            }
        }
        self.bump_version().await;
        self.record_mutation().await;
        self.persist_and_audit("agent.register", "system", AuditOutcome::Success)
            .await?;
        self.publish(StateEvent::AgentChanged(Box::new(agent.clone())));
        Ok(agent)
    }

    pub async fn get_agent(&self, id: &AgentId) -> Option<Agent> {
        self.agents.read().await.get(id.as_str()).cloned()
    }

    pub async fn list_agents(&self) -> Vec<Agent> {
        self.agents.read().await.values().cloned().collect()
    }

    pub async fn update_agent<F>(&self, id: &AgentId, action: &str, mutator: F) -> Result<Agent>
    where
        F: FnOnce(&mut Agent) -> Result<()>,
    {
        let _guard = self.write_lane.lock().await;
        let agent = {
            let mut agents = self.agents.write().await;
            let agent = agents
                .get_mut(id.as_str())
                .ok_or_else(|| MissionControlError::NotFound {
                    kind: "agent",
                    id: id.to_string(),
                })?;
            mutator(agent)?;
            agent.state_version += 1;
            agent.clone()
        };
        self.bump_version().await;
        self.record_mutation().await;
        self.persist_and_audit(action, "system", AuditOutcome::Success)
            .await?;
        self.publish(StateEvent::AgentChanged(Box::new(agent.clone())));
        Ok(agent)
    }

    // ---- Approval mutations ----

    pub async fn create_approval(&self, approval: Approval) -> Result<Approval> {
        let _guard = self.write_lane.lock().await;
        {
            let mut approvals = self.approvals.write().await;
            approvals.insert(approval.id.to_string(), approval.clone());
        }
        self.bump_version().await;
        self.record_mutation().await;
        self.persist_and_audit("approval.create", "system", AuditOutcome::Success)
            .await?;
        self.publish(StateEvent::ApprovalChanged(Box::new(approval.clone())));
        Ok(approval)
    }

    pub async fn get_approval(&self, id: &ApprovalId) -> Option<Approval> {
        self.approvals.read().await.get(id.as_str()).cloned()
    }

    pub async fn list_pending_approvals(&self) -> Vec<Approval> {
        self.approvals
            .read()
            .await
            .values()
            .filter(|a| a.status == ApprovalStatus::Pending)
            .cloned()
            .collect()
    }

    pub async fn resolve_approval<F>(&self, id: &ApprovalId, action: &str, mutator: F) -> Result<Approval>
    where
        F: FnOnce(&mut Approval) -> Result<()>,
    {
        let _guard = self.write_lane.lock().await;
        let approval = {
            let mut approvals = self.approvals.write().await;
            let approval = approvals
                .get_mut(id.as_str())
                .ok_or_else(|| MissionControlError::NotFound {
                    kind: "approval",
                    id: id.to_string(),
                })?;
            mutator(approval)?;
            approval.clone()
        };
        self.bump_version().await;
        self.record_mutation().await;
        self.persist_and_audit(action, "human", AuditOutcome::Success)
            .await?;
        self.publish(StateEvent::ApprovalChanged(Box::new(approval.clone())));
        Ok(approval)
    }

    // ---- Global state ----

    pub async fn global_state(&self) -> GlobalState {
        self.global.read().await.clone()
    }

    pub async fn set_armed_mode(&self, armed: bool) -> Result<()> {
        let _guard = self.write_lane.lock().await;
        {
            let mut global = self.global.write().await;
            global.armed_mode = armed;
        }
        self.bump_version().await;
        self.record_mutation().await;
        self.persist_and_audit("state.set_armed_mode", "operator", AuditOutcome::Success)
            .await?;
        self.publish(StateEvent::ArmedModeChanged(armed));
        Ok(())
    }

    pub async fn mutate_global<F, T>(&self, action: &str, mutator: F) -> Result<T>
    where
        F: FnOnce(&mut GlobalState) -> Result<T>,
    {
        let _guard = self.write_lane.lock().await;
        let result = {
            let mut global = self.global.write().await;
            mutator(&mut global)?
        };
        self.bump_version().await;
        self.record_mutation().await;
        self.persist_and_audit(action, "system", AuditOutcome::Success)
            .await?;
        Ok(result)
    }

    // ---- Rolling hourly counters ----

    async fn record_mutation(&self) {
        let mut global = self.global.write().await;
        let now = Utc::now();
        global.mutation_timestamps.push_back(now);
        prune_older_than_one_hour(&mut global.mutation_timestamps, now);
    }

    async fn record_artifact_created(&self) {
        let mut global = self.global.write().await;
        let now = Utc::now();
        global.artifact_timestamps.push_back(now);
        prune_older_than_one_hour(&mut global.artifact_timestamps, now);
    }

    pub async fn record_spawn(&self) {
        let mut global = self.global.write().await;
        let now = Utc::now();
        global.spawn_timestamps.push_back(now);
        prune_older_than_one_hour(&mut global.spawn_timestamps, now);
    }

    pub async fn hourly_mutation_count(&self) -> usize {
        let global = self.global.read().await;
        global.mutation_timestamps.len()
    }

    pub async fn hourly_spawn_count(&self) -> usize {
        let global = self.global.read().await;
        global.spawn_timestamps.len()
    }

    async fn bump_version(&self) {
        let mut version = self.version.write().await;
        *version += 1;
    }
}

fn prune_older_than_one_hour(
    timestamps: &mut std::collections::VecDeque<chrono::DateTime<Utc>>,
    now: chrono::DateTime<Utc>,
) {
    while let Some(front) = timestamps.front() {
        if (now - *front).num_seconds() > 3600 {
            timestamps.pop_front();
        } else {
            break;
        }
    }
}

/// Deterministic, non-cryptographic hash used only to populate the audit record's
/// `paramsHash` field for at-a-glance correlation; not a security boundary.
fn md5_like_hash(input: &str) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    input.hash(&mut hasher);
    hasher.finish()
}
