//! Handler bodies for the Tool Router. Kept thin and mechanical: deserialize
//! args, call the owning component, serialize the result. No gate logic here
//! — `ToolRouter::run_gates` already ran before `handle` is reached.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{MissionControlError, Result};
use crate::execution::HybridExecutor;
use crate::models::{
    Artifact, ArtifactAppend, ArtifactId, ArtifactType, Mission, MissionClass, MissionContract,
    Producer, Provenance, Task, TaskId, TaskStatus, TaskType,
};
use crate::self_heal::HealProposal;

use super::{ToolCall, ToolRouter};

fn args_of<T: for<'de> Deserialize<'de>>(call: &ToolCall) -> Result<T> {
    serde_json::from_value(call.args.clone()).map_err(MissionControlError::Serialization)
}

pub async fn handle(router: &ToolRouter, call: &ToolCall) -> Result<Value> {
    match call.tool.as_str() {
        "mission.create" => mission_create(router, call).await,
        "mission.get" => mission_get(router, call).await,
        "mission.list" => mission_list(router).await,
        "mission.get_progress" => mission_get_progress(router, call).await,
        "mission.get_artifacts" => mission_get_artifacts(router, call).await,
        "mission.update_status" => mission_update_status(router, call).await,
        "mission.unlock" => mission_unlock(router, call).await,
        "task.create" => task_create(router, call).await,
        "task.get" => task_get(router, call).await,
        "task.list" => task_list(router, call).await,
        "task.update_status" => task_update_status(router, call).await,
        "artifact.create" => artifact_create(router, call).await,
        "artifact.get" => artifact_get(router, call).await,
        "artifact.list" => artifact_list(router, call).await,
        "agent.spawn" => agent_spawn(router, call).await,
        "agent.spawn_immediate" => agent_spawn_immediate(router, call).await,
        "agent.get" => agent_get(router, call).await,
        "agent.list" => agent_list(router).await,
        "agent.heartbeat" => agent_heartbeat(router, call).await,
        "approval.approve" => approval_approve(router, call).await,
        "approval.reject" => approval_reject(router, call).await,
        "approval.list_pending" => approval_list_pending(router).await,
        "state.get_snapshot" => state_get_snapshot(router).await,
        "selfheal.propose" => selfheal_propose(router, call).await,
        "provider.health" => provider_health(router, call).await,
        other => Err(MissionControlError::ToolNotAllowed { tool: other.to_string() }),
    }
}

#[derive(Deserialize)]
struct MissionCreateArgs {
    name: String,
    description: String,
    mission_class: MissionClass,
    contract: MissionContract,
}

async fn mission_create(router: &ToolRouter, call: &ToolCall) -> Result<Value> {
    let args: MissionCreateArgs = args_of(call)?;
    let mission = Mission::new(args.name, args.description, args.mission_class, args.contract);
    let created = router.store.create_mission(mission).await?;
    Ok(json!(created))
}

fn require_mission_id(call: &ToolCall) -> Result<&crate::models::MissionId> {
    call.context.mission_id.as_ref().ok_or_else(|| MissionControlError::Validation {
        message: "tool requires a missionId in context".into(),
    })
}

async fn mission_get(router: &ToolRouter, call: &ToolCall) -> Result<Value> {
    let id = require_mission_id(call)?;
    let mission = router.store.get_mission(id).await.ok_or_else(|| MissionControlError::NotFound {
        kind: "mission",
        id: id.to_string(),
    })?;
    Ok(json!(mission))
}

async fn mission_list(router: &ToolRouter) -> Result<Value> {
    Ok(json!(router.store.list_missions().await))
}

async fn mission_get_progress(router: &ToolRouter, call: &ToolCall) -> Result<Value> {
    let id = require_mission_id(call)?;
    let tasks = router.store.list_tasks_for_mission(id).await;
    let total = tasks.len();
    let complete = tasks.iter().filter(|t| t.status == TaskStatus::Complete).count();
    Ok(json!({ "total": total, "complete": complete, "tasks": tasks }))
}

async fn mission_get_artifacts(router: &ToolRouter, call: &ToolCall) -> Result<Value> {
    let id = require_mission_id(call)?;
    Ok(json!(router.store.list_artifacts_for_mission(id).await))
}

#[derive(Deserialize)]
struct MissionUpdateStatusArgs {
    status: crate::models::MissionStatus,
}

async fn mission_update_status(router: &ToolRouter, call: &ToolCall) -> Result<Value> {
    let id = require_mission_id(call)?;
    let args: MissionUpdateStatusArgs = args_of(call)?;

    let mission = router.store.get_mission(id).await.ok_or_else(|| MissionControlError::NotFound {
        kind: "mission",
        id: id.to_string(),
    })?;
    crate::validators::validate_status_transition(mission.status, args.status, crate::models::is_valid_mission_transition)?;

    if args.status == crate::models::MissionStatus::Complete {
        let artifacts = router.store.list_artifacts_for_mission(id).await;
        let refs: Vec<&Artifact> = artifacts.iter().collect();
        let global = router.store.global_state().await;
        crate::validators::validate_completion(&mission, &refs, &global.global_breaker)?;
    }

    let updated = router
        .store
        .update_mission(id, "router.mission_update_status", |mission| {
            mission.status = args.status;
            if args.status == crate::models::MissionStatus::Complete {
                mission.completed_at = Some(chrono::Utc::now());
            }
            Ok(())
        })
        .await?;
    Ok(json!(updated))
}

#[derive(Deserialize)]
struct MissionUnlockArgs {
    unlocked_by: String,
}

async fn mission_unlock(router: &ToolRouter, call: &ToolCall) -> Result<Value> {
    let id = require_mission_id(call)?;
    let args: MissionUnlockArgs = args_of(call)?;
    crate::circuit_breaker::unlock_mission(&router.store, id, &args.unlocked_by).await?;
    let mission = router.store.get_mission(id).await.ok_or_else(|| MissionControlError::NotFound {
        kind: "mission",
        id: id.to_string(),
    })?;
    Ok(json!(mission))
}

#[derive(Deserialize)]
struct TaskCreateArgs {
    title: String,
    description: String,
    task_type: TaskType,
    #[serde(default)]
    deps: Vec<TaskId>,
    #[serde(default)]
    required_artifacts: Vec<String>,
}

async fn task_create(router: &ToolRouter, call: &ToolCall) -> Result<Value> {
    let mission_id = require_mission_id(call)?.clone();
    let args: TaskCreateArgs = args_of(call)?;
    let existing = router.store.list_tasks_for_mission(&mission_id).await;
    let task = Task::new(mission_id, args.title, args.description, args.task_type, args.deps, args.required_artifacts);
    crate::task_graph::check_for_cycle(&existing, &task.id, &task.deps)?;
    let created = router.store.create_task(task).await?;
    Ok(json!(created))
}

#[derive(Deserialize)]
struct TaskIdArgs {
    task_id: TaskId,
}

async fn task_get(router: &ToolRouter, call: &ToolCall) -> Result<Value> {
    let args: TaskIdArgs = args_of(call)?;
    let task = router.store.get_task(&args.task_id).await.ok_or_else(|| MissionControlError::NotFound {
        kind: "task",
        id: args.task_id.to_string(),
    })?;
    Ok(json!(task))
}

async fn task_list(router: &ToolRouter, call: &ToolCall) -> Result<Value> {
    let id = require_mission_id(call)?;
    Ok(json!(router.store.list_tasks_for_mission(id).await))
}

#[derive(Deserialize)]
struct TaskUpdateStatusArgs {
    task_id: TaskId,
    status: TaskStatus,
    #[serde(default)]
    blocked_reason: Option<String>,
}

async fn task_update_status(router: &ToolRouter, call: &ToolCall) -> Result<Value> {
    let args: TaskUpdateStatusArgs = args_of(call)?;

    let task = router.store.get_task(&args.task_id).await.ok_or_else(|| MissionControlError::NotFound {
        kind: "task",
        id: args.task_id.to_string(),
    })?;
    crate::validators::validate_status_transition(task.status, args.status, crate::models::is_valid_task_transition)?;

    if args.status == TaskStatus::Running {
        let mission_id = require_mission_id(call)?;
        let tasks = router.store.list_tasks_for_mission(mission_id).await;
        let by_id = tasks.iter().map(|t| (t.id.clone(), t.clone())).collect();
        crate::task_graph::check_dependencies_met(&task, &by_id)?;
    }
    let updated = router
        .store
        .update_task(&args.task_id, "router.task_update_status", |task| {
            task.status = args.status;
            task.blocked_reason = args.blocked_reason.clone();
            Ok(())
        })
        .await?;
    Ok(json!(updated))
}

#[derive(Deserialize)]
struct ArtifactCreateArgs {
    #[serde(default)]
    task_id: Option<TaskId>,
    artifact_type: ArtifactType,
    label: String,
    #[serde(default)]
    payload: std::collections::HashMap<String, Value>,
    #[serde(default)]
    files: Vec<String>,
}

async fn artifact_create(router: &ToolRouter, call: &ToolCall) -> Result<Value> {
    let mission_id = require_mission_id(call)?.clone();
    let args: ArtifactCreateArgs = args_of(call)?;
    let provenance = Provenance {
        producer: match call.context.caller {
            crate::delegation_gate::Caller::Watchdog => Producer::Watchdog,
            _ => Producer::Human,
        },
        agent_id: None,
        worktree: None,
        commit_hash: None,
    };
    let artifact = Artifact::new(mission_id, args.task_id, args.artifact_type, args.label, args.payload, args.files, provenance);
    let created = router.store.add_artifact(artifact).await?;
    Ok(json!(created))
}

#[derive(Deserialize)]
struct ArtifactIdArgs {
    artifact_id: ArtifactId,
}

async fn artifact_get(router: &ToolRouter, call: &ToolCall) -> Result<Value> {
    let args: ArtifactIdArgs = args_of(call)?;
    let artifact = router.store.get_artifact(&args.artifact_id).await.ok_or_else(|| MissionControlError::NotFound {
        kind: "artifact",
        id: args.artifact_id.to_string(),
    })?;
    Ok(json!(artifact))
}

async fn artifact_list(router: &ToolRouter, call: &ToolCall) -> Result<Value> {
    let id = require_mission_id(call)?;
    Ok(json!(router.store.list_artifacts_for_mission(id).await))
}

#[derive(Deserialize)]
struct AgentSpawnArgs {
    model: String,
    prompt: String,
    worktree: String,
    branch: String,
    #[serde(default)]
    allowed_tools: Vec<String>,
    #[serde(default)]
    required_artifacts: Vec<String>,
    risk_level: crate::models::RiskLevel,
    estimated_cost: f64,
}

async fn agent_spawn(router: &ToolRouter, call: &ToolCall) -> Result<Value> {
    let mission_id = require_mission_id(call)?.clone();
    let mission = router.store.get_mission(&mission_id).await.ok_or_else(|| MissionControlError::NotFound {
        kind: "mission",
        id: mission_id.to_string(),
    })?;
    let args: AgentSpawnArgs = args_of(call)?;
    let executor = HybridExecutor::new(router.store.clone(), std::path::PathBuf::from("."));
    let recipe = crate::execution::AgentRecipe {
        model: args.model,
        prompt: args.prompt,
        worktree: args.worktree,
        branch: args.branch,
        allowed_tools: args.allowed_tools,
        required_artifacts: args.required_artifacts,
        risk_level: args.risk_level,
        estimated_cost: args.estimated_cost,
        expires_at: chrono::Utc::now() + chrono::Duration::hours(1),
    };
    let artifact_id = executor.spawn_agent(&mission, call.context.task_id.clone(), recipe).await?;
    Ok(json!({ "artifact_id": artifact_id }))
}

#[derive(Deserialize)]
struct AgentSpawnImmediateArgs {
    worker_binary: String,
}

async fn agent_spawn_immediate(router: &ToolRouter, call: &ToolCall) -> Result<Value> {
    let mission_id = require_mission_id(call)?.clone();
    let mission = router.store.get_mission(&mission_id).await.ok_or_else(|| MissionControlError::NotFound {
        kind: "mission",
        id: mission_id.to_string(),
    })?;
    let args: AgentSpawnImmediateArgs = args_of(call)?;
    let executor = HybridExecutor::new(router.store.clone(), std::path::PathBuf::from("."));
    let agent_id = executor
        .spawn_agent_immediate(&mission, call.context.task_id.clone(), &args.worker_binary)
        .await?;
    Ok(json!({ "agent_id": agent_id }))
}

#[derive(Deserialize)]
struct AgentIdArgs {
    agent_id: crate::models::AgentId,
}

async fn agent_get(router: &ToolRouter, call: &ToolCall) -> Result<Value> {
    let args: AgentIdArgs = args_of(call)?;
    let agent = router.store.get_agent(&args.agent_id).await.ok_or_else(|| MissionControlError::NotFound {
        kind: "agent",
        id: args.agent_id.to_string(),
    })?;
    Ok(json!(agent))
}

async fn agent_list(router: &ToolRouter) -> Result<Value> {
    Ok(json!(router.store.list_agents().await))
}

#[derive(Deserialize)]
struct AgentHeartbeatArgs {
    agent_id: crate::models::AgentId,
}

async fn agent_heartbeat(router: &ToolRouter, call: &ToolCall) -> Result<Value> {
    let args: AgentHeartbeatArgs = args_of(call)?;
    let updated = router
        .store
        .update_agent(&args.agent_id, "router.agent_heartbeat", |agent| {
            agent.last_heartbeat = chrono::Utc::now();
            Ok(())
        })
        .await?;
    Ok(json!(updated))
}

#[derive(Deserialize)]
struct ApprovalDecisionArgs {
    approval_id: crate::models::ApprovalId,
    decided_by: String,
    #[serde(default)]
    comment: Option<String>,
}

async fn approval_approve(router: &ToolRouter, call: &ToolCall) -> Result<Value> {
    let args: ApprovalDecisionArgs = args_of(call)?;
    let approval = router
        .store
        .resolve_approval(&args.approval_id, "router.approval_approve", |approval| {
            approval.approve(args.decided_by.clone(), args.comment.clone());
            Ok(())
        })
        .await?;
    Ok(json!(approval))
}

async fn approval_reject(router: &ToolRouter, call: &ToolCall) -> Result<Value> {
    let args: ApprovalDecisionArgs = args_of(call)?;
    let approval = router
        .store
        .resolve_approval(&args.approval_id, "router.approval_reject", |approval| {
            approval.reject(args.decided_by.clone(), args.comment.clone());
            Ok(())
        })
        .await?;
    Ok(json!(approval))
}

async fn approval_list_pending(router: &ToolRouter) -> Result<Value> {
    Ok(json!(router.store.list_pending_approvals().await))
}

async fn state_get_snapshot(router: &ToolRouter) -> Result<Value> {
    Ok(json!(router.store.snapshot().await))
}

#[derive(Deserialize)]
struct SelfHealProposeArgs {
    failure_signature: String,
    proposal: HealProposal,
}

async fn selfheal_propose(router: &ToolRouter, call: &ToolCall) -> Result<Value> {
    let mission_id = require_mission_id(call)?.clone();
    let mission = router.store.get_mission(&mission_id).await.ok_or_else(|| MissionControlError::NotFound {
        kind: "mission",
        id: mission_id.to_string(),
    })?;
    let args: SelfHealProposeArgs = args_of(call)?;
    let outcome = router
        .self_heal
        .propose_and_evaluate(&mission, &args.failure_signature, args.proposal)
        .await?;
    Ok(json!(outcome))
}

#[derive(Deserialize)]
struct ProviderHealthArgs {
    provider: String,
}

async fn provider_health(router: &ToolRouter, call: &ToolCall) -> Result<Value> {
    let args: ProviderHealthArgs = args_of(call)?;
    let status = router.rate_limits.status(&args.provider).await;
    Ok(json!({ "provider": args.provider, "status": status }))
}
