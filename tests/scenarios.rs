//! Concrete scenarios drawn directly from the control plane's testable
//! properties: one test per literal input/outcome pair, plus the
//! resume-on-reconnect idempotence property.

use std::sync::Arc;

use mission_control::circuit_breaker;
use mission_control::delegation_gate::{Caller, DelegationGate};
use mission_control::execution::HybridExecutor;
use mission_control::models::*;
use mission_control::rate_limit::RateLimitRegistry;
use mission_control::router::resume_on_reconnect;
use mission_control::self_heal::{HealProposal, HealOutcome, SelfHealEngine};
use mission_control::state::StateStore;
use mission_control::task_graph;
use mission_control::MissionControlError;
use tempfile::tempdir;

fn contract(required: Vec<&str>, authority: ExecutionAuthority, mode: ExecutionMode, risk: RiskLevel) -> MissionContract {
    MissionContract {
        required_artifacts: required.into_iter().map(String::from).collect(),
        verification_checks: vec![],
        risk_level: risk,
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
async fn scenario_recipe_only_mode_blocks_immediate_spawn() {
    let dir = tempdir().unwrap();
    let store = Arc::new(StateStore::open(dir.path()).await.unwrap());
    let gate = DelegationGate::new(store.clone());

    let mission = Mission::new(
        "mission-1".into(),
        "d".into(),
        MissionClass::Implementation,
        contract(vec!["verification_report"], ExecutionAuthority::ClaudeCode, ExecutionMode::RecipeOnly, RiskLevel::Low),
    );
    store.create_mission(mission.clone()).await.unwrap();

    let err = gate.check(Caller::Desktop, "agent.spawn_immediate", &mission, None).await.unwrap_err();
    assert_eq!(err.code(), "MODE_LOCK_VIOLATION");

    let artifacts = store.list_artifacts_for_mission(&mission.id).await;
    assert!(artifacts.iter().any(|a| a.artifact_type == ArtifactType::ExecutionViolation));
}

#[tokio::test]
async fn scenario_completion_gate_blocks_on_missing_artifact() {
    let dir = tempdir().unwrap();
    let store = Arc::new(StateStore::open(dir.path()).await.unwrap());
    let mission = Mission::new(
        "m".into(),
        "d".into(),
        MissionClass::Implementation,
        contract(vec!["git_diff", "verification_report"], ExecutionAuthority::Desktop, ExecutionMode::RecipeOnly, RiskLevel::Low),
    );
    store.create_mission(mission.clone()).await.unwrap();

    store
        .add_artifact(Artifact::new(
            mission.id.clone(),
            None,
            ArtifactType::GitDiff,
            "diff".into(),
            Default::default(),
            vec![],
            Provenance { producer: Producer::Agent, agent_id: None, worktree: None, commit_hash: None },
        ))
        .await
        .unwrap();

    let artifacts = store.list_artifacts_for_mission(&mission.id).await;
    let refs: Vec<&Artifact> = artifacts.iter().collect();
    let global = store.global_state().await;
    let err = mission_control::validators::validate_completion(&mission, &refs, &global.global_breaker).unwrap_err();
    match err {
        MissionControlError::CompletionBlocked { missing_artifacts } => {
            assert!(missing_artifacts.iter().any(|m| m.eq_ignore_ascii_case("verification_report")));
            assert!(!missing_artifacts.iter().any(|m| m.eq_ignore_ascii_case("git_diff")));
        }
        other => panic!("expected CompletionBlocked, got {other:?}"),
    }

    let reloaded = store.get_mission(&mission.id).await.unwrap();
    assert_eq!(reloaded.status, MissionStatus::Queued);
}

#[tokio::test]
async fn scenario_third_failure_trips_breaker_and_blocks_unlock_without_approval() {
    let dir = tempdir().unwrap();
    let store = StateStore::open(dir.path()).await.unwrap();
    let mission = Mission::new(
        "m".into(),
        "d".into(),
        MissionClass::Implementation,
        contract(vec![], ExecutionAuthority::Desktop, ExecutionMode::RecipeOnly, RiskLevel::Low),
    );
    let id = mission.id.clone();
    store.create_mission(mission).await.unwrap();

    for _ in 0..3 {
        circuit_breaker::record_mission_failure(&store, &id).await.unwrap();
    }

    let locked = store.get_mission(&id).await.unwrap();
    assert_eq!(locked.status, MissionStatus::Locked);
    let artifacts = store.list_artifacts_for_mission(&id).await;
    assert!(artifacts.iter().any(|a| a.artifact_type == ArtifactType::CircuitBreakerTrip));

    let executor = HybridExecutor::new(Arc::new(store), dir.path().to_path_buf());
    let err = executor.spawn_agent_immediate(&locked, None, "/bin/true").await.unwrap_err();
    assert_eq!(err.code(), "MISSION_LOCKED");
}

#[tokio::test]
async fn scenario_unlock_requires_locked_state_and_resets_failure_count() {
    let dir = tempdir().unwrap();
    let store = StateStore::open(dir.path()).await.unwrap();
    let mission = Mission::new(
        "m".into(),
        "d".into(),
        MissionClass::Implementation,
        contract(vec![], ExecutionAuthority::Desktop, ExecutionMode::RecipeOnly, RiskLevel::Low),
    );
    let id = mission.id.clone();
    store.create_mission(mission).await.unwrap();

    assert!(circuit_breaker::unlock_mission(&store, &id, "human").await.is_err());

    for _ in 0..3 {
        circuit_breaker::record_mission_failure(&store, &id).await.unwrap();
    }
    circuit_breaker::unlock_mission(&store, &id, "human").await.unwrap();
    let unlocked = store.get_mission(&id).await.unwrap();
    assert_eq!(unlocked.status, MissionStatus::Blocked);
    assert_eq!(unlocked.failure_count, 0);
}

#[tokio::test]
async fn scenario_auto_approve_policy_scope() {
    let dir = tempdir().unwrap();
    let store = Arc::new(StateStore::open(dir.path()).await.unwrap());
    store.mutate_global("test.arm", |g| { g.armed_mode = true; Ok(()) }).await.unwrap();
    let mission = Mission::new(
        "m".into(),
        "d".into(),
        MissionClass::Maintenance,
        contract(vec![], ExecutionAuthority::ClaudeCode, ExecutionMode::RecipeOnly, RiskLevel::Low),
    );
    store.create_mission(mission.clone()).await.unwrap();
    let engine = SelfHealEngine::new(store.clone());

    let in_scope = HealProposal {
        diagnosis: "log overflow".into(),
        proposed_commands: vec!["truncate /logs/x.log".into()],
        files_touched: vec!["/logs/x.log".into()],
        risk_rating: RiskLevel::Low,
        rollback_plan: "none needed".into(),
        estimated_cost: 0.0,
    };
    let outcome = engine.propose_and_evaluate(&mission, "sig-logs", in_scope).await.unwrap();
    assert!(matches!(outcome, HealOutcome::AutoApplied { .. }));
    let artifacts = store.list_artifacts_for_mission(&mission.id).await;
    assert!(artifacts.iter().any(|a| a.artifact_type == ArtifactType::PolicyMatchReport));

    let out_of_scope = HealProposal {
        diagnosis: "bad code".into(),
        proposed_commands: vec!["patch src/a.ts".into()],
        files_touched: vec!["src/a.ts".into()],
        risk_rating: RiskLevel::Low,
        rollback_plan: "git revert".into(),
        estimated_cost: 0.0,
    };
    let outcome = engine.propose_and_evaluate(&mission, "sig-src", out_of_scope).await.unwrap();
    assert!(matches!(outcome, HealOutcome::NeedsReview { .. }));
}

#[tokio::test]
async fn scenario_rate_limit_backoff_doubles_and_records_exhaustion() {
    let registry = RateLimitRegistry::new();
    let first = registry.check_rate_limit("serp").await;
    let _ = first;
    registry.record_throttle("serp").await;
    let after_one = registry.check_rate_limit("serp").await;
    registry.record_throttle("serp").await;
    let after_two = registry.check_rate_limit("serp").await;

    let retry_one = after_one.retry_after_ms.unwrap_or(0);
    let retry_two = after_two.retry_after_ms.unwrap_or(0);
    assert!(retry_two >= retry_one, "backoff must not shrink between attempts");

    let exhausted = registry.record_throttle("serp").await;
    assert!(exhausted, "three throttles should exhaust the retry budget");
}

#[tokio::test]
async fn scenario_task_dag_readiness_and_finalization_gate() {
    let mission_id = MissionId::generate();
    let t1 = Task::new(mission_id.clone(), "T1".into(), "d".into(), TaskType::Work, vec![], vec![]);
    let mut t2 = Task::new(mission_id.clone(), "T2".into(), "d".into(), TaskType::Work, vec![t1.id.clone()], vec![]);
    let mut t3 = Task::new(mission_id.clone(), "T3".into(), "d".into(), TaskType::Verification, vec![t2.id.clone()], vec![]);
    let t4 = Task::new(mission_id, "T4".into(), "d".into(), TaskType::Finalization, vec![t3.id.clone()], vec![]);

    let mut tasks = vec![t1.clone(), t2.clone(), t3.clone(), t4.clone()];
    assert_eq!(task_graph::ready_tasks(&tasks).into_iter().map(|t| t.id).collect::<Vec<_>>(), vec![t1.id.clone()]);

    tasks[0].status = TaskStatus::Complete;
    t2.status = TaskStatus::Pending;
    assert_eq!(task_graph::ready_tasks(&tasks).into_iter().map(|t| t.id).collect::<Vec<_>>(), vec![t2.id.clone()]);

    tasks[1].status = TaskStatus::Complete;
    t3.status = TaskStatus::Pending;
    assert_eq!(task_graph::ready_tasks(&tasks).into_iter().map(|t| t.id).collect::<Vec<_>>(), vec![t3.id.clone()]);

    let by_id: std::collections::HashMap<_, _> = tasks.iter().map(|t| (t.id.clone(), t.clone())).collect();
    let err = task_graph::check_dependencies_met(&t4, &by_id).unwrap_err();
    assert!(matches!(err, MissionControlError::DependencyNotMet { .. }));
}

#[tokio::test]
async fn resume_on_reconnect_is_idempotent() {
    let dir = tempdir().unwrap();
    let store = Arc::new(StateStore::open(dir.path()).await.unwrap());
    let mut mission = Mission::new(
        "m".into(),
        "d".into(),
        MissionClass::Implementation,
        contract(vec![], ExecutionAuthority::ClaudeCode, ExecutionMode::RecipeOnly, RiskLevel::Low),
    );
    mission.status = MissionStatus::Running;
    store.create_mission(mission.clone()).await.unwrap();

    let mut task = Task::new(mission.id.clone(), "t".into(), "d".into(), TaskType::Work, vec![], vec![]);
    task.status = TaskStatus::Running;
    let task = store.create_task(task).await.unwrap();

    let mut agent = Agent::new(mission.id.clone(), Some(task.id.clone()), "/tmp/wt".into(), SpawnMode::Immediate);
    agent.status = AgentStatus::Running;
    agent.last_heartbeat = chrono::Utc::now() - chrono::Duration::seconds(1000);
    store.register_agent(agent).await.unwrap();

    resume_on_reconnect(&store, 30).await.unwrap();
    let after_first = store.snapshot().await;
    resume_on_reconnect(&store, 30).await.unwrap();
    let after_second = store.snapshot().await;

    assert_eq!(
        serde_json::to_value(&after_first.tasks).unwrap(),
        serde_json::to_value(&after_second.tasks).unwrap()
    );
    assert_eq!(
        serde_json::to_value(&after_first.agents).unwrap(),
        serde_json::to_value(&after_second.agents).unwrap()
    );
}
