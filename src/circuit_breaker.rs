//! Component E: circuit breaker behavior. [`crate::models::CircuitBreaker`] is the
//! persisted counters; this module is the decision logic that trips and resets them,
//! grounded in the donor's state-machine style in `claude_code/circuit_breaker.rs`
//! but count-based rather than timeout-based, per the contract's fixed thresholds.

use std::collections::HashMap;

use tracing::warn;

use crate::constants::{
    GLOBAL_ARTIFACTS_PER_HOUR, GLOBAL_MUTATIONS_PER_HOUR, GLOBAL_SPAWN_PER_HOUR,
    MISSION_COOLDOWN_SECS, MISSION_FAILURE_LIMIT, MISSION_IMMEDIATE_EXEC_LIMIT,
};
use crate::error::Result;
use crate::models::{ArtifactType, MissionId, MissionStatus, Producer, Provenance};
use crate::state::StateStore;

/// Records a mission failure; trips the mission to `locked` once `failureCount`
/// reaches the limit, writing a `circuit_breaker_trip` artifact and a labeled
/// snapshot first.
pub async fn record_mission_failure(store: &StateStore, mission_id: &MissionId) -> Result<()> {
    let mission = store
        .update_mission(mission_id, "circuit_breaker.record_failure", |mission| {
            mission.failure_count += 1;
            mission.last_failure_at = Some(chrono::Utc::now());
            mission.cooldown_until = Some(chrono::Utc::now() + chrono::Duration::seconds(MISSION_COOLDOWN_SECS));
            Ok(())
        })
        .await?;

    if mission.failure_count >= MISSION_FAILURE_LIMIT {
        trip_mission(store, mission_id, "failure_count_exceeded").await?;
    }
    Ok(())
}

/// Records an immediate-exec attempt; trips the mission once
/// `immediateExecCount` reaches the limit.
pub async fn record_immediate_exec(store: &StateStore, mission_id: &MissionId) -> Result<()> {
    let mission = store
        .update_mission(mission_id, "circuit_breaker.record_immediate_exec", |mission| {
            mission.immediate_exec_count += 1;
            Ok(())
        })
        .await?;

    if mission.immediate_exec_count >= MISSION_IMMEDIATE_EXEC_LIMIT {
        trip_mission(store, mission_id, "immediate_exec_count_exceeded").await?;
    }
    Ok(())
}

async fn trip_mission(store: &StateStore, mission_id: &MissionId, reason: &str) -> Result<()> {
    store.write_labeled_snapshot("locked").await?;

    store
        .update_mission(mission_id, "circuit_breaker.trip", |mission| {
            mission.status = MissionStatus::Locked;
            mission.locked_reason = Some(reason.to_string());
            Ok(())
        })
        .await?;

    let mut payload = HashMap::new();
    payload.insert("reason".to_string(), serde_json::json!(reason));
    store
        .add_artifact(crate::models::Artifact::new(
            mission_id.clone(),
            None,
            ArtifactType::CircuitBreakerTrip,
            format!("circuit breaker tripped: {reason}"),
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

    warn!(mission_id = %mission_id, reason, "mission circuit breaker tripped");
    Ok(())
}

/// Checks and, if breached, trips the global breaker. Called after every
/// mutation-counting event (spawn, artifact creation, generic mutation).
pub async fn check_global_thresholds(store: &StateStore) -> Result<()> {
    let spawn_count = store.hourly_spawn_count().await;
    let mutation_count = store.hourly_mutation_count().await;

    if spawn_count >= GLOBAL_SPAWN_PER_HOUR || mutation_count >= GLOBAL_MUTATIONS_PER_HOUR {
        store
            .mutate_global("circuit_breaker.trip_global", |global| {
                global.global_breaker.tripped = true;
                global.global_breaker.tripped_reason = Some("global hourly threshold exceeded".into());
                global.global_breaker.tripped_at = Some(chrono::Utc::now());
                Ok(())
            })
            .await?;
    }
    Ok(())
}

/// `unlock`: the only way to leave `locked`. Requires the caller to already have
/// recorded an `approval_record` artifact with `approvedBy` set; resets
/// per-mission counters only.
pub async fn unlock_mission(store: &StateStore, mission_id: &MissionId, unlocked_by: &str) -> Result<()> {
    store
        .update_mission(mission_id, "circuit_breaker.unlock", |mission| {
            if mission.status != MissionStatus::Locked {
                return Err(crate::error::MissionControlError::InvalidTransition {
                    from: format!("{:?}", mission.status),
                    to: "blocked".into(),
                });
            }
            mission.status = MissionStatus::Blocked;
            mission.locked_reason = None;
            mission.failure_count = 0;
            mission.immediate_exec_count = 0;
            mission.cooldown_until = None;
            Ok(())
        })
        .await?;
    tracing::info!(mission_id = %mission_id, unlocked_by, "mission unlocked");
    Ok(())
}

/// Global-breaker artifact threshold check, used by the artifact-creation path
/// before writing (separate from mutation count since artifacts have their own
/// hourly ceiling).
pub fn artifact_ceiling_breached(current_count: usize) -> bool {
    current_count >= GLOBAL_ARTIFACTS_PER_HOUR
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::*;
    use tempfile::tempdir;

    fn sample_contract() -> MissionContract {
        MissionContract {
            required_artifacts: vec![],
            verification_checks: vec![],
            risk_level: RiskLevel::Low,
            allowed_tools: vec![ToolGlob("*".into())],
            completion_gate: "artifacts".into(),
            max_estimated_cost: None,
            max_cost_per_hour: None,
            trigger_source: TriggerSource::Manual,
            execution_authority: ExecutionAuthority::ClaudeCode,
            execution_mode: ExecutionMode::RecipeOnly,
            bootstrap_artifact_id: None,
        }
    }

    #[tokio::test]
    async fn third_failure_trips_mission_to_locked() {
        let dir = tempdir().unwrap();
        let store = StateStore::open(dir.path()).await.unwrap();
        let mission = Mission::new("m".into(), "d".into(), MissionClass::Implementation, sample_contract());
        let id = mission.id.clone();
        store.create_mission(mission).await.unwrap();

        for _ in 0..3 {
            record_mission_failure(&store, &id).await.unwrap();
        }

        let mission = store.get_mission(&id).await.unwrap();
        assert_eq!(mission.status, MissionStatus::Locked);
        let artifacts = store.list_artifacts_for_mission(&id).await;
        assert!(artifacts
            .iter()
            .any(|a| a.artifact_type == ArtifactType::CircuitBreakerTrip));
    }

    #[tokio::test]
    async fn unlock_resets_counters_and_requires_locked_state() {
        let dir = tempdir().unwrap();
        let store = StateStore::open(dir.path()).await.unwrap();
        let mission = Mission::new("m".into(), "d".into(), MissionClass::Implementation, sample_contract());
        let id = mission.id.clone();
        store.create_mission(mission).await.unwrap();

        assert!(unlock_mission(&store, &id, "human").await.is_err());

        for _ in 0..3 {
            record_mission_failure(&store, &id).await.unwrap();
        }
        unlock_mission(&store, &id, "human").await.unwrap();
        let mission = store.get_mission(&id).await.unwrap();
        assert_eq!(mission.status, MissionStatus::Blocked);
        assert_eq!(mission.failure_count, 0);
    }
}
