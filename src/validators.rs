//! Component C: pure validation functions over the data model. None of these
//! functions touch the state store directly; they take the data they need as
//! arguments and return a typed `Result`, so they are trivially unit-testable.

use std::collections::HashSet;

use crate::error::{MissionControlError, Result};
use crate::models::{
    Artifact, ArtifactAppend, ArtifactMode, CircuitBreaker, ExecutionAuthority, Mission,
    MissionClass, MissionContract, MissionStatus,
};

/// Required fields present, enums valid, execution authority/mode set.
pub fn validate_mission_contract(contract: &MissionContract) -> Result<()> {
    if contract.required_artifacts.is_empty() && contract.completion_gate == "artifacts" {
        // exploration missions legitimately have no required artifacts; this only
        // flags a contract that claims the artifacts gate but lists nothing to gate.
    }
    if contract.allowed_tools.is_empty() {
        return Err(MissionControlError::Validation {
            message: "mission contract must specify at least one allowed tool".into(),
        });
    }
    if contract.completion_gate != "artifacts" {
        return Err(MissionControlError::Validation {
            message: format!("unsupported completion gate: {}", contract.completion_gate),
        });
    }
    Ok(())
}

pub fn validate_status_transition<S>(from: S, to: S, is_valid: impl Fn(S, S) -> bool) -> Result<()>
where
    S: std::fmt::Debug + Copy,
{
    if is_valid(from, to) {
        Ok(())
    } else {
        Err(MissionControlError::InvalidTransition {
            from: format!("{from:?}"),
            to: format!("{to:?}"),
        })
    }
}

/// `validateArtifact(data)`: type in closed set is enforced by the `ArtifactType`
/// enum itself at deserialization time; this checks the remaining mandatory fields.
pub fn validate_artifact(artifact: &Artifact) -> Result<()> {
    if artifact.label.trim().is_empty() {
        return Err(MissionControlError::Validation {
            message: "artifact label must not be empty".into(),
        });
    }
    Ok(())
}

/// `immutable` -> always fails; `append-only` -> patch keys must be a subset of
/// {payload, files} and must never overwrite an existing payload key with a
/// different value.
pub fn validate_artifact_update(existing: &Artifact, patch: &ArtifactAppend) -> Result<()> {
    if existing.artifact_mode == ArtifactMode::Immutable {
        return Err(MissionControlError::ImmutableViolation {
            artifact_id: existing.id.to_string(),
        });
    }
    for (key, value) in &patch.payload {
        if let Some(existing_value) = existing.payload.get(key) {
            if existing_value != value {
                return Err(MissionControlError::AppendOnlyViolation {
                    artifact_id: existing.id.to_string(),
                    key: key.clone(),
                });
            }
        }
    }
    Ok(())
}

/// For non-exploration missions, every `requiredArtifacts` type must appear at
/// least once among the mission's artifacts.
pub fn validate_artifact_gate(mission: &Mission, artifacts: &[&Artifact]) -> Result<()> {
    if mission.mission_class == MissionClass::Exploration {
        return Ok(());
    }
    let present: HashSet<&str> = artifacts.iter().map(|a| a.artifact_type.as_str()).collect();
    let missing: Vec<String> = mission
        .contract
        .required_artifacts
        .iter()
        .filter(|req| !present.iter().any(|p| p.eq_ignore_ascii_case(req)))
        .cloned()
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(MissionControlError::CompletionBlocked {
            missing_artifacts: missing,
        })
    }
}

/// Combines the breaker check, the artifact gate, the destructive-approval
/// presence check, and (for `CLAUDE_CODE` authority) the bootstrap-artifact
/// presence check.
pub fn validate_completion(
    mission: &Mission,
    artifacts: &[&Artifact],
    breaker: &CircuitBreaker,
) -> Result<()> {
    if mission.is_locked() || breaker.tripped {
        return Err(MissionControlError::MissionLocked {
            mission_id: mission.id.to_string(),
        });
    }

    validate_artifact_gate(mission, artifacts)?;

    if mission.is_destructive() {
        let has_human_approval = artifacts.iter().any(|a| {
            matches!(a.artifact_type, crate::models::ArtifactType::ApprovalRecord)
                && a.provenance.producer == crate::models::Producer::Human
        });
        let has_preflight = artifacts
            .iter()
            .any(|a| matches!(a.artifact_type, crate::models::ArtifactType::PreFlightSnapshot));
        if !has_human_approval || !has_preflight {
            return Err(MissionControlError::CompletionBlocked {
                missing_artifacts: vec!["approval_record".into(), "pre_flight_snapshot".into()],
            });
        }
    }

    if mission.contract.execution_authority == ExecutionAuthority::ClaudeCode {
        let has_bootstrap = artifacts
            .iter()
            .any(|a| matches!(a.artifact_type, crate::models::ArtifactType::Bootstrap));
        if !has_bootstrap {
            return Err(MissionControlError::CompletionBlocked {
                missing_artifacts: vec!["bootstrap".into()],
            });
        }
    }

    if mission.status == MissionStatus::Locked {
        return Err(MissionControlError::MissionLocked {
            mission_id: mission.id.to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::*;
    use std::collections::HashMap;

    fn contract(required: Vec<&str>, authority: ExecutionAuthority) -> MissionContract {
        MissionContract {
            required_artifacts: required.into_iter().map(String::from).collect(),
            verification_checks: vec![],
            risk_level: RiskLevel::Low,
            allowed_tools: vec![ToolGlob("*".into())],
            completion_gate: "artifacts".into(),
            max_estimated_cost: None,
            max_cost_per_hour: None,
            trigger_source: TriggerSource::Manual,
            execution_authority: authority,
            execution_mode: ExecutionMode::RecipeOnly,
            bootstrap_artifact_id: None,
        }
    }

    fn artifact(mission_id: MissionId, artifact_type: ArtifactType, producer: Producer) -> Artifact {
        Artifact::new(
            mission_id,
            None,
            artifact_type,
            "label".into(),
            HashMap::new(),
            vec![],
            Provenance {
                producer,
                agent_id: None,
                worktree: None,
                commit_hash: None,
            },
        )
    }

    #[test]
    fn completion_gate_reports_missing_artifact_types() {
        let mission = Mission::new(
            "m".into(),
            "d".into(),
            MissionClass::Implementation,
            contract(vec!["git_diff", "verification_report"], ExecutionAuthority::Desktop),
        );
        let git_diff = artifact(mission.id.clone(), ArtifactType::GitDiff, Producer::Agent);
        let err = validate_artifact_gate(&mission, &[&git_diff]).unwrap_err();
        match err {
            MissionControlError::CompletionBlocked { missing_artifacts } => {
                assert_eq!(missing_artifacts, vec!["verification_report".to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn destructive_mission_requires_human_approval_and_preflight() {
        let mut mission = Mission::new(
            "m".into(),
            "d".into(),
            MissionClass::Destructive,
            contract(vec![], ExecutionAuthority::Desktop),
        );
        mission.status = MissionStatus::NeedsReview;
        let breaker = CircuitBreaker::default();
        let err = validate_completion(&mission, &[], &breaker).unwrap_err();
        assert!(matches!(err, MissionControlError::CompletionBlocked { .. }));

        let approval = artifact(mission.id.clone(), ArtifactType::ApprovalRecord, Producer::Human);
        let preflight = artifact(mission.id.clone(), ArtifactType::PreFlightSnapshot, Producer::System);
        validate_completion(&mission, &[&approval, &preflight], &breaker).unwrap();
    }

    #[test]
    fn claude_code_authority_requires_bootstrap_artifact() {
        let mut mission = Mission::new(
            "m".into(),
            "d".into(),
            MissionClass::Implementation,
            contract(vec![], ExecutionAuthority::ClaudeCode),
        );
        mission.status = MissionStatus::NeedsReview;
        let breaker = CircuitBreaker::default();
        let err = validate_completion(&mission, &[], &breaker).unwrap_err();
        assert!(matches!(err, MissionControlError::CompletionBlocked { .. }));

        let bootstrap = artifact(mission.id.clone(), ArtifactType::Bootstrap, Producer::System);
        validate_completion(&mission, &[&bootstrap], &breaker).unwrap();
    }

    #[test]
    fn append_only_patch_cannot_overwrite_existing_key_with_different_value() {
        let mut existing = artifact(MissionId::generate(), ArtifactType::RuntimeLog, Producer::Agent);
        existing.payload.insert("lines".into(), serde_json::json!(3));
        let mut patch = ArtifactAppend::default();
        patch.payload.insert("lines".into(), serde_json::json!(4));
        let err = validate_artifact_update(&existing, &patch).unwrap_err();
        assert!(matches!(err, MissionControlError::AppendOnlyViolation { .. }));
    }

    #[test]
    fn immutable_artifacts_reject_any_update() {
        let existing = artifact(MissionId::generate(), ArtifactType::GitDiff, Producer::Agent);
        let patch = ArtifactAppend::default();
        let err = validate_artifact_update(&existing, &patch).unwrap_err();
        assert!(matches!(err, MissionControlError::ImmutableViolation { .. }));
    }
}
