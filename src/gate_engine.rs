//! Component G: the gate engine. Composes the state store, validators, circuit
//! breaker, and rate limiter into a single `validate(tool, args, context)` decision
//! for every tool call, in the exact order the contract specifies.

use std::sync::Arc;

use tracing::warn;

use crate::error::{MissionControlError, Result};
use crate::models::{Approval, Mission, MissionStatus};
use crate::rate_limit::RateLimitRegistry;
use crate::state::StateStore;

/// Tools that only make sense while armed (non-recipe execution, or anything
/// destructive). Mirrors the donor's `validation.rs` style of matching on tool
/// name prefixes rather than a duck-typed registry.
const IMMEDIATE_OR_DESTRUCTIVE_TOOLS: &[&str] = &[
    "agent.spawn_immediate",
    "agent.execute_recipe",
    "selfheal.apply",
];

const DESTRUCTIVE_TOOLS: &[&str] = &["mission.unlock", "selfheal.apply"];

#[derive(Debug, Clone, Default)]
pub struct GateArgs {
    pub estimated_cost: Option<f64>,
    pub hour_spend_so_far: Option<f64>,
    pub provider: Option<String>,
}

pub struct GateEngine {
    store: Arc<StateStore>,
    rate_limits: Arc<RateLimitRegistry>,
}

impl GateEngine {
    pub fn new(store: Arc<StateStore>, rate_limits: Arc<RateLimitRegistry>) -> Self {
        Self { store, rate_limits }
    }

    /// Runs every gate in contract order; the first rejection wins. Persists a
    /// `blocked` audit record for the caller via the Tool Router, not here — this
    /// function is pure decision logic over already-loaded state.
    pub async fn validate(&self, tool: &str, args: &GateArgs, mission: &Mission) -> Result<Option<String>> {
        let global = self.store.global_state().await;

        // 1. breaker tripped
        if mission.status == MissionStatus::Locked || global.global_breaker.tripped {
            warn!(tool, mission_id = %mission.id, "rejected: circuit breaker tripped");
            return Err(MissionControlError::CircuitBreakerTripped {
                reason: mission
                    .locked_reason
                    .clone()
                    .unwrap_or_else(|| "breaker tripped".into()),
            });
        }

        // 2. armed-mode gate
        if IMMEDIATE_OR_DESTRUCTIVE_TOOLS.contains(&tool) {
            let risk_ok = mission.contract.risk_level <= global.risk_threshold;
            if !global.armed_mode || !risk_ok {
                warn!(tool, mission_id = %mission.id, "rejected: armed mode gate");
                return Err(MissionControlError::ToolNotAllowed { tool: tool.to_string() });
            }
        }

        // 3. tool permission
        if !mission.allows_tool(tool) {
            warn!(tool, mission_id = %mission.id, "rejected: tool not in allowedTools");
            return Err(MissionControlError::ToolNotAllowed { tool: tool.to_string() });
        }

        // 4. destructive gate — never auto-approve.
        if mission.is_destructive() || DESTRUCTIVE_TOOLS.contains(&tool) {
            let approval_id = self.require_destructive_approval(mission, tool).await?;
            return Err(MissionControlError::ApprovalRequired {
                approval_id: approval_id.to_string(),
            });
        }

        // 5. cost gate
        if let Some(estimated) = args.estimated_cost {
            if let Some(max) = mission.contract.max_estimated_cost {
                if estimated > max {
                    return Err(MissionControlError::CostExceeded { estimated, limit: max });
                }
            }
            if let (Some(max_hourly), Some(hour_spend)) =
                (mission.contract.max_cost_per_hour, args.hour_spend_so_far)
            {
                if hour_spend + estimated > max_hourly {
                    return Err(MissionControlError::CostExceeded {
                        estimated: hour_spend + estimated,
                        limit: max_hourly,
                    });
                }
            }
        }

        // 6. rate gate
        if let Some(provider) = &args.provider {
            let decision = self.rate_limits.check_rate_limit(provider).await;
            if !decision.allowed {
                return Err(MissionControlError::RateExceeded {
                    provider: provider.clone(),
                    retry_after_ms: decision.retry_after_ms.unwrap_or(1000),
                });
            }
        }

        Ok(None)
    }

    /// Finds an existing pending approval for this mission+tool, or creates one.
    /// Never returns success; a destructive gate hit is always `APPROVAL_REQUIRED`.
    async fn require_destructive_approval(&self, mission: &Mission, tool: &str) -> Result<crate::models::ApprovalId> {
        let pending = self.store.list_pending_approvals().await;
        if let Some(existing) = pending
            .iter()
            .find(|a| a.mission_id == mission.id && a.action == tool)
        {
            return Ok(existing.id.clone());
        }

        let approval = Approval::new(
            mission.id.clone(),
            None,
            tool.to_string(),
            Some(tool.to_string()),
            mission.contract.risk_level,
            None,
        );
        let created = self.store.create_approval(approval).await?;
        Ok(created.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::*;
    use tempfile::tempdir;

    fn contract(authority: ExecutionAuthority, risk: RiskLevel) -> MissionContract {
        MissionContract {
            required_artifacts: vec![],
            verification_checks: vec![],
            risk_level: risk,
            allowed_tools: vec![ToolGlob("agent.*".into())],
            completion_gate: "artifacts".into(),
            max_estimated_cost: Some(10.0),
            max_cost_per_hour: None,
            trigger_source: TriggerSource::Manual,
            execution_authority: authority,
            execution_mode: ExecutionMode::ImmediateOnly,
            bootstrap_artifact_id: None,
        }
    }

    async fn fresh_engine() -> (GateEngine, Arc<StateStore>) {
        let dir = tempdir().unwrap();
        let store = Arc::new(StateStore::open(dir.path()).await.unwrap());
        let rate_limits = Arc::new(RateLimitRegistry::new());
        (GateEngine::new(store.clone(), rate_limits), store)
    }

    #[tokio::test]
    async fn armed_mode_gate_blocks_immediate_tools_when_not_armed() {
        let (engine, store) = fresh_engine().await;
        let mission = Mission::new(
            "m".into(),
            "d".into(),
            MissionClass::Implementation,
            contract(ExecutionAuthority::ClaudeCode, RiskLevel::Low),
        );
        store.create_mission(mission.clone()).await.unwrap();

        let err = engine
            .validate("agent.spawn_immediate", &GateArgs::default(), &mission)
            .await
            .unwrap_err();
        assert!(matches!(err, MissionControlError::ToolNotAllowed { .. }));
    }

    #[tokio::test]
    async fn tool_not_in_allowed_set_is_rejected() {
        let (engine, store) = fresh_engine().await;
        let mission = Mission::new(
            "m".into(),
            "d".into(),
            MissionClass::Implementation,
            contract(ExecutionAuthority::ClaudeCode, RiskLevel::Low),
        );
        store.create_mission(mission.clone()).await.unwrap();

        let err = engine
            .validate("mission.create", &GateArgs::default(), &mission)
            .await
            .unwrap_err();
        assert!(matches!(err, MissionControlError::ToolNotAllowed { .. }));
    }

    #[tokio::test]
    async fn cost_over_mission_ceiling_is_rejected() {
        let (engine, store) = fresh_engine().await;
        store
            .mutate_global("test.arm", |global| {
                global.armed_mode = true;
                Ok(())
            })
            .await
            .unwrap();
        let mission = Mission::new(
            "m".into(),
            "d".into(),
            MissionClass::Implementation,
            contract(ExecutionAuthority::ClaudeCode, RiskLevel::Low),
        );
        store.create_mission(mission.clone()).await.unwrap();

        let args = GateArgs {
            estimated_cost: Some(20.0),
            ..Default::default()
        };
        let err = engine.validate("agent.spawn", &args, &mission).await.unwrap_err();
        assert!(matches!(err, MissionControlError::CostExceeded { .. }));
    }

    #[tokio::test]
    async fn destructive_mission_always_requires_approval() {
        let (engine, store) = fresh_engine().await;
        store
            .mutate_global("test.arm", |global| {
                global.armed_mode = true;
                Ok(())
            })
            .await
            .unwrap();
        let mut c = contract(ExecutionAuthority::ClaudeCode, RiskLevel::Low);
        c.allowed_tools = vec![ToolGlob("*".into())];
        let mission = Mission::new("m".into(), "d".into(), MissionClass::Destructive, c);
        store.create_mission(mission.clone()).await.unwrap();

        let err = engine.validate("agent.spawn", &GateArgs::default(), &mission).await.unwrap_err();
        assert!(matches!(err, MissionControlError::ApprovalRequired { .. }));

        // second call returns the same pending approval, not a duplicate
        let err2 = engine.validate("agent.spawn", &GateArgs::default(), &mission).await.unwrap_err();
        let (MissionControlError::ApprovalRequired { approval_id: id1 }, MissionControlError::ApprovalRequired { approval_id: id2 }) =
            (err, err2)
        else {
            panic!("expected ApprovalRequired");
        };
        assert_eq!(id1, id2);
    }
}
