//! Component L: the Tool Router. Transport-agnostic dispatch of a typed
//! `{tool, args, context}` call through the Delegation Gate, then the Gate
//! Engine, then a handler, returning a typed `{ok, result}` / `{ok:false,
//! code, message, ...}` envelope. Session tracking lives alongside dispatch so
//! every transport (HTTP today) gets resume-on-reconnect for free.

mod handlers;
mod session;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::delegation_gate::{Caller, DelegationGate};
use crate::error::{MissionControlError, Result};
use crate::gate_engine::{GateArgs, GateEngine};
use crate::models::{MissionId, TaskId};
use crate::rate_limit::RateLimitRegistry;
use crate::self_heal::SelfHealEngine;
use crate::state::StateStore;

pub use session::{resume_on_reconnect, SessionTracker};

#[derive(Debug, Clone, Deserialize)]
pub struct CallContext {
    pub caller: Caller,
    pub mission_id: Option<MissionId>,
    pub task_id: Option<TaskId>,
    pub auth_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolCall {
    pub tool: String,
    #[serde(default)]
    pub args: Value,
    pub context: CallContext,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked: Option<bool>,
}

impl ToolResponse {
    fn ok(result: Value) -> Self {
        Self {
            ok: true,
            result: Some(result),
            code: None,
            message: None,
            blocked: None,
        }
    }

    fn err(err: &MissionControlError) -> Self {
        Self {
            ok: false,
            result: None,
            code: Some(err.code()),
            message: Some(err.to_string()),
            blocked: Some(err.is_blocked_outcome()),
        }
    }
}

/// Static discovery list for `tools/list`. One entry per tool the dispatcher
/// actually routes; kept next to the match arms in `handlers` so the two
/// can't drift silently.
pub const TOOL_NAMES: &[&str] = &[
    "mission.create",
    "mission.get",
    "mission.list",
    "mission.get_progress",
    "mission.get_artifacts",
    "mission.update_status",
    "mission.unlock",
    "task.create",
    "task.get",
    "task.list",
    "task.update_status",
    "artifact.create",
    "artifact.get",
    "artifact.list",
    "agent.spawn",
    "agent.spawn_immediate",
    "agent.get",
    "agent.list",
    "agent.heartbeat",
    "approval.approve",
    "approval.reject",
    "approval.list_pending",
    "state.get_snapshot",
    "selfheal.propose",
    "provider.health",
];

pub struct ToolRouter {
    pub store: Arc<StateStore>,
    pub delegation_gate: DelegationGate,
    pub gate_engine: GateEngine,
    pub rate_limits: Arc<RateLimitRegistry>,
    pub self_heal: Arc<SelfHealEngine>,
    pub sessions: SessionTracker,
}

impl ToolRouter {
    pub fn new(store: Arc<StateStore>, rate_limits: Arc<RateLimitRegistry>) -> Self {
        let self_heal = Arc::new(SelfHealEngine::new(store.clone()));
        Self {
            delegation_gate: DelegationGate::new(store.clone()),
            gate_engine: GateEngine::new(store.clone(), rate_limits.clone()),
            rate_limits,
            self_heal,
            sessions: SessionTracker::new(),
            store,
        }
    }

    /// Runs a call end to end: gate → handler → audit. Never panics; every
    /// rejection becomes a typed `ToolResponse`.
    pub async fn dispatch(&self, call: ToolCall) -> ToolResponse {
        self.sessions.record_call(&call).await;

        if let Err(err) = self.run_gates(&call).await {
            warn!(tool = %call.tool, code = err.code(), "call rejected by gate");
            return ToolResponse::err(&err);
        }

        match handlers::handle(self, &call).await {
            Ok(result) => {
                info!(tool = %call.tool, "call dispatched");
                ToolResponse::ok(result)
            }
            Err(err) => {
                warn!(tool = %call.tool, code = err.code(), "handler returned error");
                ToolResponse::err(&err)
            }
        }
    }

    async fn run_gates(&self, call: &ToolCall) -> Result<()> {
        let Some(mission_id) = &call.context.mission_id else {
            // Tools with no mission in scope (mission.create, provider.health) skip
            // both mission-scoped gates; they still pass through the router.
            return Ok(());
        };
        let mission = self
            .store
            .get_mission(mission_id)
            .await
            .ok_or_else(|| MissionControlError::NotFound {
                kind: "mission",
                id: mission_id.to_string(),
            })?;

        self.delegation_gate
            .check(call.context.caller, &call.tool, &mission, call.context.task_id.as_ref())
            .await?;

        self.gate_engine
            .validate(&call.tool, &GateArgs::default(), &mission)
            .await?;

        Ok(())
    }
}
