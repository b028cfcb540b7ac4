//! Error taxonomy for the control plane.
//!
//! Every variant maps to a stable `code()` string used both in the Tool Router's
//! `{ok:false, code, message, ...}` envelope and in audit records. `Io` and
//! `Serialization` are the only variants with no operator-facing code; they only ever
//! surface from Persistence and are handled by `main` as a startup failure.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, MissionControlError>;

#[derive(Error, Debug)]
pub enum MissionControlError {
    #[error("validation failed: {message}")]
    Validation { message: String },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("dependency not met: {task_id} depends on incomplete {dep_id}")]
    DependencyNotMet { task_id: String, dep_id: String },

    #[error("completion blocked: missing artifacts {missing_artifacts:?}")]
    CompletionBlocked { missing_artifacts: Vec<String> },

    #[error("tool not allowed: {tool}")]
    ToolNotAllowed { tool: String },

    #[error("approval required: {approval_id}")]
    ApprovalRequired { approval_id: String },

    #[error("execution violation: {attempted_tool} requires {required_authority}")]
    ExecutionViolation {
        attempted_tool: String,
        required_authority: String,
    },

    #[error("mode lock violation: {attempted_tool} not permitted in current execution mode")]
    ModeLockViolation { attempted_tool: String },

    #[error("rate exceeded for provider {provider}, retry after {retry_after_ms}ms")]
    RateExceeded {
        provider: String,
        retry_after_ms: u64,
    },

    #[error("quota exceeded for provider {provider}")]
    QuotaExceeded { provider: String },

    #[error("cost exceeded: estimated {estimated}, limit {limit}")]
    CostExceeded { estimated: f64, limit: f64 },

    #[error("circuit breaker tripped: {reason}")]
    CircuitBreakerTripped { reason: String },

    #[error("mission {mission_id} is locked")]
    MissionLocked { mission_id: String },

    #[error("immutable artifact {artifact_id} cannot be modified")]
    ImmutableViolation { artifact_id: String },

    #[error("append-only artifact {artifact_id} rejected patch key {key}")]
    AppendOnlyViolation { artifact_id: String, key: String },

    #[error("duplicate self-heal proposal for key {self_heal_key}")]
    DuplicateHeal { self_heal_key: String },

    #[error("self-heal policy {policy_class} has been revoked")]
    PolicyRevoked { policy_class: String },

    #[error("resume is ambiguous for mission {mission_id}")]
    AmbiguousResume { mission_id: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl MissionControlError {
    /// Stable taxonomy code, as used in the RPC error envelope and audit records.
    pub fn code(&self) -> &'static str {
        use MissionControlError::*;
        match self {
            Validation { .. } => "VALIDATION_ERROR",
            NotFound { .. } => "NOT_FOUND",
            InvalidTransition { .. } => "INVALID_TRANSITION",
            DependencyNotMet { .. } => "DEPENDENCY_NOT_MET",
            CompletionBlocked { .. } => "COMPLETION_BLOCKED",
            ToolNotAllowed { .. } => "TOOL_NOT_ALLOWED",
            ApprovalRequired { .. } => "APPROVAL_REQUIRED",
            ExecutionViolation { .. } => "EXECUTION_VIOLATION",
            ModeLockViolation { .. } => "MODE_LOCK_VIOLATION",
            RateExceeded { .. } => "RATE_EXCEEDED",
            QuotaExceeded { .. } => "QUOTA_EXCEEDED",
            CostExceeded { .. } => "COST_EXCEEDED",
            CircuitBreakerTripped { .. } => "CIRCUIT_BREAKER_TRIPPED",
            MissionLocked { .. } => "MISSION_LOCKED",
            ImmutableViolation { .. } => "IMMUTABLE_VIOLATION",
            AppendOnlyViolation { .. } => "APPEND_ONLY_VIOLATION",
            DuplicateHeal { .. } => "DUPLICATE_HEAL",
            PolicyRevoked { .. } => "POLICY_REVOKED",
            AmbiguousResume { .. } => "AMBIGUOUS_RESUME",
            Cancelled => "CANCELLED",
            Io(_) => "IO_ERROR",
            Serialization(_) => "SERIALIZATION_ERROR",
            Config(_) => "CONFIG_ERROR",
        }
    }

    /// True for gate/authority rejections that must be persisted as `outcome: blocked`
    /// audit records rather than a plain validation failure.
    pub fn is_blocked_outcome(&self) -> bool {
        use MissionControlError::*;
        matches!(
            self,
            ToolNotAllowed { .. }
                | ApprovalRequired { .. }
                | ExecutionViolation { .. }
                | ModeLockViolation { .. }
                | RateExceeded { .. }
                | QuotaExceeded { .. }
                | CostExceeded { .. }
                | CircuitBreakerTripped { .. }
                | MissionLocked { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable_strings() {
        let err = MissionControlError::MissionLocked {
            mission_id: "mission-1".into(),
        };
        assert_eq!(err.code(), "MISSION_LOCKED");
        assert!(err.is_blocked_outcome());
    }

    #[test]
    fn validation_errors_are_not_blocked_outcomes() {
        let err = MissionControlError::Validation {
            message: "bad".into(),
        };
        assert!(!err.is_blocked_outcome());
    }
}
