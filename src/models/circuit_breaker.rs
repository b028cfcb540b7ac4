use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-mission or global runaway-protection counters. The behavior that trips and
/// resets this lives in [`crate::circuit_breaker`]; this struct is the persisted,
/// serializable state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreaker {
    pub tripped: bool,
    pub tripped_reason: Option<String>,
    pub tripped_at: Option<DateTime<Utc>>,
    pub failure_count: u32,
    pub immediate_exec_count: u32,
    pub locked_until: Option<DateTime<Utc>>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self {
            tripped: false,
            tripped_reason: None,
            tripped_at: None,
            failure_count: 0,
            immediate_exec_count: 0,
            locked_until: None,
        }
    }
}

impl CircuitBreaker {
    pub fn reset(&mut self) {
        *self = CircuitBreaker::default();
    }
}
