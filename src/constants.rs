//! System-wide configuration values with fixed defaults from the contract.

/// Per-mission failure count ceiling before the breaker trips the mission to `locked`.
pub const MISSION_FAILURE_LIMIT: u32 = 3;

/// Per-mission immediate-exec count ceiling.
pub const MISSION_IMMEDIATE_EXEC_LIMIT: u32 = 3;

/// Cooldown between immediate spawns on the same mission, and after a failure.
pub const MISSION_COOLDOWN_SECS: i64 = 60;

/// Global hourly spawn ceiling.
pub const GLOBAL_SPAWN_PER_HOUR: usize = 10;

/// Global hourly artifact-creation ceiling.
pub const GLOBAL_ARTIFACTS_PER_HOUR: usize = 100;

/// Global hourly mutation ceiling.
pub const GLOBAL_MUTATIONS_PER_HOUR: usize = 500;

/// Fraction of the global hourly mutation ceiling at which the router starts
/// rejecting non-read calls with `RATE_EXCEEDED` ahead of an outright breaker trip.
pub const MUTATION_BACKPRESSURE_THRESHOLD: f64 = 0.9;

/// Default agent heartbeat interval in seconds (`N` in the 2N/5N stale/dead rule).
pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: i64 = 30;

/// Provider rate-limit backoff schedule: 1,2,4,8,...,60s capped, 3 retries max.
pub const BACKOFF_BASE_MS: u64 = 1000;
pub const BACKOFF_CAP_MS: u64 = 60_000;
pub const BACKOFF_MAX_RETRIES: u32 = 3;

/// Quota usage fraction at which a provider enters `warning` status.
pub const QUOTA_WARNING_THRESHOLD: f64 = 0.8;

/// Maximum snapshots retained on disk before the oldest are pruned (implementation
/// detail; the spec requires snapshots be retained but does not mandate unbounded
/// growth).
pub const MAX_RETAINED_SNAPSHOTS: usize = 500;
