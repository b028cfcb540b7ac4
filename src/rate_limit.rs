//! Component D: per-provider rate limiting, daily quotas, backoff, and cost estimation.

use chrono::{DateTime, Timelike, Utc};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::constants::{BACKOFF_BASE_MS, BACKOFF_CAP_MS, BACKOFF_MAX_RETRIES, QUOTA_WARNING_THRESHOLD};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateStatus {
    Ok,
    Warning,
    Exceeded,
}

#[derive(Debug, Clone, Serialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub retry_after_ms: Option<u64>,
    pub reason: Option<String>,
}

struct ProviderState {
    limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    daily_quota: u64,
    daily_count: u64,
    daily_reset_day: u32,
    backoff_attempt: u32,
    next_retry_at: Option<DateTime<Utc>>,
}

impl ProviderState {
    fn new(qps: u32, daily_quota: u64) -> Self {
        let quota = Quota::per_second(NonZeroU32::new(qps.max(1)).unwrap());
        Self {
            limiter: Arc::new(RateLimiter::direct(quota)),
            daily_quota,
            daily_count: 0,
            daily_reset_day: Utc::now().ordinal(),
            backoff_attempt: 0,
            next_retry_at: None,
        }
    }

    fn roll_daily_counter_if_needed(&mut self, now: DateTime<Utc>) {
        if now.ordinal() != self.daily_reset_day {
            self.daily_count = 0;
            self.daily_reset_day = now.ordinal();
        }
    }

    fn status(&self) -> RateStatus {
        if self.daily_count >= self.daily_quota {
            RateStatus::Exceeded
        } else if self.daily_quota > 0
            && (self.daily_count as f64 / self.daily_quota as f64) >= QUOTA_WARNING_THRESHOLD
        {
            RateStatus::Warning
        } else {
            RateStatus::Ok
        }
    }
}

/// Owns every provider's token bucket, daily quota, and backoff state.
pub struct RateLimitRegistry {
    providers: RwLock<HashMap<String, ProviderState>>,
}

impl Default for RateLimitRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimitRegistry {
    pub fn new() -> Self {
        Self {
            providers: RwLock::new(HashMap::new()),
        }
    }

    async fn with_provider<F, T>(&self, provider: &str, f: F) -> T
    where
        F: FnOnce(&mut ProviderState) -> T,
    {
        let mut providers = self.providers.write().await;
        let state = providers
            .entry(provider.to_string())
            .or_insert_with(|| ProviderState::new(5, 1000));
        f(state)
    }

    pub async fn status(&self, provider: &str) -> RateStatus {
        self.with_provider(provider, |state| {
            state.roll_daily_counter_if_needed(Utc::now());
            state.status()
        })
        .await
    }

    /// `checkRateLimit(provider)`: decrements the token bucket and increments the
    /// daily counter only when the call is allowed.
    pub async fn check_rate_limit(&self, provider: &str) -> RateLimitDecision {
        let now = Utc::now();
        self.with_provider(provider, |state| {
            state.roll_daily_counter_if_needed(now);

            if let Some(retry_at) = state.next_retry_at {
                if now < retry_at {
                    return RateLimitDecision {
                        allowed: false,
                        retry_after_ms: Some((retry_at - now).num_milliseconds().max(0) as u64),
                        reason: Some("backoff in effect".into()),
                    };
                }
            }

            if state.daily_count >= state.daily_quota {
                return RateLimitDecision {
                    allowed: false,
                    retry_after_ms: None,
                    reason: Some("daily quota exhausted".into()),
                };
            }

            if state.limiter.check().is_err() {
                return RateLimitDecision {
                    allowed: false,
                    retry_after_ms: Some(1000),
                    reason: Some("qps limit reached".into()),
                };
            }

            state.daily_count += 1;
            RateLimitDecision {
                allowed: true,
                retry_after_ms: None,
                reason: None,
            }
        })
        .await
    }

    /// `recordThrottle(provider)`: schedules the next exponential backoff step.
    /// Returns `true` once retries are exhausted, signalling the caller should emit
    /// a `rate_limit_event` artifact.
    pub async fn record_throttle(&self, provider: &str) -> bool {
        self.with_provider(provider, |state| {
            state.backoff_attempt += 1;
            let delay_ms = (BACKOFF_BASE_MS * 2u64.pow(state.backoff_attempt.saturating_sub(1)))
                .min(BACKOFF_CAP_MS);
            state.next_retry_at = Some(Utc::now() + chrono::Duration::milliseconds(delay_ms as i64));
            state.backoff_attempt >= BACKOFF_MAX_RETRIES
        })
        .await
    }

    pub async fn reset_backoff(&self, provider: &str) {
        self.with_provider(provider, |state| {
            state.backoff_attempt = 0;
            state.next_retry_at = None;
        })
        .await;
    }
}

/// Registry mapping model name to its per-1k-token pricing.
#[derive(Debug, Clone)]
pub struct ModelPricing {
    pub input_per_1k: f64,
    pub output_per_1k: f64,
    pub min_billing_unit: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CostEstimate {
    pub min: f64,
    pub max: f64,
    pub confidence: f64,
}

pub fn default_model_pricing() -> HashMap<&'static str, ModelPricing> {
    let mut table = HashMap::new();
    table.insert(
        "claude-opus",
        ModelPricing {
            input_per_1k: 0.015,
            output_per_1k: 0.075,
            min_billing_unit: 0.0001,
        },
    );
    table.insert(
        "claude-sonnet",
        ModelPricing {
            input_per_1k: 0.003,
            output_per_1k: 0.015,
            min_billing_unit: 0.0001,
        },
    );
    table
}

/// `estimateTaskCost(model, inTok, outTok, retries, providerCalls)`: widens the
/// range with retries and per-provider call overhead, narrowing confidence as
/// retries accumulate.
pub fn estimate_task_cost(
    pricing: &ModelPricing,
    input_tokens: u64,
    output_tokens: u64,
    retries: u32,
    provider_calls: &HashMap<String, u32>,
) -> CostEstimate {
    let base = (input_tokens as f64 / 1000.0) * pricing.input_per_1k
        + (output_tokens as f64 / 1000.0) * pricing.output_per_1k;
    let base = base.max(pricing.min_billing_unit);
    let retry_multiplier = 1.0 + retries as f64 * 0.5;
    let provider_overhead: f64 = provider_calls.values().map(|&n| n as f64 * 0.0005).sum();

    let min = base;
    let max = base * retry_multiplier + provider_overhead;
    let confidence = (1.0 - (retries as f64 * 0.15)).clamp(0.1, 1.0);

    CostEstimate { min, max, confidence }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allows_calls_within_quota_and_denies_past_it() {
        let registry = RateLimitRegistry::new();
        registry
            .with_provider("serp", |state| {
                *state = ProviderState::new(1000, 1);
            })
            .await;
        let first = registry.check_rate_limit("serp").await;
        assert!(first.allowed);
        let second = registry.check_rate_limit("serp").await;
        assert!(!second.allowed);
    }

    #[tokio::test]
    async fn backoff_doubles_each_attempt_and_exhausts_after_max_retries() {
        let registry = RateLimitRegistry::new();
        assert!(!registry.record_throttle("serp").await);
        assert!(!registry.record_throttle("serp").await);
        assert!(registry.record_throttle("serp").await);
    }

    #[test]
    fn cost_estimate_widens_with_retries() {
        let pricing = ModelPricing {
            input_per_1k: 0.01,
            output_per_1k: 0.03,
            min_billing_unit: 0.0001,
        };
        let no_retry = estimate_task_cost(&pricing, 1000, 500, 0, &HashMap::new());
        let with_retry = estimate_task_cost(&pricing, 1000, 500, 2, &HashMap::new());
        assert!(with_retry.max > no_retry.max);
        assert!(with_retry.confidence < no_retry.confidence);
    }
}
