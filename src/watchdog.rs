//! Component J: the watchdog. A single-threaded ticking loop with pluggable
//! signal sources. Observes only — it may create missions and approvals but
//! never spawns agents, applies fixes, or calls destructive tools.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::constants::DEFAULT_HEARTBEAT_INTERVAL_SECS;
use crate::error::Result;
use crate::execution::HybridExecutor;
use crate::models::{
    ArtifactType, Mission, MissionClass, MissionContract, Producer, Provenance, RiskLevel,
    ToolGlob, TriggerSource,
};
use crate::state::StateStore;

/// `{source, threshold, pollInterval, missionTemplate, enabled}`: a registered
/// signal watch. `poll_interval_secs` is informational here since the loop
/// itself ticks at a single global interval and checks each signal's due time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalWatch {
    pub source: String,
    pub threshold: f64,
    pub poll_interval_secs: i64,
    pub mission_template: MissionTemplate,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissionTemplate {
    pub name: String,
    pub description: String,
    pub mission_class: MissionClass,
    pub risk_level: RiskLevel,
    pub allowed_tools: Vec<String>,
    pub completion_gate: String,
}

/// Reads a signal's current value; implemented by whatever external polling
/// backs a given `source` (provider health, traffic metrics, rank trackers).
#[async_trait::async_trait]
pub trait SignalSource: Send + Sync {
    async fn read(&self, source: &str) -> Result<f64>;
}

const MAX_HEAL_ATTEMPTS: u32 = 5;

pub struct Watchdog {
    store: Arc<StateStore>,
    signals: Vec<SignalWatch>,
    signal_source: Arc<dyn SignalSource>,
    heal_attempts: HashMap<String, u32>,
}

impl Watchdog {
    pub fn new(store: Arc<StateStore>, signals: Vec<SignalWatch>, signal_source: Arc<dyn SignalSource>) -> Self {
        Self {
            store,
            signals,
            signal_source,
            heal_attempts: HashMap::new(),
        }
    }

    /// Runs one observation pass: heartbeat check, then signal polling.
    pub async fn tick(&mut self) -> Result<()> {
        let executor = HybridExecutor::new(self.store.clone(), std::path::PathBuf::from("."));
        executor
            .apply_heartbeat_transitions(DEFAULT_HEARTBEAT_INTERVAL_SECS)
            .await?;

        for watch in self.signals.clone() {
            if !watch.enabled {
                continue;
            }
            if let Err(err) = self.poll_signal(&watch).await {
                warn!(source = %watch.source, error = %err, "signal poll failed");
            }
        }
        Ok(())
    }

    async fn poll_signal(&mut self, watch: &SignalWatch) -> Result<()> {
        let value = self.signal_source.read(&watch.source).await?;
        if value < watch.threshold {
            return Ok(());
        }

        let attempts = self.heal_attempts.entry(watch.source.clone()).or_insert(0);
        *attempts += 1;
        if *attempts > MAX_HEAL_ATTEMPTS {
            warn!(source = %watch.source, "heal attempt ceiling reached, needs review");
            return Ok(());
        }

        let mission = self.create_mission_from_template(&watch.mission_template, &watch.source, value).await?;
        info!(mission_id = %mission.id, source = %watch.source, value, "watchdog created mission from template");
        Ok(())
    }

    async fn create_mission_from_template(
        &self,
        template: &MissionTemplate,
        source: &str,
        observed_value: f64,
    ) -> Result<Mission> {
        let contract = MissionContract {
            required_artifacts: vec!["verification_report".into()],
            verification_checks: vec![],
            risk_level: template.risk_level,
            allowed_tools: template.allowed_tools.iter().cloned().map(ToolGlob).collect(),
            completion_gate: template.completion_gate.clone(),
            max_estimated_cost: None,
            max_cost_per_hour: None,
            trigger_source: TriggerSource::Watchdog,
            // Watchdog-created missions default to CLAUDE_CODE execution authority
            // when the template doesn't pin one.
            execution_authority: crate::models::ExecutionAuthority::ClaudeCode,
            execution_mode: crate::models::ExecutionMode::RecipeOnly,
            bootstrap_artifact_id: None,
        };

        let mission = Mission::new(template.name.clone(), template.description.clone(), template.mission_class, contract);
        let mission = self.store.create_mission(mission).await?;

        let mut payload = HashMap::new();
        payload.insert("source".to_string(), serde_json::json!(source));
        payload.insert("observedValue".to_string(), serde_json::json!(observed_value));
        self.store
            .add_artifact(crate::models::Artifact::new(
                mission.id.clone(),
                None,
                ArtifactType::SignalReport,
                format!("signal {source} breached threshold"),
                payload,
                vec![],
                Provenance {
                    producer: Producer::Watchdog,
                    agent_id: None,
                    worktree: None,
                    commit_hash: None,
                },
            ))
            .await?;

        Ok(mission)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::*;
    use tempfile::tempdir;

    struct FixedSignal(f64);

    #[async_trait::async_trait]
    impl SignalSource for FixedSignal {
        async fn read(&self, _source: &str) -> Result<f64> {
            Ok(self.0)
        }
    }

    fn watch(threshold: f64) -> SignalWatch {
        SignalWatch {
            source: "provider.health".into(),
            threshold,
            poll_interval_secs: 60,
            mission_template: MissionTemplate {
                name: "auto-recover".into(),
                description: "signal breach".into(),
                mission_class: MissionClass::Maintenance,
                risk_level: RiskLevel::Low,
                allowed_tools: vec!["agent.*".into()],
                completion_gate: "artifacts".into(),
            },
            enabled: true,
        }
    }

    #[tokio::test]
    async fn signal_breach_creates_mission_with_watchdog_authority_default() {
        let dir = tempdir().unwrap();
        let store = Arc::new(StateStore::open(dir.path()).await.unwrap());
        let mut watchdog = Watchdog::new(store.clone(), vec![watch(0.5)], Arc::new(FixedSignal(0.9)));

        watchdog.tick().await.unwrap();

        let missions = store.list_missions().await;
        assert_eq!(missions.len(), 1);
        assert_eq!(missions[0].contract.trigger_source, TriggerSource::Watchdog);
        assert_eq!(missions[0].contract.execution_authority, ExecutionAuthority::ClaudeCode);
    }

    #[tokio::test]
    async fn signal_below_threshold_creates_nothing() {
        let dir = tempdir().unwrap();
        let store = Arc::new(StateStore::open(dir.path()).await.unwrap());
        let mut watchdog = Watchdog::new(store.clone(), vec![watch(0.5)], Arc::new(FixedSignal(0.1)));

        watchdog.tick().await.unwrap();
        assert!(store.list_missions().await.is_empty());
    }

    #[tokio::test]
    async fn heal_attempt_ceiling_stops_recreating_missions() {
        let dir = tempdir().unwrap();
        let store = Arc::new(StateStore::open(dir.path()).await.unwrap());
        let mut watchdog = Watchdog::new(store.clone(), vec![watch(0.5)], Arc::new(FixedSignal(0.9)));

        for _ in 0..(MAX_HEAL_ATTEMPTS + 2) {
            watchdog.tick().await.unwrap();
        }
        assert_eq!(store.list_missions().await.len() as u32, MAX_HEAL_ATTEMPTS);
    }
}
