//! Layered configuration loading: defaults, then an optional `config.toml`, then
//! `MISSION_CONTROL_`-prefixed environment variables, preceded by an early `.env`
//! load via `dotenvy`.
//!
//! Per the external-interfaces contract, only the bind address, the state root path,
//! and optional provider credential *references* (environment variable names, never
//! raw secrets) are configurable — no flag here changes request-handling behavior
//! that isn't already described by the schema in this module.

use crate::error::{MissionControlError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;


#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Address the HTTP transport (§4.M) binds to.
    pub bind_address: String,
    /// Root directory for `state/`, `state/snapshots/`, `state/audit/`.
    pub state_root: PathBuf,
    /// Heartbeat interval (seconds) used to derive the stale (2N) / dead (5N) agent
    /// thresholds.
    pub heartbeat_interval_secs: i64,
    /// Default risk threshold gating armed-mode immediate execution.
    pub risk_threshold: String,
    /// Provider name -> environment variable name holding its credential. The
    /// credential value itself is never read into this struct; providers resolve it
    /// lazily from the named variable.
    #[serde(default)]
    pub provider_credential_refs: HashMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:7878".to_string(),
            state_root: PathBuf::from("./state"),
            heartbeat_interval_secs: 30,
            risk_threshold: "medium".to_string(),
            provider_credential_refs: HashMap::new(),
        }
    }
}

impl Config {
    /// Loads configuration. A missing or unparseable required value is a
    /// configuration error (exit code 2 per §6), never a panic.
    pub fn load() -> Result<Self> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::info!("loaded .env file from {:?}", path),
            Err(_) => tracing::debug!("no .env file found; continuing with process environment"),
        }

        let defaults = Config::default();

        let builder = config::Config::builder()
            .set_default("bind_address", defaults.bind_address.clone())
            .map_err(MissionControlError::Config)?
            .set_default("state_root", defaults.state_root.to_string_lossy().to_string())
            .map_err(MissionControlError::Config)?
            .set_default("heartbeat_interval_secs", defaults.heartbeat_interval_secs)
            .map_err(MissionControlError::Config)?
            .set_default("risk_threshold", defaults.risk_threshold.clone())
            .map_err(MissionControlError::Config)?
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("MISSION_CONTROL")
                    .separator("_")
                    .try_parsing(true),
            );

        let raw = builder.build().map_err(MissionControlError::Config)?;

        let bind_address: String = raw
            .get_string("bind_address")
            .map_err(MissionControlError::Config)?;
        let state_root: String = raw
            .get_string("state_root")
            .map_err(MissionControlError::Config)?;
        let heartbeat_interval_secs: i64 = raw
            .get_int("heartbeat_interval_secs")
            .map_err(MissionControlError::Config)?;
        let risk_threshold: String = raw
            .get_string("risk_threshold")
            .map_err(MissionControlError::Config)?;

        if !["low", "medium", "high"].contains(&risk_threshold.as_str()) {
            return Err(MissionControlError::Validation {
                message: format!("risk_threshold must be one of low|medium|high, got {risk_threshold}"),
            });
        }
        if heartbeat_interval_secs <= 0 {
            return Err(MissionControlError::Validation {
                message: "heartbeat_interval_secs must be positive".to_string(),
            });
        }

        let provider_credential_refs = Self::load_provider_credential_refs();

        Ok(Config {
            bind_address,
            state_root: PathBuf::from(state_root),
            heartbeat_interval_secs,
            risk_threshold,
            provider_credential_refs,
        })
    }

    /// Collects `MISSION_CONTROL_PROVIDER_<NAME>_CREDENTIAL_REF` environment
    /// variables into a provider -> env-var-name map. Credential *values* stay in
    /// the process environment and are resolved by provider clients on demand.
    fn load_provider_credential_refs() -> HashMap<String, String> {
        let mut refs = HashMap::new();
        let prefix = "MISSION_CONTROL_PROVIDER_";
        let suffix = "_CREDENTIAL_REF";
        for (key, value) in std::env::vars() {
            if let Some(middle) = key.strip_prefix(prefix).and_then(|k| k.strip_suffix(suffix)) {
                refs.insert(middle.to_lowercase(), value);
            }
        }
        refs
    }
}
