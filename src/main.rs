use std::sync::Arc;
use std::time::Duration;

use mission_control::api::ApiServer;
use mission_control::config::Config;
use mission_control::rate_limit::RateLimitRegistry;
use mission_control::router::{resume_on_reconnect, ToolRouter};
use mission_control::state::StateStore;
use mission_control::watchdog::{SignalSource, Watchdog};
use mission_control::Result;
use tracing::{error, info};

struct NoopSignalSource;

#[async_trait::async_trait]
impl SignalSource for NoopSignalSource {
    async fn read(&self, _source: &str) -> Result<f64> {
        Ok(0.0)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::load()?;
    info!(bind_address = %config.bind_address, "starting mission control");

    let store = Arc::new(StateStore::open(&config.state_root).await?);

    let configured_risk_threshold: mission_control::models::RiskLevel =
        config.risk_threshold.parse().map_err(|e: String| anyhow::anyhow!(e))?;
    store
        .mutate_global("config.apply_risk_threshold", |global| {
            global.risk_threshold = configured_risk_threshold;
            Ok(())
        })
        .await?;

    resume_on_reconnect(&store, config.heartbeat_interval_secs).await?;

    let rate_limits = Arc::new(RateLimitRegistry::new());
    let router = Arc::new(ToolRouter::new(store.clone(), rate_limits));

    let app = ApiServer::new(router.clone()).into_router();
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;

    let mut watchdog = Watchdog::new(store.clone(), Vec::new(), Arc::new(NoopSignalSource));
    let heartbeat_interval = Duration::from_secs(config.heartbeat_interval_secs as u64);

    tokio::select! {
        result = axum::serve(listener, app) => {
            if let Err(err) = result {
                error!(error = %err, "http server exited");
            }
        }
        _ = async {
            let mut ticker = tokio::time::interval(heartbeat_interval);
            loop {
                ticker.tick().await;
                if let Err(err) = watchdog.tick().await {
                    error!(error = %err, "watchdog tick failed");
                }
            }
        } => {}
    }

    Ok(())
}
