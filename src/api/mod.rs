//! `[AMBIENT]` 4.M HTTP transport binding. One POST route per RPC group plus
//! `/tools/list` and `/health`. Handlers here only (de)serialize and map status
//! codes; all behavior lives in the Tool Router.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::router::{ToolCall, ToolResponse, ToolRouter, TOOL_NAMES};

const SERVICE_NAME: &str = "mission-control";
const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Clone)]
pub struct ApiServer {
    router: Arc<ToolRouter>,
}

impl ApiServer {
    pub fn new(router: Arc<ToolRouter>) -> Self {
        Self { router }
    }

    pub fn into_router(self) -> Router {
        Router::new()
            .route("/health", get(health_check))
            .route("/tools/list", get(tools_list))
            .route("/mission", post(dispatch))
            .route("/task", post(dispatch))
            .route("/artifact", post(dispatch))
            .route("/agent", post(dispatch))
            .route("/approval", post(dispatch))
            .route("/state", post(dispatch))
            .route("/selfheal", post(dispatch))
            .route("/watchdog", post(dispatch))
            .route("/provider", post(dispatch))
            .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive()))
            .with_state(self)
    }
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "healthy", "service": SERVICE_NAME, "version": SERVICE_VERSION }))
}

async fn tools_list() -> Json<Value> {
    Json(json!({ "tools": TOOL_NAMES }))
}

fn status_for(response: &ToolResponse) -> StatusCode {
    if response.ok {
        return StatusCode::OK;
    }
    match response.code {
        Some("NOT_FOUND") => StatusCode::NOT_FOUND,
        Some("VALIDATION_ERROR") | Some("DEPENDENCY_NOT_MET") => StatusCode::BAD_REQUEST,
        Some("TOOL_NOT_ALLOWED") | Some("EXECUTION_VIOLATION") | Some("MODE_LOCK_VIOLATION") => StatusCode::FORBIDDEN,
        Some("APPROVAL_REQUIRED") | Some("MISSION_LOCKED") | Some("CIRCUIT_BREAKER_TRIPPED") => StatusCode::CONFLICT,
        Some("RATE_EXCEEDED") | Some("QUOTA_EXCEEDED") | Some("COST_EXCEEDED") => StatusCode::TOO_MANY_REQUESTS,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn dispatch(State(api): State<ApiServer>, Json(call): Json<ToolCall>) -> (StatusCode, Json<ToolResponse>) {
    let response = api.router.dispatch(call).await;
    (status_for(&response), Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::RateLimitRegistry;
    use crate::state::StateStore;
    use tempfile::tempdir;
    use tower::ServiceExt;

    #[tokio::test]
    async fn health_check_reports_service_name() {
        let dir = tempdir().unwrap();
        let store = Arc::new(StateStore::open(dir.path()).await.unwrap());
        let router = Arc::new(ToolRouter::new(store, Arc::new(RateLimitRegistry::new())));
        let app = ApiServer::new(router).into_router();

        let response = app
            .oneshot(axum::http::Request::builder().uri("/health").body(axum::body::Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
