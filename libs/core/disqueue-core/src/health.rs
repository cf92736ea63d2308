//! Health and admin HTTP surface for a worker process.
//!
//! - Liveness/readiness probes (`/health`, `/healthz`, `/ready`, `/readyz`)
//! - Prometheus scrape endpoint (`/metrics`)
//! - Read-only queue/DLQ introspection (`/queues`, `/dlq/length`)

use axum::{extract::State, http::{header, StatusCode}, response::IntoResponse, routing::get, Json, Router};
use redis::aio::ConnectionManager;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::job_store::JobStore;
use crate::metrics;
use crate::queue::QueueRegistry;

/// Shared state for the health/admin router.
#[derive(Clone)]
pub struct HealthState {
    pub redis: Arc<ConnectionManager>,
    pub job_store: JobStore,
    pub queues: Arc<QueueRegistry>,
    pub app_name: String,
    pub app_version: String,
}

impl HealthState {
    pub fn new(
        redis: Arc<ConnectionManager>,
        job_store: JobStore,
        queues: Arc<QueueRegistry>,
        app_name: impl Into<String>,
        app_version: impl Into<String>,
    ) -> Self {
        Self {
            redis,
            job_store,
            queues,
            app_name: app_name.into(),
            app_version: app_version.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub name: String,
    pub version: String,
}

/// Always returns OK if the process is alive. For Kubernetes liveness probes.
pub async fn health_handler(State(state): State<HealthState>) -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy", name: state.app_name, version: state.app_version })
}

/// Checks broker connectivity with a `PING`. For Kubernetes readiness probes.
pub async fn ready_handler(State(state): State<HealthState>) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let mut conn = (*state.redis).clone();
    let result: Result<String, _> = redis::cmd("PING").query_async(&mut conn).await;

    match result {
        Ok(response) if response == "PONG" => Ok(Json(json!({ "status": "ready" }))),
        Ok(response) => Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "not_ready", "reason": format!("unexpected PING reply: {response}") })),
        )),
        Err(e) => Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "not_ready", "reason": e.to_string() })),
        )),
    }
}

/// Lists the registered queues and the priorities each accepts.
pub async fn queues_handler(State(state): State<HealthState>) -> Json<Value> {
    let queues: Vec<Value> = state
        .queues
        .list()
        .into_iter()
        .map(|q| {
            json!({
                "name": q.name,
                "priorities": q.priorities.iter().map(|p| p.as_str()).collect::<Vec<_>>(),
                "retry_limit": q.retry_limit,
                "dlq_enabled": q.dlq_enabled,
            })
        })
        .collect();
    Json(json!({ "queues": queues }))
}

/// Current length of the shared DLQ stream.
pub async fn dlq_length_handler(State(state): State<HealthState>) -> Json<Value> {
    Json(json!({ "dlq_length": state.job_store.dlq_len().await }))
}

/// Renders the process's Prometheus metrics in text exposition format.
pub async fn metrics_handler() -> impl IntoResponse {
    match metrics::get_metrics_handle() {
        Some(handle) => (StatusCode::OK, [(header::CONTENT_TYPE, "text/plain; charset=utf-8")], handle.render()).into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            "metrics not initialized".to_string(),
        )
            .into_response(),
    }
}

/// Builds the full health/admin router for a worker process.
pub fn health_router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/readyz", get(ready_handler))
        .route("/queues", get(queues_handler))
        .route("/dlq/length", get(dlq_length_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_response_serializes_expected_shape() {
        let response = HealthResponse { status: "healthy", name: "worker".to_string(), version: "0.1.0".to_string() };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"status\":\"healthy\""));
        assert!(json.contains("\"name\":\"worker\""));
    }
}
