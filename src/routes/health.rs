//! Gateway health endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::Gateway;

/// Health response structure.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Overall gateway status.
    pub status: String,
    /// Known workers and their probe state.
    pub workers: Vec<WorkerStatus>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WorkerStatus {
    pub id: String,
    pub healthy: bool,
}

/// GET /health - gateway self-report.
///
/// Returns 200 while at least one worker is healthy (or none are known
/// yet, during startup), 503 once every known worker is down.
async fn health(State(state): State<Arc<Gateway>>) -> (StatusCode, Json<HealthResponse>) {
    let workers: Vec<WorkerStatus> = state
        .monitor
        .all()
        .await
        .into_iter()
        .map(|w| WorkerStatus {
            id: w.id(),
            healthy: w.healthy,
        })
        .collect();

    let (status_code, status_str) = if workers.is_empty() {
        (StatusCode::OK, "starting")
    } else if workers.iter().any(|w| w.healthy) {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    };

    let response = HealthResponse {
        status: status_str.to_string(),
        workers,
    };

    (status_code, Json(response))
}

pub fn router(state: Arc<Gateway>) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}
