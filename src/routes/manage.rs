//! Model management endpoints: fleet-wide load and unload.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use crate::error::GatewayError;
use crate::worker::ModelKey;
use crate::Gateway;

use super::{proxy_to_worker, read_body, run_detached};

pub fn router(state: Arc<Gateway>) -> Router {
    Router::new()
        .route("/models/load", post(load_model))
        .route("/models/unload", post(unload_model))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct LoadBody {
    model_name: String,
    version: String,
    #[serde(default)]
    #[allow(dead_code)]
    batch_size: Option<u32>,
    #[serde(default)]
    #[allow(dead_code)]
    batch_wait_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct UnloadBody {
    model_name: String,
    version: String,
}

fn parse_body<'a, T: Deserialize<'a>>(bytes: &'a [u8]) -> Result<T, GatewayError> {
    serde_json::from_slice(bytes).map_err(|e| GatewayError::BadRequest(e.to_string()))
}

/// `POST /models/load`: place the model on a worker, then forward the load
/// request (with its batching options) to that worker.
async fn load_model(
    State(state): State<Arc<Gateway>>,
    request: Request,
) -> Result<Response, GatewayError> {
    let method = request.method().clone();
    let headers = request.headers().clone();
    let bytes = read_body(request.into_body()).await?;
    let body: LoadBody = parse_body(&bytes)?;

    let key = ModelKey::new(&body.model_name, &body.version);
    let placer = state.placer.clone();
    let worker = run_detached(async move { placer.get_worker_for_model(&key).await }).await?;

    proxy_to_worker(&state, &worker, method, "/models/load", &headers, bytes).await
}

/// `POST /models/unload`: unload the model from every worker holding it
/// and clear its registry state.
async fn unload_model(
    State(state): State<Arc<Gateway>>,
    request: Request,
) -> Result<Response, GatewayError> {
    let bytes = read_body(request.into_body()).await?;
    let body: UnloadBody = parse_body(&bytes)?;

    let key = ModelKey::new(&body.model_name, &body.version);
    let placer = state.placer.clone();
    let workers = run_detached(async move { placer.unload_globally(&key).await }).await?;

    let response = (
        StatusCode::OK,
        Json(json!({
            "status": "unloaded",
            "model_name": body.model_name,
            "version": body.version,
            "workers": workers,
        })),
    );
    Ok(response.into_response())
}
