//! Smart routing for per-model requests.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use axum::extract::{OriginalUri, Path, Request, State};
use axum::response::Response;
use axum::routing::any;
use axum::Router;

use crate::error::GatewayError;
use crate::placement::PlacerError;
use crate::worker::ModelKey;
use crate::Gateway;

use super::{proxy_to_worker, read_body, run_detached};

pub fn router(state: Arc<Gateway>) -> Router {
    let models = Router::new()
        .route("/{name}/versions/{version}/{action}", any(model_action))
        .fallback(fallback)
        .with_state(state);
    Router::new().nest("/models", models)
}

/// `/models/{name}/versions/{version}/{action}`: place the model, then
/// forward to the worker that holds it.
///
/// `predict` and unknown actions keep their path; `load` maps to the
/// worker's `/models/load` endpoint. Status and body pass through
/// unchanged.
async fn model_action(
    State(state): State<Arc<Gateway>>,
    OriginalUri(original_uri): OriginalUri,
    Path((name, version, action)): Path<(String, String, String)>,
    request: Request,
) -> Result<Response, GatewayError> {
    let key = ModelKey::new(&name, &version);
    tracing::debug!("Routing request for model {}", key);

    let placer = state.placer.clone();
    let placed_key = key.clone();
    let worker =
        run_detached(async move { placer.get_worker_for_model(&placed_key).await }).await?;

    let worker_path = match action.as_str() {
        "load" => "/models/load".to_string(),
        "predict" => format!("/models/{name}/versions/{version}/predict"),
        _ => original_uri.path().to_string(),
    };

    let method = request.method().clone();
    let headers = request.headers().clone();
    let body = read_body(request.into_body()).await?;

    proxy_to_worker(&state, &worker, method, &worker_path, &headers, body).await
}

/// Any other `/models/**` path goes round-robin to a healthy worker.
async fn fallback(
    State(state): State<Arc<Gateway>>,
    OriginalUri(original_uri): OriginalUri,
    request: Request,
) -> Result<Response, GatewayError> {
    let healthy = state.monitor.healthy().await;
    if healthy.is_empty() {
        return Err(PlacerError::NoHealthyWorkers.into());
    }
    let index = state.round_robin.fetch_add(1, Ordering::Relaxed);
    let worker = &healthy[index % healthy.len()];

    let path = original_uri.path().to_string();
    let method = request.method().clone();
    let headers = request.headers().clone();
    let body = read_body(request.into_body()).await?;

    proxy_to_worker(&state, worker, method, &path, &headers, body).await
}
