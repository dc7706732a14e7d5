//! HTTP frontend: smart model routing plus management endpoints.

pub mod health;
pub mod manage;
pub mod predict;

use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, Method};
use axum::middleware;
use axum::response::Response;
use axum::Router;

use crate::error::GatewayError;
use crate::logging;
use crate::worker::Worker;
use crate::Gateway;

/// Largest request/response body the frontend will buffer while proxying.
const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

/// Build the full gateway application.
pub fn app(state: Arc<Gateway>) -> Router {
    Router::new()
        .merge(health::router(state.clone()))
        .merge(manage::router(state.clone()))
        .merge(predict::router(state))
        .layer(middleware::from_fn(logging::request_id))
        .layer(middleware::from_fn(logging::request_logger))
}

/// Forward a buffered request to `worker` and hand the worker's status and
/// body back unchanged.
pub(crate) async fn proxy_to_worker(
    state: &Gateway,
    worker: &Worker,
    method: Method,
    path: &str,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<Response, GatewayError> {
    let url = format!("{}{}", worker.base_url(), path);
    tracing::debug!("Proxying request to {} (worker: {})", url, worker.id());

    let mut request = state.http.request(method, &url).body(body);
    if let Some(content_type) = headers.get(header::CONTENT_TYPE) {
        request = request.header(header::CONTENT_TYPE, content_type);
    }
    if let Some(request_id) = headers.get(logging::REQUEST_ID_HEADER) {
        request = request.header(logging::REQUEST_ID_HEADER, request_id);
    }

    let upstream = request.send().await.map_err(|e| {
        if e.is_timeout() {
            GatewayError::UpstreamTimeout
        } else {
            GatewayError::Upstream(e.to_string())
        }
    })?;

    let status = upstream.status();
    let content_type = upstream.headers().get(header::CONTENT_TYPE).cloned();
    let bytes = upstream
        .bytes()
        .await
        .map_err(|e| GatewayError::Upstream(e.to_string()))?;

    let mut builder = Response::builder().status(status);
    if let Some(content_type) = content_type {
        builder = builder.header(header::CONTENT_TYPE, content_type);
    }
    builder
        .body(Body::from(bytes))
        .map_err(|e| GatewayError::Upstream(e.to_string()))
}

/// Read a request body, bounding the buffered size.
pub(crate) async fn read_body(body: Body) -> Result<Bytes, GatewayError> {
    axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| GatewayError::BadRequest(format!("failed to read request body: {e}")))
}

/// Run a placement operation in its own task.
///
/// Registry writes and worker loads are edge-triggered side effects: a
/// client disconnect abandons the response but must not cancel them, so
/// they run detached from the request future. Leftover state after a crash
/// is reconciler-repaired.
pub(crate) async fn run_detached<T, F>(fut: F) -> Result<T, GatewayError>
where
    F: std::future::Future<Output = Result<T, crate::placement::PlacerError>> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(fut)
        .await
        .map_err(|e| GatewayError::Upstream(format!("placement task failed: {e}")))?
        .map_err(GatewayError::from)
}
