//! Error type surfaced by the HTTP frontend.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::placement::PlacerError;

/// Errors the frontend maps onto HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Placer(#[from] PlacerError),

    #[error("Upstream worker timed out")]
    UpstreamTimeout,

    #[error("Upstream worker request failed: {0}")]
    Upstream(String),
}

impl GatewayError {
    fn status_and_type(&self) -> (StatusCode, &'static str) {
        match self {
            GatewayError::BadRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            GatewayError::Placer(PlacerError::NoHealthyWorkers) => {
                (StatusCode::SERVICE_UNAVAILABLE, "no_healthy_workers")
            }
            GatewayError::Placer(PlacerError::AssignmentRace(_)) => {
                (StatusCode::SERVICE_UNAVAILABLE, "assignment_race")
            }
            GatewayError::Placer(PlacerError::LoadFailed { .. }) => {
                (StatusCode::BAD_GATEWAY, "model_load_failed")
            }
            GatewayError::Placer(PlacerError::ModelNotFound(_)) => {
                (StatusCode::NOT_FOUND, "model_not_found")
            }
            GatewayError::Placer(PlacerError::Registry(_)) => {
                (StatusCode::BAD_GATEWAY, "registry_error")
            }
            GatewayError::UpstreamTimeout => (StatusCode::GATEWAY_TIMEOUT, "upstream_timeout"),
            GatewayError::Upstream(_) => (StatusCode::BAD_GATEWAY, "upstream_error"),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, error_type) = self.status_and_type();

        let body = Json(json!({
            "error": {
                "type": error_type,
                "message": self.to_string()
            }
        }));

        (status, body).into_response()
    }
}
