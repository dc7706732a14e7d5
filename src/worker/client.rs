//! Typed HTTP client for the worker fleet.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use super::{ModelKey, Worker};

pub const DEFAULT_BATCH_SIZE: u32 = 32;
pub const DEFAULT_BATCH_WAIT_MS: u64 = 50;

/// Errors from worker HTTP calls.
#[derive(Debug, thiserror::Error)]
pub enum WorkerClientError {
    #[error("worker request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("worker returned HTTP {status}: {body}")]
    Status { status: StatusCode, body: String },
}

impl WorkerClientError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Request(e) if e.is_timeout())
    }
}

/// Worker `/health` response. Only `models` is consumed; workers may send
/// additional fields.
#[derive(Debug, Deserialize)]
pub struct WorkerHealth {
    #[serde(default)]
    pub models: Vec<String>,
}

/// Body for the worker `/models/load` endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct LoadRequest {
    pub model_name: String,
    pub version: String,
    pub batch_size: u32,
    pub batch_wait_ms: u64,
}

impl LoadRequest {
    pub fn new(key: &ModelKey) -> Self {
        Self {
            model_name: key.name.clone(),
            version: key.version.clone(),
            batch_size: DEFAULT_BATCH_SIZE,
            batch_wait_ms: DEFAULT_BATCH_WAIT_MS,
        }
    }
}

#[derive(Debug, Serialize)]
struct UnloadRequest<'a> {
    model_name: &'a str,
    version: &'a str,
}

/// HTTP client for individual workers.
///
/// One shared instance serves the whole gateway; probe and load fan-out are
/// bounded here so callers cannot create request storms.
pub struct WorkerClient {
    http: Client,
    probe_timeout: Duration,
    load_timeout: Duration,
    unload_timeout: Duration,
    health_fanout: Arc<Semaphore>,
    load_fanout: Arc<Semaphore>,
}

impl WorkerClient {
    pub fn new(
        probe_timeout: Duration,
        load_timeout: Duration,
        unload_timeout: Duration,
        health_fanout: usize,
        load_fanout: usize,
    ) -> Self {
        Self {
            http: Client::new(),
            probe_timeout,
            load_timeout,
            unload_timeout,
            health_fanout: Arc::new(Semaphore::new(health_fanout.max(1))),
            load_fanout: Arc::new(Semaphore::new(load_fanout.max(1))),
        }
    }

    /// Probe `GET {worker}/health` and return the models the worker reports
    /// as resident.
    pub async fn health(&self, worker: &Worker) -> Result<WorkerHealth, WorkerClientError> {
        let _permit = self.health_fanout.acquire().await;
        let url = format!("{}/health", worker.base_url());

        let response = self
            .http
            .get(&url)
            .timeout(self.probe_timeout)
            .send()
            .await?;
        let response = Self::check_status(response).await?;
        response
            .json::<WorkerHealth>()
            .await
            .map_err(WorkerClientError::from)
    }

    /// Trigger a model load on `worker`. A 2xx response is success, which
    /// includes the worker's "already loaded" reply.
    pub async fn load(
        &self,
        worker: &Worker,
        request: &LoadRequest,
    ) -> Result<(), WorkerClientError> {
        let _permit = self.load_fanout.acquire().await;
        let url = format!("{}/models/load", worker.base_url());
        tracing::info!(
            "Triggering load of {}:{} on worker {}",
            request.model_name,
            request.version,
            worker.id()
        );

        let response = self
            .http
            .post(&url)
            .json(request)
            .timeout(self.load_timeout)
            .send()
            .await?;
        Self::check_status(response).await?;
        Ok(())
    }

    /// Unload a model from `worker`.
    pub async fn unload(&self, worker: &Worker, key: &ModelKey) -> Result<(), WorkerClientError> {
        let url = format!("{}/models/unload", worker.base_url());
        let body = UnloadRequest {
            model_name: &key.name,
            version: &key.version,
        };

        let response = self
            .http
            .post(&url)
            .json(&body)
            .timeout(self.unload_timeout)
            .send()
            .await?;
        Self::check_status(response).await?;
        Ok(())
    }

    /// Fetch the resident model set of every worker in `workers`, in
    /// parallel bounded by the health fan-out. Probe failures yield an empty
    /// set for that worker.
    pub async fn fetch_resident_sets(
        &self,
        workers: &[Worker],
    ) -> HashMap<String, HashSet<String>> {
        let fetches = workers.iter().map(|worker| async move {
            let models = match self.health(worker).await {
                Ok(health) => health.models.into_iter().collect(),
                Err(e) => {
                    tracing::debug!("Failed to fetch models from {}: {}", worker.id(), e);
                    HashSet::new()
                }
            };
            (worker.id(), models)
        });
        join_all(fetches).await.into_iter().collect()
    }

    async fn check_status(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, WorkerClientError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(WorkerClientError::Status { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_request_defaults() {
        let request = LoadRequest::new(&ModelKey::new("iris", "v1"));
        assert_eq!(request.model_name, "iris");
        assert_eq!(request.version, "v1");
        assert_eq!(request.batch_size, 32);
        assert_eq!(request.batch_wait_ms, 50);
    }

    #[test]
    fn test_load_request_serialization() {
        let request = LoadRequest::new(&ModelKey::new("iris", "v1"));
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains(r#""model_name":"iris""#));
        assert!(json.contains(r#""version":"v1""#));
        assert!(json.contains(r#""batch_size":32"#));
        assert!(json.contains(r#""batch_wait_ms":50"#));
    }

    #[test]
    fn test_worker_health_tolerates_unknown_fields() {
        let json = r#"{"status":"ok","models":["iris:v1","digits:v2"],"uptime_s":123}"#;
        let health: WorkerHealth = serde_json::from_str(json).unwrap();
        assert_eq!(health.models, vec!["iris:v1", "digits:v2"]);
    }

    #[test]
    fn test_worker_health_missing_models_field() {
        let health: WorkerHealth = serde_json::from_str(r#"{"status":"ok"}"#).unwrap();
        assert!(health.models.is_empty());
    }
}
