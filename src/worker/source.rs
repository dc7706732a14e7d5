//! Worker discovery sources.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Endpoints;
use kube::Api;
use tokio::sync::Mutex;

use super::{HealthMonitor, WorkerAddr};

/// Produces the current membership of the worker fleet.
#[async_trait]
pub trait WorkerSource: Send + Sync {
    async fn discover(&self) -> Vec<WorkerAddr>;
}

/// Fixed worker list from configuration.
pub struct StaticWorkerSource {
    addrs: Vec<WorkerAddr>,
}

impl StaticWorkerSource {
    pub fn new(addrs: Vec<WorkerAddr>) -> Self {
        Self { addrs }
    }
}

#[async_trait]
impl WorkerSource for StaticWorkerSource {
    async fn discover(&self) -> Vec<WorkerAddr> {
        self.addrs.clone()
    }
}

/// Discovers workers from the Ready addresses of the worker Service's
/// Endpoints object.
///
/// A failed query returns the previous snapshot so a transient API error
/// never drops healthy workers from the fleet.
pub struct EndpointsWorkerSource {
    api: Api<Endpoints>,
    service: String,
    target_port: u16,
    last: Mutex<Vec<WorkerAddr>>,
}

impl EndpointsWorkerSource {
    pub fn new(client: kube::Client, namespace: &str, service: &str, target_port: u16) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            service: service.to_string(),
            target_port,
            last: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl WorkerSource for EndpointsWorkerSource {
    async fn discover(&self) -> Vec<WorkerAddr> {
        match self.api.get(&self.service).await {
            Ok(endpoints) => {
                let mut discovered = Vec::new();
                for subset in endpoints.subsets.unwrap_or_default() {
                    for address in subset.addresses.unwrap_or_default() {
                        discovered.push(WorkerAddr::new(address.ip, self.target_port));
                    }
                }
                tracing::debug!("Discovered {} workers from endpoints", discovered.len());
                let mut last = self.last.lock().await;
                *last = discovered.clone();
                discovered
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to read endpoints for {}: {}, keeping previous snapshot",
                    self.service,
                    e
                );
                self.last.lock().await.clone()
            }
        }
    }
}

/// Discovery loop: polls the source every `period` and syncs the fleet
/// membership into the monitor.
pub async fn run_discovery_loop(
    source: Arc<dyn WorkerSource>,
    monitor: Arc<HealthMonitor>,
    period: Duration,
) {
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        let addrs = source.discover().await;
        monitor.sync_addrs(&addrs).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_source_returns_configured_list() {
        let source = StaticWorkerSource::new(vec![
            WorkerAddr::new("w1", 8000),
            WorkerAddr::new("w2", 8000),
        ]);

        let addrs = source.discover().await;
        assert_eq!(addrs.len(), 2);
        assert_eq!(addrs[0].id(), "w1:8000");
    }
}
