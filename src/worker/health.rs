//! Health tracking for the worker fleet.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::RwLock;

use super::{Worker, WorkerAddr, WorkerClient};

/// Registry of known workers and their health flags.
///
/// Discovery is the single writer of membership; probes only flip the
/// `healthy` flag. Readers get cloned snapshots, so a single read sees a
/// consistent view and never holds the lock across I/O.
#[derive(Debug, Default)]
pub struct HealthMonitor {
    workers: RwLock<HashMap<String, Worker>>,
}

impl HealthMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace fleet membership with `addrs`: unknown addresses are added
    /// as unhealthy until a probe confirms them, and workers no longer
    /// listed are dropped.
    pub async fn sync_addrs(&self, addrs: &[WorkerAddr]) {
        let mut workers = self.workers.write().await;
        for addr in addrs {
            workers
                .entry(addr.id())
                .or_insert_with(|| Worker::new(addr));
        }
        workers.retain(|id, _| {
            let keep = addrs.iter().any(|a| a.id() == *id);
            if !keep {
                tracing::info!("Worker {} no longer discovered, removing", id);
            }
            keep
        });
    }

    /// Snapshot of every known worker.
    pub async fn all(&self) -> Vec<Worker> {
        self.workers.read().await.values().cloned().collect()
    }

    /// Snapshot of the workers currently marked healthy.
    pub async fn healthy(&self) -> Vec<Worker> {
        self.workers
            .read()
            .await
            .values()
            .filter(|w| w.healthy)
            .cloned()
            .collect()
    }

    /// Look up a worker by its `host:port` id.
    pub async fn get(&self, id: &str) -> Option<Worker> {
        self.workers.read().await.get(id).cloned()
    }

    pub async fn set_healthy(&self, id: &str, healthy: bool) {
        if let Some(worker) = self.workers.write().await.get_mut(id) {
            if worker.healthy != healthy {
                tracing::info!("Worker {} health: {}", id, healthy);
            }
            worker.healthy = healthy;
        }
    }

    /// Probe every known worker once and update the health flags. Failed
    /// probes mark the worker unhealthy but never remove it.
    pub async fn probe_all(&self, client: &WorkerClient) {
        let snapshot = self.all().await;
        tracing::debug!("Running health checks on {} workers", snapshot.len());

        let probes = snapshot.iter().map(|worker| async move {
            let healthy = match client.health(worker).await {
                Ok(_) => true,
                Err(e) => {
                    tracing::debug!("Health check failed for {}: {}", worker.id(), e);
                    false
                }
            };
            (worker.id(), healthy)
        });

        for (id, healthy) in join_all(probes).await {
            self.set_healthy(&id, healthy).await;
        }
    }

    /// Probe loop, ticking every `period`.
    pub async fn run(self: Arc<Self>, client: Arc<WorkerClient>, period: Duration) {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            self.probe_all(&client).await;
        }
    }
}
