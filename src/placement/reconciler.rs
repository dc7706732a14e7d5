//! Periodic repair of the registry and cache against worker truth.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use crate::registry::{RegistryError, RegistryStore};
use crate::worker::{HealthMonitor, WorkerClient};

use super::PlacementCache;

/// Reconciles model assignments and load counters with the resident sets
/// the healthy workers actually report.
///
/// Assignments pointing at departed workers or at workers that no longer
/// hold the model are cleared; resident models without any assignment get
/// one re-asserted best-effort; load counters are overwritten from the
/// observed counts. The reconciler never blocks routing.
pub struct Reconciler {
    registry: Arc<dyn RegistryStore>,
    monitor: Arc<HealthMonitor>,
    client: Arc<WorkerClient>,
    cache: Arc<PlacementCache>,
    model_key_prefix: String,
    load_key_prefix: String,
    assign_ttl: Duration,
}

impl Reconciler {
    pub fn new(
        registry: Arc<dyn RegistryStore>,
        monitor: Arc<HealthMonitor>,
        client: Arc<WorkerClient>,
        cache: Arc<PlacementCache>,
        model_key_prefix: impl Into<String>,
        load_key_prefix: impl Into<String>,
        assign_ttl: Duration,
    ) -> Self {
        Self {
            registry,
            monitor,
            client,
            cache,
            model_key_prefix: model_key_prefix.into(),
            load_key_prefix: load_key_prefix.into(),
            assign_ttl,
        }
    }

    /// Reconcile loop, ticking every `period`. Errors are logged and the
    /// tick is skipped; the next one retries.
    pub async fn run(self: Arc<Self>, period: Duration) {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            if let Err(e) = self.reconcile_once().await {
                tracing::warn!("Registry reconcile failed: {}", e);
            }
        }
    }

    /// One reconcile pass over the healthy fleet.
    pub async fn reconcile_once(&self) -> Result<(), RegistryError> {
        tracing::debug!("Reconciling model registry with worker state");

        let workers = self.monitor.healthy().await;
        let resident_sets = self.client.fetch_resident_sets(&workers).await;

        self.cache.replace_all(resident_sets.clone()).await;

        self.clear_stale_assignments(&resident_sets).await?;
        self.ensure_assignments(&resident_sets).await?;
        self.overwrite_load_counters(&resident_sets).await?;

        Ok(())
    }

    /// Delete assignments whose worker is gone or no longer holds the
    /// model.
    async fn clear_stale_assignments(
        &self,
        resident_sets: &HashMap<String, HashSet<String>>,
    ) -> Result<(), RegistryError> {
        let keys = self.registry.scan(&self.model_key_prefix).await?;
        for model_key in keys {
            let Some(worker_id) = self.registry.get(&model_key).await? else {
                continue;
            };
            let model = &model_key[self.model_key_prefix.len()..];
            let still_resident = resident_sets
                .get(&worker_id)
                .is_some_and(|models| models.contains(model));
            if !still_resident {
                tracing::info!("Clearing stale assignment {} -> {}", model_key, worker_id);
                self.registry.delete(&model_key).await?;
            }
        }
        Ok(())
    }

    /// Make sure every resident model has some assignment. Contention with
    /// other gateways is benign: any resident worker may claim the model.
    async fn ensure_assignments(
        &self,
        resident_sets: &HashMap<String, HashSet<String>>,
    ) -> Result<(), RegistryError> {
        for (worker_id, models) in resident_sets {
            for model in models {
                let model_key = format!("{}{}", self.model_key_prefix, model);
                self.registry
                    .set_if_absent(&model_key, worker_id, self.assign_ttl)
                    .await?;
            }
        }
        Ok(())
    }

    /// The reconciler is authoritative for load counters: overwrite each
    /// healthy worker's counter with its observed resident count.
    async fn overwrite_load_counters(
        &self,
        resident_sets: &HashMap<String, HashSet<String>>,
    ) -> Result<(), RegistryError> {
        for worker in self.monitor.healthy().await {
            let count = resident_sets
                .get(&worker.id())
                .map(|models| models.len())
                .unwrap_or(0);
            let load_key = format!("{}{}", self.load_key_prefix, worker.id());
            self.registry.set(&load_key, &count.to_string()).await?;
        }
        Ok(())
    }
}
