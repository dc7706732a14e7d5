//! Placement decision engine.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;

use crate::registry::{RegistryError, RegistryStore};
use crate::worker::{
    HealthMonitor, LoadRequest, ModelKey, Worker, WorkerClient, WorkerClientError,
};

use super::PlacementCache;

const MAX_ASSIGN_ATTEMPTS: usize = 3;

/// Errors from placement decisions.
#[derive(Debug, thiserror::Error)]
pub enum PlacerError {
    #[error("no healthy workers available")]
    NoHealthyWorkers,
    #[error("lost the assignment race for {0} repeatedly")]
    AssignmentRace(String),
    #[error("failed to load {model} on worker {worker}: {source}")]
    LoadFailed {
        model: String,
        worker: String,
        #[source]
        source: WorkerClientError,
    },
    #[error("model {0} is not loaded on any worker")]
    ModelNotFound(String),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Routing and placement core.
///
/// Registry reads that fail transiently degrade to "no assignment";
/// registry writes propagate their errors to the caller.
pub struct Placer {
    registry: Arc<dyn RegistryStore>,
    monitor: Arc<HealthMonitor>,
    client: Arc<WorkerClient>,
    cache: Arc<PlacementCache>,
    model_key_prefix: String,
    load_key_prefix: String,
    assign_ttl: Duration,
}

impl Placer {
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

    pub fn model_key(&self, key: &ModelKey) -> String {
        format!("{}{}", self.model_key_prefix, key.canonical())
    }

    pub fn load_key(&self, worker_id: &str) -> String {
        format!("{}{}", self.load_key_prefix, worker_id)
    }

    /// Find the worker that should serve `key`, assigning and loading it
    /// if no healthy worker currently holds it.
    pub async fn get_worker_for_model(&self, key: &ModelKey) -> Result<Worker, PlacerError> {
        let model_key = self.model_key(key);

        let assigned = match self.registry.get(&model_key).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("Registry read for {} failed: {}, reassigning", model_key, e);
                None
            }
        };

        if let Some(worker_id) = assigned {
            match self.monitor.get(&worker_id).await {
                Some(worker) if worker.healthy => {
                    let canonical = key.canonical();
                    if self.cache.contains_fresh(&worker_id, &canonical).await {
                        tracing::debug!("Found model {} on worker {} (cache hit)", key, worker_id);
                        return Ok(worker);
                    }

                    // Cache miss or stale: attempt a load on the assigned
                    // worker before giving up on the assignment.
                    tracing::debug!(
                        "Model {} not fresh in cache for {}, loading on assigned worker",
                        key,
                        worker_id
                    );
                    match self.client.load(&worker, &LoadRequest::new(key)).await {
                        Ok(()) => {
                            self.cache.record(&worker_id, &canonical).await;
                            return Ok(worker);
                        }
                        Err(e) => {
                            tracing::warn!(
                                "Load of {} failed on assigned worker {}: {}, reassigning",
                                key,
                                worker_id,
                                e
                            );
                            self.registry.delete(&model_key).await?;
                        }
                    }
                }
                Some(_) => {
                    tracing::warn!(
                        "Worker {} for model {} is unhealthy, reassigning",
                        worker_id,
                        key
                    );
                    self.registry.delete(&model_key).await?;
                }
                None => {
                    tracing::warn!(
                        "Worker {} for model {} left the fleet, reassigning",
                        worker_id,
                        key
                    );
                    self.registry.delete(&model_key).await?;
                    self.cache.remove_worker(&worker_id).await;
                }
            }
        }

        self.assign(key).await
    }

    /// Assign `key` to the least-loaded healthy worker and trigger a load.
    ///
    /// Losing the `set_if_absent` race adopts the winner's worker when it is
    /// healthy; otherwise selection retries, bounded to three attempts.
    pub async fn assign(&self, key: &ModelKey) -> Result<Worker, PlacerError> {
        let model_key = self.model_key(key);

        for _ in 0..MAX_ASSIGN_ATTEMPTS {
            let worker = self.select_least_loaded().await?;
            let worker_id = worker.id();

            let placed = self
                .registry
                .set_if_absent(&model_key, &worker_id, self.assign_ttl)
                .await?;
            if !placed {
                if let Some(existing_id) = self.registry.get(&model_key).await? {
                    if let Some(existing) = self.monitor.get(&existing_id).await {
                        if existing.healthy {
                            tracing::debug!(
                                "Lost assignment race for {}, adopting worker {}",
                                key,
                                existing_id
                            );
                            return Ok(existing);
                        }
                    }
                }
                continue;
            }

            self.registry.incr_by(&self.load_key(&worker_id), 1).await?;

            match self.client.load(&worker, &LoadRequest::new(key)).await {
                Ok(()) => {
                    self.cache.record(&worker_id, &key.canonical()).await;
                    tracing::info!("Assigned model {} to worker {}", key, worker_id);
                    return Ok(worker);
                }
                Err(e) => {
                    // Roll back the assignment; the next caller retries
                    // against a possibly different worker.
                    if let Err(re) = self.registry.delete(&model_key).await {
                        tracing::warn!("Rollback delete of {} failed: {}", model_key, re);
                    }
                    if let Err(re) = self.registry.incr_by(&self.load_key(&worker_id), -1).await {
                        tracing::warn!("Rollback decrement for {} failed: {}", worker_id, re);
                    }
                    return Err(PlacerError::LoadFailed {
                        model: key.canonical(),
                        worker: worker_id,
                        source: e,
                    });
                }
            }
        }

        Err(PlacerError::AssignmentRace(key.canonical()))
    }

    /// Pick the healthy worker with the smallest load counter; ties break
    /// on lexicographic worker id order for determinism.
    pub async fn select_least_loaded(&self) -> Result<Worker, PlacerError> {
        let mut workers = self.monitor.healthy().await;
        if workers.is_empty() {
            return Err(PlacerError::NoHealthyWorkers);
        }
        workers.sort_by_key(|w| w.id());

        let loads = join_all(workers.iter().map(|w| {
            let worker_id = w.id();
            async move { self.worker_load(&worker_id).await }
        }))
        .await;

        let mut best: Option<Worker> = None;
        for (mut worker, load) in workers.into_iter().zip(loads) {
            worker.loaded_models = load;
            if best.as_ref().is_none_or(|b| load < b.loaded_models) {
                best = Some(worker);
            }
        }
        // The list is non-empty, so a best candidate always exists.
        let selected = best.ok_or(PlacerError::NoHealthyWorkers)?;
        tracing::debug!(
            "Selected least-loaded worker {} (load {})",
            selected.id(),
            selected.loaded_models
        );
        Ok(selected)
    }

    /// Advisory load of `worker_id`: absent and unreadable counters count
    /// as zero, negative counters clamp to zero.
    async fn worker_load(&self, worker_id: &str) -> i64 {
        match self.registry.get(&self.load_key(worker_id)).await {
            Ok(Some(v)) => v.parse::<i64>().unwrap_or(0).max(0),
            Ok(None) => 0,
            Err(e) => {
                tracing::warn!("Failed to read load counter for {}: {}", worker_id, e);
                0
            }
        }
    }

    /// All healthy workers that actually hold `key` right now, from worker
    /// truth rather than the registry (the registry may be stale after a
    /// crash).
    pub async fn find_workers_with_model(&self, key: &ModelKey) -> Vec<Worker> {
        let workers = self.monitor.healthy().await;
        let resident_sets = self.client.fetch_resident_sets(&workers).await;
        let canonical = key.canonical();
        workers
            .into_iter()
            .filter(|w| {
                resident_sets
                    .get(&w.id())
                    .is_some_and(|models| models.contains(&canonical))
            })
            .collect()
    }

    /// Unload `key` from every worker holding it. Returns the ids of the
    /// workers that unloaded successfully; individual failures are logged
    /// and left for the reconciler.
    pub async fn unload_globally(&self, key: &ModelKey) -> Result<Vec<String>, PlacerError> {
        let residents = self.find_workers_with_model(key).await;
        if residents.is_empty() {
            return Err(PlacerError::ModelNotFound(key.canonical()));
        }

        let results = join_all(residents.iter().map(|worker| async move {
            let outcome = self.client.unload(worker, key).await;
            (worker, outcome)
        }))
        .await;

        let mut unloaded = Vec::new();
        for (worker, outcome) in results {
            match outcome {
                Ok(()) => {
                    tracing::info!("Unloaded model {} on {}", key, worker.id());
                    unloaded.push(worker.id());
                }
                Err(e) => {
                    tracing::warn!("Failed to unload model {} on {}: {}", key, worker.id(), e);
                }
            }
        }

        self.registry.delete(&self.model_key(key)).await?;

        let canonical = key.canonical();
        for worker_id in &unloaded {
            if let Err(e) = self.registry.incr_by(&self.load_key(worker_id), -1).await {
                tracing::warn!("Failed to decrement load for {}: {}", worker_id, e);
            }
            self.cache.remove(worker_id, &canonical).await;
        }

        Ok(unloaded)
    }

    /// Remove the assignment of `key` to `worker_id` and undo its load
    /// accounting. Safe to call repeatedly.
    pub async fn unassign(&self, key: &ModelKey, worker_id: &str) -> Result<(), PlacerError> {
        self.registry.delete(&self.model_key(key)).await?;
        self.registry.incr_by(&self.load_key(worker_id), -1).await?;
        self.cache.remove(worker_id, &key.canonical()).await;
        Ok(())
    }
}
