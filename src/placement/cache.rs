//! Gateway-local memo of which models each worker holds.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

/// Cache of worker resident sets with per-entry freshness stamps.
///
/// An entry is only trusted while it is fresh; stale entries force the
/// placer to re-attempt a load on the assigned worker. Mutations happen
/// under the write lock, so readers always observe a worker's set either
/// entirely before or entirely after an update.
#[derive(Debug)]
pub struct PlacementCache {
    models: RwLock<HashMap<String, HashSet<String>>>,
    verified_at: RwLock<HashMap<(String, String), Instant>>,
    verify_ttl: Duration,
}

impl PlacementCache {
    pub fn new(verify_ttl: Duration) -> Self {
        Self {
            models: RwLock::new(HashMap::new()),
            verified_at: RwLock::new(HashMap::new()),
            verify_ttl,
        }
    }

    /// True iff the cache holds `model` for `worker_id` and the entry is
    /// still fresh.
    pub async fn contains_fresh(&self, worker_id: &str, model: &str) -> bool {
        let present = self
            .models
            .read()
            .await
            .get(worker_id)
            .is_some_and(|set| set.contains(model));
        if !present {
            return false;
        }
        self.verified_at
            .read()
            .await
            .get(&(worker_id.to_string(), model.to_string()))
            .is_some_and(|at| at.elapsed() < self.verify_ttl)
    }

    /// Record `model` as resident on `worker_id`, stamped now.
    pub async fn record(&self, worker_id: &str, model: &str) {
        self.models
            .write()
            .await
            .entry(worker_id.to_string())
            .or_default()
            .insert(model.to_string());
        self.verified_at
            .write()
            .await
            .insert((worker_id.to_string(), model.to_string()), Instant::now());
    }

    /// Forget `model` on `worker_id`.
    pub async fn remove(&self, worker_id: &str, model: &str) {
        if let Some(set) = self.models.write().await.get_mut(worker_id) {
            set.remove(model);
        }
        self.verified_at
            .write()
            .await
            .remove(&(worker_id.to_string(), model.to_string()));
    }

    /// Drop everything cached for `worker_id`.
    pub async fn remove_worker(&self, worker_id: &str) {
        self.models.write().await.remove(worker_id);
        self.verified_at
            .write()
            .await
            .retain(|(w, _), _| w != worker_id);
    }

    /// Wholesale replacement from observed truth, stamping every entry now.
    pub async fn replace_all(&self, mapping: HashMap<String, HashSet<String>>) {
        let now = Instant::now();
        let mut stamps = HashMap::new();
        for (worker_id, models) in &mapping {
            for model in models {
                stamps.insert((worker_id.clone(), model.clone()), now);
            }
        }
        *self.models.write().await = mapping;
        *self.verified_at.write().await = stamps;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_record_then_fresh() {
        let cache = PlacementCache::new(Duration::from_secs(30));
        assert!(!cache.contains_fresh("w1:8000", "iris:v1").await);

        cache.record("w1:8000", "iris:v1").await;
        assert!(cache.contains_fresh("w1:8000", "iris:v1").await);
        assert!(!cache.contains_fresh("w2:8000", "iris:v1").await);
        assert!(!cache.contains_fresh("w1:8000", "iris:v2").await);
    }

    #[tokio::test]
    async fn test_entries_go_stale() {
        let cache = PlacementCache::new(Duration::from_millis(10));
        cache.record("w1:8000", "iris:v1").await;

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!cache.contains_fresh("w1:8000", "iris:v1").await);
    }

    #[tokio::test]
    async fn test_remove() {
        let cache = PlacementCache::new(Duration::from_secs(30));
        cache.record("w1:8000", "iris:v1").await;
        cache.remove("w1:8000", "iris:v1").await;
        assert!(!cache.contains_fresh("w1:8000", "iris:v1").await);
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let cache = PlacementCache::new(Duration::from_secs(30));
        cache.remove("w1:8000", "iris:v1").await;
        cache.remove("w1:8000", "iris:v1").await;
        assert!(!cache.contains_fresh("w1:8000", "iris:v1").await);
    }

    #[tokio::test]
    async fn test_replace_all() {
        let cache = PlacementCache::new(Duration::from_secs(30));
        cache.record("w1:8000", "iris:v1").await;

        let mut mapping = HashMap::new();
        mapping.insert(
            "w2:8000".to_string(),
            HashSet::from(["digits:v2".to_string()]),
        );
        cache.replace_all(mapping).await;

        assert!(!cache.contains_fresh("w1:8000", "iris:v1").await);
        assert!(cache.contains_fresh("w2:8000", "digits:v2").await);
    }

    #[tokio::test]
    async fn test_remove_worker() {
        let cache = PlacementCache::new(Duration::from_secs(30));
        cache.record("w1:8000", "iris:v1").await;
        cache.record("w1:8000", "digits:v2").await;
        cache.record("w2:8000", "iris:v1").await;

        cache.remove_worker("w1:8000").await;

        assert!(!cache.contains_fresh("w1:8000", "iris:v1").await);
        assert!(!cache.contains_fresh("w1:8000", "digits:v2").await);
        assert!(cache.contains_fresh("w2:8000", "iris:v1").await);
    }
}
