//! In-memory backend for the registry store, used by tests.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{RegistryError, RegistryStore};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// Registry store backed by a process-local map with TTL support.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RegistryStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, RegistryError> {
        let mut data = self.data.lock().await;
        match data.get(key) {
            Some(entry) if entry.expired() => {
                data.remove(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value.clone())),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), RegistryError> {
        self.data.lock().await.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, RegistryError> {
        let mut data = self.data.lock().await;
        if data.get(key).is_some_and(|e| !e.expired()) {
            return Ok(false);
        }
        data.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<(), RegistryError> {
        self.data.lock().await.remove(key);
        Ok(())
    }

    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64, RegistryError> {
        let mut data = self.data.lock().await;
        let current = match data.get(key) {
            Some(entry) if !entry.expired() => entry
                .value
                .parse::<i64>()
                .map_err(|_| RegistryError::Backend(format!("key '{key}' is not an integer")))?,
            _ => 0,
        };
        let next = current + delta;
        data.insert(
            key.to_string(),
            Entry {
                value: next.to_string(),
                expires_at: None,
            },
        );
        Ok(next)
    }

    async fn scan(&self, prefix: &str) -> Result<Vec<String>, RegistryError> {
        let data = self.data.lock().await;
        Ok(data
            .iter()
            .filter(|(k, e)| k.starts_with(prefix) && !e.expired())
            .map(|(k, _)| k.clone())
            .collect())
    }
}
