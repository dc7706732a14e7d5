//! Registry store abstraction over the external key-value registry.
//!
//! The gateway keeps two kinds of facts in the registry: model assignments
//! (`model:{name}:{version}` -> worker id, with a TTL) and per-worker load
//! counters (`worker:load:{worker_id}` -> integer).

mod memory;
mod redis;

pub use memory::MemoryStore;
pub use redis::RedisStore;

use std::time::Duration;

use async_trait::async_trait;

/// Errors from registry operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("registry backend error: {0}")]
    Backend(String),
    #[error("registry operation timed out")]
    Timeout,
}

/// Operations the placement core relies on.
///
/// Every operation is atomic in the store; `set_if_absent` is the only
/// compound atomicity the core requires.
#[async_trait]
pub trait RegistryStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, RegistryError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), RegistryError>;

    /// Atomic create-only set with a TTL. Returns `true` if this call
    /// created the key.
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, RegistryError>;

    async fn delete(&self, key: &str) -> Result<(), RegistryError>;

    /// Atomic integer increment; missing keys start at zero.
    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64, RegistryError>;

    /// All keys starting with `prefix`.
    async fn scan(&self, prefix: &str) -> Result<Vec<String>, RegistryError>;
}
