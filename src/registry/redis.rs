//! Redis backend for the registry store.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Config, Pool, Runtime};
use redis::AsyncCommands;

use super::{RegistryError, RegistryStore};

/// Registry store backed by a Redis connection pool.
pub struct RedisStore {
    pool: Pool,
    op_timeout: Duration,
}

impl RedisStore {
    /// Create a pool against `redis_url` and verify the connection with a
    /// PING.
    pub async fn connect(redis_url: &str, op_timeout: Duration) -> Result<Self, RegistryError> {
        let cfg = Config::from_url(redis_url);
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| RegistryError::Backend(format!("failed to create Redis pool: {e}")))?;

        let mut conn = pool
            .get()
            .await
            .map_err(|e| RegistryError::Backend(format!("failed to connect to Redis: {e}")))?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(|e| RegistryError::Backend(format!("Redis ping failed: {e}")))?;

        Ok(Self { pool, op_timeout })
    }

    async fn with_conn<T, F, Fut>(&self, op: F) -> Result<T, RegistryError>
    where
        F: FnOnce(deadpool_redis::Connection) -> Fut,
        Fut: Future<Output = Result<T, redis::RedisError>>,
    {
        let fut = async {
            let conn = self
                .pool
                .get()
                .await
                .map_err(|e| RegistryError::Backend(format!("failed to get connection: {e}")))?;
            op(conn)
                .await
                .map_err(|e| RegistryError::Backend(e.to_string()))
        };
        tokio::time::timeout(self.op_timeout, fut)
            .await
            .map_err(|_| RegistryError::Timeout)?
    }
}

#[async_trait]
impl RegistryStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, RegistryError> {
        self.with_conn(|mut conn| async move { conn.get(key).await })
            .await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), RegistryError> {
        self.with_conn(|mut conn| async move { conn.set(key, value).await })
            .await
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, RegistryError> {
        let created: Option<String> = self
            .with_conn(|mut conn| async move {
                redis::cmd("SET")
                    .arg(key)
                    .arg(value)
                    .arg("NX")
                    .arg("EX")
                    .arg(ttl.as_secs().max(1))
                    .query_async(&mut conn)
                    .await
            })
            .await?;
        Ok(created.is_some())
    }

    async fn delete(&self, key: &str) -> Result<(), RegistryError> {
        self.with_conn(|mut conn| async move { conn.del(key).await })
            .await
    }

    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64, RegistryError> {
        self.with_conn(|mut conn| async move { conn.incr(key, delta).await })
            .await
    }

    async fn scan(&self, prefix: &str) -> Result<Vec<String>, RegistryError> {
        let pattern = format!("{prefix}*");
        self.with_conn(|mut conn| async move {
            let mut keys = Vec::new();
            let mut cursor: u64 = 0;
            loop {
                let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(&pattern)
                    .arg("COUNT")
                    .arg(100)
                    .query_async(&mut conn)
                    .await?;
                keys.extend(batch);
                cursor = next;
                if cursor == 0 {
                    break;
                }
            }
            Ok(keys)
        })
        .await
    }
}
