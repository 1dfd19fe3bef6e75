//! Redis cache
//!
//! Shared cache for several server instances. Entries expire through
//! `SETEX`; pattern deletes walk the keyspace with `SCAN` instead of `KEYS`.

use super::{keys, CacheLayer};
use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;

const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Keys fetched per SCAN round trip
const SCAN_COUNT: usize = 100;

pub struct RedisCache {
    connection: MultiplexedConnection,
    default_ttl: Duration,
}

impl std::fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCache")
            .field("default_ttl", &self.default_ttl)
            .finish_non_exhaustive()
    }
}

impl RedisCache {
    pub async fn new(redis_url: &str) -> Result<Self> {
        Self::with_ttl(redis_url, DEFAULT_TTL).await
    }

    pub async fn with_ttl(redis_url: &str, default_ttl: Duration) -> Result<Self> {
        let client = Client::open(redis_url).context("Failed to create Redis client")?;
        let connection = client
            .get_multiplexed_async_connection()
            .await
            .context("Failed to connect to Redis")?;

        Ok(Self {
            connection,
            default_ttl,
        })
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }
}

#[async_trait]
impl CacheLayer for RedisCache {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>> {
        let mut conn = self.connection.clone();
        let json: Option<String> = conn
            .get(key)
            .await
            .context("Failed to get value from Redis")?;

        json.map(|json| serde_json::from_str(&json).context("Failed to deserialize cached value"))
            .transpose()
    }

    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        let mut conn = self.connection.clone();
        let json = serde_json::to_string(value).context("Failed to serialize cache value")?;

        let _: () = conn
            .set_ex(key, json, ttl.as_secs().max(1))
            .await
            .context("Failed to set value in Redis")?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.connection.clone();
        let _: () = conn
            .del(key)
            .await
            .context("Failed to delete key from Redis")?;
        Ok(())
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<()> {
        let mut conn = self.connection.clone();
        let mut cursor: u64 = 0;

        loop {
            let (next, found): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut conn)
                .await
                .context("Failed to scan keys in Redis")?;

            if !found.is_empty() {
                let _: () = conn
                    .del(&found)
                    .await
                    .context("Failed to delete keys from Redis")?;
            }

            cursor = next;
            if cursor == 0 {
                break;
            }
        }
        Ok(())
    }

    /// Only keys under [`keys::PREFIX`] are removed; the database may be
    /// shared with other applications.
    async fn clear(&self) -> Result<()> {
        self.delete_pattern(&format!("{}*", keys::PREFIX)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn redis_url() -> String {
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
    }

    // Run with: cargo test --features redis-cache -- --ignored

    #[tokio::test]
    #[ignore = "requires running Redis server"]
    async fn test_set_get_delete() {
        let cache = RedisCache::new(&redis_url()).await.unwrap();
        let key = keys::tag("redis-test");

        cache.set(&key, &"rust".to_string(), Duration::from_secs(60)).await.unwrap();
        let value: Option<String> = cache.get(&key).await.unwrap();
        assert_eq!(value.as_deref(), Some("rust"));

        cache.delete(&key).await.unwrap();
        assert_eq!(cache.get::<String>(&key).await.unwrap(), None);
    }

    #[tokio::test]
    #[ignore = "requires running Redis server"]
    async fn test_clear_keeps_foreign_keys() {
        let cache = RedisCache::new(&redis_url()).await.unwrap();
        cache.set(keys::CATEGORY_TREE, &1, Duration::from_secs(60)).await.unwrap();
        cache.set("other-app:key", &2, Duration::from_secs(60)).await.unwrap();

        cache.clear().await.unwrap();

        assert_eq!(cache.get::<i32>(keys::CATEGORY_TREE).await.unwrap(), None);
        assert_eq!(cache.get::<i32>("other-app:key").await.unwrap(), Some(2));
        cache.delete("other-app:key").await.unwrap();
    }
}
