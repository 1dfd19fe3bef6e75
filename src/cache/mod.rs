//! Cache layer
//!
//! Read-heavy lookups (the category tree, tag pages) are cached as JSON.
//! Two drivers are available:
//! - in-memory cache (moka), the default for a single instance
//! - Redis, behind the `redis-cache` feature, for several instances
//!
//! ```rust,ignore
//! use ruifeng::cache::{create_cache, keys, CacheLayer};
//! use ruifeng::config::CacheConfig;
//!
//! let cache = create_cache(&CacheConfig::default()).await?;
//! cache.set(keys::CATEGORY_TREE, &tree, cache.ttl()).await?;
//! ```

pub mod memory;
#[cfg(feature = "redis-cache")]
pub mod redis;

use anyhow::Result;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{CacheConfig, CacheDriver};

pub use memory::MemoryCache;
#[cfg(feature = "redis-cache")]
pub use redis::RedisCache;

/// Cache keys. Every key starts with [`keys::PREFIX`].
pub mod keys {
    pub const PREFIX: &str = "ruifeng:";

    pub const CATEGORY_TREE: &str = "ruifeng:categories:tree";

    /// Matches every cached tag entry
    pub const TAG_PATTERN: &str = "ruifeng:tags:*";

    pub fn tag_page(page: u32, limit: u32) -> String {
        format!("ruifeng:tags:page:{}:{}", page, limit)
    }

    pub fn tag(id: &str) -> String {
        format!("ruifeng:tags:id:{}", id)
    }
}

/// Cache operations shared by the drivers.
///
/// The methods are generic, so this trait is not object safe; the [`Cache`]
/// enum provides runtime dispatch instead.
#[async_trait]
pub trait CacheLayer: Send + Sync {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>>;

    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T, ttl: Duration) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Delete every key matching a glob pattern (`*` and `?`)
    async fn delete_pattern(&self, pattern: &str) -> Result<()>;

    /// Delete every key this service wrote
    async fn clear(&self) -> Result<()>;
}

/// The configured cache driver
#[derive(Debug)]
pub enum Cache {
    Memory(MemoryCache),
    #[cfg(feature = "redis-cache")]
    Redis(RedisCache),
}

impl Cache {
    /// Default lifetime of cache entries
    pub fn ttl(&self) -> Duration {
        match self {
            Cache::Memory(cache) => cache.default_ttl(),
            #[cfg(feature = "redis-cache")]
            Cache::Redis(cache) => cache.default_ttl(),
        }
    }
}

#[async_trait]
impl CacheLayer for Cache {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>> {
        match self {
            Cache::Memory(cache) => cache.get(key).await,
            #[cfg(feature = "redis-cache")]
            Cache::Redis(cache) => cache.get(key).await,
        }
    }

    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        match self {
            Cache::Memory(cache) => cache.set(key, value, ttl).await,
            #[cfg(feature = "redis-cache")]
            Cache::Redis(cache) => cache.set(key, value, ttl).await,
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match self {
            Cache::Memory(cache) => cache.delete(key).await,
            #[cfg(feature = "redis-cache")]
            Cache::Redis(cache) => cache.delete(key).await,
        }
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<()> {
        match self {
            Cache::Memory(cache) => cache.delete_pattern(pattern).await,
            #[cfg(feature = "redis-cache")]
            Cache::Redis(cache) => cache.delete_pattern(pattern).await,
        }
    }

    async fn clear(&self) -> Result<()> {
        match self {
            Cache::Memory(cache) => cache.clear().await,
            #[cfg(feature = "redis-cache")]
            Cache::Redis(cache) => cache.clear().await,
        }
    }
}

/// Create the cache selected by `config.driver`.
///
/// Fails when Redis is selected without a URL, without the `redis-cache`
/// feature, or when the server cannot be reached.
pub async fn create_cache(config: &CacheConfig) -> Result<Arc<Cache>> {
    let ttl = Duration::from_secs(config.ttl_seconds);

    match config.driver {
        CacheDriver::Memory => {
            let cache = MemoryCache::with_capacity_and_ttl(10_000, ttl);
            tracing::debug!("Using in-memory cache, ttl {:?}", ttl);
            Ok(Arc::new(Cache::Memory(cache)))
        }
        CacheDriver::Redis => {
            #[cfg(feature = "redis-cache")]
            {
                let redis_url = config.redis_url.as_ref().ok_or_else(|| {
                    anyhow::anyhow!(
                        "Redis URL is required when using the redis cache driver. \
                         Set 'redis_url' in the cache section or RUIFENG_REDIS_URL."
                    )
                })?;

                let cache = RedisCache::with_ttl(redis_url, ttl).await?;
                tracing::debug!("Using Redis cache at {}", redis_url);
                Ok(Arc::new(Cache::Redis(cache)))
            }

            #[cfg(not(feature = "redis-cache"))]
            {
                anyhow::bail!(
                    "Redis cache driver is configured but the 'redis-cache' feature is not enabled. \
                     Build with `--features redis-cache` or use the 'memory' driver."
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_memory_cache() {
        let cache = create_cache(&CacheConfig::default()).await.unwrap();

        cache
            .set(keys::CATEGORY_TREE, &vec!["a".to_string()], cache.ttl())
            .await
            .unwrap();
        let result: Option<Vec<String>> = cache.get(keys::CATEGORY_TREE).await.unwrap();
        assert_eq!(result, Some(vec!["a".to_string()]));
    }

    #[tokio::test]
    async fn test_configured_ttl_is_default() {
        let config = CacheConfig {
            driver: CacheDriver::Memory,
            redis_url: None,
            ttl_seconds: 1800,
        };
        let cache = create_cache(&config).await.unwrap();
        assert_eq!(cache.ttl(), Duration::from_secs(1800));
    }

    #[tokio::test]
    async fn test_tag_pattern_covers_tag_keys() {
        let cache = create_cache(&CacheConfig::default()).await.unwrap();
        let ttl = cache.ttl();
        cache.set(&keys::tag_page(1, 10), &1, ttl).await.unwrap();
        cache.set(&keys::tag("abc"), &2, ttl).await.unwrap();
        cache.set(keys::CATEGORY_TREE, &3, ttl).await.unwrap();

        cache.delete_pattern(keys::TAG_PATTERN).await.unwrap();

        assert_eq!(cache.get::<i32>(&keys::tag_page(1, 10)).await.unwrap(), None);
        assert_eq!(cache.get::<i32>(&keys::tag("abc")).await.unwrap(), None);
        assert_eq!(cache.get::<i32>(keys::CATEGORY_TREE).await.unwrap(), Some(3));
    }

    #[cfg(not(feature = "redis-cache"))]
    #[tokio::test]
    async fn test_create_redis_cache_without_feature() {
        let config = CacheConfig {
            driver: CacheDriver::Redis,
            redis_url: Some("redis://localhost:6379".to_string()),
            ttl_seconds: 3600,
        };

        let err = create_cache(&config).await.unwrap_err().to_string();
        assert!(err.contains("redis-cache") && err.contains("feature"));
    }

    #[cfg(feature = "redis-cache")]
    #[tokio::test]
    async fn test_create_redis_cache_without_url() {
        let config = CacheConfig {
            driver: CacheDriver::Redis,
            redis_url: None,
            ttl_seconds: 3600,
        };

        let err = create_cache(&config).await.unwrap_err().to_string();
        assert!(err.contains("Redis URL"));
    }
}
