//! Product cache.
//!
//! Two kinds of entries live in the cache: one per product under `Product_{id}` and a single
//! collection snapshot under [`ALL_PRODUCTS_KEY`]. Both are JSON. The store stays the source of
//! truth; every cache problem degrades to a miss or a skipped write.

use async_trait::async_trait;
use core_config::{ConfigError, FromEnv, env_parse};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

use crate::error::ProductResult;
use crate::models::Product;

/// Key of the collection snapshot.
pub const ALL_PRODUCTS_KEY: &str = "Product_AllProducts";

/// Key of a per-product entry.
pub fn product_key(id: &str) -> String {
    format!("Product_{}", id)
}

/// Cache settings.
///
/// - `CACHE_TTL_SECS` (default 600) - entry lifetime; `0` disables expiry
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_secs: 600 }
    }
}

impl FromEnv for CacheConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            ttl_secs: env_parse("CACHE_TTL_SECS", 600u64)?,
        })
    }
}

/// Raw string cache.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProductCache: Send + Sync {
    async fn get(&self, key: &str) -> ProductResult<Option<String>>;

    async fn set(&self, key: &str, value: String) -> ProductResult<()>;

    async fn delete(&self, key: &str) -> ProductResult<()>;
}

/// Redis-backed cache; entries expire after the configured TTL.
#[derive(Clone)]
pub struct RedisProductCache {
    redis: ConnectionManager,
    ttl_secs: u64,
}

impl RedisProductCache {
    pub fn new(redis: ConnectionManager, config: &CacheConfig) -> Self {
        Self {
            redis,
            ttl_secs: config.ttl_secs,
        }
    }
}

#[async_trait]
impl ProductCache for RedisProductCache {
    async fn get(&self, key: &str) -> ProductResult<Option<String>> {
        let mut conn = self.redis.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: String) -> ProductResult<()> {
        let mut conn = self.redis.clone();
        if self.ttl_secs > 0 {
            let _: () = conn.set_ex(key, value, self.ttl_secs).await?;
        } else {
            let _: () = conn.set(key, value).await?;
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> ProductResult<()> {
        let mut conn = self.redis.clone();
        let _: i64 = conn.del(key).await?;
        Ok(())
    }
}

/// Process-local cache without expiry, for tests and local runs.
#[derive(Clone, Default)]
pub struct InMemoryProductCache {
    entries: Arc<RwLock<HashMap<String, String>>>,
}

impl InMemoryProductCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProductCache for InMemoryProductCache {
    async fn get(&self, key: &str) -> ProductResult<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> ProductResult<()> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> ProductResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

/// Typed view over a [`ProductCache`].
///
/// Never fails: read errors and undecodable entries count as misses, write errors are
/// logged and skipped.
pub struct CatalogCache<C: ProductCache> {
    inner: Arc<C>,
}

impl<C: ProductCache> Clone for CatalogCache<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: ProductCache> CatalogCache<C> {
    pub fn new(cache: C) -> Self {
        Self {
            inner: Arc::new(cache),
        }
    }

    async fn read<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.inner.get(key).await {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(key, error = %e, "Cache read failed, treating as miss");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, error = %e, "Corrupt cache entry, treating as miss");
                None
            }
        }
    }

    async fn write<T: serde::Serialize + ?Sized>(&self, key: &str, value: &T) {
        let json = match serde_json::to_string(value) {
            Ok(json) => json,
            Err(e) => {
                warn!(key, error = %e, "Failed to encode cache entry");
                return;
            }
        };

        if let Err(e) = self.inner.set(key, json).await {
            warn!(key, error = %e, "Cache write failed, skipping");
        }
    }

    pub async fn product(&self, id: &str) -> Option<Product> {
        self.read(&product_key(id)).await
    }

    pub async fn put_product(&self, product: &Product) {
        self.write(&product_key(&product.id), product).await;
    }

    pub async fn evict_product(&self, id: &str) {
        let key = product_key(id);
        if let Err(e) = self.inner.delete(&key).await {
            warn!(key, error = %e, "Cache eviction failed, skipping");
        }
    }

    pub async fn collection(&self) -> Option<Vec<Product>> {
        self.read(ALL_PRODUCTS_KEY).await
    }

    pub async fn put_collection(&self, products: &[Product]) {
        self.write(ALL_PRODUCTS_KEY, products).await;
    }

    /// Append to the collection snapshot if one is cached; otherwise leave it absent.
    pub async fn append_to_collection(&self, product: &Product) {
        if let Some(mut products) = self.collection().await {
            products.push(product.clone());
            self.put_collection(&products).await;
        }
    }

    /// Replace the matching item in the cached collection; no-op when absent.
    pub async fn replace_in_collection(&self, product: &Product) {
        let Some(mut products) = self.collection().await else {
            return;
        };
        if let Some(slot) = products.iter_mut().find(|p| p.id == product.id) {
            *slot = product.clone();
            self.put_collection(&products).await;
        }
    }

    /// Drop the matching item from the cached collection; no-op when absent.
    pub async fn remove_from_collection(&self, id: &str) {
        let Some(mut products) = self.collection().await else {
            return;
        };
        let before = products.len();
        products.retain(|p| p.id != id);
        if products.len() != before {
            self.put_collection(&products).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProductError;
    use mockall::predicate::eq;
    use rust_decimal::Decimal;

    fn product(id: &str, quantity: i32) -> Product {
        Product {
            id: id.to_string(),
            name: format!("Product {}", id),
            description: String::new(),
            price: Decimal::new(500, 2),
            quantity_in_stock: quantity,
        }
    }

    #[test]
    fn test_keys() {
        assert_eq!(product_key("42"), "Product_42");
        assert_eq!(ALL_PRODUCTS_KEY, "Product_AllProducts");
    }

    #[test]
    fn test_cache_config_from_env() {
        temp_env::with_var("CACHE_TTL_SECS", Some("0"), || {
            assert_eq!(CacheConfig::from_env().unwrap().ttl_secs, 0);
        });
        temp_env::with_var_unset("CACHE_TTL_SECS", || {
            assert_eq!(CacheConfig::from_env().unwrap().ttl_secs, 600);
        });
        temp_env::with_var("CACHE_TTL_SECS", Some("soon"), || {
            assert!(CacheConfig::from_env().is_err());
        });
    }

    #[tokio::test]
    async fn test_product_round_trip() {
        let cache = CatalogCache::new(InMemoryProductCache::new());
        assert!(cache.product("a").await.is_none());

        cache.put_product(&product("a", 3)).await;
        assert_eq!(cache.product("a").await, Some(product("a", 3)));

        cache.evict_product("a").await;
        assert!(cache.product("a").await.is_none());
    }

    #[tokio::test]
    async fn test_append_only_when_collection_cached() {
        let cache = CatalogCache::new(InMemoryProductCache::new());

        cache.append_to_collection(&product("a", 1)).await;
        assert!(cache.collection().await.is_none());

        cache.put_collection(&[]).await;
        cache.append_to_collection(&product("a", 1)).await;
        assert_eq!(cache.collection().await, Some(vec![product("a", 1)]));
    }

    #[tokio::test]
    async fn test_replace_and_remove_in_collection() {
        let cache = CatalogCache::new(InMemoryProductCache::new());
        cache
            .put_collection(&[product("a", 1), product("b", 2)])
            .await;

        cache.replace_in_collection(&product("b", 9)).await;
        cache.replace_in_collection(&product("zz", 9)).await;
        assert_eq!(
            cache.collection().await,
            Some(vec![product("a", 1), product("b", 9)])
        );

        cache.remove_from_collection("a").await;
        assert_eq!(cache.collection().await, Some(vec![product("b", 9)]));
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_a_miss() {
        let inner = InMemoryProductCache::new();
        inner
            .set(&product_key("a"), "{not json".to_string())
            .await
            .unwrap();

        let cache = CatalogCache::new(inner);
        assert!(cache.product("a").await.is_none());
    }

    #[tokio::test]
    async fn test_read_error_is_a_miss() {
        let mut mock = MockProductCache::new();
        mock.expect_get()
            .with(eq(ALL_PRODUCTS_KEY))
            .returning(|_| Err(ProductError::Cache("connection refused".into())));

        let cache = CatalogCache::new(mock);
        assert!(cache.collection().await.is_none());
    }

    #[tokio::test]
    async fn test_write_error_is_swallowed() {
        let mut mock = MockProductCache::new();
        mock.expect_set()
            .times(1)
            .returning(|_, _| Err(ProductError::Cache("read-only replica".into())));
        mock.expect_delete()
            .times(1)
            .returning(|_| Err(ProductError::Cache("read-only replica".into())));

        let cache = CatalogCache::new(mock);
        cache.put_product(&product("a", 1)).await;
        cache.evict_product("a").await;
    }
}
