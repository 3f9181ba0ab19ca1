//! Persistent cache store implementations.

use crate::error::Result;
use std::future::Future;
use std::time::Duration;

pub mod inmemory;
#[cfg(feature = "redis")]
pub mod redis;

pub use inmemory::InMemoryBackend;
#[cfg(feature = "redis")]
pub use redis::{PoolStats, RedisBackend, RedisConfig};

/// Store statistics.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreStats {
    pub entry_count: usize,
    pub expired_entries: usize,
    pub total_bytes: usize,
    /// Short name of the storage medium ("memory", "redis").
    pub storage_type: &'static str,
}

/// Trait for cache store implementations.
///
/// Abstracts the storage medium behind the request cache, allowing an
/// in-memory store or a durable one.
///
/// **IMPORTANT:** All methods use `&self` instead of `&mut self` to allow concurrent access.
/// Implementations should use interior mutability or external storage.
///
/// **ASYNC:** All methods return `Send` futures so cache reads can run inside
/// detached background tasks.
pub trait CacheBackend: Send + Sync + Clone + 'static {
    /// Retrieve value from cache by key.
    ///
    /// # Returns
    /// - `Ok(Some(bytes))` - Value found and not expired
    /// - `Ok(None)` - Cache miss (absent or expired)
    ///
    /// # Errors
    /// Returns `Err` if the store is unavailable.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<Vec<u8>>>> + Send;

    /// Store value in cache with optional TTL.
    ///
    /// `None` means the entry never expires.
    ///
    /// # Errors
    /// Returns `Err` if the store is unavailable.
    fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Remove value from cache.
    ///
    /// # Errors
    /// Returns `Err` if the store is unavailable.
    fn delete(&self, key: &str) -> impl Future<Output = Result<()>> + Send;

    /// Remove every entry of this store.
    ///
    /// # Errors
    /// Returns `Err` if the store is unavailable.
    fn clear_all(&self) -> impl Future<Output = Result<()>> + Send;

    /// Entry count and storage introspection.
    ///
    /// # Errors
    /// Returns `Err` if the store is unavailable.
    fn stats(&self) -> impl Future<Output = Result<StoreStats>> + Send;

    /// Check if key exists and is not expired.
    ///
    /// # Errors
    /// Returns `Err` if the store is unavailable.
    fn exists(&self, key: &str) -> impl Future<Output = Result<bool>> + Send {
        async move { Ok(self.get(key).await?.is_some()) }
    }

    /// Bulk get. Default implementation calls `get()` for each key.
    ///
    /// # Errors
    /// Returns `Err` if the store is unavailable.
    fn mget(&self, keys: &[&str]) -> impl Future<Output = Result<Vec<Option<Vec<u8>>>>> + Send {
        async move {
            let mut results = Vec::with_capacity(keys.len());
            for key in keys {
                results.push(self.get(key).await?);
            }
            Ok(results)
        }
    }

    /// Bulk delete. Default implementation calls `delete()` for each key.
    ///
    /// # Errors
    /// Returns `Err` if the store is unavailable.
    fn mdelete(&self, keys: &[&str]) -> impl Future<Output = Result<()>> + Send {
        async move {
            for key in keys {
                self.delete(key).await?;
            }
            Ok(())
        }
    }

    /// Whether the store is reachable. The cached client bypasses the cache when this
    /// returns `false` or errors.
    fn health_check(&self) -> impl Future<Output = Result<bool>> + Send {
        async { Ok(true) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_backend_exists_default() {
        let backend = InMemoryBackend::new();
        backend
            .set("key", vec![1, 2, 3], None)
            .await
            .expect("Failed to set key");
        assert!(backend.exists("key").await.expect("Failed to check exists"));
        assert!(!backend
            .exists("nonexistent")
            .await
            .expect("Failed to check exists"));
    }
}
