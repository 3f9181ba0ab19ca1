//! Redis cache store: the durable option.
//!
//! Every key is stored under `RedisConfig::namespace`, so `clear_all` and
//! `stats` touch only this client's entries and never the whole database.

use super::{CacheBackend, StoreStats};
use crate::error::{Error, Result};
use deadpool_redis::{redis::AsyncCommands, Config as PoolConfig, Connection, Pool, Runtime};
use std::time::Duration;

/// Pool statistics information.
#[derive(Debug, Clone)]
pub struct PoolStats {
    pub connections: u32,
    pub idle_connections: u32,
}

/// Default Redis connection pool size.
/// Override with REDIS_POOL_SIZE environment variable
const DEFAULT_POOL_SIZE: u32 = 16;

/// Keys fetched per SCAN round trip.
const SCAN_BATCH: usize = 500;

/// Configuration for Redis store.
#[derive(Clone, Debug)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub database: u32,
    pub pool_size: u32,
    pub connection_timeout: Duration,
    /// Prefix prepended to every key, joined with `:`.
    pub namespace: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        RedisConfig {
            host: "localhost".to_string(),
            port: 6379,
            username: None,
            password: None,
            database: 0,
            pool_size: std::env::var("REDIS_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse::<u32>().ok())
                .unwrap_or(DEFAULT_POOL_SIZE),
            connection_timeout: Duration::from_secs(5),
            namespace: "campus-cache".to_string(),
        }
    }
}

impl RedisConfig {
    /// Build Redis connection string.
    pub fn connection_string(&self) -> String {
        match (&self.username, &self.password) {
            (Some(username), Some(password)) => format!(
                "redis://{}:{}@{}:{}/{}",
                username, password, self.host, self.port, self.database
            ),
            (None, Some(password)) => format!(
                "redis://default:{}@{}:{}/{}",
                password, self.host, self.port, self.database
            ),
            _ => format!("redis://{}:{}/{}", self.host, self.port, self.database),
        }
    }
}

/// Redis store with connection pooling.
///
/// # Example
///
/// ```no_run
/// # use campus_kit::backend::{RedisBackend, RedisConfig, CacheBackend};
/// # use campus_kit::error::Result;
/// # async fn example() -> Result<()> {
/// let backend = RedisBackend::new(RedisConfig::default()).await?;
///
/// backend.set("campus:/institutes", b"[]".to_vec(), None).await?;
/// let value = backend.get("campus:/institutes").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RedisBackend {
    pool: Pool,
    namespace: String,
}

impl RedisBackend {
    /// Create new Redis store from configuration.
    ///
    /// # Errors
    /// Returns `Err` if pool creation fails.
    pub async fn new(config: RedisConfig) -> Result<Self> {
        let mut cfg = PoolConfig::from_url(config.connection_string());
        let mut pool_cfg = deadpool_redis::PoolConfig::new(config.pool_size as usize);
        pool_cfg.timeouts.wait = Some(config.connection_timeout);
        pool_cfg.timeouts.create = Some(config.connection_timeout);
        cfg.pool = Some(pool_cfg);

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| Error::BackendError(format!("Failed to create Redis pool: {}", e)))?;

        info!(
            "✓ Redis cache store initialized: {}:{} (namespace: {})",
            config.host, config.port, config.namespace
        );

        Ok(RedisBackend {
            pool,
            namespace: config.namespace,
        })
    }

    /// Get current pool statistics.
    pub fn pool_stats(&self) -> PoolStats {
        let status = self.pool.status();
        PoolStats {
            connections: status.size as u32,
            idle_connections: status.available as u32,
        }
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}:{}", self.namespace, key)
    }

    async fn connection(&self) -> Result<Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| Error::BackendError(format!("Failed to get Redis connection: {}", e)))
    }

    /// Every key under this store's namespace.
    async fn scan_namespace(&self, conn: &mut Connection) -> Result<Vec<String>> {
        let pattern = format!("{}:*", self.namespace);
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        loop {
            let (next, batch): (u64, Vec<String>) = deadpool_redis::redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut **conn)
                .await
                .map_err(|e| Error::BackendError(format!("Redis SCAN failed: {}", e)))?;

            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        Ok(keys)
    }
}

impl CacheBackend for RedisBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.connection().await?;

        let value: Option<Vec<u8>> = conn
            .get(self.namespaced(key))
            .await
            .map_err(|e| Error::BackendError(format!("Redis GET failed for key {}: {}", key, e)))?;

        if value.is_some() {
            debug!("✓ Redis GET {} -> HIT", key);
        } else {
            debug!("✓ Redis GET {} -> MISS", key);
        }

        Ok(value)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.connection().await?;
        let full_key = self.namespaced(key);

        match ttl {
            // SETEX rejects 0; a zero TTL entry is already expired.
            Some(duration) if duration.as_secs() == 0 => {
                conn.del::<_, ()>(&full_key).await.map_err(|e| {
                    Error::BackendError(format!("Redis DEL failed for key {}: {}", key, e))
                })?;
            }
            Some(duration) => {
                let seconds = duration.as_secs();
                conn.set_ex::<_, _, ()>(&full_key, value, seconds)
                    .await
                    .map_err(|e| {
                        Error::BackendError(format!("Redis SET_EX failed for key {}: {}", key, e))
                    })?;
                debug!("✓ Redis SET {} (TTL: {}s)", key, seconds);
            }
            None => {
                conn.set::<_, _, ()>(&full_key, value).await.map_err(|e| {
                    Error::BackendError(format!("Redis SET failed for key {}: {}", key, e))
                })?;
                debug!("✓ Redis SET {}", key);
            }
        }

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.connection().await?;

        conn.del::<_, ()>(self.namespaced(key))
            .await
            .map_err(|e| Error::BackendError(format!("Redis DEL failed for key {}: {}", key, e)))?;

        debug!("✓ Redis DELETE {}", key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.connection().await?;

        conn.exists(self.namespaced(key)).await.map_err(|e| {
            Error::BackendError(format!("Redis EXISTS failed for key {}: {}", key, e))
        })
    }

    async fn mdelete(&self, keys: &[&str]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.connection().await?;
        let full_keys: Vec<String> = keys.iter().map(|k| self.namespaced(k)).collect();

        conn.del::<_, ()>(full_keys)
            .await
            .map_err(|e| Error::BackendError(format!("Redis DEL (bulk) failed: {}", e)))?;

        debug!("✓ Redis MDELETE {} keys", keys.len());
        Ok(())
    }

    async fn health_check(&self) -> Result<bool> {
        let mut conn = self.connection().await?;

        let pong: String = deadpool_redis::redis::cmd("PING")
            .query_async(&mut *conn)
            .await
            .map_err(|e| Error::BackendError(format!("Redis PING failed: {}", e)))?;

        Ok(pong.contains("PONG"))
    }

    async fn clear_all(&self) -> Result<()> {
        let mut conn = self.connection().await?;
        let keys = self.scan_namespace(&mut conn).await?;

        for chunk in keys.chunks(SCAN_BATCH) {
            conn.del::<_, ()>(chunk)
                .await
                .map_err(|e| Error::BackendError(format!("Redis DEL (clear) failed: {}", e)))?;
        }

        warn!(
            "⚠ Redis CLEAR_ALL executed - {} keys dropped from namespace {}",
            keys.len(),
            self.namespace
        );
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats> {
        let mut conn = self.connection().await?;
        let keys = self.scan_namespace(&mut conn).await?;

        let mut total_bytes = 0usize;
        for key in &keys {
            let len: usize = conn.strlen(key).await.map_err(|e| {
                Error::BackendError(format!("Redis STRLEN failed for key {}: {}", key, e))
            })?;
            total_bytes += len;
        }

        Ok(StoreStats {
            entry_count: keys.len(),
            // Redis evicts expired keys itself
            expired_entries: 0,
            total_bytes,
            storage_type: "redis",
        })
    }
}
