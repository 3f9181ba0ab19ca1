//! Metrics hooks and TTL policies for the cached client.
//!
//! # Metrics
//!
//! Implement [`CacheMetrics`] to forward cache events to a monitoring system.
//! The default methods log through the `log` crate; [`NoOpMetrics`] drops
//! everything and is what a client starts with.
//!
//! ```ignore
//! use campus_kit::observability::CacheMetrics;
//! use std::time::Duration;
//!
//! struct PrometheusMetrics;
//!
//! impl CacheMetrics for PrometheusMetrics {
//!     fn record_hit(&self, _key: &str, _duration: Duration) {
//!         // counter!("campus_cache_hits").inc();
//!     }
//! }
//!
//! // let client = CachedClient::builder(backend, http)
//! //     .with_metrics(Box::new(PrometheusMetrics))
//! //     .build();
//! ```
//!
//! # TTL Policies
//!
//! | Policy | Use Case |
//! |--------|----------|
//! | `Default` | Use `ClientConfig::default_ttl` (30 minutes) |
//! | `Fixed` | Same lifetime for every endpoint |
//! | `PerResource` | Long-lived institute lists, short-lived attendance |
//!
//! A TTL passed in [`GetOptions`](crate::strategy::GetOptions) always wins over
//! the policy.

use std::time::Duration;

/// Trait for cache metrics collection.
pub trait CacheMetrics: Send + Sync {
    /// Record a cache hit.
    fn record_hit(&self, key: &str, duration: Duration) {
        debug!("Cache HIT: {} took {:?}", key, duration);
    }

    /// Record a cache miss that went to the network.
    fn record_miss(&self, key: &str, duration: Duration) {
        debug!("Cache MISS: {} took {:?}", key, duration);
    }

    /// Record a cache write.
    fn record_set(&self, key: &str) {
        debug!("Cache SET: {}", key);
    }

    /// Record a caller that joined an in-flight request instead of issuing its own.
    fn record_dedup(&self, key: &str) {
        debug!("Request DEDUP: {}", key);
    }

    /// Record an invalidation triggered by a mutation.
    fn record_invalidation(&self, endpoint: &str, removed: usize) {
        debug!("Cache INVALIDATE after {}: {} entries", endpoint, removed);
    }

    /// Record a cache-layer or background failure that was swallowed.
    fn record_error(&self, key: &str, error: &str) {
        warn!("Cache ERROR for {}: {}", key, error);
    }
}

/// Default metrics implementation (no-op).
#[derive(Clone, Default)]
pub struct NoOpMetrics;

impl CacheMetrics for NoOpMetrics {
    fn record_hit(&self, _key: &str, _duration: Duration) {}
    fn record_miss(&self, _key: &str, _duration: Duration) {}
    fn record_set(&self, _key: &str) {}
    fn record_dedup(&self, _key: &str) {}
    fn record_invalidation(&self, _endpoint: &str, _removed: usize) {}
    fn record_error(&self, _key: &str, _error: &str) {}
}

/// Metrics implementation that only logs (all trait defaults).
#[derive(Clone, Default)]
pub struct LogMetrics;

impl CacheMetrics for LogMetrics {}

/// TTL policy for cached GET responses.
#[derive(Clone, Debug, Default)]
pub enum TtlPolicy {
    /// Use the client's configured default TTL
    #[default]
    Default,

    /// Fixed duration for all entries
    Fixed(Duration),

    /// Per resource family (`"/institutes"`, `"/homework"`, ...).
    /// Receives `None` for endpoints outside every tracked family.
    PerResource(fn(Option<&str>) -> Duration),
}

impl TtlPolicy {
    /// TTL for an endpoint, or `None` to fall back to the client default.
    pub fn get_ttl(&self, endpoint: &str) -> Option<Duration> {
        match self {
            TtlPolicy::Default => None,
            TtlPolicy::Fixed(d) => Some(*d),
            TtlPolicy::PerResource(f) => {
                Some(f(crate::key::CacheKeyBuilder::resource_family(endpoint)))
            }
        }
    }
}
