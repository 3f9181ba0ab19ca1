//! Request cache: maps `(endpoint, params)` onto store entries.
//!
//! Every method here is best effort. Store failures and undecodable entries
//! are logged and reported as misses; nothing in this module returns an error
//! to the caller.

use crate::backend::CacheBackend;
use crate::config::BaseUrl;
use crate::key::{CacheKeyBuilder, Params};
use crate::serialization::{decode_entry, encode_entry};
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// A decoded cache hit.
#[derive(Clone, Debug, PartialEq)]
pub struct CachedValue {
    pub value: Value,
    pub stored_at_ms: u64,
    pub ttl_minutes: u32,
}

/// Request cache statistics.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entry_count: usize,
    pub expired_entries: usize,
    pub total_bytes: usize,
    pub storage_type: &'static str,
    /// Distinct tags currently indexed.
    pub tag_count: usize,
    /// `false` when the store could not be queried.
    pub available: bool,
}

/// Facade over a [`CacheBackend`] keyed by endpoint and params.
///
/// Cheap to clone; clones share the store and the tag index.
#[derive(Clone)]
pub struct RequestCache<B: CacheBackend> {
    backend: B,
    namespace: Arc<str>,
    /// tag -> keys written under it
    tags: Arc<DashMap<String, HashSet<String>>>,
    index_tags: bool,
}

impl<B: CacheBackend> RequestCache<B> {
    pub fn new(backend: B) -> Self {
        Self::with_namespace(backend, "campus")
    }

    pub fn with_namespace(backend: B, namespace: &str) -> Self {
        RequestCache {
            backend,
            namespace: Arc::from(namespace),
            tags: Arc::new(DashMap::new()),
            index_tags: true,
        }
    }

    /// Whether writes record their resource tags. Only tag invalidation
    /// reads the index.
    pub fn with_tag_index(mut self, enabled: bool) -> Self {
        self.index_tags = enabled;
        self
    }

    /// Canonical, namespaced key for a request to the primary origin.
    pub fn compute_key(&self, endpoint: &str, params: &Params) -> String {
        self.compute_key_for(BaseUrl::Primary, endpoint, params)
    }

    /// Canonical, namespaced key for a request to `base`.
    pub fn compute_key_for(&self, base: BaseUrl, endpoint: &str, params: &Params) -> String {
        CacheKeyBuilder::build_for_base(&self.namespace, base, endpoint, params)
    }

    /// Cached value for a request, or `None` on miss or any failure.
    pub async fn get_cache<T: DeserializeOwned>(&self, endpoint: &str, params: &Params) -> Option<T> {
        self.get_cache_for(BaseUrl::Primary, endpoint, params).await
    }

    pub async fn get_cache_for<T: DeserializeOwned>(
        &self,
        base: BaseUrl,
        endpoint: &str,
        params: &Params,
    ) -> Option<T> {
        let key = self.compute_key_for(base, endpoint, params);
        let entry = self.get_entry_by_key(&key).await?;
        match serde_json::from_value(entry.value) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Cached value for {} has unexpected shape: {}", key, e);
                None
            }
        }
    }

    /// Cached value plus its metadata.
    pub async fn get_entry(&self, endpoint: &str, params: &Params) -> Option<CachedValue> {
        self.get_entry_for(BaseUrl::Primary, endpoint, params).await
    }

    pub async fn get_entry_for(
        &self,
        base: BaseUrl,
        endpoint: &str,
        params: &Params,
    ) -> Option<CachedValue> {
        self.get_entry_by_key(&self.compute_key_for(base, endpoint, params))
            .await
    }

    pub(crate) async fn get_entry_by_key(&self, key: &str) -> Option<CachedValue> {
        let bytes = match self.backend.get(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                warn!("Cache read failed for {}: {}", key, e);
                return None;
            }
        };

        let decoded = decode_entry(&bytes).and_then(|envelope| {
            Ok(CachedValue {
                value: envelope.value()?,
                stored_at_ms: envelope.stored_at_ms,
                ttl_minutes: envelope.ttl_minutes,
            })
        });

        match decoded {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Evicting unreadable cache entry {}: {}", key, e);
                self.remove_by_key(key).await;
                None
            }
        }
    }

    /// Delete one entry and forget its tags.
    pub(crate) async fn remove_by_key(&self, key: &str) {
        self.untag(key);
        if let Err(e) = self.backend.delete(key).await {
            warn!("Cache delete failed for {}: {}", key, e);
        }
    }

    fn untag(&self, key: &str) {
        if !self.index_tags {
            return;
        }
        for mut entry in self.tags.iter_mut() {
            entry.value_mut().remove(key);
        }
        self.tags.retain(|_, keys| !keys.is_empty());
    }

    /// Store a response for `ttl_minutes`.
    pub async fn set_cache(&self, endpoint: &str, value: &Value, params: &Params, ttl_minutes: u32) {
        let key = self.compute_key(endpoint, params);
        let ttl = Duration::from_secs(u64::from(ttl_minutes) * 60);
        self.set_entry_by_key(&key, endpoint, value, ttl).await;
    }

    /// Returns whether the entry was written.
    pub(crate) async fn set_entry_by_key(
        &self,
        key: &str,
        endpoint: &str,
        value: &Value,
        ttl: Duration,
    ) -> bool {
        let tags = CacheKeyBuilder::resource_tags(endpoint);
        let ttl_minutes = u32::try_from(ttl.as_secs().div_ceil(60)).unwrap_or(u32::MAX);

        let bytes = match encode_entry(value, ttl_minutes, tags.clone()) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Cache encode failed for {}: {}", key, e);
                return false;
            }
        };

        if let Err(e) = self.backend.set(key, bytes, Some(ttl)).await {
            warn!("Cache write failed for {}: {}", key, e);
            return false;
        }

        if self.index_tags {
            for tag in tags {
                self.tags.entry(tag).or_default().insert(key.to_string());
            }
        }
        true
    }

    /// Whether a live entry exists. Never touches the network.
    pub async fn has_cache(&self, endpoint: &str, params: &Params) -> bool {
        self.has_cache_for(BaseUrl::Primary, endpoint, params).await
    }

    pub async fn has_cache_for(&self, base: BaseUrl, endpoint: &str, params: &Params) -> bool {
        let key = self.compute_key_for(base, endpoint, params);
        match self.backend.exists(&key).await {
            Ok(exists) => exists,
            Err(e) => {
                warn!("Cache lookup failed for {}: {}", key, e);
                false
            }
        }
    }

    /// Drop every entry.
    pub async fn clear_all_cache(&self) {
        self.tags.clear();
        match self.backend.clear_all().await {
            Ok(()) => debug!("Request cache cleared"),
            Err(e) => warn!("Cache clear failed: {}", e),
        }
    }

    /// Drop every entry written under any of `tags`. Returns how many keys
    /// were targeted.
    pub async fn invalidate_tags(&self, tags: &[String]) -> usize {
        let mut keys: HashSet<String> = HashSet::new();
        for tag in tags {
            if let Some((_, tagged)) = self.tags.remove(tag) {
                keys.extend(tagged);
            }
        }
        if keys.is_empty() {
            return 0;
        }

        // Keys may be indexed under tags that were not invalidated.
        for mut entry in self.tags.iter_mut() {
            entry.value_mut().retain(|k| !keys.contains(k));
        }

        let refs: Vec<&str> = keys.iter().map(String::as_str).collect();
        if let Err(e) = self.backend.mdelete(&refs).await {
            warn!("Tag invalidation failed for {:?}: {}", tags, e);
        }
        debug!("Invalidated {} entries for tags {:?}", refs.len(), tags);
        refs.len()
    }

    /// Forget indexed keys the store no longer holds. Returns how many were
    /// dropped.
    pub async fn prune_tags(&self) -> usize {
        if !self.index_tags {
            return 0;
        }
        let indexed: HashSet<String> = self
            .tags
            .iter()
            .flat_map(|entry| entry.value().iter().cloned().collect::<Vec<_>>())
            .collect();

        let mut gone = 0;
        for key in indexed {
            // Read errors keep the key indexed.
            if let Ok(false) = self.backend.exists(&key).await {
                self.untag(&key);
                gone += 1;
            }
        }
        if gone > 0 {
            debug!("Pruned {} expired keys from the tag index", gone);
        }
        gone
    }

    /// Store statistics. Prunes the tag index first so `tag_count` only
    /// counts tags with live entries.
    pub async fn get_cache_stats(&self) -> CacheStats {
        self.prune_tags().await;
        match self.backend.stats().await {
            Ok(stats) => CacheStats {
                entry_count: stats.entry_count,
                expired_entries: stats.expired_entries,
                total_bytes: stats.total_bytes,
                storage_type: stats.storage_type,
                tag_count: self.tags.len(),
                available: true,
            },
            Err(e) => {
                warn!("Cache stats unavailable: {}", e);
                CacheStats {
                    storage_type: "unavailable",
                    ..Default::default()
                }
            }
        }
    }

    /// Whether the store answers a health check.
    pub async fn is_available(&self) -> bool {
        match self.backend.health_check().await {
            Ok(healthy) => healthy,
            Err(e) => {
                warn!("Cache unavailable: {}", e);
                false
            }
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;
    use serde_json::json;

    #[tokio::test]
    async fn test_set_then_get() {
        let cache = RequestCache::new(InMemoryBackend::new());
        let params = Params::new().with("instituteId", "I1");

        cache
            .set_cache("/homework", &json!([{"id": "H1"}]), &params, 15)
            .await;

        let value: Option<Vec<Value>> = cache.get_cache("/homework", &params).await;
        assert_eq!(value, Some(vec![json!({"id": "H1"})]));

        let entry = cache
            .get_entry("/homework", &params)
            .await
            .expect("Entry missing");
        assert_eq!(entry.ttl_minutes, 15);
        assert!(cache.has_cache("/homework", &params).await);
        assert!(!cache.has_cache("/homework", &Params::new()).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_ttl() {
        let cache = RequestCache::new(InMemoryBackend::new());

        cache.set_cache("/exams", &json!([]), &Params::new(), 15).await;

        tokio::time::advance(Duration::from_secs(15 * 60 - 1)).await;
        assert!(cache.get_entry("/exams", &Params::new()).await.is_some());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cache.get_entry("/exams", &Params::new()).await.is_none());
    }

    #[tokio::test]
    async fn test_wrong_shape_is_a_miss() {
        let cache = RequestCache::new(InMemoryBackend::new());
        cache
            .set_cache("/classes", &json!({"not": "a list"}), &Params::new(), 5)
            .await;

        let value: Option<Vec<String>> = cache.get_cache("/classes", &Params::new()).await;
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn test_garbage_entry_is_evicted() {
        let backend = InMemoryBackend::new();
        let cache = RequestCache::new(backend.clone());
        let key = cache.compute_key("/subjects", &Params::new());

        backend
            .set(&key, b"not an envelope".to_vec(), None)
            .await
            .expect("Failed to set");

        assert!(cache.get_entry("/subjects", &Params::new()).await.is_none());
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn test_invalidate_tags_is_selective() {
        let cache = RequestCache::new(InMemoryBackend::new());
        let params = Params::new();

        cache.set_cache("/homework", &json!(1), &params, 10).await;
        cache
            .set_cache("/institutes/I1/classes", &json!(2), &params, 10)
            .await;
        cache.set_cache("/exams", &json!(3), &params, 10).await;

        let removed = cache.invalidate_tags(&["classes".to_string()]).await;
        assert_eq!(removed, 1);

        assert!(cache.has_cache("/homework", &params).await);
        assert!(cache.has_cache("/exams", &params).await);
        assert!(!cache.has_cache("/institutes/I1/classes", &params).await);

        // Already removed via the "classes" tag
        assert_eq!(cache.invalidate_tags(&["institutes".to_string()]).await, 0);
    }

    #[tokio::test]
    async fn test_clear_all_and_stats() {
        let cache = RequestCache::new(InMemoryBackend::new());
        cache.set_cache("/lectures", &json!([]), &Params::new(), 10).await;
        cache.set_cache("/attendance", &json!([]), &Params::new(), 10).await;

        let stats = cache.get_cache_stats().await;
        assert!(stats.available);
        assert_eq!(stats.entry_count, 2);
        assert_eq!(stats.tag_count, 2);
        assert_eq!(stats.storage_type, "memory");

        cache.clear_all_cache().await;
        let stats = cache.get_cache_stats().await;
        assert_eq!(stats.entry_count, 0);
        assert_eq!(stats.tag_count, 0);
    }

    #[tokio::test]
    async fn test_origins_do_not_share_entries() {
        let cache = RequestCache::new(InMemoryBackend::new());
        let params = Params::new();
        let key = cache.compute_key_for(BaseUrl::Secondary, "/organizations", &params);
        cache
            .set_entry_by_key(&key, "/organizations", &json!(["org"]), Duration::from_secs(60))
            .await;

        assert!(cache.has_cache_for(BaseUrl::Secondary, "/organizations", &params).await);
        assert!(!cache.has_cache("/organizations", &params).await);
        assert!(cache.get_entry("/organizations", &params).await.is_none());

        let value: Option<Vec<String>> = cache
            .get_cache_for(BaseUrl::Secondary, "/organizations", &params)
            .await;
        assert_eq!(value, Some(vec!["org".to_string()]));
    }

    #[tokio::test]
    async fn test_tag_index_disabled() {
        let cache = RequestCache::new(InMemoryBackend::new()).with_tag_index(false);
        cache.set_cache("/homework", &json!([]), &Params::new(), 10).await;

        assert_eq!(cache.get_cache_stats().await.tag_count, 0);
        assert_eq!(cache.invalidate_tags(&["homework".to_string()]).await, 0);
        assert!(cache.has_cache("/homework", &Params::new()).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_keys_leave_tag_index() {
        let cache = RequestCache::new(InMemoryBackend::new());
        cache.set_cache("/homework", &json!([]), &Params::new(), 1).await;
        cache.set_cache("/exams", &json!([]), &Params::new(), 10).await;
        assert_eq!(cache.get_cache_stats().await.tag_count, 2);

        tokio::time::advance(Duration::from_secs(61)).await;

        assert_eq!(cache.prune_tags().await, 1);
        assert_eq!(cache.get_cache_stats().await.tag_count, 1);
        assert_eq!(cache.invalidate_tags(&["homework".to_string()]).await, 0);
    }

    #[tokio::test]
    async fn test_evicted_entry_leaves_tag_index() {
        let backend = InMemoryBackend::new();
        let cache = RequestCache::new(backend.clone());
        cache.set_cache("/lectures", &json!([]), &Params::new(), 10).await;
        let key = cache.compute_key("/lectures", &Params::new());
        backend
            .set(&key, b"not an envelope".to_vec(), None)
            .await
            .expect("Failed to set");

        assert!(cache.get_entry("/lectures", &Params::new()).await.is_none());
        assert!(cache.tags.is_empty());
    }
}
