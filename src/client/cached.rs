//! Deduplicating, caching client: the read path every API call goes through.
//!
//! # Read path
//!
//! ```text
//! get(endpoint, params, options)
//!   ├─ sweep in-flight requests older than PENDING_REQUEST_TTL
//!   ├─ in-flight request for the same key? ── join it (one network call)
//!   └─ register a new in-flight request, then on a spawned task:
//!        ├─ Bypass ─────────────────────────────── network
//!        ├─ cache unavailable ──────────────────── network
//!        ├─ cache hit ── (Revalidate: spawn background refresh) ── return
//!        └─ miss / Refresh ── network ── write cache ── return
//! ```
//!
//! Registration happens before the first `.await`, so callers arriving while
//! the cache is still being consulted join the same request.
//!
//! # Write path
//!
//! Mutations go straight to the HTTP client, then invalidate according to the
//! [`InvalidationPolicy`]. A generation counter is bumped on every
//! invalidation; reads and background refreshes scheduled before it never
//! write their (possibly stale) result back.

use super::breaker::RevalidationBreaker;
use super::http::HttpClient;
use super::response::unwrap_data;
use super::transport::{Method, Transport};
use crate::backend::CacheBackend;
use crate::cache::{CacheStats, RequestCache};
use crate::config::{BaseUrl, PENDING_REQUEST_TTL};
use crate::error::{Error, Result};
use crate::key::{CacheKeyBuilder, Params};
use crate::observability::{CacheMetrics, NoOpMetrics, TtlPolicy};
use crate::strategy::{FetchStrategy, GetOptions, InvalidationPolicy};
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

type SharedResponse = Shared<BoxFuture<'static, Result<Value>>>;

/// An in-flight GET that later identical calls join.
struct PendingRequest {
    id: u64,
    created_at: Instant,
    response: SharedResponse,
}

impl PendingRequest {
    fn is_stale(&self) -> bool {
        self.created_at.elapsed() >= PENDING_REQUEST_TTL
    }
}

struct ClientInner<B: CacheBackend, T: Transport> {
    cache: RequestCache<B>,
    http: HttpClient<T>,
    pending: DashMap<String, PendingRequest>,
    revalidating: DashSet<String>,
    breaker: RevalidationBreaker,
    metrics: Box<dyn CacheMetrics>,
    ttl_policy: TtlPolicy,
    invalidation: InvalidationPolicy,
    default_ttl: Duration,
    revalidate_delay: Duration,
    next_id: AtomicU64,
    generation: AtomicU64,
}

/// Builder for [`CachedClient`].
pub struct CachedClientBuilder<B: CacheBackend, T: Transport> {
    backend: B,
    http: HttpClient<T>,
    metrics: Box<dyn CacheMetrics>,
    ttl_policy: TtlPolicy,
    invalidation: InvalidationPolicy,
    breaker: RevalidationBreaker,
}

impl<B: CacheBackend, T: Transport> CachedClientBuilder<B, T> {
    /// Set custom metrics handler.
    pub fn with_metrics(mut self, metrics: Box<dyn CacheMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Set custom TTL policy.
    pub fn with_ttl_policy(mut self, policy: TtlPolicy) -> Self {
        self.ttl_policy = policy;
        self
    }

    pub fn with_invalidation(mut self, policy: InvalidationPolicy) -> Self {
        self.invalidation = policy;
        self
    }

    /// Failures before background refresh of a key is suspended, and for how long.
    pub fn with_revalidation_breaker(mut self, threshold: u32, cooldown: Duration) -> Self {
        self.breaker = RevalidationBreaker::new(threshold, cooldown);
        self
    }

    pub fn build(self) -> CachedClient<B, T> {
        let config = self.http.config().clone();
        CachedClient {
            inner: Arc::new(ClientInner {
                cache: RequestCache::with_namespace(self.backend, &config.key_namespace)
                    .with_tag_index(self.invalidation == InvalidationPolicy::Tagged),
                http: self.http,
                pending: DashMap::new(),
                revalidating: DashSet::new(),
                breaker: self.breaker,
                metrics: self.metrics,
                ttl_policy: self.ttl_policy,
                invalidation: self.invalidation,
                default_ttl: config.default_ttl,
                revalidate_delay: config.revalidate_delay,
                next_id: AtomicU64::new(1),
                generation: AtomicU64::new(0),
            }),
        }
    }
}

/// Caching API client.
///
/// Each instance owns its cache facade and in-flight table; clones share them,
/// separately built instances are fully isolated.
///
/// # Example
///
/// ```ignore
/// use campus_kit::{CachedClient, ClientConfig, GetOptions, Params};
/// use campus_kit::backend::InMemoryBackend;
/// use campus_kit::client::{HttpClient, ReqwestTransport};
///
/// let http = HttpClient::new(ReqwestTransport::new()?, ClientConfig::from_env());
/// let client = CachedClient::new(InMemoryBackend::new(), http);
///
/// let homework: serde_json::Value = client
///     .get("/homework", &Params::new().with("instituteId", "I1"), GetOptions::default().with_ttl_minutes(15))
///     .await?;
/// ```
pub struct CachedClient<B: CacheBackend, T: Transport> {
    inner: Arc<ClientInner<B, T>>,
}

impl<B: CacheBackend, T: Transport> Clone for CachedClient<B, T> {
    fn clone(&self) -> Self {
        CachedClient {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: CacheBackend, T: Transport> CachedClient<B, T> {
    /// Client with default metrics, TTL policy and coarse invalidation.
    pub fn new(backend: B, http: HttpClient<T>) -> Self {
        Self::builder(backend, http).build()
    }

    pub fn builder(backend: B, http: HttpClient<T>) -> CachedClientBuilder<B, T> {
        CachedClientBuilder {
            backend,
            http,
            metrics: Box::new(NoOpMetrics),
            ttl_policy: TtlPolicy::default(),
            invalidation: InvalidationPolicy::default(),
            breaker: RevalidationBreaker::default(),
        }
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Cached GET, decoded into `R`.
    ///
    /// # Errors
    ///
    /// Network and HTTP errors of the underlying call (shared by every joined
    /// caller), or `Error::DeserializationError` if the body does not match `R`.
    /// Cache failures never surface.
    pub async fn get<R: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &Params,
        options: GetOptions,
    ) -> Result<R> {
        let value = self.get_value(endpoint, params, options).await?;
        serde_json::from_value(value)
            .map_err(|e| Error::DeserializationError(format!("{}: {}", endpoint, e)))
    }

    /// Cached GET, payload extracted from the `{ data, ... }` envelope when present.
    ///
    /// # Errors
    ///
    /// As [`get`](Self::get), plus `Error::Other` for `success: false` envelopes.
    pub async fn get_data<R: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &Params,
        options: GetOptions,
    ) -> Result<R> {
        unwrap_data(self.get_value(endpoint, params, options).await?)
    }

    /// Cached GET returning the raw JSON body.
    ///
    /// # Errors
    ///
    /// See [`get`](Self::get).
    pub async fn get_value(
        &self,
        endpoint: &str,
        params: &Params,
        options: GetOptions,
    ) -> Result<Value> {
        let key = self
            .inner
            .cache
            .compute_key_for(options.base, endpoint, params);
        self.sweep_pending();
        let response = self.join_or_dispatch(key, endpoint, params, options);
        response.await
    }

    /// GET that skips the cache read and any in-flight request, then rewrites the cache.
    ///
    /// # Errors
    ///
    /// See [`get`](Self::get).
    pub async fn refresh<R: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &Params,
        options: GetOptions,
    ) -> Result<R> {
        self.get(endpoint, params, options.with_strategy(FetchStrategy::Refresh))
            .await
    }

    /// Whether a live cache entry exists for the primary origin. Never
    /// touches the network.
    pub async fn has_cache(&self, endpoint: &str, params: &Params) -> bool {
        self.has_cache_for(BaseUrl::Primary, endpoint, params).await
    }

    pub async fn has_cache_for(&self, base: BaseUrl, endpoint: &str, params: &Params) -> bool {
        self.inner.cache.has_cache_for(base, endpoint, params).await
    }

    /// Cached primary-origin value only; `None` on miss instead of fetching.
    pub async fn get_cached_only<R: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &Params,
    ) -> Option<R> {
        self.get_cached_only_for(BaseUrl::Primary, endpoint, params)
            .await
    }

    pub async fn get_cached_only_for<R: DeserializeOwned>(
        &self,
        base: BaseUrl,
        endpoint: &str,
        params: &Params,
    ) -> Option<R> {
        self.inner.cache.get_cache_for(base, endpoint, params).await
    }

    /// Warm the cache for a request, discarding the result. Failures are logged.
    pub async fn preload(&self, endpoint: &str, params: &Params, options: GetOptions) {
        let options = options.with_strategy(FetchStrategy::CacheFirst);
        log_preload(endpoint, self.get_value(endpoint, params, options).await);
    }

    /// [`preload`](Self::preload) without waiting for it.
    ///
    /// The request is registered before this returns, so a `clear_cache`
    /// issued afterwards also discards its result.
    pub fn spawn_preload(&self, endpoint: String, params: Params) -> JoinHandle<()> {
        let options = GetOptions::cache_first();
        let key = self
            .inner
            .cache
            .compute_key_for(options.base, &endpoint, &params);
        self.sweep_pending();
        let response = self.join_or_dispatch(key, &endpoint, &params, options);
        tokio::spawn(async move { log_preload(&endpoint, response.await) })
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// # Errors
    ///
    /// `Error::SerializationError` for an unencodable body, otherwise the
    /// errors of the underlying call.
    pub async fn post<R: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &impl Serialize,
    ) -> Result<R> {
        self.mutate_as(Method::Post, endpoint, Some(encode_body(body)?), BaseUrl::Primary)
            .await
    }

    /// # Errors
    ///
    /// See [`post`](Self::post).
    pub async fn put<R: DeserializeOwned>(&self, endpoint: &str, body: &impl Serialize) -> Result<R> {
        self.mutate_as(Method::Put, endpoint, Some(encode_body(body)?), BaseUrl::Primary)
            .await
    }

    /// # Errors
    ///
    /// See [`post`](Self::post).
    pub async fn patch<R: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &impl Serialize,
    ) -> Result<R> {
        self.mutate_as(Method::Patch, endpoint, Some(encode_body(body)?), BaseUrl::Primary)
            .await
    }

    /// # Errors
    ///
    /// Errors of the underlying call.
    pub async fn delete<R: DeserializeOwned>(&self, endpoint: &str) -> Result<R> {
        self.mutate_as(Method::Delete, endpoint, None, BaseUrl::Primary)
            .await
    }

    async fn mutate_as<R: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<Value>,
        base: BaseUrl,
    ) -> Result<R> {
        let value = self.mutate(method, endpoint, body, base).await?;
        serde_json::from_value(value)
            .map_err(|e| Error::DeserializationError(format!("{}: {}", endpoint, e)))
    }

    /// Send a mutation, then invalidate.
    ///
    /// Invalidation runs whether or not the call succeeded: a failed response
    /// does not prove the server state is unchanged.
    ///
    /// # Errors
    ///
    /// Errors of the underlying call.
    pub async fn mutate(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<Value>,
        base: BaseUrl,
    ) -> Result<Value> {
        let result = self
            .inner
            .http
            .request(method, endpoint, &Params::new(), body.as_ref(), base)
            .await;
        self.invalidate_for(endpoint).await;
        result
    }

    /// Apply the invalidation policy for a mutation on `endpoint`.
    /// Returns the number of cache entries targeted (coarse: all of them).
    pub async fn invalidate_for(&self, endpoint: &str) -> usize {
        match self.inner.invalidation {
            InvalidationPolicy::Coarse => {
                let Some(family) = CacheKeyBuilder::resource_family(endpoint) else {
                    return 0;
                };
                let removed = self.inner.cache.get_cache_stats().await.entry_count;
                self.clear_cache().await;
                debug!(
                    "Mutation on {} (resource {}) cleared the request cache",
                    endpoint, family
                );
                self.inner.metrics.record_invalidation(endpoint, removed);
                removed
            }
            InvalidationPolicy::Tagged => {
                let tags = CacheKeyBuilder::resource_tags(endpoint);
                if tags.is_empty() {
                    return 0;
                }
                self.bump_generation();
                self.inner.pending.retain(|key, _| {
                    !CacheKeyBuilder::resource_tags(key)
                        .iter()
                        .any(|t| tags.contains(t))
                });
                let removed = self.inner.cache.invalidate_tags(&tags).await;
                self.inner.metrics.record_invalidation(endpoint, removed);
                removed
            }
        }
    }

    // ------------------------------------------------------------------
    // Housekeeping
    // ------------------------------------------------------------------

    /// Forget every in-flight request. The calls themselves keep running but
    /// are never joined again.
    pub fn clear_pending_requests(&self) {
        let count = self.inner.pending.len();
        self.inner.pending.clear();
        debug!("Cleared {} pending requests", count);
    }

    /// Number of registered in-flight requests.
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    /// Drop the whole cache and every in-flight registration. Reads already in
    /// flight will not write their results back.
    pub async fn clear_cache(&self) {
        self.bump_generation();
        self.clear_pending_requests();
        self.inner.cache.clear_all_cache().await;
        self.inner.breaker.clear();
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.inner.cache.get_cache_stats().await
    }

    pub fn cache(&self) -> &RequestCache<B> {
        &self.inner.cache
    }

    pub fn http(&self) -> &HttpClient<T> {
        &self.inner.http
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn bump_generation(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
    }

    fn sweep_pending(&self) {
        let before = self.inner.pending.len();
        self.inner.pending.retain(|_, pending| !pending.is_stale());
        let swept = before.saturating_sub(self.inner.pending.len());
        if swept > 0 {
            debug!("Swept {} stale pending requests", swept);
        }
    }

    /// Join the in-flight request for `key` or register and spawn a new one.
    /// Synchronous: nothing here yields.
    fn join_or_dispatch(
        &self,
        key: String,
        endpoint: &str,
        params: &Params,
        options: GetOptions,
    ) -> SharedResponse {
        let entry = self.inner.pending.entry(key.clone());

        if let Entry::Occupied(occupied) = &entry {
            let pending = occupied.get();
            if options.strategy.joins_in_flight() && !pending.is_stale() {
                self.inner.metrics.record_dedup(&key);
                debug!("Joining in-flight request for {}", key);
                return pending.response.clone();
            }
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        // Read at dispatch: a clear issued before the task first runs must
        // still discard its result.
        let generation = self.inner.generation.load(Ordering::SeqCst);
        let task = tokio::spawn(Self::run(
            Arc::clone(&self.inner),
            id,
            generation,
            key,
            endpoint.to_string(),
            params.clone(),
            options,
        ));
        let response: SharedResponse = async move {
            task.await
                .unwrap_or_else(|e| Err(Error::Other(format!("request task failed: {}", e))))
        }
        .boxed()
        .shared();

        // The spawned task removes its entry on completion, which needs this
        // shard lock, so the insert below always happens first.
        let pending = PendingRequest {
            id,
            created_at: Instant::now(),
            response: response.clone(),
        };
        match entry {
            Entry::Occupied(mut occupied) => {
                occupied.insert(pending);
            }
            Entry::Vacant(vacant) => {
                vacant.insert(pending);
            }
        }

        response
    }

    async fn run(
        inner: Arc<ClientInner<B, T>>,
        id: u64,
        generation: u64,
        key: String,
        endpoint: String,
        params: Params,
        options: GetOptions,
    ) -> Result<Value> {
        let result = Self::resolve(&inner, generation, &key, &endpoint, &params, options).await;
        inner.pending.remove_if(&key, |_, pending| pending.id == id);
        result
    }

    async fn resolve(
        inner: &Arc<ClientInner<B, T>>,
        generation: u64,
        key: &str,
        endpoint: &str,
        params: &Params,
        options: GetOptions,
    ) -> Result<Value> {
        let started = Instant::now();

        if options.strategy == FetchStrategy::Bypass {
            return inner.fetch(endpoint, params, options.base).await;
        }

        if !inner.cache.is_available().await {
            warn!("Cache unavailable, fetching {} directly", endpoint);
            return inner.fetch(endpoint, params, options.base).await;
        }

        if options.strategy.reads_cache() {
            if let Some(hit) = inner.cache.get_entry_by_key(key).await {
                inner.metrics.record_hit(key, started.elapsed());
                if options.strategy.revalidates_on_hit() {
                    Self::spawn_revalidation(inner, generation, key, endpoint, params, &options);
                }
                return Ok(hit.value);
            }
        }

        let value = inner.fetch(endpoint, params, options.base).await?;
        inner.metrics.record_miss(key, started.elapsed());
        inner
            .store(key, endpoint, &value, &options, generation)
            .await;
        Ok(value)
    }

    /// Background refresh after a cache hit. At most one per key at a time.
    ///
    /// Belongs to the read that scheduled it: an invalidation after
    /// `generation` cancels the refresh.
    fn spawn_revalidation(
        inner: &Arc<ClientInner<B, T>>,
        generation: u64,
        key: &str,
        endpoint: &str,
        params: &Params,
        options: &GetOptions,
    ) {
        if !inner.breaker.allows(key) {
            debug!("Background refresh for {} suspended", key);
            return;
        }
        if !inner.revalidating.insert(key.to_string()) {
            return;
        }

        let inner = Arc::clone(inner);
        let key = key.to_string();
        let endpoint = endpoint.to_string();
        let params = params.clone();
        let options = options.clone();

        tokio::spawn(async move {
            tokio::time::sleep(inner.revalidate_delay).await;
            if inner.generation.load(Ordering::SeqCst) != generation {
                debug!("Background refresh of {} dropped: cache invalidated", key);
                inner.revalidating.remove(&key);
                return;
            }

            match inner.fetch(&endpoint, &params, options.base).await {
                Ok(value) => {
                    inner.breaker.record_success(&key);
                    inner
                        .store(&key, &endpoint, &value, &options, generation)
                        .await;
                    debug!("✓ Background refresh of {}", key);
                }
                Err(e) => {
                    inner.breaker.record_failure(&key);
                    inner.metrics.record_error(&key, &e.to_string());
                    warn!("Background refresh of {} failed: {}", endpoint, e);
                }
            }

            inner.revalidating.remove(&key);
        });
    }
}

impl<B: CacheBackend, T: Transport> ClientInner<B, T> {
    async fn fetch(&self, endpoint: &str, params: &Params, base: BaseUrl) -> Result<Value> {
        self.http.get(endpoint, params, base).await
    }

    fn ttl_for(&self, endpoint: &str, options: &GetOptions) -> Duration {
        options
            .ttl
            .or_else(|| self.ttl_policy.get_ttl(endpoint))
            .unwrap_or(self.default_ttl)
    }

    /// Write a fetched value unless the strategy forbids it or an
    /// invalidation happened since `generation` was read.
    async fn store(
        &self,
        key: &str,
        endpoint: &str,
        value: &Value,
        options: &GetOptions,
        generation: u64,
    ) {
        if !options.strategy.writes_cache() {
            return;
        }
        if self.generation.load(Ordering::SeqCst) != generation {
            debug!("Discarding result for {}: cache invalidated meanwhile", key);
            return;
        }
        let ttl = self.ttl_for(endpoint, options);
        if !self.cache.set_entry_by_key(key, endpoint, value, ttl).await {
            return;
        }
        // An invalidation may have landed while the write was in flight.
        if self.generation.load(Ordering::SeqCst) != generation {
            debug!("Retracting result for {}: cache invalidated meanwhile", key);
            self.cache.remove_by_key(key).await;
            return;
        }
        self.metrics.record_set(key);
    }
}

fn log_preload(endpoint: &str, result: Result<Value>) {
    match result {
        Ok(_) => debug!("✓ Preloaded {}", endpoint),
        Err(e) => warn!("Preload of {} failed: {}", endpoint, e),
    }
}

fn encode_body(body: &impl Serialize) -> Result<Value> {
    serde_json::to_value(body).map_err(|e| Error::SerializationError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;
    use crate::client::mock::MockTransport;
    use crate::config::ClientConfig;
    use serde_json::json;

    fn client_with(
        transport: MockTransport,
        config: ClientConfig,
    ) -> CachedClient<InMemoryBackend, MockTransport> {
        CachedClient::new(InMemoryBackend::new(), HttpClient::new(transport, config))
    }

    fn config() -> ClientConfig {
        ClientConfig::new("https://api.example.edu")
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let transport = MockTransport::new();
        transport.on_json(Method::Get, "/subjects", json!([{"id": "S1"}]));
        let client = client_with(transport.clone(), config());

        let first: Value = client
            .get("/subjects", &Params::new(), GetOptions::cache_first())
            .await
            .expect("First get failed");
        let second: Value = client
            .get("/subjects", &Params::new(), GetOptions::cache_first())
            .await
            .expect("Second get failed");

        assert_eq!(first, second);
        assert_eq!(transport.calls(Method::Get, "/subjects"), 1);
        assert!(client.has_cache("/subjects", &Params::new()).await);
        assert_eq!(client.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_bypass_never_writes_cache() {
        let transport = MockTransport::new();
        transport.on_json(Method::Get, "/attendance", json!([]));
        let client = client_with(transport.clone(), config());

        let _: Value = client
            .get("/attendance", &Params::new(), GetOptions::bypass())
            .await
            .expect("Get failed");

        assert!(!client.has_cache("/attendance", &Params::new()).await);
        assert_eq!(transport.calls(Method::Get, "/attendance"), 1);
    }

    #[tokio::test]
    async fn test_refresh_ignores_cache() {
        let transport = MockTransport::new();
        transport
            .on_json(Method::Get, "/exams", json!(["old"]))
            .on_json(Method::Get, "/exams", json!(["new"]));
        let client = client_with(transport.clone(), config());

        let _: Value = client
            .get("/exams", &Params::new(), GetOptions::cache_first())
            .await
            .expect("Get failed");
        let refreshed: Value = client
            .refresh("/exams", &Params::new(), GetOptions::default())
            .await
            .expect("Refresh failed");

        assert_eq!(refreshed, json!(["new"]));
        let cached: Option<Value> = client.get_cached_only("/exams", &Params::new()).await;
        assert_eq!(cached, Some(json!(["new"])));
    }

    #[tokio::test]
    async fn test_get_cached_only_never_fetches() {
        let transport = MockTransport::new();
        let client = client_with(transport.clone(), config());

        let cached: Option<Value> = client.get_cached_only("/lectures", &Params::new()).await;
        assert!(cached.is_none());
        assert_eq!(transport.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_errors_propagate_and_are_not_cached() {
        let transport = MockTransport::new();
        transport
            .on(Method::Get, "/homework", 500, json!({"message": "db down"}))
            .on_json(Method::Get, "/homework", json!([]));
        let client = client_with(transport.clone(), config());

        let err = client
            .get::<Value>("/homework", &Params::new(), GetOptions::default())
            .await
            .expect_err("Should fail");
        assert_eq!(err.status(), Some(500));
        assert_eq!(client.pending_count(), 0);

        let ok: Value = client
            .get("/homework", &Params::new(), GetOptions::default())
            .await
            .expect("Retry failed");
        assert_eq!(ok, json!([]));
    }

    #[tokio::test]
    async fn test_preload_warms_cache() {
        let transport = MockTransport::new();
        transport.on_json(Method::Get, "/institutes/I1/classes", json!([]));
        let client = client_with(transport.clone(), config());

        client
            .spawn_preload("/institutes/I1/classes".to_string(), Params::new())
            .await
            .expect("Preload task panicked");

        assert!(client.has_cache("/institutes/I1/classes", &Params::new()).await);
    }

    #[tokio::test]
    async fn test_clear_discards_scheduled_preload() {
        let transport = MockTransport::new();
        transport.on_json(Method::Get, "/institutes/I1/classes", json!([]));
        let client = client_with(transport.clone(), config());

        let handle = client.spawn_preload("/institutes/I1/classes".to_string(), Params::new());
        client.clear_cache().await;
        handle.await.expect("Preload task panicked");

        assert_eq!(transport.calls(Method::Get, "/institutes/I1/classes"), 1);
        assert!(!client.has_cache("/institutes/I1/classes", &Params::new()).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_cancels_scheduled_refresh() {
        let transport = MockTransport::new();
        transport.on_json(Method::Get, "/homework", json!([]));
        let client = client_with(transport.clone(), config());

        let _: Value = client
            .get("/homework", &Params::new(), GetOptions::cache_first())
            .await
            .expect("Get failed");
        // Hit under the default strategy schedules a refresh
        let _: Value = client
            .get("/homework", &Params::new(), GetOptions::default())
            .await
            .expect("Cached get failed");
        client.clear_cache().await;
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(transport.calls(Method::Get, "/homework"), 1);
        assert!(!client.has_cache("/homework", &Params::new()).await);
    }

    #[derive(Clone, Default)]
    struct CountingMetrics {
        hits: Arc<AtomicU64>,
        misses: Arc<AtomicU64>,
    }

    impl CacheMetrics for CountingMetrics {
        fn record_hit(&self, _key: &str, _duration: Duration) {
            self.hits.fetch_add(1, Ordering::SeqCst);
        }

        fn record_miss(&self, _key: &str, _duration: Duration) {
            self.misses.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_builder_installs_metrics() {
        let transport = MockTransport::new();
        transport.on_json(Method::Get, "/lectures", json!([]));
        let metrics = CountingMetrics::default();
        let client = CachedClient::builder(
            InMemoryBackend::new(),
            HttpClient::new(transport, config()),
        )
        .with_metrics(Box::new(metrics.clone()))
        .build();

        for _ in 0..2 {
            let _: Value = client
                .get("/lectures", &Params::new(), GetOptions::cache_first())
                .await
                .expect("Get failed");
        }

        assert_eq!(metrics.misses.load(Ordering::SeqCst), 1);
        assert_eq!(metrics.hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_coarse_client_keeps_no_tag_index() {
        let transport = MockTransport::new();
        transport.on_json(Method::Get, "/homework", json!([]));
        let client = client_with(transport, config());

        let _: Value = client
            .get("/homework", &Params::new(), GetOptions::cache_first())
            .await
            .expect("Get failed");

        let stats = client.cache_stats().await;
        assert_eq!(stats.entry_count, 1);
        assert_eq!(stats.tag_count, 0);
    }

    #[tokio::test]
    async fn test_preload_failure_is_swallowed() {
        let transport = MockTransport::new();
        transport.on_network_error(Method::Get, "/institutes/I1/users", "connection reset");
        let client = client_with(transport, config());

        client
            .preload("/institutes/I1/users", &Params::new(), GetOptions::default())
            .await;
        assert!(!client.has_cache("/institutes/I1/users", &Params::new()).await);
    }

    #[tokio::test]
    async fn test_tagged_invalidation_keeps_unrelated_entries() {
        let transport = MockTransport::new();
        transport
            .on_json(Method::Get, "/homework", json!([]))
            .on_json(Method::Get, "/exams", json!([]))
            .on_json(Method::Post, "/homework", json!({"id": "H9"}));
        let client = CachedClient::builder(
            InMemoryBackend::new(),
            HttpClient::new(transport.clone(), config()),
        )
        .with_invalidation(InvalidationPolicy::Tagged)
        .build();

        for endpoint in ["/homework", "/exams"] {
            let _: Value = client
                .get(endpoint, &Params::new(), GetOptions::cache_first())
                .await
                .expect("Get failed");
        }

        let _: Value = client
            .post("/homework", &json!({"title": "Essay"}))
            .await
            .expect("Post failed");

        assert!(!client.has_cache("/homework", &Params::new()).await);
        assert!(client.has_cache("/exams", &Params::new()).await);
        assert_eq!(client.cache_stats().await.tag_count, 1);
    }

    #[tokio::test]
    async fn test_untracked_mutation_keeps_cache() {
        let transport = MockTransport::new();
        transport
            .on_json(Method::Get, "/homework", json!([]))
            .on_json(Method::Post, "/auth/login", json!({}));
        let client = client_with(transport, config());

        let _: Value = client
            .get("/homework", &Params::new(), GetOptions::cache_first())
            .await
            .expect("Get failed");
        let _: Value = client
            .post("/auth/login", &json!({}))
            .await
            .expect("Post failed");

        assert!(client.has_cache("/homework", &Params::new()).await);
    }

    #[tokio::test]
    async fn test_failed_mutation_still_invalidates() {
        let transport = MockTransport::new();
        transport
            .on_json(Method::Get, "/classes", json!([]))
            .on(Method::Delete, "/classes/C1", 409, json!({"message": "in use"}));
        let client = client_with(transport, config());

        let _: Value = client
            .get("/classes", &Params::new(), GetOptions::cache_first())
            .await
            .expect("Get failed");
        let err = client
            .delete::<Value>("/classes/C1")
            .await
            .expect_err("Should fail");

        assert_eq!(err.status(), Some(409));
        assert!(!client.has_cache("/classes", &Params::new()).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_breaker_suspends_background_refresh() {
        let transport = MockTransport::new();
        transport
            .on_json(Method::Get, "/results", json!([1]))
            .on_network_error(Method::Get, "/results", "unreachable");
        let client = CachedClient::builder(
            InMemoryBackend::new(),
            HttpClient::new(transport.clone(), config()),
        )
        .with_revalidation_breaker(2, Duration::from_secs(600))
        .build();

        // Populate, then hit repeatedly; each hit may trigger one refresh.
        let _: Value = client
            .get("/results", &Params::new(), GetOptions::default())
            .await
            .expect("Get failed");
        for _ in 0..5 {
            let hit: Value = client
                .get("/results", &Params::new(), GetOptions::default())
                .await
                .expect("Cached get failed");
            assert_eq!(hit, json!([1]));
            tokio::time::sleep(Duration::from_secs(1)).await;
        }

        // 1 initial fetch + 2 failed refreshes, then suspended
        assert_eq!(transport.calls(Method::Get, "/results"), 3);
    }
}
