//! Fetch strategies and per-call options for cached reads.
//!
//! An enum replaces the `forceRefresh` / `skipCache` /
//! `useStaleWhileRevalidate` flag soup, so impossible combinations cannot be
//! expressed.
//!
//! | Strategy | Joins in-flight | Reads cache | Background refresh on hit | Writes cache |
//! |----------|-----------------|-------------|---------------------------|--------------|
//! | **Revalidate** (default) | yes | yes | yes | yes |
//! | **CacheFirst** | yes | yes | no | yes |
//! | **Refresh** | no | no | - | yes |
//! | **Bypass** | yes | no | - | no |
//!
//! ```
//! use campus_kit::strategy::{FetchStrategy, GetOptions};
//! use std::time::Duration;
//!
//! // Institutes change rarely: no background refresh, one hour lifetime.
//! let options = GetOptions::default()
//!     .with_strategy(FetchStrategy::CacheFirst)
//!     .with_ttl(Duration::from_secs(3600));
//! assert!(!options.strategy.revalidates_on_hit());
//! ```

use crate::config::BaseUrl;
use std::time::Duration;

/// How a GET uses the cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum FetchStrategy {
    /// Serve from cache and refresh it in the background; network on miss.
    #[default]
    Revalidate,

    /// Serve from cache without background refresh; network on miss.
    CacheFirst,

    /// Skip the cache read and any in-flight request, fetch, then rewrite the cache.
    Refresh,

    /// Network only. Concurrent identical calls are still deduplicated.
    Bypass,
}

impl FetchStrategy {
    pub fn joins_in_flight(self) -> bool {
        !matches!(self, FetchStrategy::Refresh)
    }

    pub fn reads_cache(self) -> bool {
        matches!(self, FetchStrategy::Revalidate | FetchStrategy::CacheFirst)
    }

    pub fn writes_cache(self) -> bool {
        !matches!(self, FetchStrategy::Bypass)
    }

    pub fn revalidates_on_hit(self) -> bool {
        matches!(self, FetchStrategy::Revalidate)
    }
}

impl std::fmt::Display for FetchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchStrategy::Revalidate => write!(f, "Revalidate"),
            FetchStrategy::CacheFirst => write!(f, "CacheFirst"),
            FetchStrategy::Refresh => write!(f, "Refresh"),
            FetchStrategy::Bypass => write!(f, "Bypass"),
        }
    }
}

/// Per-call options for [`CachedClient::get`](crate::client::CachedClient::get).
#[derive(Clone, Debug, Default)]
pub struct GetOptions {
    pub strategy: FetchStrategy,
    /// Overrides the client's TTL policy for this call.
    pub ttl: Option<Duration>,
    pub base: BaseUrl,
}

impl GetOptions {
    pub fn with_strategy(mut self, strategy: FetchStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// TTL in whole minutes, the granularity cache entries record.
    pub fn with_ttl_minutes(self, minutes: u64) -> Self {
        self.with_ttl(Duration::from_secs(minutes.saturating_mul(60)))
    }

    pub fn with_base(mut self, base: BaseUrl) -> Self {
        self.base = base;
        self
    }

    pub fn refresh() -> Self {
        Self::default().with_strategy(FetchStrategy::Refresh)
    }

    pub fn bypass() -> Self {
        Self::default().with_strategy(FetchStrategy::Bypass)
    }

    pub fn cache_first() -> Self {
        Self::default().with_strategy(FetchStrategy::CacheFirst)
    }
}

/// What a mutation removes from the cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum InvalidationPolicy {
    /// Any mutation on a tracked resource clears the whole cache.
    #[default]
    Coarse,

    /// A mutation removes only entries tagged with the resource families
    /// named in its endpoint.
    Tagged,
}
