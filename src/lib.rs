//! # campus-kit
//!
//! Client-side data layer for a school-management REST API: a request cache
//! with TTLs, a deduplicating caching client, and the user's institute →
//! class → subject session context.
//!
//! ## Features
//!
//! - **Request dedup:** concurrent identical GETs share one network call
//! - **Stale-while-revalidate:** cached values return immediately and refresh in the background
//! - **Mutation invalidation:** writes clear the affected cached reads (coarse or tagged)
//! - **Pluggable stores:** in-memory by default, Redis behind the `redis` feature
//! - **Pluggable transport:** `reqwest` in production, [`client::MockTransport`] in tests
//!
//! ## Quick Start
//!
//! ```ignore
//! use campus_kit::{
//!     backend::InMemoryBackend,
//!     client::{HttpClient, ReqwestTransport},
//!     session::{Credentials, SessionContext},
//!     CachedClient, ClientConfig, GetOptions, Params,
//! };
//!
//! let http = HttpClient::new(ReqwestTransport::new()?, ClientConfig::from_env());
//! let client = CachedClient::new(InMemoryBackend::new(), http);
//! let session = SessionContext::new(client.clone());
//!
//! let user = session.login(&Credentials::new("ada@example.edu", "secret")).await?;
//! session.select_institute(user.institutes.first().cloned()).await;
//!
//! // Cached for 15 minutes; concurrent callers share the request.
//! let homework: serde_json::Value = client
//!     .get_data(
//!         "/homework",
//!         &Params::new().with("instituteId", &user.institutes[0].id),
//!         GetOptions::default().with_ttl_minutes(15),
//!     )
//!     .await?;
//! ```

#[macro_use]
extern crate log;

pub mod backend;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod key;
pub mod observability;
pub mod serialization;
pub mod session;
pub mod strategy;

// Re-exports for convenience
pub use backend::CacheBackend;
pub use cache::{CacheStats, RequestCache};
pub use client::CachedClient;
pub use config::{BaseUrl, ClientConfig};
pub use error::{Error, Result};
pub use key::Params;
pub use session::SessionContext;
pub use strategy::{FetchStrategy, GetOptions, InvalidationPolicy};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
