//! API clients.
//!
//! - [`HttpClient`]: one request, one response; auth header, error mapping
//! - [`CachedClient`]: request dedup and response caching on top of it
//! - [`Transport`]: the seam between both and the wire ([`ReqwestTransport`],
//!   or [`MockTransport`] in tests)

pub mod breaker;
pub mod cached;
pub mod http;
pub mod mock;
pub mod response;
pub mod transport;

pub use breaker::RevalidationBreaker;
pub use cached::{CachedClient, CachedClientBuilder};
pub use http::{HttpClient, UnauthorizedHandler};
pub use mock::MockTransport;
pub use response::{unwrap_data, unwrap_page, ApiResponse, PageMeta};
pub use transport::{HttpRequest, HttpResponse, Method, ReqwestTransport, Transport};
