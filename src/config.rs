//! Client configuration.
//!
//! Base URLs come from an externally configured string store. Either may be
//! blank; calls routed to a blank base URL fail fast with
//! [`Error::ConfigError`](crate::Error::ConfigError).

use std::time::Duration;

/// Age after which an in-flight request is no longer joined by new callers.
pub const PENDING_REQUEST_TTL: Duration = Duration::from_secs(30);

/// Default cache lifetime for GET responses.
pub const DEFAULT_TTL: Duration = Duration::from_secs(30 * 60);

/// Header that lets requests through the HTTP tunnel without its interstitial page.
pub const TUNNEL_BYPASS_HEADER: (&str, &str) = ("ngrok-skip-browser-warning", "true");

/// Which backend origin a call is routed to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BaseUrl {
    /// Main institute API.
    #[default]
    Primary,
    /// Organization API, served from a separate origin.
    Secondary,
}

impl std::fmt::Display for BaseUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BaseUrl::Primary => write!(f, "primary"),
            BaseUrl::Secondary => write!(f, "secondary"),
        }
    }
}

/// Configuration for the HTTP and cached clients.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub base_url: String,
    pub secondary_base_url: String,
    /// TTL used when neither the call nor the TTL policy specifies one.
    pub default_ttl: Duration,
    /// Upper bound on a single HTTP exchange.
    pub request_timeout: Duration,
    /// Delay before a stale-while-revalidate refresh is issued.
    pub revalidate_delay: Duration,
    /// Prefix applied to every cache key.
    pub key_namespace: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            base_url: String::new(),
            secondary_base_url: String::new(),
            default_ttl: DEFAULT_TTL,
            request_timeout: PENDING_REQUEST_TTL,
            revalidate_delay: Duration::from_millis(100),
            key_namespace: "campus".to_string(),
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        ClientConfig {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Build configuration from environment variables.
    ///
    /// - `CAMPUS_API_BASE_URL`
    /// - `CAMPUS_ORG_API_BASE_URL`
    /// - `CAMPUS_DEFAULT_TTL_MINUTES`
    /// - `CAMPUS_REQUEST_TIMEOUT_SECS`
    ///
    /// Unset or unparsable values keep their defaults.
    pub fn from_env() -> Self {
        let mut config = ClientConfig::default();

        if let Ok(url) = std::env::var("CAMPUS_API_BASE_URL") {
            config.base_url = url;
        }
        if let Ok(url) = std::env::var("CAMPUS_ORG_API_BASE_URL") {
            config.secondary_base_url = url;
        }
        if let Some(minutes) = std::env::var("CAMPUS_DEFAULT_TTL_MINUTES")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
        {
            config.default_ttl = Duration::from_secs(minutes.saturating_mul(60));
        }
        if let Some(secs) = std::env::var("CAMPUS_REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
        {
            config = config.with_request_timeout(Duration::from_secs(secs));
        }

        config
    }

    pub fn with_secondary_base_url(mut self, url: impl Into<String>) -> Self {
        self.secondary_base_url = url.into();
        self
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Set the per-request timeout.
    ///
    /// Values above [`PENDING_REQUEST_TTL`] let a hung request outlive its
    /// dedup registration; the default equals it.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_revalidate_delay(mut self, delay: Duration) -> Self {
        self.revalidate_delay = delay;
        self
    }

    pub fn with_key_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.key_namespace = namespace.into();
        self
    }

    /// Resolve the configured origin for `base`, trimmed of trailing slashes.
    ///
    /// Returns `None` when that origin is blank.
    pub fn resolve(&self, base: BaseUrl) -> Option<&str> {
        let url = match base {
            BaseUrl::Primary => &self.base_url,
            BaseUrl::Secondary => &self.secondary_base_url,
        };
        let url = url.trim().trim_end_matches('/');
        if url.is_empty() {
            None
        } else {
            Some(url)
        }
    }
}
