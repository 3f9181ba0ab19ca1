//! Error types for the client, cache and session layers.

use std::fmt;

/// Result type for campus-kit operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for campus-kit.
///
/// `Error` is `Clone` because a single in-flight request result is handed to
/// every caller that joined it.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// The server answered with a non-2xx status (other than 401).
    ///
    /// `message` comes from the JSON error body (`message` or `error` field) when
    /// present, otherwise it is synthesized from the status code and reason phrase.
    /// `raw` is the unparsed response body.
    Http {
        status: u16,
        message: String,
        raw: String,
    },

    /// The server answered 401. The session is no longer valid.
    ///
    /// The registered unauthorized handler has already been invoked when this
    /// error is returned.
    Unauthorized(String),

    /// The request never produced a response (DNS, connect, TLS, reset).
    Network(String),

    /// Operation exceeded the configured request timeout.
    Timeout(String),

    /// Cache store error (Redis unavailable, storage full, ...).
    ///
    /// Never surfaced by the cached client: it degrades to direct network calls.
    BackendError(String),

    /// Serialization failed when encoding a request body or cache entry.
    SerializationError(String),

    /// Deserialization failed when decoding a response or cache entry.
    DeserializationError(String),

    /// Cache entry header is invalid (magic is not `b"CAMP"`).
    InvalidCacheEntry(String),

    /// Cache entry was written with a different schema version.
    VersionMismatch {
        /// Expected schema version (from compiled code)
        expected: u32,
        /// Found schema version (from cached entry)
        found: u32,
    },

    /// Missing or invalid configuration, such as a blank organization base URL.
    ConfigError(String),

    /// A selection was made whose parent selection is missing
    /// (a class without an institute, a subject without a class).
    InvalidSelection(String),

    /// The operation needs a logged-in user.
    NotAuthenticated,

    /// Feature not implemented or not enabled for this backend.
    NotImplemented(String),

    /// Generic error with custom message.
    Other(String),
}

impl Error {
    /// HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Http { status, .. } => Some(*status),
            Error::Unauthorized(_) => Some(401),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Error::Unauthorized(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Http {
                status, message, ..
            } => write!(f, "HTTP {}: {}", status, message),
            Error::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            Error::Network(msg) => write!(f, "Network error: {}", msg),
            Error::Timeout(msg) => write!(f, "Timeout: {}", msg),
            Error::BackendError(msg) => write!(f, "Cache backend error: {}", msg),
            Error::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            Error::DeserializationError(msg) => write!(f, "Deserialization error: {}", msg),
            Error::InvalidCacheEntry(msg) => write!(f, "Invalid cache entry: {}", msg),
            Error::VersionMismatch { expected, found } => {
                write!(
                    f,
                    "Cache version mismatch: expected {}, found {}",
                    expected, found
                )
            }
            Error::ConfigError(msg) => write!(f, "Config error: {}", msg),
            Error::InvalidSelection(msg) => write!(f, "Invalid selection: {}", msg),
            Error::NotAuthenticated => write!(f, "Not authenticated"),
            Error::NotImplemented(msg) => write!(f, "Not implemented: {}", msg),
            Error::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

// ============================================================================
// Conversions from other error types
// ============================================================================

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        if e.is_io() {
            Error::Network(e.to_string())
        } else if e.is_syntax() || e.is_data() || e.is_eof() {
            Error::DeserializationError(e.to_string())
        } else {
            Error::SerializationError(e.to_string())
        }
    }
}

impl From<postcard::Error> for Error {
    fn from(e: postcard::Error) -> Self {
        Error::DeserializationError(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Timeout(e.to_string())
        } else if e.is_decode() {
            Error::DeserializationError(e.to_string())
        } else {
            Error::Network(e.to_string())
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::BackendError(e.to_string())
    }
}

impl From<String> for Error {
    fn from(e: String) -> Self {
        Error::Other(e)
    }
}

impl From<&str> for Error {
    fn from(e: &str) -> Self {
        Error::Other(e.to_string())
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for Error {
    fn from(e: redis::RedisError) -> Self {
        Error::BackendError(format!("Redis error: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Http {
            status: 404,
            message: "Institute not found".to_string(),
            raw: "{}".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP 404: Institute not found");
        assert_eq!(
            Error::InvalidSelection("no institute".to_string()).to_string(),
            "Invalid selection: no institute"
        );
    }

    #[test]
    fn test_error_status() {
        assert_eq!(Error::Unauthorized("expired".into()).status(), Some(401));
        assert_eq!(Error::Network("reset".into()).status(), None);
        assert!(Error::Unauthorized("expired".into()).is_unauthorized());
    }

    #[test]
    fn test_error_from_string() {
        let err: Error = "test error".into();
        assert!(matches!(err, Error::Other(_)));
    }

    #[test]
    fn test_error_from_json_syntax() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        assert!(matches!(Error::from(json_err), Error::DeserializationError(_)));
    }
}
