//! Versioned envelopes for stored cache entries.
//!
//! Every entry written to a [`CacheBackend`](crate::backend::CacheBackend) has
//! this layout, encoded with Postcard:
//!
//! ```text
//! ┌──────────┬─────────┬────────────┬─────────────┬──────┬──────────────────────┐
//! │ MAGIC    │ VERSION │ STORED_AT  │ TTL_MINUTES │ TAGS │ PAYLOAD (JSON bytes) │
//! └──────────┴─────────┴────────────┴─────────────┴──────┴──────────────────────┘
//!   "CAMP"     u32       unix ms      u32           [str]
//! ```
//!
//! The payload stays JSON because API responses are schemaless
//! `serde_json::Value`s, which Postcard cannot describe on its own.
//!
//! # Example
//!
//! ```rust
//! use campus_kit::serialization::{encode_entry, decode_entry};
//! use serde_json::json;
//!
//! # fn main() -> campus_kit::Result<()> {
//! let bytes = encode_entry(&json!({"id": "I1"}), 15, vec!["institutes".to_string()])?;
//! let envelope = decode_entry(&bytes)?;
//!
//! assert_eq!(envelope.ttl_minutes, 15);
//! assert_eq!(envelope.value()?, json!({"id": "I1"}));
//! # Ok(())
//! # }
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Magic header for campus-kit entries: b"CAMP"
pub const CACHE_MAGIC: [u8; 4] = *b"CAMP";

/// Current schema version.
///
/// Increment when the envelope layout changes. Entries with another version are
/// evicted on read.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Versioned envelope for cache entries.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CacheEnvelope {
    /// Magic header: must be b"CAMP"
    pub magic: [u8; 4],
    /// Schema version: must match CURRENT_SCHEMA_VERSION
    pub version: u32,
    /// Write time in unix-epoch milliseconds.
    pub stored_at_ms: u64,
    pub ttl_minutes: u32,
    /// Resource families the entry belongs to.
    pub tags: Vec<String>,
    /// JSON-encoded response body.
    pub payload: Vec<u8>,
}

impl CacheEnvelope {
    /// Create an envelope stamped with the current magic, version and time.
    ///
    /// # Errors
    ///
    /// Returns `Error::SerializationError` if the value cannot be encoded as JSON.
    pub fn new(value: &Value, ttl_minutes: u32, tags: Vec<String>) -> Result<Self> {
        let payload = serde_json::to_vec(value)
            .map_err(|e| Error::SerializationError(e.to_string()))?;
        Ok(CacheEnvelope {
            magic: CACHE_MAGIC,
            version: CURRENT_SCHEMA_VERSION,
            stored_at_ms: now_millis(),
            ttl_minutes,
            tags,
            payload,
        })
    }

    /// Decode the JSON payload.
    ///
    /// # Errors
    ///
    /// Returns `Error::DeserializationError` if the payload is not valid JSON.
    pub fn value(&self) -> Result<Value> {
        serde_json::from_slice(&self.payload)
            .map_err(|e| Error::DeserializationError(e.to_string()))
    }

    /// Write time as a `SystemTime`.
    pub fn stored_at(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_millis(self.stored_at_ms)
    }

    /// `stored_at + ttl`.
    pub fn expires_at(&self) -> SystemTime {
        self.stored_at() + Duration::from_secs(u64::from(self.ttl_minutes) * 60)
    }
}

/// Milliseconds since the unix epoch, 0 if the system clock is before it.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Encode a response value for cache storage.
///
/// # Errors
///
/// Returns `Error::SerializationError` if JSON or Postcard encoding fails.
pub fn encode_entry(value: &Value, ttl_minutes: u32, tags: Vec<String>) -> Result<Vec<u8>> {
    let envelope = CacheEnvelope::new(value, ttl_minutes, tags)?;
    postcard::to_allocvec(&envelope).map_err(|e| {
        log::error!("Cache serialization failed: {}", e);
        Error::SerializationError(e.to_string())
    })
}

/// Decode and validate a stored entry.
///
/// # Errors
///
/// - `Error::DeserializationError`: Corrupted Postcard envelope
/// - `Error::InvalidCacheEntry`: Invalid magic header
/// - `Error::VersionMismatch`: Schema version mismatch
pub fn decode_entry(bytes: &[u8]) -> Result<CacheEnvelope> {
    let envelope: CacheEnvelope = postcard::from_bytes(bytes).map_err(|e| {
        log::warn!("Cache entry decode failed: {}", e);
        Error::DeserializationError(e.to_string())
    })?;

    if envelope.magic != CACHE_MAGIC {
        log::warn!(
            "Invalid cache entry: expected magic {:?}, got {:?}",
            CACHE_MAGIC,
            envelope.magic
        );
        return Err(Error::InvalidCacheEntry(format!(
            "Invalid magic: expected {:?}, got {:?}",
            CACHE_MAGIC, envelope.magic
        )));
    }

    if envelope.version != CURRENT_SCHEMA_VERSION {
        log::warn!(
            "Cache version mismatch: expected {}, got {}",
            CURRENT_SCHEMA_VERSION,
            envelope.version
        );
        return Err(Error::VersionMismatch {
            expected: CURRENT_SCHEMA_VERSION,
            found: envelope.version,
        });
    }

    Ok(envelope)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope_bytes(magic: [u8; 4], version: u32) -> Vec<u8> {
        let envelope = CacheEnvelope {
            magic,
            version,
            stored_at_ms: 1_700_000_000_000,
            ttl_minutes: 30,
            tags: vec![],
            payload: b"[]".to_vec(),
        };
        postcard::to_allocvec(&envelope).expect("Failed to encode")
    }

    #[test]
    fn test_roundtrip_keeps_metadata() {
        let value = json!({"data": [{"id": "C1", "name": "Grade 7"}], "meta": {"total": 1}});
        let bytes = encode_entry(&value, 15, vec!["classes".into()]).expect("Failed to encode");
        let envelope = decode_entry(&bytes).expect("Failed to decode");

        assert_eq!(envelope.value().expect("Bad payload"), value);
        assert_eq!(envelope.ttl_minutes, 15);
        assert_eq!(envelope.tags, vec!["classes".to_string()]);
        assert_eq!(
            envelope
                .expires_at()
                .duration_since(envelope.stored_at())
                .expect("Clock went backwards"),
            Duration::from_secs(15 * 60)
        );
    }

    #[test]
    fn test_invalid_magic_rejected() {
        let bytes = envelope_bytes(*b"CKIT", CURRENT_SCHEMA_VERSION);
        assert!(matches!(
            decode_entry(&bytes),
            Err(Error::InvalidCacheEntry(_))
        ));
    }

    #[test]
    fn test_version_mismatch_rejected() {
        let bytes = envelope_bytes(CACHE_MAGIC, CURRENT_SCHEMA_VERSION + 1);
        match decode_entry(&bytes) {
            Err(Error::VersionMismatch { expected, found }) => {
                assert_eq!(expected, CURRENT_SCHEMA_VERSION);
                assert_eq!(found, CURRENT_SCHEMA_VERSION + 1);
            }
            other => panic!("Expected VersionMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_truncated_entry_rejected() {
        let bytes = encode_entry(&json!("payload"), 1, vec![]).expect("Failed to encode");
        assert!(matches!(
            decode_entry(&bytes[..bytes.len() / 2]),
            Err(Error::DeserializationError(_))
        ));
    }
}
