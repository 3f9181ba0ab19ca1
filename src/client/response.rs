//! Response envelope handling.
//!
//! The API answers either with an envelope
//! `{ data?, meta?, success?, message?, error? }` or with a bare array/object.

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Standard API envelope.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    #[serde(default)]
    pub data: Option<T>,
    #[serde(default)]
    pub meta: Option<Value>,
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub message: Option<String>,
    /// A string, a list of strings, or an object with its own `message`.
    #[serde(default)]
    pub error: Option<Value>,
}

/// Pagination block commonly found in `meta`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PageMeta {
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

fn is_envelope(value: &Value) -> bool {
    value.as_object().is_some_and(|obj| {
        obj.contains_key("data") || obj.get("success").is_some_and(Value::is_boolean)
    })
}

/// Extract the payload from an envelope, or take a bare payload as is.
///
/// # Errors
///
/// - `Error::Other` if the envelope says `success: false`
/// - `Error::DeserializationError` if the payload does not match `T`
pub fn unwrap_data<T: DeserializeOwned>(value: Value) -> Result<T> {
    if !is_envelope(&value) {
        return serde_json::from_value(value)
            .map_err(|e| Error::DeserializationError(e.to_string()));
    }

    let envelope: ApiResponse<Value> =
        serde_json::from_value(value).map_err(|e| Error::DeserializationError(e.to_string()))?;

    if envelope.success == Some(false) {
        let message = envelope
            .error
            .as_ref()
            .and_then(error_text)
            .or(envelope.message)
            .unwrap_or_else(|| "Request was not successful".to_string());
        return Err(Error::Other(message));
    }

    serde_json::from_value(envelope.data.unwrap_or(Value::Null))
        .map_err(|e| Error::DeserializationError(e.to_string()))
}

/// Human-readable text of an `error`/`message` field.
pub(crate) fn error_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Array(items) => {
            let joined: Vec<&str> = items.iter().filter_map(Value::as_str).collect();
            (!joined.is_empty()).then(|| joined.join(", "))
        }
        Value::Object(obj) => obj.get("message")?.as_str().map(str::to_string),
        _ => None,
    }
}

/// Payload plus pagination metadata from an envelope.
///
/// # Errors
///
/// Same as [`unwrap_data`].
pub fn unwrap_page<T: DeserializeOwned>(value: Value) -> Result<(T, Option<PageMeta>)> {
    let meta = value
        .get("meta")
        .cloned()
        .and_then(|m| serde_json::from_value::<PageMeta>(m).ok());
    Ok((unwrap_data(value)?, meta))
}
