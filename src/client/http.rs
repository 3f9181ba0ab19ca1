//! Raw HTTP client: URL resolution, fixed headers, response handling.
//!
//! The target origin is an explicit [`BaseUrl`] argument on every call; there
//! is no shared "current base URL" to set and restore.

use super::response::error_text;
use super::transport::{HttpRequest, HttpResponse, Method, Transport};
use crate::config::{BaseUrl, ClientConfig, TUNNEL_BYPASS_HEADER};
use crate::error::{Error, Result};
use crate::key::Params;
use serde_json::Value;
use std::sync::{Arc, RwLock};

/// Callback run when the server answers 401.
pub type UnauthorizedHandler = Arc<dyn Fn() + Send + Sync>;

struct HttpInner<T: Transport> {
    transport: T,
    config: ClientConfig,
    token: RwLock<Option<String>>,
    on_unauthorized: RwLock<Option<UnauthorizedHandler>>,
}

/// Thin JSON client over a [`Transport`]. Cheap to clone.
pub struct HttpClient<T: Transport> {
    inner: Arc<HttpInner<T>>,
}

impl<T: Transport> Clone for HttpClient<T> {
    fn clone(&self) -> Self {
        HttpClient {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Transport> HttpClient<T> {
    pub fn new(transport: T, config: ClientConfig) -> Self {
        HttpClient {
            inner: Arc::new(HttpInner {
                transport,
                config,
                token: RwLock::new(None),
                on_unauthorized: RwLock::new(None),
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn transport(&self) -> &T {
        &self.inner.transport
    }

    /// Bearer token sent with every request. Cookies are sent regardless.
    pub fn set_token(&self, token: Option<String>) {
        match self.inner.token.write() {
            Ok(mut slot) => *slot = token,
            Err(poisoned) => *poisoned.into_inner() = token,
        }
    }

    pub fn token(&self) -> Option<String> {
        match self.inner.token.read() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Register the callback run on every 401 response.
    pub fn set_unauthorized_handler(&self, handler: Option<UnauthorizedHandler>) {
        match self.inner.on_unauthorized.write() {
            Ok(mut slot) => *slot = handler,
            Err(poisoned) => *poisoned.into_inner() = handler,
        }
    }

    /// Absolute URL for `endpoint` on `base`, with params as query string.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConfigError` if the origin for `base` is blank or the
    /// result is not a valid URL.
    pub fn build_url(&self, endpoint: &str, params: &Params, base: BaseUrl) -> Result<String> {
        let origin = self.inner.config.resolve(base).ok_or_else(|| match base {
            BaseUrl::Primary => Error::ConfigError(
                "API base URL is not configured; set CAMPUS_API_BASE_URL".to_string(),
            ),
            BaseUrl::Secondary => Error::ConfigError(
                "organization API base URL is not configured; set CAMPUS_ORG_API_BASE_URL"
                    .to_string(),
            ),
        })?;

        let path = if endpoint.starts_with('/') {
            endpoint.to_string()
        } else {
            format!("/{}", endpoint)
        };
        let raw = format!("{}{}", origin, path);

        let url = if params.is_empty() {
            reqwest::Url::parse(&raw)
        } else {
            reqwest::Url::parse_with_params(&raw, params.iter())
        }
        .map_err(|e| Error::ConfigError(format!("Invalid request URL {}: {}", raw, e)))?;

        Ok(url.to_string())
    }

    fn headers(&self) -> Vec<(String, String)> {
        let mut headers = vec![
            ("Content-Type".to_string(), "application/json".to_string()),
            ("Accept".to_string(), "application/json".to_string()),
            (
                TUNNEL_BYPASS_HEADER.0.to_string(),
                TUNNEL_BYPASS_HEADER.1.to_string(),
            ),
        ];
        if let Some(token) = self.token() {
            headers.push(("Authorization".to_string(), format!("Bearer {}", token)));
        }
        headers
    }

    /// Perform one request and decode the JSON body.
    ///
    /// # Errors
    ///
    /// - `Error::ConfigError`: blank base URL for `base`
    /// - `Error::Timeout`: no response within `request_timeout`
    /// - `Error::Network`: no response at all
    /// - `Error::Unauthorized`: 401 (the unauthorized handler has run)
    /// - `Error::Http`: any other non-2xx status
    /// - `Error::DeserializationError`: 2xx with a non-JSON body
    pub async fn request(
        &self,
        method: Method,
        endpoint: &str,
        params: &Params,
        body: Option<&Value>,
        base: BaseUrl,
    ) -> Result<Value> {
        let request = HttpRequest {
            method,
            url: self.build_url(endpoint, params, base)?,
            headers: self.headers(),
            body: body.cloned(),
        };
        let url = request.url.clone();

        debug!("→ {} {}", method, url);
        let timeout = self.inner.config.request_timeout;
        let response = tokio::time::timeout(timeout, self.inner.transport.execute(request))
            .await
            .map_err(|_| {
                Error::Timeout(format!("{} {} exceeded {:?}", method, url, timeout))
            })??;
        debug!("← {} {} {}", response.status, method, url);

        self.handle_response(response)
    }

    pub async fn get(&self, endpoint: &str, params: &Params, base: BaseUrl) -> Result<Value> {
        self.request(Method::Get, endpoint, params, None, base).await
    }

    fn handle_response(&self, response: HttpResponse) -> Result<Value> {
        if response.status == 401 {
            warn!("Session rejected by server (401)");
            let handler = match self.inner.on_unauthorized.read() {
                Ok(slot) => slot.clone(),
                Err(poisoned) => poisoned.into_inner().clone(),
            };
            if let Some(handler) = handler {
                handler();
            }
            let message = error_message(&response)
                .unwrap_or_else(|| "Session expired, please log in again".to_string());
            return Err(Error::Unauthorized(message));
        }

        if !response.is_success() {
            let message =
                error_message(&response).unwrap_or_else(|| synthesized_message(response.status));
            return Err(Error::Http {
                status: response.status,
                message,
                raw: response.body,
            });
        }

        if response.body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&response.body)
            .map_err(|e| Error::DeserializationError(format!("Invalid JSON response: {}", e)))
    }
}

/// `message` or `error` (string, or object with a `message`) from a JSON error body.
fn error_message(response: &HttpResponse) -> Option<String> {
    let body: Value = serde_json::from_str(&response.body).ok()?;
    let pick = |field: &str| body.get(field).and_then(error_text);
    pick("message").or_else(|| pick("error"))
}

fn synthesized_message(status: u16) -> String {
    let reason = reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown Status");
    format!("Request failed with status {} {}", status, reason)
}
