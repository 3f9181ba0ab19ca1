//! Scripted in-memory transport for tests.
//!
//! Routes are matched on method and URL path (query string ignored). Each
//! route holds a queue of responses; the last one repeats once the queue is
//! down to a single entry. Unrouted requests get a 404.
//!
//! ```
//! use campus_kit::client::{Method, MockTransport};
//! use serde_json::json;
//!
//! let transport = MockTransport::new();
//! transport.on_json(Method::Get, "/homework", json!([{"id": "H1"}]));
//! transport.on(Method::Get, "/exams", 500, json!({"message": "boom"}));
//! assert_eq!(transport.total_calls(), 0);
//! ```

use super::transport::{HttpRequest, HttpResponse, Method, Transport};
use crate::error::{Error, Result};
use dashmap::DashMap;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct MockRoute {
    responses: VecDeque<std::result::Result<HttpResponse, Error>>,
    hits: usize,
}

/// Scripted transport. Clones share routes and the request log.
#[derive(Clone, Default)]
pub struct MockTransport {
    routes: Arc<DashMap<String, MockRoute>>,
    requests: Arc<Mutex<Vec<HttpRequest>>>,
    latency: Duration,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every response by `latency` (tokio clock).
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Queue a response for `method path`.
    pub fn on(&self, method: Method, path: &str, status: u16, body: Value) -> &Self {
        self.push(method, path, Ok(HttpResponse::json(status, &body)))
    }

    /// Queue a 200 JSON response.
    pub fn on_json(&self, method: Method, path: &str, body: Value) -> &Self {
        self.on(method, path, 200, body)
    }

    /// Queue a raw response body, for non-JSON payloads.
    pub fn on_raw(&self, method: Method, path: &str, status: u16, body: &str) -> &Self {
        self.push(method, path, Ok(HttpResponse::new(status, body)))
    }

    /// Queue a transport failure (no response at all).
    pub fn on_network_error(&self, method: Method, path: &str, message: &str) -> &Self {
        self.push(method, path, Err(Error::Network(message.to_string())))
    }

    fn push(
        &self,
        method: Method,
        path: &str,
        response: std::result::Result<HttpResponse, Error>,
    ) -> &Self {
        self.routes
            .entry(route_key(method, path))
            .or_default()
            .responses
            .push_back(response);
        self
    }

    /// Requests served for `method path`.
    pub fn calls(&self, method: Method, path: &str) -> usize {
        self.routes
            .get(&route_key(method, path))
            .map(|route| route.hits)
            .unwrap_or(0)
    }

    /// All requests received, in arrival order.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .map(|log| log.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn total_calls(&self) -> usize {
        self.requests().len()
    }

    fn record(&self, request: HttpRequest) {
        match self.requests.lock() {
            Ok(mut log) => log.push(request),
            Err(poisoned) => poisoned.into_inner().push(request),
        }
    }
}

impl Transport for MockTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        let key = route_key(request.method, &path_of(&request.url));
        self.record(request);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let Some(mut route) = self.routes.get_mut(&key) else {
            return Ok(HttpResponse::json(
                404,
                &json!({ "message": format!("no mock route for {}", key) }),
            ));
        };
        route.hits += 1;

        let response = if route.responses.len() > 1 {
            route.responses.pop_front()
        } else {
            route.responses.front().cloned()
        };
        response.unwrap_or_else(|| Ok(HttpResponse::new(204, "")))
    }
}

fn route_key(method: Method, path: &str) -> String {
    format!("{} {}", method, path)
}

fn path_of(url: &str) -> String {
    match reqwest::Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url.split('?').next().unwrap_or(url).to_string(),
    }
}
