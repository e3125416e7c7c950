//! HTTP transport abstraction.
//!
//! This module defines the `HttpClient` trait, the capability set the
//! dispatcher needs from a transport (one async call per method), along with
//! the production reqwest implementation and a mock for tests.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use crate::classify::communication_failure;
use crate::dispatch::DispatchConfig;
use crate::error::{BarrageError, Result};
use crate::request::{Method, Params};

/// Response from an HTTP request.
///
/// Bodies are buffered in full before the response is handed back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Method of the request that produced this response
    pub method: Method,
    /// Final URL of the request
    pub url: String,
    /// HTTP status code
    pub status: u16,
    /// Reason phrase (canonical for the status code, empty if there is none)
    pub reason: String,
    /// Raw `Link` header value, if the server sent one
    pub links: Option<String>,
    /// Raw response body
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Create an empty-bodied response with the canonical reason phrase.
    pub fn new(method: Method, url: impl Into<String>, status: u16) -> Self {
        let reason = reqwest::StatusCode::from_u16(status)
            .ok()
            .and_then(|code| code.canonical_reason())
            .unwrap_or_default()
            .to_string();
        Self {
            method,
            url: url.into(),
            status,
            reason,
            links: None,
            body: Vec::new(),
        }
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_links(mut self, links: impl Into<String>) -> Self {
        self.links = Some(links.into());
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// Trait for executing HTTP requests against one base URL.
///
/// Paths are relative to the base URL the transport was built for. GET and
/// DELETE take only query parameters; the other methods also take an optional
/// JSON body.
///
/// Implementations must report failures where no response exists as
/// [`ClassifiedError::CommunicationFailure`](crate::ClassifiedError). A
/// response of any status, including 4xx/5xx, is an `Ok`.
#[async_trait]
pub trait HttpClient: Send + Sync + Clone {
    async fn get(&self, path: &str, params: Option<&Params>) -> Result<HttpResponse>;

    async fn delete(&self, path: &str, params: Option<&Params>) -> Result<HttpResponse>;

    async fn post(
        &self,
        path: &str,
        params: Option<&Params>,
        body: Option<&Value>,
    ) -> Result<HttpResponse>;

    async fn put(
        &self,
        path: &str,
        params: Option<&Params>,
        body: Option<&Value>,
    ) -> Result<HttpResponse>;

    async fn patch(
        &self,
        path: &str,
        params: Option<&Params>,
        body: Option<&Value>,
    ) -> Result<HttpResponse>;
}

/// Builds a transport for one batch.
///
/// Each submitted batch gets a fresh transport, so connection pools are never
/// shared across batches.
pub trait TransportFactory: Send + Sync {
    type Client: HttpClient + 'static;

    fn connect(&self, config: &DispatchConfig) -> Result<Self::Client>;
}

/// Join a request path onto a base URL.
///
/// The base is treated as a directory (a trailing `/` is implied) and leading
/// slashes on the path are ignored, so `https://host/api` + `/items` gives
/// `https://host/api/items`. Absolute URLs replace the base entirely.
pub fn join_url(base: &Url, path: &str) -> std::result::Result<Url, url::ParseError> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let directory = format!("{}/", base.path());
        base.set_path(&directory);
    }
    base.join(path.trim_start_matches('/'))
}

// ============================================================================
// Production Implementation using reqwest
// ============================================================================

/// Production HTTP client using reqwest.
///
/// Holds one pooled `reqwest::Client` configured with the default headers,
/// TLS verification flag and timeout of a [`DispatchConfig`].
#[derive(Clone)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
    base_url: Url,
}

impl ReqwestHttpClient {
    pub fn new(config: &DispatchConfig) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        for (name, value) in &config.headers {
            let name = reqwest::header::HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                BarrageError::InvalidConfig(format!("invalid header name '{}': {}", name, e))
            })?;
            let value = reqwest::header::HeaderValue::from_str(value).map_err(|e| {
                BarrageError::InvalidConfig(format!("invalid value for header '{}': {}", name, e))
            })?;
            headers.insert(name, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .danger_accept_invalid_certs(!config.verify)
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(config.max_concurrency)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[tracing::instrument(skip_all, fields(method = %method, path = %path))]
    async fn send(
        &self,
        method: Method,
        path: &str,
        params: Option<&Params>,
        body: Option<&Value>,
    ) -> Result<HttpResponse> {
        let url = join_url(&self.base_url, path)?;

        tracing::debug!(url = %url, "Executing HTTP request");

        let mut req = self.client.request(method.into(), url.clone());

        if let Some(params) = params {
            req = req.query(params);
        }

        // Only add a body for methods that support one
        if method.carries_body()
            && let Some(body) = body
        {
            req = req.json(body);
            tracing::trace!("Added JSON request body");
        }

        let response = req.send().await.map_err(|e| {
            tracing::error!(url = %url, error = %e, "HTTP request failed");
            transport_error(e)
        })?;

        let status = response.status();
        let final_url = response.url().to_string();
        let links = response
            .headers()
            .get(reqwest::header::LINK)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await.map_err(transport_error)?;

        tracing::debug!(
            url = %final_url,
            status = status.as_u16(),
            response_len = body.len(),
            "HTTP request completed"
        );

        Ok(HttpResponse {
            method,
            url: final_url,
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or_default().to_string(),
            links,
            body: body.to_vec(),
        })
    }
}

/// Builder errors are bugs in the request, everything else is a transport
/// failure.
fn transport_error(e: reqwest::Error) -> BarrageError {
    if e.is_builder() {
        BarrageError::HttpClient(e)
    } else {
        communication_failure(&e).into()
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn get(&self, path: &str, params: Option<&Params>) -> Result<HttpResponse> {
        self.send(Method::Get, path, params, None).await
    }

    async fn delete(&self, path: &str, params: Option<&Params>) -> Result<HttpResponse> {
        self.send(Method::Delete, path, params, None).await
    }

    async fn post(
        &self,
        path: &str,
        params: Option<&Params>,
        body: Option<&Value>,
    ) -> Result<HttpResponse> {
        self.send(Method::Post, path, params, body).await
    }

    async fn put(
        &self,
        path: &str,
        params: Option<&Params>,
        body: Option<&Value>,
    ) -> Result<HttpResponse> {
        self.send(Method::Put, path, params, body).await
    }

    async fn patch(
        &self,
        path: &str,
        params: Option<&Params>,
        body: Option<&Value>,
    ) -> Result<HttpResponse> {
        self.send(Method::Patch, path, params, body).await
    }
}

/// Connects a fresh [`ReqwestHttpClient`] per batch.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReqwestConnector;

impl TransportFactory for ReqwestConnector {
    type Client = ReqwestHttpClient;

    fn connect(&self, config: &DispatchConfig) -> Result<ReqwestHttpClient> {
        ReqwestHttpClient::new(config)
    }
}

// ============================================================================
// Test/Mock Implementation
// ============================================================================

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::oneshot;

/// Mock HTTP client for testing.
///
/// Allows configuring predetermined responses for specific requests without
/// making actual HTTP calls, and tracks how many calls are in flight at once.
///
/// # Example
/// ```ignore
/// let mock = MockHttpClient::new();
/// mock.add_response(
///     "POST /v1/items",
///     Ok(HttpResponse::new(Method::Post, "https://api.example.com/v1/items", 201)),
/// );
/// ```
#[derive(Clone)]
pub struct MockHttpClient {
    responses: Arc<Mutex<HashMap<String, Vec<MockResponse>>>>,
    calls: Arc<Mutex<Vec<MockCall>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

/// A mock response that can optionally wait before completing.
enum MockResponse {
    /// Immediate response
    Immediate(Result<HttpResponse>),
    /// Response that completes after a fixed delay
    Delayed {
        response: Result<HttpResponse>,
        delay: Duration,
    },
    /// Response that waits for a trigger signal before completing
    Triggered {
        response: Result<HttpResponse>,
        trigger: oneshot::Receiver<()>,
    },
}

/// Record of a call made to the mock HTTP client.
#[derive(Debug, Clone, PartialEq)]
pub struct MockCall {
    pub method: Method,
    pub path: String,
    pub params: Option<Params>,
    pub body: Option<Value>,
}

impl MockHttpClient {
    /// Create a new mock HTTP client.
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(HashMap::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Add a predetermined response for a specific method and path.
    ///
    /// The key is formatted as "{method} {path}". Multiple responses can be
    /// added for the same key - they will be returned in FIFO order.
    pub fn add_response(&self, key: &str, response: Result<HttpResponse>) {
        self.push(key, MockResponse::Immediate(response));
    }

    /// Add a response that is returned only after `delay` has elapsed.
    pub fn add_response_with_delay(
        &self,
        key: &str,
        response: Result<HttpResponse>,
        delay: Duration,
    ) {
        self.push(key, MockResponse::Delayed { response, delay });
    }

    /// Add a response that will wait for a manual trigger before completing.
    ///
    /// Returns a sender that when triggered (by sending `()` or dropping) will
    /// cause the HTTP request to complete with the given response.
    ///
    /// # Example
    /// ```ignore
    /// let trigger = mock.add_response_with_trigger(
    ///     "POST /test",
    ///     Ok(HttpResponse::new(Method::Post, "https://api.example.com/test", 200)),
    /// );
    /// // ... request is now blocked waiting ...
    /// trigger.send(()).unwrap(); // Now it completes
    /// ```
    pub fn add_response_with_trigger(
        &self,
        key: &str,
        response: Result<HttpResponse>,
    ) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.push(
            key,
            MockResponse::Triggered {
                response,
                trigger: rx,
            },
        );
        tx
    }

    fn push(&self, key: &str, response: MockResponse) {
        self.responses
            .lock()
            .entry(key.to_string())
            .or_default()
            .push(response);
    }

    /// Get all calls that have been made to this mock client.
    pub fn get_calls(&self) -> Vec<MockCall> {
        self.calls.lock().clone()
    }

    /// Clear all recorded calls.
    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    /// Get the number of calls made.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Get the number of requests currently in-flight (executing).
    ///
    /// This is useful for testing cancellation - if a request is aborted,
    /// the in-flight count will decrease.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of requests that were ever in flight at the same time.
    pub fn max_in_flight_count(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn execute(
        &self,
        method: Method,
        path: &str,
        params: Option<&Params>,
        body: Option<&Value>,
    ) -> Result<HttpResponse> {
        // Increment in-flight counter and record the high-water mark
        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);

        // Guard to ensure we decrement even if cancelled/panicked
        let in_flight = self.in_flight.clone();
        let _guard = InFlightGuard { in_flight };

        self.calls.lock().push(MockCall {
            method,
            path: path.to_string(),
            params: params.cloned(),
            body: body.cloned(),
        });

        let key = format!("{} {}", method, path);
        let mock_response = {
            let mut responses = self.responses.lock();
            match responses.get_mut(&key) {
                Some(queue) if !queue.is_empty() => Some(queue.remove(0)),
                _ => None,
            }
        };

        match mock_response {
            Some(MockResponse::Immediate(response)) => response,
            Some(MockResponse::Delayed { response, delay }) => {
                tokio::time::sleep(delay).await;
                response
            }
            Some(MockResponse::Triggered { response, trigger }) => {
                // Wait for trigger (ignore the result - we proceed either way)
                let _ = trigger.await;
                response
            }
            None => Err(BarrageError::Other(anyhow::anyhow!(
                "No mock response configured for {}",
                key
            ))),
        }
    }
}

impl Default for MockHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn get(&self, path: &str, params: Option<&Params>) -> Result<HttpResponse> {
        self.execute(Method::Get, path, params, None).await
    }

    async fn delete(&self, path: &str, params: Option<&Params>) -> Result<HttpResponse> {
        self.execute(Method::Delete, path, params, None).await
    }

    async fn post(
        &self,
        path: &str,
        params: Option<&Params>,
        body: Option<&Value>,
    ) -> Result<HttpResponse> {
        self.execute(Method::Post, path, params, body).await
    }

    async fn put(
        &self,
        path: &str,
        params: Option<&Params>,
        body: Option<&Value>,
    ) -> Result<HttpResponse> {
        self.execute(Method::Put, path, params, body).await
    }

    async fn patch(
        &self,
        path: &str,
        params: Option<&Params>,
        body: Option<&Value>,
    ) -> Result<HttpResponse> {
        self.execute(Method::Patch, path, params, body).await
    }
}

/// The mock is its own factory: every batch shares the configured responses
/// and call log.
impl TransportFactory for MockHttpClient {
    type Client = MockHttpClient;

    fn connect(&self, _config: &DispatchConfig) -> Result<MockHttpClient> {
        Ok(self.clone())
    }
}

/// Guard that decrements the in-flight counter when dropped.
/// This ensures the counter is decremented even if the task is cancelled or panics.
struct InFlightGuard {
    in_flight: Arc<AtomicUsize>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}
