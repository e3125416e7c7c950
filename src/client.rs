//! Blocking entry point for submitting batches.
//!
//! [`Client`] owns one [`DispatchConfig`] and hides the dispatcher entirely:
//! callers hand it a list of descriptors and get responses (or the first
//! failure) back, without touching tasks, cancellation or connection pools.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use url::Url;

use crate::dispatch::{BatchResult, DispatchConfig, Dispatcher};
use crate::error::{BarrageError, Result};
use crate::http::{ReqwestConnector, TransportFactory};
use crate::request::RequestDescriptor;

/// Batching HTTP client.
///
/// # Example
/// ```no_run
/// use barrage::{Client, DispatchConfig, RequestDescriptor};
///
/// # fn main() -> barrage::Result<()> {
/// let client = Client::new(DispatchConfig::new("https://httpbin.org/")?)?;
/// let responses = client.submit(vec![
///     RequestDescriptor::get("get", None),
///     RequestDescriptor::post("post", Some(serde_json::json!({"hello": "world"}))),
/// ])?;
/// for response in responses {
///     println!("{} {}", response.status, response.url);
/// }
/// # Ok(())
/// # }
/// ```
pub struct Client<F = ReqwestConnector>
where
    F: TransportFactory,
{
    config: Arc<DispatchConfig>,
    transport: F,
}

impl Client<ReqwestConnector> {
    /// Client backed by reqwest.
    pub fn new(config: DispatchConfig) -> Result<Self> {
        Self::with_transport(config, ReqwestConnector)
    }
}

impl<F> Client<F>
where
    F: TransportFactory,
{
    /// Client backed by a custom transport.
    pub fn with_transport(config: DispatchConfig, transport: F) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            transport,
        })
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn base_url(&self) -> &Url {
        &self.config.base_url
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.config.headers
    }

    pub fn verify(&self) -> bool {
        self.config.verify
    }

    /// Transport timeout in seconds.
    pub fn timeout(&self) -> u64 {
        self.config.timeout_secs
    }

    pub fn raise_on_error(&self) -> bool {
        self.config.raise_on_error
    }

    /// Submit a batch and block until it completes or hard-stops.
    ///
    /// Runs the batch on a dedicated single-threaded runtime. Inside an async
    /// context this fails with [`BarrageError::NestedRuntime`]; use
    /// [`submit_async`](Self::submit_async) there.
    pub fn submit(&self, batch: Vec<RequestDescriptor>) -> Result<BatchResult> {
        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(BarrageError::NestedRuntime);
        }
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(self.submit_async(batch))
    }

    /// Submit a batch from within an existing runtime.
    ///
    /// Each call connects a fresh transport, so no connections or other state
    /// carry over between batches.
    pub async fn submit_async(&self, batch: Vec<RequestDescriptor>) -> Result<BatchResult> {
        let http_client = self.transport.connect(&self.config)?;
        Dispatcher::new(http_client, self.config.clone())
            .run(batch)
            .await
    }
}

impl<F> fmt::Debug for Client<F>
where
    F: TransportFactory,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<F> fmt::Display for Client<F>
where
    F: TransportFactory,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Client(base_url={}, verify={}, timeout={}, raise_on_error={})",
            self.config.base_url, self.config.verify, self.config.timeout_secs, self.config.raise_on_error
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{HttpResponse, MockHttpClient};
    use crate::request::Method;

    #[test]
    fn test_client_initialization() {
        for (verify, timeout, raise_on_error) in [(false, 15, true), (true, 30, false)] {
            let config = DispatchConfig::new("https://api.example.com")
                .unwrap()
                .with_verify(verify)
                .with_timeout_secs(timeout)
                .with_raise_on_error(raise_on_error);
            let client = Client::new(config).unwrap();

            assert_eq!(client.base_url().as_str(), "https://api.example.com/");
            assert_eq!(client.verify(), verify);
            assert_eq!(client.timeout(), timeout);
            assert_eq!(client.raise_on_error(), raise_on_error);
            assert!(client.headers().is_empty());
        }
    }

    #[test]
    fn test_client_display() {
        let client = Client::new(DispatchConfig::default()).unwrap();
        assert_eq!(
            client.to_string(),
            "Client(base_url=https://httpbin.org/, verify=false, timeout=15, raise_on_error=true)"
        );
    }

    #[test]
    fn test_client_rejects_invalid_config() {
        let result = Client::new(DispatchConfig::default().with_max_concurrency(0));
        assert!(matches!(result, Err(BarrageError::InvalidConfig(_))));
    }

    #[test_log::test]
    fn test_submit_blocks_until_batch_completes() {
        let http_client = MockHttpClient::new();
        for _ in 0..2 {
            http_client.add_response(
                "GET anything",
                Ok(HttpResponse::new(Method::Get, "https://httpbin.org/anything", 200)),
            );
        }
        http_client.add_response(
            "POST anything",
            Ok(HttpResponse::new(Method::Post, "https://httpbin.org/anything", 201)),
        );

        let client = Client::with_transport(DispatchConfig::default(), http_client.clone()).unwrap();

        let single = client
            .submit(vec![RequestDescriptor::get("anything", None)])
            .unwrap();
        assert_eq!(single.as_single().map(|r| r.status), Some(200));

        let many = client
            .submit(vec![
                RequestDescriptor::get("anything", None),
                RequestDescriptor::post("anything", None),
            ])
            .unwrap();
        let statuses: Vec<u16> = many.into_iter().map(|r| r.status).collect();
        assert_eq!(statuses, vec![200, 201]);
        assert_eq!(http_client.call_count(), 3);
    }

    #[test_log::test(tokio::test)]
    async fn test_blocking_submit_inside_runtime_is_rejected() {
        let http_client = MockHttpClient::new();
        let client = Client::with_transport(DispatchConfig::default(), http_client.clone()).unwrap();

        let result = client.submit(vec![RequestDescriptor::get("anything", None)]);

        assert!(matches!(result, Err(BarrageError::NestedRuntime)));
        assert_eq!(http_client.call_count(), 0);
    }

    #[test_log::test]
    fn test_batch_after_hard_stop_is_dispatched() {
        let http_client = MockHttpClient::new();
        http_client.add_response(
            "GET anything",
            Ok(HttpResponse::new(Method::Get, "https://httpbin.org/anything", 500)),
        );
        http_client.add_response(
            "GET anything",
            Ok(HttpResponse::new(Method::Get, "https://httpbin.org/anything", 200)),
        );
        let client = Client::with_transport(DispatchConfig::default(), http_client.clone()).unwrap();

        let error = client
            .submit(vec![RequestDescriptor::get("anything", None)])
            .unwrap_err();
        assert!(error.is_status_failure());

        let result = client
            .submit(vec![RequestDescriptor::get("anything", None)])
            .unwrap();
        assert_eq!(result.as_single().map(|r| r.status), Some(200));
        assert_eq!(http_client.call_count(), 2);
    }

    #[test]
    fn test_oversized_concurrency_is_rejected_before_submit() {
        let result = Client::new(DispatchConfig::default().with_max_concurrency(usize::MAX));
        assert!(matches!(result, Err(BarrageError::InvalidConfig(_))));
    }

    #[test_log::test]
    fn test_submit_reports_status_failure() {
        let http_client = MockHttpClient::new();
        http_client.add_response(
            "DELETE items/7",
            Ok(HttpResponse::new(Method::Delete, "https://httpbin.org/items/7", 404)
                .with_body("no such item")),
        );

        let client = Client::with_transport(DispatchConfig::default(), http_client).unwrap();
        let error = client
            .submit(vec![RequestDescriptor::delete("items/7", None)])
            .unwrap_err();

        assert!(error.is_status_failure());
        assert_eq!(error.to_string(), "Client error 404 Not Found no such item");
    }
}
