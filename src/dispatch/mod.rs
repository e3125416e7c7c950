//! Concurrent dispatcher for one batch of requests.
//!
//! The dispatcher fans a batch of [`RequestDescriptor`]s out over a pooled
//! transport, at most `max_concurrency` at a time, and fans the responses back
//! in. The first fatal failure (a transport failure, or a non-2xx status when
//! `raise_on_error` is set) cancels every other task in the batch and is
//! returned in place of any results.
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use metrics::counter;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::classify::{ClassifiedError, status_failure};
use crate::error::{BarrageError, Result};
use crate::http::{HttpClient, HttpResponse};
use crate::request::{Method, RequestDescriptor};

pub mod types;

pub use types::{BatchId, BatchResult, DispatchedResponse};

/// Base URL used when none is configured.
pub const DEFAULT_BASE_URL: &str = "https://httpbin.org/";

/// Ceiling on simultaneously in-flight requests per batch.
pub const MAX_CONCURRENCY: usize = 50;

/// Default transport timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// Configuration shared read-only by every batch a client submits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Base URL every descriptor path is joined onto
    pub base_url: Url,

    /// Headers sent with every request
    pub headers: BTreeMap<String, String>,

    /// Whether to verify TLS certificates
    pub verify: bool,

    /// Transport timeout (connect + read) per request, in seconds
    pub timeout_secs: u64,

    /// Whether a non-2xx response aborts the batch
    pub raise_on_error: bool,

    /// Maximum number of requests in flight at once
    pub max_concurrency: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse(DEFAULT_BASE_URL).expect("default base URL is valid"),
            headers: BTreeMap::new(),
            verify: false,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            raise_on_error: true,
            max_concurrency: MAX_CONCURRENCY,
        }
    }
}

impl DispatchConfig {
    /// Default configuration against the given base URL.
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url).map_err(|source| BarrageError::InvalidBaseUrl {
            url: base_url.to_string(),
            source,
        })?;
        Ok(Self {
            base_url,
            ..Default::default()
        })
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_raise_on_error(mut self, raise_on_error: bool) -> Self {
        self.raise_on_error = raise_on_error;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Reject configurations that could never dispatch anything.
    pub fn validate(&self) -> Result<()> {
        if self.base_url.cannot_be_a_base() {
            return Err(BarrageError::InvalidConfig(format!(
                "base URL '{}' cannot have paths joined onto it",
                self.base_url
            )));
        }
        if self.max_concurrency == 0 {
            return Err(BarrageError::InvalidConfig(
                "max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.max_concurrency > Semaphore::MAX_PERMITS {
            return Err(BarrageError::InvalidConfig(format!(
                "max_concurrency must be at most {}",
                Semaphore::MAX_PERMITS
            )));
        }
        if self.timeout_secs == 0 {
            return Err(BarrageError::InvalidConfig(
                "timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Issue one descriptor through the transport operation for its method.
async fn perform<H: HttpClient>(
    http_client: &H,
    descriptor: &RequestDescriptor,
) -> Result<HttpResponse> {
    let path = descriptor.path();
    let params = descriptor.params();
    match descriptor.method() {
        Method::Get => http_client.get(path, params).await,
        Method::Delete => http_client.delete(path, params).await,
        Method::Post => http_client.post(path, params, descriptor.body()).await,
        Method::Put => http_client.put(path, params, descriptor.body()).await,
        Method::Patch => http_client.patch(path, params, descriptor.body()).await,
    }
}

fn outcome_label(error: &BarrageError) -> &'static str {
    match error {
        BarrageError::Classified(ClassifiedError::CommunicationFailure { .. }) => {
            "communication_failure"
        }
        BarrageError::Classified(ClassifiedError::StatusFailure(_)) => "status_failure",
        _ => "error",
    }
}

/// Runs a single batch.
///
/// A dispatcher runs exactly one batch: it owns the transport (and with it
/// the connection pool), the concurrency limiter and the batch cancellation
/// token, none of which outlive the batch.
pub struct Dispatcher<H>
where
    H: HttpClient,
{
    batch_id: BatchId,
    http_client: Arc<H>,
    config: Arc<DispatchConfig>,
    semaphore: Arc<Semaphore>,
    requests_in_flight: Arc<AtomicUsize>,
    cancellation_token: CancellationToken,
}

impl<H> Dispatcher<H>
where
    H: HttpClient + 'static,
{
    /// Create a new dispatcher.
    pub fn new(http_client: H, config: Arc<DispatchConfig>) -> Self {
        Self {
            batch_id: BatchId::new(),
            http_client: Arc::new(http_client),
            semaphore: Arc::new(Semaphore::new(config.max_concurrency)),
            config,
            requests_in_flight: Arc::new(AtomicUsize::new(0)),
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Tie the batch to an outer token: cancelling `parent` stops the batch,
    /// while a hard stop inside the batch leaves `parent` untouched.
    pub fn with_parent_token(mut self, parent: &CancellationToken) -> Self {
        self.cancellation_token = parent.child_token();
        self
    }

    pub fn batch_id(&self) -> BatchId {
        self.batch_id
    }

    /// Run the batch to completion or to its first fatal failure.
    ///
    /// Consumes the dispatcher: a hard stop cancels its token for good, so
    /// every batch needs a fresh one. Responses are collected as they complete and returned in submission
    /// order. No partial results are ever returned: on failure the caller gets
    /// only the error.
    #[tracing::instrument(skip_all, fields(batch_id = %self.batch_id, batch_size = descriptors.len()))]
    pub async fn run(self, descriptors: Vec<RequestDescriptor>) -> Result<BatchResult> {
        let total = descriptors.len();
        if total == 0 {
            tracing::debug!("Empty batch, nothing to dispatch");
            return Ok(BatchResult::Many(Vec::new()));
        }

        tracing::info!(
            max_concurrency = self.config.max_concurrency,
            raise_on_error = self.config.raise_on_error,
            "Dispatching batch"
        );

        let results: Arc<Mutex<Vec<DispatchedResponse>>> =
            Arc::new(Mutex::new(Vec::with_capacity(total)));
        let mut join_set: JoinSet<Result<()>> = JoinSet::new();

        for (index, descriptor) in descriptors.into_iter().enumerate() {
            let http_client = self.http_client.clone();
            let semaphore = self.semaphore.clone();
            let cancellation_token = self.cancellation_token.clone();
            let requests_in_flight = self.requests_in_flight.clone();
            let results = results.clone();
            let raise_on_error = self.config.raise_on_error;

            join_set.spawn(async move {
                // Wait for a free slot; the permit is held until this task ends
                let _permit = tokio::select! {
                    biased;
                    _ = cancellation_token.cancelled() => return Ok(()),
                    permit = semaphore.acquire_owned() => permit
                        .map_err(|e| anyhow::anyhow!("Concurrency limiter closed: {}", e))?,
                };

                let in_flight = requests_in_flight.fetch_add(1, Ordering::Relaxed) + 1;
                let _guard = scopeguard::guard((), |_| {
                    requests_in_flight.fetch_sub(1, Ordering::Relaxed);
                });

                let method = descriptor.method();
                tracing::debug!(index, in_flight, method = %method, path = %descriptor.path(), "Dispatching request");

                let outcome = tokio::select! {
                    biased;
                    _ = cancellation_token.cancelled() => return Ok(()),
                    outcome = perform(http_client.as_ref(), &descriptor) => outcome,
                };

                let response = match outcome {
                    Ok(response) => response,
                    Err(e) => {
                        counter!(
                            "barrage_requests_total",
                            "method" => method.as_str(),
                            "outcome" => outcome_label(&e)
                        )
                        .increment(1);
                        tracing::warn!(index, error = %e, "Request failed, stopping batch");
                        cancellation_token.cancel();
                        return Err(e);
                    }
                };

                if raise_on_error && !response.is_success() {
                    counter!(
                        "barrage_requests_total",
                        "method" => method.as_str(),
                        "outcome" => "status_failure"
                    )
                    .increment(1);
                    tracing::warn!(
                        index,
                        status = response.status,
                        url = %response.url,
                        "Request returned error status, stopping batch"
                    );
                    cancellation_token.cancel();
                    return Err(ClassifiedError::StatusFailure(status_failure(&response)).into());
                }

                counter!(
                    "barrage_requests_total",
                    "method" => method.as_str(),
                    "outcome" => "success"
                )
                .increment(1);
                tracing::trace!(index, status = response.status, "Request completed");

                results.lock().push(DispatchedResponse { index, response });
                Ok(())
            });
        }

        let mut first_error: Option<BarrageError> = None;

        while let Some(joined) = join_set.join_next().await {
            let error = match joined {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e,
                Err(join_error) if join_error.is_cancelled() => continue,
                Err(join_error) => {
                    tracing::error!(error = %join_error, "Dispatch task panicked");
                    BarrageError::Other(anyhow::anyhow!("Dispatch task panicked: {}", join_error))
                }
            };

            if first_error.is_none() {
                // Hard stop: nothing else in this batch gets to finish
                self.cancellation_token.cancel();
                join_set.abort_all();
                first_error = Some(error);
            } else {
                tracing::trace!(error = %error, "Ignoring failure after hard stop");
            }
        }

        if let Some(error) = first_error {
            counter!("barrage_batches_total", "outcome" => outcome_label(&error)).increment(1);
            tracing::warn!(error = %error, "Batch aborted");
            return Err(error);
        }

        let mut responses = std::mem::take(&mut *results.lock());
        if responses.len() != total {
            // Only an outer cancellation stops tasks without an error
            counter!("barrage_batches_total", "outcome" => "cancelled").increment(1);
            tracing::info!(
                completed = responses.len(),
                total,
                "Batch cancelled before completion"
            );
            return Err(BarrageError::Cancelled);
        }

        // Completion order -> submission order
        responses.sort_unstable_by_key(|r| r.index);

        counter!("barrage_batches_total", "outcome" => "success").increment(1);
        tracing::info!(completed = total, "Batch completed");

        Ok(BatchResult::from_responses(
            responses.into_iter().map(|r| r.response).collect(),
        ))
    }
}
