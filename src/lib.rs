//! Concurrent HTTP request batching.
//!
//! A [`Client`] takes a batch of [`RequestDescriptor`]s and dispatches them
//! against one base URL, at most [`MAX_CONCURRENCY`] at a time. A batch either
//! succeeds as a whole, returning every response in submission order, or stops
//! at the first fatal failure: any transport failure, or a non-2xx status when
//! `raise_on_error` is set. Stopping cancels every request still queued or in
//! flight.

pub mod api;
pub mod classify;
pub mod client;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod request;

// Re-export commonly used types
pub use classify::{ClassifiedError, Diagnostic, StatusClass, StatusFailure};
pub use client::Client;
pub use dispatch::{
    BatchId, BatchResult, DEFAULT_BASE_URL, DEFAULT_TIMEOUT_SECS, DispatchConfig, Dispatcher,
    MAX_CONCURRENCY,
};
pub use error::{BarrageError, Result};
pub use http::{
    HttpClient, HttpResponse, MockHttpClient, ReqwestConnector, ReqwestHttpClient,
    TransportFactory,
};
pub use request::{Method, ParamValue, Params, RequestDescriptor};
