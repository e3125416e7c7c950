//! Error types for the batching client.

use thiserror::Error;

pub use crate::classify::ClassifiedError;

/// Result type alias using the barrage error type.
pub type Result<T> = std::result::Result<T, BarrageError>;

/// Main error type for the batching client.
#[derive(Error, Debug)]
pub enum BarrageError {
    /// A request in the batch failed at the transport or status level.
    ///
    /// This is the error that aborts a batch; see [`ClassifiedError`].
    #[error(transparent)]
    Classified(#[from] ClassifiedError),

    /// The batch was cancelled from outside before every request completed
    #[error("Batch cancelled")]
    Cancelled,

    /// The blocking `submit` was called from inside an async runtime
    #[error("Blocking submit called from within an async runtime; use submit_async")]
    NestedRuntime,

    /// Payload rejected by a validator before any request was sent
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration rejected when the client was built
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The configured base URL could not be parsed
    #[error("Invalid base URL '{url}': {source}")]
    InvalidBaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// A request path could not be joined onto the base URL
    #[error("Invalid request URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// HTTP client construction or request building failed
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The per-submit runtime could not be started
    #[error("Failed to start runtime: {0}")]
    Runtime(#[from] std::io::Error),

    /// General error from anyhow
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BarrageError {
    /// The classified request failure, if this error aborted a batch.
    pub fn classified(&self) -> Option<&ClassifiedError> {
        match self {
            BarrageError::Classified(e) => Some(e),
            _ => None,
        }
    }

    /// True if a request never produced a response.
    pub fn is_communication_failure(&self) -> bool {
        matches!(
            self,
            BarrageError::Classified(ClassifiedError::CommunicationFailure { .. })
        )
    }

    /// True if a request produced a non-2xx response.
    pub fn is_status_failure(&self) -> bool {
        matches!(
            self,
            BarrageError::Classified(ClassifiedError::StatusFailure(_))
        )
    }
}
