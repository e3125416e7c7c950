//! Classification of failed calls.
//!
//! Every failure that aborts a batch is turned into a [`ClassifiedError`] here:
//! either the transport never produced a response
//! ([`ClassifiedError::CommunicationFailure`]) or the server answered outside
//! the 2xx range ([`ClassifiedError::StatusFailure`]). Status failures carry a
//! best-effort [`Diagnostic`] extracted from the response body so the message
//! is actionable without re-fetching.

use std::fmt;

use serde_json::Value;
use thiserror::Error;

use crate::http::HttpResponse;

/// Coarse classification of a non-2xx status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusClass {
    /// 400-499
    ClientError,
    /// 500-599
    ServerError,
    /// Anything else. Callers only classify non-2xx responses, so seeing this
    /// means the classifier was invoked outside its contract.
    Unknown,
}

impl StatusClass {
    pub fn from_status(status: u16) -> Self {
        match status {
            400..=499 => StatusClass::ClientError,
            500..=599 => StatusClass::ServerError,
            _ => {
                tracing::warn!(status, "Status classification reached for a non-error status");
                StatusClass::Unknown
            }
        }
    }

    /// Human-readable error type, used as the message prefix.
    pub fn error_type(&self) -> &'static str {
        match self {
            StatusClass::ClientError => "Client error",
            StatusClass::ServerError => "Server error",
            StatusClass::Unknown => "Unknown error",
        }
    }
}

impl fmt::Display for StatusClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.error_type())
    }
}

/// Best-effort diagnostic payload extracted from an error response body.
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    /// The response had no body.
    Empty,
    /// The body was not JSON; this is the body decoded as text.
    Text(String),
    /// The body was JSON: its `errors` field when present, else the whole value.
    Json(Value),
}

impl Diagnostic {
    pub fn from_body(body: &[u8]) -> Self {
        if body.is_empty() {
            return Diagnostic::Empty;
        }
        match serde_json::from_slice::<Value>(body) {
            Ok(Value::Object(mut map)) if map.contains_key("errors") => {
                Diagnostic::Json(map.remove("errors").unwrap_or(Value::Null))
            }
            Ok(value) => Diagnostic::Json(value),
            Err(_) => Diagnostic::Text(String::from_utf8_lossy(body).into_owned()),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Diagnostic::Empty)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::Empty => Ok(()),
            Diagnostic::Text(text) => f.write_str(text),
            Diagnostic::Json(Value::String(s)) => f.write_str(s),
            Diagnostic::Json(value) => write!(f, "{}", value),
        }
    }
}

/// A response outside the 2xx range.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusFailure {
    pub kind: StatusClass,
    pub status: u16,
    pub reason: String,
    pub diagnostic: Diagnostic,
    /// `METHOD url` of the request that produced the response
    pub request: String,
    /// Raw `Link` header of the response, for paginated APIs
    pub links: Option<String>,
}

impl StatusFailure {
    /// `"<error_type> <status_code> <reason_phrase> <diagnostic_body>"`
    pub fn message(&self) -> String {
        format!(
            "{} {} {} {}",
            self.kind.error_type(),
            self.status,
            self.reason,
            self.diagnostic
        )
    }
}

impl fmt::Display for StatusFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

/// A failure that aborts the batch it occurred in.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClassifiedError {
    /// The transport never produced a response (connect error, connect
    /// timeout, protocol error).
    #[error("CommunicationError, {message}")]
    CommunicationFailure { message: String },

    /// The server responded with a non-2xx status.
    #[error("{0}")]
    StatusFailure(StatusFailure),
}

impl ClassifiedError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ClassifiedError::StatusFailure(failure) => Some(failure.status),
            ClassifiedError::CommunicationFailure { .. } => None,
        }
    }

    pub fn kind(&self) -> Option<StatusClass> {
        match self {
            ClassifiedError::StatusFailure(failure) => Some(failure.kind),
            ClassifiedError::CommunicationFailure { .. } => None,
        }
    }
}

/// Classify a non-2xx response.
pub fn status_failure(response: &HttpResponse) -> StatusFailure {
    debug_assert!(
        !response.is_success(),
        "status_failure called on a {} response",
        response.status
    );
    let failure = StatusFailure {
        kind: StatusClass::from_status(response.status),
        status: response.status,
        reason: response.reason.clone(),
        diagnostic: Diagnostic::from_body(&response.body),
        request: format!("{} {}", response.method, response.url),
        links: response.links.clone(),
    };
    tracing::debug!(
        request = %failure.request,
        status = failure.status,
        kind = %failure.kind,
        "Classified response as status failure"
    );
    failure
}

/// Classify a transport error that produced no response.
///
/// The message includes the error's source chain, which is where the
/// underlying cause (connection refused, timed out, ...) usually lives.
pub fn communication_failure(error: &(dyn std::error::Error + 'static)) -> ClassifiedError {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    ClassifiedError::CommunicationFailure { message }
}
