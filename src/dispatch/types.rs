//! Batch identity and result types.

use uuid::Uuid;

use crate::http::HttpResponse;

/// Identifier of one dispatched batch, used to correlate log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BatchId(pub Uuid);

impl BatchId {
    pub fn new() -> Self {
        BatchId(Uuid::new_v4())
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Display only first 8 characters for readability in logs
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

impl From<Uuid> for BatchId {
    fn from(uuid: Uuid) -> Self {
        BatchId(uuid)
    }
}

impl std::ops::Deref for BatchId {
    type Target = Uuid;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// A successful response tagged with the submission index of its descriptor.
#[derive(Debug, Clone)]
pub struct DispatchedResponse {
    pub index: usize,
    pub response: HttpResponse,
}

/// Outcome of a successful batch.
///
/// A batch of exactly one descriptor yields [`BatchResult::Single`]; every
/// other size (including zero) yields [`BatchResult::Many`], ordered by
/// submission.
#[derive(Debug, Clone)]
pub enum BatchResult {
    Single(HttpResponse),
    Many(Vec<HttpResponse>),
}

impl BatchResult {
    /// Build from responses already in submission order.
    pub fn from_responses(mut responses: Vec<HttpResponse>) -> Self {
        if responses.len() == 1
            && let Some(response) = responses.pop()
        {
            return BatchResult::Single(response);
        }
        BatchResult::Many(responses)
    }

    pub fn len(&self) -> usize {
        match self {
            BatchResult::Single(_) => 1,
            BatchResult::Many(responses) => responses.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_single(&self) -> bool {
        matches!(self, BatchResult::Single(_))
    }

    pub fn as_single(&self) -> Option<&HttpResponse> {
        match self {
            BatchResult::Single(response) => Some(response),
            BatchResult::Many(_) => None,
        }
    }

    pub fn as_many(&self) -> Option<&[HttpResponse]> {
        match self {
            BatchResult::Single(_) => None,
            BatchResult::Many(responses) => Some(responses),
        }
    }

    /// Flatten into a list regardless of batch size.
    pub fn into_vec(self) -> Vec<HttpResponse> {
        match self {
            BatchResult::Single(response) => vec![response],
            BatchResult::Many(responses) => responses,
        }
    }
}

impl IntoIterator for BatchResult {
    type Item = HttpResponse;
    type IntoIter = std::vec::IntoIter<HttpResponse>;

    fn into_iter(self) -> Self::IntoIter {
        self.into_vec().into_iter()
    }
}
