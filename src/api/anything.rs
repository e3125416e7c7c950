//! Wrapper for the `anything` endpoint.

use serde_json::Value;

use crate::api::schema::{GdayBodyList, Schema, Validator};
use crate::client::Client;
use crate::dispatch::BatchResult;
use crate::error::Result;
use crate::http::TransportFactory;
use crate::request::{Method, RequestDescriptor};

/// `GET anything`, one request per validated body.
///
/// Bodies are validated as a [`GdayBodyList`] first; an invalid list fails
/// before anything is sent. The requests themselves are GETs, so the bodies
/// are not transmitted.
pub struct Anything<'c, F>
where
    F: TransportFactory,
{
    client: &'c Client<F>,
    schema: Schema<GdayBodyList>,
}

impl<'c, F> Anything<'c, F>
where
    F: TransportFactory,
{
    pub fn new(client: &'c Client<F>) -> Self {
        Self {
            client,
            schema: Schema::new(),
        }
    }

    fn descriptors(&self, bodies: Vec<Value>) -> Result<Vec<RequestDescriptor>> {
        self.schema.validate(&Value::Array(bodies.clone()))?;

        Ok(bodies
            .into_iter()
            .map(|body| RequestDescriptor::new(Method::Get, "anything", None, Some(body)))
            .collect())
    }

    /// Validate and submit, blocking until the batch finishes.
    pub fn get_anything(&self, bodies: Vec<Value>) -> Result<BatchResult> {
        let batch = self.descriptors(bodies)?;
        self.client.submit(batch)
    }

    /// Validate and submit from within an existing runtime.
    pub async fn get_anything_async(&self, bodies: Vec<Value>) -> Result<BatchResult> {
        let batch = self.descriptors(bodies)?;
        self.client.submit_async(batch).await
    }
}

impl<F> Client<F>
where
    F: TransportFactory,
{
    /// Endpoint wrapper for `anything`.
    pub fn anything(&self) -> Anything<'_, F> {
        Anything::new(self)
    }
}
