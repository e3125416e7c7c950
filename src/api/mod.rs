//! Endpoint wrappers built on top of [`Client`](crate::Client).
//!
//! Each wrapper validates its payload before anything is sent, then turns it
//! into descriptors and submits them as one batch.

pub mod anything;
pub mod schema;

pub use anything::Anything;
pub use schema::{GdayBody, GdayBodyList, Schema, Validator};
