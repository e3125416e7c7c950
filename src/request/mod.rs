//! Request descriptors - the unit of work submitted in a batch.

pub mod types;

pub use types::{Method, ParamValue, Params, RequestDescriptor};
