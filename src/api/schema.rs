//! Payload validation.
//!
//! The dispatcher never validates anything; wrappers that need to check a
//! payload do so through a [`Validator`] before building descriptors. The only
//! shape defined here is the nested `gday` body used by the
//! [`Anything`](super::Anything) endpoint:
//!
//! ```json
//! [
//!     {"gday": {"mate": {"how": {"the": {"bloody": {"hell": ["are", "ya", 0]}}}}}},
//!     {"gday": {"mate": {"how": {"the": {"bloody": {"hell": ["are", "ya", 1]}}}}}}
//! ]
//! ```

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{BarrageError, Result};

/// Checks a JSON payload, failing with [`BarrageError::Validation`].
pub trait Validator: Send + Sync {
    fn validate(&self, payload: &Value) -> Result<()>;
}

/// Validates a payload by deserializing it into `T`.
///
/// Unknown object keys are ignored unless `T` says otherwise.
pub struct Schema<T> {
    _shape: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> Schema<T> {
    pub fn new() -> Self {
        Self {
            _shape: PhantomData,
        }
    }

    /// Validate and return the typed payload.
    pub fn parse(&self, payload: &Value) -> Result<T> {
        T::deserialize(payload).map_err(|e| {
            tracing::debug!(error = %e, "Payload failed validation");
            BarrageError::Validation(e.to_string())
        })
    }
}

impl<T: DeserializeOwned> Default for Schema<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: DeserializeOwned> Validator for Schema<T> {
    fn validate(&self, payload: &Value) -> Result<()> {
        self.parse(payload).map(|_| ())
    }
}

/// Entry of the innermost `hell` list: an integer or a string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HellItem {
    Int(i64),
    Str(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bloody {
    pub hell: Vec<HellItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct The {
    pub bloody: Bloody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct How {
    pub the: The,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mate {
    pub how: How,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gday {
    pub mate: Mate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GdayBody {
    #[serde(default)]
    pub gday: Option<Gday>,
}

/// A list of [`GdayBody`] objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GdayBodyList(pub Vec<GdayBody>);
