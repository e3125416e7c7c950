//! Core request types for the batching client.
//!
//! A [`RequestDescriptor`] is an immutable description of one HTTP call. It is
//! built by the caller, handed to the dispatcher for the duration of one batch,
//! and dropped afterwards.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// HTTP method of a descriptor.
///
/// Parsing from a name is case-insensitive and never fails: any name outside
/// the supported set falls back to [`Method::Get`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE", from = "String")]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    /// Parse a method name, defaulting to GET for anything unrecognized.
    pub fn parse_lenient(name: &str) -> Self {
        match name.trim().to_ascii_uppercase().as_str() {
            "GET" => Method::Get,
            "POST" => Method::Post,
            "PUT" => Method::Put,
            "PATCH" => Method::Patch,
            "DELETE" => Method::Delete,
            other => {
                tracing::debug!(method = %other, "Unrecognized HTTP method, dispatching as GET");
                Method::Get
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }

    /// Whether requests with this method may carry a body.
    pub fn carries_body(&self) -> bool {
        !matches!(self, Method::Get | Method::Delete)
    }
}

impl FromStr for Method {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Method::parse_lenient(s))
    }
}

impl From<String> for Method {
    fn from(name: String) -> Self {
        Method::parse_lenient(&name)
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single query parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(b) => write!(f, "{}", b),
            ParamValue::Int(i) => write!(f, "{}", i),
            ParamValue::Float(x) => write!(f, "{}", x),
            ParamValue::Str(s) => f.write_str(s),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Str(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Str(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        ParamValue::Int(value.into())
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

/// Query parameters of a descriptor, serialized as URL query pairs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params(BTreeMap<String, ParamValue>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a raw query string (`a=1&b=two`). Every value is kept as a string.
    pub fn from_query(query: &str) -> Self {
        Params(
            url::form_urlencoded::parse(query.trim_start_matches('?').as_bytes())
                .map(|(k, v)| (k.into_owned(), ParamValue::Str(v.into_owned())))
                .collect(),
        )
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.0.iter()
    }
}

impl<K, V> FromIterator<(K, V)> for Params
where
    K: Into<String>,
    V: Into<ParamValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Params(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl fmt::Display for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (key, value)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", key, value)?;
        }
        f.write_str("}")
    }
}

/// Immutable description of one pending HTTP call.
///
/// GET and DELETE descriptors never carry a body: whatever body is passed to
/// the constructor is dropped, and there is no API to set it afterwards.
///
/// # Example
/// ```
/// use barrage::{Method, RequestDescriptor};
/// use serde_json::json;
///
/// let get = RequestDescriptor::new(Method::Get, "anything", None, Some(json!({"a": 1})));
/// assert!(get.body().is_none());
///
/// let post = RequestDescriptor::new(Method::Post, "anything", None, Some(json!({"a": 1})));
/// assert_eq!(post.body(), Some(&json!({"a": 1})));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestDescriptor {
    method: Method,
    path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Params>,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<Value>,
}

impl RequestDescriptor {
    pub fn new(
        method: Method,
        path: impl Into<String>,
        params: Option<Params>,
        body: Option<Value>,
    ) -> Self {
        let body = if method.carries_body() { body } else { None };
        Self {
            method,
            path: path.into(),
            params,
            body,
        }
    }

    /// Build from a method name, using the lenient GET fallback.
    pub fn from_parts(
        method: &str,
        path: impl Into<String>,
        params: Option<Params>,
        body: Option<Value>,
    ) -> Self {
        Self::new(Method::parse_lenient(method), path, params, body)
    }

    pub fn get(path: impl Into<String>, params: Option<Params>) -> Self {
        Self::new(Method::Get, path, params, None)
    }

    pub fn delete(path: impl Into<String>, params: Option<Params>) -> Self {
        Self::new(Method::Delete, path, params, None)
    }

    pub fn post(path: impl Into<String>, body: Option<Value>) -> Self {
        Self::new(Method::Post, path, None, body)
    }

    pub fn put(path: impl Into<String>, body: Option<Value>) -> Self {
        Self::new(Method::Put, path, None, body)
    }

    pub fn patch(path: impl Into<String>, body: Option<Value>) -> Self {
        Self::new(Method::Patch, path, None, body)
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn params(&self) -> Option<&Params> {
        self.params.as_ref()
    }

    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }
}

impl fmt::Display for RequestDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RequestDescriptor(method: {}, path: {}, params: ",
            self.method, self.path
        )?;
        match &self.params {
            Some(params) => write!(f, "{}", params)?,
            None => f.write_str("None")?,
        }
        f.write_str(", body: ")?;
        match &self.body {
            Some(Value::String(s)) => f.write_str(s)?,
            Some(body) => write!(f, "{}", body)?,
            None => f.write_str("None")?,
        }
        f.write_str(")")
    }
}
