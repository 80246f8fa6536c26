//! Request descriptors: everything needed to issue one network call.
//!
//! A [`RequestDescriptor`] is a plain value. The pipeline clones it when
//! it has to re-issue the original request after a refresh, so nothing in
//! here may hold a connection, a lock, or any other live resource.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Codec, JsonCodec, ProtocolError};

// ---------------------------------------------------------------------------
// Method
// ---------------------------------------------------------------------------

/// HTTP method of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl Method {
    /// The upper-case wire name (`"GET"`, `"POST"`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Headers
// ---------------------------------------------------------------------------

/// A case-insensitive header map.
///
/// Names are normalised to lower case on the way in, so `Content-Type`
/// and `content-type` address the same entry. Inserting an existing name
/// replaces the previous value (last write wins).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Headers(BTreeMap<String, String>);

impl Headers {
    /// Creates an empty header map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a header, replacing any value stored under the same name.
    pub fn insert(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.0.insert(name.as_ref().to_ascii_lowercase(), value.into());
    }

    /// Looks up a header by name, ignoring case.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Removes a header, returning its value if it was present.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.0.remove(&name.to_ascii_lowercase())
    }

    /// Returns `true` if a header with this name is present.
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(&name.to_ascii_lowercase())
    }

    /// Iterates over `(lower-case name, value)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of distinct headers.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if no headers are set.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Self::new();
        for (name, value) in iter {
            headers.insert(name, value);
        }
        headers
    }
}

// ---------------------------------------------------------------------------
// Body
// ---------------------------------------------------------------------------

/// The payload of a request.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Body {
    /// No body at all (the refresh and logout calls use this).
    #[default]
    Empty,
    /// Opaque bytes, sent as-is.
    Bytes(Vec<u8>),
    /// A structured payload, encoded with [`JsonCodec`] at send time.
    Json(serde_json::Value),
}

impl Body {
    /// Returns `true` for [`Body::Empty`].
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Encodes the body to the bytes that go on the wire.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Encode`] if a JSON payload can't be
    /// serialized.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        match self {
            Self::Empty => Ok(Vec::new()),
            Self::Bytes(bytes) => Ok(bytes.clone()),
            Self::Json(value) => JsonCodec.encode(value),
        }
    }
}

// ---------------------------------------------------------------------------
// RequestDescriptor
// ---------------------------------------------------------------------------

/// A fully formed request, ready to hand to a transport.
///
/// The two flags only matter to the authenticated pipeline:
///
/// - `skip_auth`: bypass 401 interception entirely. The refresh and
///   logout calls set this so they can never recurse into the pipeline.
/// - `retry_on_unauthorized`: when `false`, a 401 is returned to the
///   caller as-is without attempting a refresh. Defaults to `true`.
///
/// ```rust
/// use sessionguard_protocol::{Method, RequestDescriptor};
///
/// let req = RequestDescriptor::post("https://api.example.com/documents")
///     .header("X-Trace", "abc")
///     .json(serde_json::json!({ "title": "notes" }));
///
/// assert_eq!(req.method, Method::Post);
/// assert_eq!(req.headers.get("content-type"), Some("application/json"));
/// assert!(req.retry_on_unauthorized);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    pub method: Method,
    pub url: String,
    pub headers: Headers,
    pub body: Body,
    pub skip_auth: bool,
    pub retry_on_unauthorized: bool,
}

impl RequestDescriptor {
    /// Creates a request with no headers, no body, and default flags.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Headers::new(),
            body: Body::Empty,
            skip_auth: false,
            retry_on_unauthorized: true,
        }
    }

    /// Shorthand for `RequestDescriptor::new(Method::Get, url)`.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    /// Shorthand for `RequestDescriptor::new(Method::Post, url)`.
    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::Post, url)
    }

    /// Sets a header (case-insensitive, last write wins).
    pub fn header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets an opaque byte body.
    pub fn body(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.body = Body::Bytes(bytes.into());
        self
    }

    /// Sets a JSON body. Adds `content-type: application/json` unless the
    /// caller already chose a content type.
    pub fn json(mut self, value: serde_json::Value) -> Self {
        if !self.headers.contains("content-type") {
            self.headers.insert("content-type", JsonCodec.content_type());
        }
        self.body = Body::Json(value);
        self
    }

    /// Marks the request as bypassing 401 interception.
    pub fn skip_auth(mut self, skip: bool) -> Self {
        self.skip_auth = skip;
        self
    }

    /// Controls whether a 401 triggers refresh-and-retry.
    pub fn retry_on_unauthorized(mut self, retry: bool) -> Self {
        self.retry_on_unauthorized = retry;
        self
    }
}

impl fmt::Display for RequestDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}
