//! Response descriptors.

use serde::de::DeserializeOwned;

use crate::{Codec, Headers, JsonCodec, ProtocolError};

/// The result of a single network call: status, headers, and body.
///
/// Fields are private and there are no setters, so a response can't be
/// changed after the transport produced it. The pipeline hands the very
/// same value back to callers when it decides not to retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseDescriptor {
    status: u16,
    headers: Headers,
    body: Vec<u8>,
}

impl ResponseDescriptor {
    /// Creates a response from its parts.
    pub fn new(status: u16, headers: Headers, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    /// A response with the given status and no headers or body.
    pub fn status_only(status: u16) -> Self {
        Self::new(status, Headers::new(), Vec::new())
    }

    /// A response carrying a JSON body and a matching content type.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Encode`] if `value` can't be serialized.
    pub fn with_json<T: serde::Serialize>(status: u16, value: &T) -> Result<Self, ProtocolError> {
        let body = JsonCodec.encode(value)?;
        let mut headers = Headers::new();
        headers.insert("content-type", JsonCodec.content_type());
        Ok(Self::new(status, headers, body))
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Looks up a response header, ignoring case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// `true` for any 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// `true` for 401 Unauthorized.
    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }

    /// `true` for 429 Too Many Requests.
    pub fn is_rate_limited(&self) -> bool {
        self.status == 429
    }

    /// The `Retry-After` header as whole seconds.
    ///
    /// Only the delta-seconds form is understood. A missing header, an
    /// HTTP-date, or any other non-numeric value yields `None`.
    pub fn retry_after_secs(&self) -> Option<u64> {
        self.header("retry-after")?.trim().parse().ok()
    }

    /// The body decoded as UTF-8, with invalid sequences replaced.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Decodes the body as JSON.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Decode`] if the body isn't valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        JsonCodec.decode(&self.body)
    }
}
