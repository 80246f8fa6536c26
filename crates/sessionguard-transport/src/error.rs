/// Transport-level failures: the request never produced a response.
///
/// These are always retryable by the caller's own policy. The session core
/// never retries them itself; a network error during a refresh attempt is
/// classified as a refresh failure.
///
/// `Clone` because scripted executors replay the same error many times and
/// because errors are occasionally shared between waiters.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The request did not complete within its deadline.
    #[error("request timed out")]
    Timeout,

    /// No connection could be established (DNS, refused, TLS).
    #[error("connect failed: {0}")]
    Connect(String),

    /// The request failed after the connection was made.
    #[error("request failed: {0}")]
    Request(String),

    /// Reading the response body failed.
    #[error("reading body failed: {0}")]
    Body(String),

    /// The descriptor can't be turned into a request (bad URL, bad header,
    /// unencodable body).
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl TransportError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}
