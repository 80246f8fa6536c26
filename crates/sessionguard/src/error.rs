//! Unified error type for the Sessionguard pipeline.

use sessionguard_session::SessionError;
use sessionguard_transport::TransportError;

/// Top-level error returned by [`AuthenticatedPipeline`](crate::AuthenticatedPipeline).
///
/// The `#[from]` attribute on each wrapping variant auto-generates `From`
/// impls, so the `?` operator converts sub-crate errors automatically.
///
/// A rate-limited refresh is deliberately absent: the pipeline hands the
/// original 401 back as an `Ok` response instead.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// No response was received (timeout, DNS, connection refused).
    /// Retrying is the caller's decision.
    #[error(transparent)]
    Network(#[from] TransportError),

    /// The refresh engine hit something unexpected, such as a malformed
    /// identity in a 2xx refresh response.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The session could not be renewed and has been logged out.
    #[error("session expired, sign in again")]
    SessionExpired,
}

impl PipelineError {
    /// Whether the user has been signed out and must authenticate again.
    pub fn is_session_expired(&self) -> bool {
        matches!(self, Self::SessionExpired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err: PipelineError = TransportError::Connect("refused".into()).into();
        assert!(matches!(err, PipelineError::Network(_)));
        assert!(err.to_string().contains("refused"));
        assert!(!err.is_session_expired());
    }

    #[test]
    fn test_from_session_error() {
        let err: PipelineError = SessionError::MalformedIdentity("not an object".into()).into();
        assert!(matches!(err, PipelineError::Session(_)));
        assert!(err.to_string().contains("not an object"));
    }

    #[test]
    fn test_session_expired_message() {
        let err = PipelineError::SessionExpired;
        assert!(err.is_session_expired());
        assert_eq!(err.to_string(), "session expired, sign in again");
    }
}
