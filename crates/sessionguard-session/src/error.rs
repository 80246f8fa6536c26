//! Error types for the session layer.

/// Unexpected conditions surfaced by [`RefreshCoordinator::refresh_once`].
///
/// Classification never goes through this type: a 429, a 401, or a
/// network error during refresh is a [`RefreshOutcome`] value. Only things
/// that shouldn't happen end up here.
///
/// `Clone` because one error may be handed to every caller that was
/// waiting on the same refresh attempt.
///
/// [`RefreshCoordinator::refresh_once`]: crate::RefreshCoordinator::refresh_once
/// [`RefreshOutcome`]: sessionguard_protocol::RefreshOutcome
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The refresh endpoint answered 2xx, but the body isn't an identity.
    #[error("refresh succeeded but the identity payload is malformed: {0}")]
    MalformedIdentity(String),

    /// The task running the refresh attempt died before producing an
    /// outcome (it panicked, or the runtime is shutting down).
    #[error("refresh attempt aborted: {0}")]
    RefreshAborted(String),
}
