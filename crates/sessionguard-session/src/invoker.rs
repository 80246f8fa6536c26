//! Refresh invoker: one call to the refresh endpoint, classified.
//!
//! Classification rules, in priority order:
//!
//! | Response                         | Outcome                 |
//! |----------------------------------|-------------------------|
//! | 2xx                              | `Success(identity)`     |
//! | 429                              | `RateLimited { hint }`  |
//! | any other status                 | `Failure`               |
//! | network error or timeout         | `Failure`               |
//!
//! Rate limiting gets its own outcome because auth providers throttle
//! bursts of refreshes. Treating that as a rejection would sign users out
//! during ordinary backpressure.

use std::sync::Arc;
use std::time::Duration;

use sessionguard_protocol::{
    Identity, ProtocolError, RefreshOutcome, RequestDescriptor, ResponseDescriptor,
};
use sessionguard_transport::RequestExecutor;

use crate::{SessionError, SessionEvent, SessionEventBus};

/// Default deadline for one refresh attempt.
pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(30);

/// Classifies a refresh response.
///
/// Pure function: no I/O, no events. A 2xx whose body isn't an identity
/// object is the only error.
///
/// # Errors
/// Returns the [`ProtocolError`] from identity parsing for a malformed
/// success payload.
pub fn classify(response: &ResponseDescriptor) -> Result<RefreshOutcome, ProtocolError> {
    if response.is_success() {
        return Identity::from_bytes(response.body()).map(RefreshOutcome::Success);
    }
    if response.is_rate_limited() {
        return Ok(RefreshOutcome::RateLimited {
            retry_after_secs: response.retry_after_secs(),
        });
    }
    Ok(RefreshOutcome::Failure)
}

/// Calls the refresh endpoint and turns the answer into a [`RefreshOutcome`].
///
/// The invoker has no memory: every [`attempt`](Self::attempt) is a fresh
/// network call. Deduplication is the coordinator's job.
pub struct RefreshInvoker<E: RequestExecutor> {
    executor: Arc<E>,
    request: RequestDescriptor,
    timeout: Duration,
    events: SessionEventBus,
}

impl<E: RequestExecutor> RefreshInvoker<E> {
    /// Creates an invoker for the refresh endpoint at `refresh_url`.
    ///
    /// The request is a bodiless POST with `skip_auth` set, so it can
    /// never be intercepted by the authenticated pipeline.
    pub fn new(executor: Arc<E>, refresh_url: impl Into<String>, events: SessionEventBus) -> Self {
        Self {
            executor,
            request: RequestDescriptor::post(refresh_url)
                .skip_auth(true)
                .retry_on_unauthorized(false),
            timeout: DEFAULT_REFRESH_TIMEOUT,
            events,
        }
    }

    /// Overrides the per-attempt deadline. An attempt that runs past it is
    /// classified as `Failure`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The request sent on every attempt.
    pub fn request(&self) -> &RequestDescriptor {
        &self.request
    }

    /// Performs one refresh call.
    ///
    /// On `Success` the new identity is published as
    /// [`SessionEvent::Renewed`] before this returns.
    ///
    /// # Errors
    /// [`SessionError::MalformedIdentity`] if the endpoint answered 2xx with
    /// a body that isn't an identity object. Every other condition,
    /// including network failures, is an `Ok` outcome.
    pub async fn attempt(&self) -> Result<RefreshOutcome, SessionError> {
        let sent = tokio::time::timeout(self.timeout, self.executor.send(&self.request)).await;

        let response = match sent {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "refresh request failed at the transport level");
                return Ok(RefreshOutcome::Failure);
            }
            Err(_) => {
                tracing::warn!(timeout = ?self.timeout, "refresh request timed out");
                return Ok(RefreshOutcome::Failure);
            }
        };

        let outcome = classify(&response).map_err(|e| {
            tracing::error!(status = response.status(), error = %e, "malformed refresh payload");
            SessionError::MalformedIdentity(e.to_string())
        })?;

        match &outcome {
            RefreshOutcome::Success(identity) => {
                tracing::info!(%identity, "session renewed");
                self.events.publish(SessionEvent::Renewed(identity.clone()));
            }
            RefreshOutcome::RateLimited { retry_after_secs } => {
                tracing::warn!(?retry_after_secs, "refresh rate limited by provider");
            }
            RefreshOutcome::Failure => {
                tracing::warn!(status = response.status(), "refresh rejected");
            }
        }
        Ok(outcome)
    }
}
