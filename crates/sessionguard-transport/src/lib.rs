//! Transport abstraction layer for Sessionguard.
//!
//! Provides the [`RequestExecutor`] trait: one method that performs a
//! single network call for a fully formed [`RequestDescriptor`] and
//! returns a [`ResponseDescriptor`]. Executors have no retry logic and no
//! knowledge of sessions. Credentials travel with the transport itself
//! (for example a cookie jar), so nothing above this layer ever sees a
//! token value.
//!
//! # Feature Flags
//!
//! - `http` (default): [`HttpExecutor`], backed by `reqwest` with a
//!   cookie store
//! - `mock`: [`MockExecutor`], a scripted in-memory executor for tests

mod error;
#[cfg(feature = "http")]
mod http;
#[cfg(any(test, feature = "mock"))]
mod mock;

pub use error::TransportError;
#[cfg(feature = "http")]
pub use http::{HttpExecutor, HttpExecutorConfig};
#[cfg(any(test, feature = "mock"))]
pub use mock::{MockExecutor, MockReply};

use std::future::Future;
use std::sync::Arc;

use sessionguard_protocol::{RequestDescriptor, ResponseDescriptor};

/// Performs a single network call.
///
/// # Trait bounds
///
/// - `Send + Sync + 'static` → one executor is shared (behind an `Arc`) by
///   the pipeline, the refresh task, and the logout call.
/// - The returned future is `Send` because refresh attempts run on their
///   own spawned task.
pub trait RequestExecutor: Send + Sync + 'static {
    /// Sends the request and waits for the complete response.
    ///
    /// Any HTTP status, including 4xx and 5xx, is a successful return.
    /// `Err` means no response was received at all.
    fn send(
        &self,
        request: &RequestDescriptor,
    ) -> impl Future<Output = Result<ResponseDescriptor, TransportError>> + Send;
}

impl<E: RequestExecutor> RequestExecutor for Arc<E> {
    fn send(
        &self,
        request: &RequestDescriptor,
    ) -> impl Future<Output = Result<ResponseDescriptor, TransportError>> + Send {
        (**self).send(request)
    }
}
