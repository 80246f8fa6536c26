//! Data model for Sessionguard.
//!
//! This crate defines the values that flow between the session core and
//! the transport underneath it:
//!
//! - **Requests** ([`RequestDescriptor`], [`Method`], [`Headers`], [`Body`]):
//!   everything needed to issue one network call, plus the two flags the
//!   pipeline reads (`skip_auth`, `retry_on_unauthorized`).
//! - **Responses** ([`ResponseDescriptor`]): status, headers, and body.
//!   Immutable once produced.
//! - **Identity** ([`Identity`]): the opaque user/session payload the
//!   refresh endpoint returns.
//! - **Outcomes** ([`RefreshOutcome`]): the three-way classification of a
//!   refresh attempt.
//! - **Codec** ([`Codec`], [`JsonCodec`]): how JSON bodies become bytes
//!   and back.
//!
//! # Architecture
//!
//! The protocol layer is the leaf of the workspace. It knows nothing about
//! networking, locking, or timers:
//!
//! ```text
//! Transport (sends descriptors) → Session (classifies outcomes) → Pipeline
//!              ↑                              ↑
//!              └──────── Protocol (this crate) ┘
//! ```

// ---------------------------------------------------------------------------
// Module declarations
// ---------------------------------------------------------------------------

mod codec;
mod error;
mod identity;
mod request;
mod response;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use identity::{Identity, OutcomeTag, RefreshOutcome};
pub use request::{Body, Headers, Method, RequestDescriptor};
pub use response::ResponseDescriptor;
