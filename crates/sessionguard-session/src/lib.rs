//! Refresh engine for Sessionguard.
//!
//! This crate owns the part of the session lifecycle that has to be
//! correct under concurrency:
//!
//! 1. **Invocation**: calling the refresh endpoint and classifying the
//!    answer ([`RefreshInvoker`], [`classify`])
//! 2. **Coordination**: making sure N concurrent callers cause exactly one
//!    refresh call ([`RefreshCoordinator`])
//! 3. **Notification**: telling the application about renewals and
//!    logouts ([`SessionEventBus`])
//!
//! # How it fits in the stack
//!
//! ```text
//! Pipeline / Scheduler (above)  ← call refresh_once() on 401 or on a timer
//!     ↕
//! Session Layer (this crate)    ← single-flight refresh + events
//!     ↕
//! Transport Layer (below)       ← performs the refresh request
//! ```

mod coordinator;
mod error;
mod events;
mod invoker;

pub use coordinator::{RefreshCoordinator, RefreshStats};
pub use error::SessionError;
pub use events::{SessionEvent, SessionEventBus, Subscription};
pub use invoker::{DEFAULT_REFRESH_TIMEOUT, RefreshInvoker, classify};
