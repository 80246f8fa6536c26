//! # Sessionguard
//!
//! Keeps a client authenticated against a backend that issues short-lived
//! access tokens and a refresh endpoint, while many request callers run
//! concurrently.
//!
//! Application code wraps its [`RequestExecutor`] in an
//! [`AuthenticatedPipeline`] and the pipeline handles the rest:
//!
//! - N concurrent 401s cause exactly one refresh call
//! - a rate-limited refresh (429) never signs the user out
//! - a hard refresh failure logs out once and surfaces
//!   [`PipelineError::SessionExpired`]
//! - a background timer renews the session before the token expires
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sessionguard::prelude::*;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! sessionguard::init_tracing();
//!
//! let pipeline = AuthenticatedPipeline::builder()
//!     .config(SessionConfig::with_base_url("https://api.example.com"))
//!     .build(HttpExecutor::new(HttpExecutorConfig::default())?);
//!
//! let _sub = pipeline.events().subscribe(|event| match event {
//!     SessionEvent::Renewed(identity) => println!("signed in as {identity}"),
//!     SessionEvent::LoggedOut => println!("signed out"),
//! });
//!
//! pipeline.resume().await?;
//! let resp = pipeline
//!     .execute(RequestDescriptor::get("https://api.example.com/api/documents"))
//!     .await?;
//! println!("{}", resp.status());
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod pipeline;

pub use config::SessionConfig;
pub use error::PipelineError;
pub use pipeline::{AuthenticatedPipeline, PipelineBuilder};

pub use sessionguard_protocol as protocol;
pub use sessionguard_renewal as renewal;
pub use sessionguard_session as session;
pub use sessionguard_transport as transport;

/// Installs a `tracing` subscriber that honours `RUST_LOG`, defaulting to
/// `info`. Meant for binaries; calling it twice is harmless.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();
}

/// Everything an application needs in one import.
pub mod prelude {
    pub use crate::{AuthenticatedPipeline, PipelineBuilder, PipelineError, SessionConfig};
    pub use sessionguard_protocol::{
        Body, Headers, Identity, Method, RefreshOutcome, RequestDescriptor, ResponseDescriptor,
    };
    pub use sessionguard_renewal::{ProactiveScheduler, RenewalConfig};
    pub use sessionguard_session::{
        RefreshCoordinator, RefreshStats, SessionError, SessionEvent, SessionEventBus,
        Subscription,
    };
    #[cfg(feature = "http")]
    pub use sessionguard_transport::{HttpExecutor, HttpExecutorConfig};
    pub use sessionguard_transport::{RequestExecutor, TransportError};
}
