//! `AuthenticatedPipeline` builder and request path.
//!
//! This is the entry point application code uses for authenticated calls.
//! It ties the layers together: transport → session (refresh engine) →
//! renewal (proactive timer).
//!
//! # Request flow
//!
//! ```text
//! execute(req) ──→ send ──→ not 401 / skip_auth / no retry ──→ response
//!                    │
//!                    └─ 401 ──→ refresh_once()
//!                                 ├─ Success      → send(req) once more → response
//!                                 ├─ RateLimited  → original 401
//!                                 └─ Failure      → logout() → SessionExpired
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use sessionguard_protocol::{Identity, RefreshOutcome, RequestDescriptor, ResponseDescriptor};
use sessionguard_renewal::ProactiveScheduler;
use sessionguard_session::{RefreshCoordinator, RefreshInvoker, SessionEvent, SessionEventBus};
use sessionguard_transport::RequestExecutor;
use tracing::{debug, info, warn};

use crate::{PipelineError, SessionConfig};

/// Builder for an [`AuthenticatedPipeline`].
///
/// The executor type is inferred from the final `build` call.
///
/// # Example
///
/// ```rust,ignore
/// use sessionguard::prelude::*;
///
/// let executor = HttpExecutor::new(HttpExecutorConfig::default())?;
/// let pipeline = AuthenticatedPipeline::builder()
///     .config(SessionConfig::with_base_url("https://api.example.com"))
///     .build(executor);
/// let resp = pipeline.execute(RequestDescriptor::get("https://api.example.com/me")).await?;
/// ```
pub struct PipelineBuilder<E: RequestExecutor> {
    config: SessionConfig,
    events: Option<SessionEventBus>,
    _executor: PhantomData<fn() -> E>,
}

impl<E: RequestExecutor> PipelineBuilder<E> {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: SessionConfig::default(),
            events: None,
            _executor: PhantomData,
        }
    }

    /// Sets the endpoints and timings.
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Uses an existing event bus instead of creating one, so subscribers
    /// registered before the pipeline existed receive its events.
    pub fn events(mut self, events: SessionEventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Builds the pipeline around `executor`.
    pub fn build(self, executor: E) -> AuthenticatedPipeline<E> {
        self.build_shared(Arc::new(executor))
    }

    /// Builds the pipeline around an executor the caller keeps a handle to.
    pub fn build_shared(self, executor: Arc<E>) -> AuthenticatedPipeline<E> {
        let config = self.config.validated();
        let events = self.events.unwrap_or_default();

        let invoker = RefreshInvoker::new(Arc::clone(&executor), config.refresh_url(), events.clone())
            .with_timeout(config.refresh_timeout());
        let coordinator = RefreshCoordinator::new(invoker);
        let scheduler = ProactiveScheduler::new(coordinator.clone(), config.renewal());
        let logout_request = RequestDescriptor::post(config.logout_url())
            .skip_auth(true)
            .retry_on_unauthorized(false);

        info!(
            refresh = %config.refresh_url(),
            logout = %config.logout_url(),
            "authenticated pipeline ready"
        );

        AuthenticatedPipeline {
            executor,
            coordinator,
            scheduler,
            events,
            config,
            logout_request,
            session: Mutex::new(SessionState::default()),
        }
    }
}

impl<E: RequestExecutor> Default for PipelineBuilder<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Which sign-in the pipeline is on, and whether it has been logged out.
///
/// `generation` moves on every `establish`, so a logout that started
/// before it can tell that its session is gone.
#[derive(Debug, Default)]
struct SessionState {
    generation: u64,
    logged_out: bool,
}

/// Wraps a [`RequestExecutor`] with 401 interception, single-flight
/// refresh, proactive renewal, and logout.
///
/// One instance per signed-in application. Share it by reference or
/// behind an `Arc`; every method takes `&self`.
pub struct AuthenticatedPipeline<E: RequestExecutor> {
    executor: Arc<E>,
    coordinator: RefreshCoordinator<E>,
    scheduler: ProactiveScheduler<E>,
    events: SessionEventBus,
    config: SessionConfig,
    logout_request: RequestDescriptor,
    session: Mutex<SessionState>,
}

impl<E: RequestExecutor> AuthenticatedPipeline<E> {
    /// Creates a new builder.
    pub fn builder() -> PipelineBuilder<E> {
        PipelineBuilder::new()
    }

    /// Sends `request`, recovering from an expired access token.
    ///
    /// A 401 triggers one coordinated refresh. On success the original
    /// request is re-issued exactly once and that second response is
    /// returned whatever its status. A rate-limited refresh hands back the
    /// original 401: try again later, the session is still alive.
    ///
    /// Requests with `skip_auth` or without `retry_on_unauthorized` are
    /// passed straight through.
    ///
    /// # Errors
    /// - [`PipelineError::Network`] if either send got no response
    /// - [`PipelineError::SessionExpired`] if the refresh failed; the
    ///   session has been logged out
    /// - [`PipelineError::Session`] for an unexpected refresh error
    pub async fn execute(
        &self,
        request: RequestDescriptor,
    ) -> Result<ResponseDescriptor, PipelineError> {
        let response = self.executor.send(&request).await?;
        if !response.is_unauthorized() || request.skip_auth || !request.retry_on_unauthorized {
            return Ok(response);
        }

        debug!(%request, "unauthorized, refreshing session");
        match self.coordinator.refresh_once().await? {
            RefreshOutcome::Success(_) => {
                self.scheduler.reset();
                let retried = self.executor.send(&request).await?;
                if retried.is_unauthorized() {
                    warn!(%request, "still unauthorized after a successful refresh");
                }
                Ok(retried)
            }
            RefreshOutcome::RateLimited { retry_after_secs } => {
                warn!(%request, ?retry_after_secs, "refresh rate limited, returning original response");
                Ok(response)
            }
            RefreshOutcome::Failure => {
                self.logout().await;
                Err(PipelineError::SessionExpired)
            }
        }
    }

    /// Marks the session as authenticated (after sign-in) and arms the
    /// proactive timer for `identity`.
    pub fn establish(&self, identity: &Identity) {
        {
            let mut session = self.session();
            session.generation += 1;
            session.logged_out = false;
        }
        info!(%identity, "session established");
        self.scheduler.arm_for(identity);
    }

    /// Checks for an existing session at start-up with one coordinated
    /// refresh, and establishes it on success.
    ///
    /// A `Failure` here just means nobody is signed in; it does not log
    /// out or publish anything.
    ///
    /// # Errors
    /// [`PipelineError::Session`] for an unexpected refresh error.
    pub async fn resume(&self) -> Result<RefreshOutcome, PipelineError> {
        let outcome = self.coordinator.refresh_once().await?;
        match outcome.identity() {
            Some(identity) => self.establish(identity),
            None => debug!(outcome = %outcome.tag(), "no session to resume"),
        }
        Ok(outcome)
    }

    /// Ends the session: disarms the proactive timer, tells the server
    /// (best effort), and publishes [`SessionEvent::LoggedOut`].
    ///
    /// Idempotent until the next [`establish`](Self::establish): any number
    /// of concurrent hard failures produce exactly one `LoggedOut`. If a
    /// new session is established while the server call is in flight, the
    /// event is not published.
    pub async fn logout(&self) {
        let generation = {
            let mut session = self.session();
            if session.logged_out {
                debug!("already logged out");
                return;
            }
            session.logged_out = true;
            session.generation
        };
        self.scheduler.disarm();

        match self.executor.send(&self.logout_request).await {
            Ok(resp) if resp.is_success() => debug!("server session closed"),
            Ok(resp) => warn!(status = resp.status(), "logout endpoint refused, ignoring"),
            Err(e) => warn!(error = %e, "logout request failed, ignoring"),
        }

        if self.session().generation != generation {
            debug!("session re-established during logout, not publishing");
            return;
        }
        info!("session logged out");
        self.events.publish(SessionEvent::LoggedOut);
    }

    /// Tears the pipeline down without publishing anything.
    pub fn shutdown(&self) {
        if self.scheduler.disarm() {
            debug!("pipeline shut down, proactive renewal cancelled");
        }
    }

    pub fn is_logged_out(&self) -> bool {
        self.session().logged_out
    }

    pub fn events(&self) -> &SessionEventBus {
        &self.events
    }

    pub fn coordinator(&self) -> &RefreshCoordinator<E> {
        &self.coordinator
    }

    pub fn scheduler(&self) -> &ProactiveScheduler<E> {
        &self.scheduler
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn executor(&self) -> &Arc<E> {
        &self.executor
    }

    fn session(&self) -> MutexGuard<'_, SessionState> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<E: RequestExecutor> fmt::Debug for AuthenticatedPipeline<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticatedPipeline")
            .field("config", &self.config)
            .field("armed", &self.scheduler.is_armed())
            .field("logged_out", &self.is_logged_out())
            .finish_non_exhaustive()
    }
}
