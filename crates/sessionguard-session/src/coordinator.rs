//! Single-flight refresh coordination.
//!
//! # State machine
//!
//! ```text
//!          refresh_once (first caller)
//!   Idle ──────────────────────────────→ Refreshing(shared attempt)
//!    ↑                                        │   ↑
//!    │         attempt resolves               │   │ refresh_once (later callers)
//!    └────────────────────────────────────────┘   │ attach to the same attempt
//!                                                 └──
//! ```
//!
//! The `Idle → Refreshing` check-and-claim happens under one lock with no
//! `.await` in between, so two callers can never both see `Idle`.
//!
//! The attempt itself runs on a spawned task. Waiters only hold a clone of
//! a [`Shared`] handle to it, so a waiter that is cancelled (dropped, timed
//! out) never cancels the network call the others are waiting for.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::future::{BoxFuture, FutureExt, Shared};
use sessionguard_protocol::RefreshOutcome;
use sessionguard_transport::RequestExecutor;

use crate::{RefreshInvoker, SessionError};

type AttemptResult = Result<RefreshOutcome, SessionError>;
type SharedAttempt = Shared<BoxFuture<'static, AttemptResult>>;

enum CoordinatorState {
    Idle,
    Refreshing {
        generation: u64,
        attempt: SharedAttempt,
    },
}

/// Counters describing what the coordinator has done so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshStats {
    /// Network refresh attempts started.
    pub attempts: u64,
    /// Callers that attached to an attempt someone else started.
    pub coalesced: u64,
    pub successes: u64,
    pub rate_limited: u64,
    /// `Failure` outcomes plus unexpected errors.
    pub failures: u64,
}

#[derive(Default)]
struct Counters {
    attempts: AtomicU64,
    coalesced: AtomicU64,
    successes: AtomicU64,
    rate_limited: AtomicU64,
    failures: AtomicU64,
}

impl Counters {
    fn record(&self, result: &AttemptResult) {
        let counter = match result {
            Ok(RefreshOutcome::Success(_)) => &self.successes,
            Ok(RefreshOutcome::RateLimited { .. }) => &self.rate_limited,
            Ok(RefreshOutcome::Failure) | Err(_) => &self.failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> RefreshStats {
        RefreshStats {
            attempts: self.attempts.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

struct Inner<E: RequestExecutor> {
    invoker: RefreshInvoker<E>,
    state: Mutex<CoordinatorState>,
    next_generation: AtomicU64,
    counters: Counters,
}

impl<E: RequestExecutor> Inner<E> {
    fn lock_state(&self) -> MutexGuard<'_, CoordinatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Returns the coordinator to `Idle` when the attempt task ends, whether
/// it finished normally or panicked.
///
/// The generation check keeps a late guard from clearing a newer attempt.
struct IdleGuard<E: RequestExecutor> {
    inner: Arc<Inner<E>>,
    generation: u64,
}

impl<E: RequestExecutor> Drop for IdleGuard<E> {
    fn drop(&mut self) {
        let mut state = self.inner.lock_state();
        if matches!(
            &*state,
            CoordinatorState::Refreshing { generation, .. } if *generation == self.generation
        ) {
            *state = CoordinatorState::Idle;
            tracing::trace!(generation = self.generation, "refresh coordinator idle");
        }
    }
}

/// Ensures at most one refresh call is in flight; every concurrent caller
/// gets the outcome of that one call.
///
/// Cloning is cheap and clones share the same state. The reactive path
/// (the pipeline's 401 handling) and the proactive scheduler must use
/// clones of one coordinator, never two separate ones.
pub struct RefreshCoordinator<E: RequestExecutor> {
    inner: Arc<Inner<E>>,
}

impl<E: RequestExecutor> Clone for RefreshCoordinator<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: RequestExecutor> RefreshCoordinator<E> {
    pub fn new(invoker: RefreshInvoker<E>) -> Self {
        Self {
            inner: Arc::new(Inner {
                invoker,
                state: Mutex::new(CoordinatorState::Idle),
                next_generation: AtomicU64::new(1),
                counters: Counters::default(),
            }),
        }
    }

    /// Runs a refresh, or joins the one already running.
    ///
    /// Once the attempt resolves the coordinator goes back to `Idle`; the
    /// next call starts a fresh attempt instead of reusing this result.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// - [`SessionError::MalformedIdentity`] from the shared attempt
    /// - [`SessionError::RefreshAborted`] if the attempt task panicked or
    ///   was cancelled by runtime shutdown
    pub async fn refresh_once(&self) -> Result<RefreshOutcome, SessionError> {
        let attempt = {
            let mut state = self.inner.lock_state();
            match &*state {
                CoordinatorState::Refreshing { generation, attempt } => {
                    self.inner.counters.coalesced.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(generation, "joining in-flight refresh");
                    attempt.clone()
                }
                CoordinatorState::Idle => {
                    let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
                    // Spawned while the lock is held, so the task's guard
                    // can't observe the state before it says Refreshing.
                    let attempt = self.spawn_attempt(generation);
                    *state = CoordinatorState::Refreshing {
                        generation,
                        attempt: attempt.clone(),
                    };
                    attempt
                }
            }
        };
        attempt.await
    }

    /// Whether an attempt is in flight right now.
    pub fn is_refreshing(&self) -> bool {
        matches!(&*self.inner.lock_state(), CoordinatorState::Refreshing { .. })
    }

    pub fn stats(&self) -> RefreshStats {
        self.inner.counters.snapshot()
    }

    pub fn invoker(&self) -> &RefreshInvoker<E> {
        &self.inner.invoker
    }

    fn spawn_attempt(&self, generation: u64) -> SharedAttempt {
        self.inner.counters.attempts.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(generation, "starting refresh attempt");

        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            let guard = IdleGuard {
                inner: Arc::clone(&inner),
                generation,
            };
            let result = inner.invoker.attempt().await;
            inner.counters.record(&result);
            tracing::debug!(
                generation,
                outcome = ?result.as_ref().map(RefreshOutcome::tag),
                "refresh attempt resolved"
            );
            drop(guard);
            result
        });

        async move {
            match task.await {
                Ok(result) => result,
                Err(join_err) => {
                    tracing::error!(generation, error = %join_err, "refresh task died");
                    Err(SessionError::RefreshAborted(join_err.to_string()))
                }
            }
        }
        .boxed()
        .shared()
    }
}

impl<E: RequestExecutor> fmt::Debug for RefreshCoordinator<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("refreshing", &self.is_refreshing())
            .field("stats", &self.stats())
            .finish()
    }
}
