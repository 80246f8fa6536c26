//! Proactive session renewal for Sessionguard.
//!
//! Refreshes the session shortly before the access token expires, so the
//! reactive 401 path rarely has to. The scheduler never owns a refresh of
//! its own: every firing goes through the same [`RefreshCoordinator`] the
//! pipeline uses, so a timer that fires during a reactive refresh simply
//! joins it.
//!
//! # State machine
//!
//! ```text
//!            arm_for / reset
//!  Unarmed ──────────────────→ Armed(handle)
//!     ↑                          │  fire → refresh_once()
//!     │        disarm            │    Success        → full interval
//!     └──────────────────────────┤    RateLimited    → retry backoff
//!                                │    Failure / Err  → retry backoff
//!                                └──→ Armed(same handle, next deadline)
//! ```
//!
//! The scheduler never declares a session dead. Only an explicit logout
//! (or the pipeline's reactive path) disarms it.
//!
//! # Timing
//!
//! With the defaults (15 min token, 5 min margin, 2 min backoff) the first
//! renewal fires at +10 min. If the identity returned by the refresh
//! endpoint carries `expires_in`, that lifetime is used instead of the
//! configured one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rand::Rng;
use sessionguard_protocol::{Identity, RefreshOutcome};
use sessionguard_session::RefreshCoordinator;
use sessionguard_transport::RequestExecutor;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, info, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Longest token lifetime or retry backoff the scheduler plans for. Larger
/// values, whether configured or returned by the server, are cut to this.
pub const MAX_TOKEN_LIFETIME: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Largest random delay added to a renewal interval.
pub const MAX_JITTER: Duration = Duration::from_secs(60 * 60);

/// Timing knobs for proactive renewal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenewalConfig {
    /// Access-token lifetime assumed when the identity doesn't say.
    pub access_token_lifetime: Duration,
    /// How long before expiry to renew.
    pub safety_margin: Duration,
    /// Delay before retrying after a rate-limited or failed renewal.
    /// Fixed: repeated failures don't grow it.
    pub retry_backoff: Duration,
    /// Upper bound of a random delay added to each full interval, to keep
    /// many clients started together from renewing in lockstep. Zero
    /// disables it.
    pub jitter: Duration,
}

impl Default for RenewalConfig {
    fn default() -> Self {
        Self {
            access_token_lifetime: Duration::from_secs(15 * 60),
            safety_margin: Duration::from_secs(5 * 60),
            retry_backoff: Duration::from_secs(2 * 60),
            jitter: Duration::ZERO,
        }
    }
}

impl RenewalConfig {
    /// Clamp and fix any out-of-range values so the config is safe to use.
    ///
    /// Called automatically by [`ProactiveScheduler::new`]. Rules:
    /// - a zero `access_token_lifetime` falls back to the default, one
    ///   above [`MAX_TOKEN_LIFETIME`] is cut to it.
    /// - `safety_margin` is forced below `access_token_lifetime` (half the
    ///   lifetime if it was not).
    /// - a zero `retry_backoff` falls back to the default, otherwise a
    ///   failing endpoint would be hammered in a tight loop. It is capped
    ///   at [`MAX_TOKEN_LIFETIME`] as well.
    /// - `jitter` is capped at [`MAX_JITTER`].
    pub fn validated(mut self) -> Self {
        let defaults = Self::default();
        if self.access_token_lifetime.is_zero() {
            warn!("access_token_lifetime is zero, using default");
            self.access_token_lifetime = defaults.access_token_lifetime;
        }
        if self.access_token_lifetime > MAX_TOKEN_LIFETIME {
            warn!(lifetime = ?self.access_token_lifetime, "access_token_lifetime too large, capping");
            self.access_token_lifetime = MAX_TOKEN_LIFETIME;
        }
        if self.safety_margin >= self.access_token_lifetime {
            warn!(
                margin = ?self.safety_margin,
                lifetime = ?self.access_token_lifetime,
                "safety_margin swallows the whole token lifetime, halving"
            );
            self.safety_margin = self.access_token_lifetime / 2;
        }
        if self.retry_backoff.is_zero() {
            warn!("retry_backoff is zero, using default");
            self.retry_backoff = defaults.retry_backoff;
        }
        if self.retry_backoff > MAX_TOKEN_LIFETIME {
            warn!(backoff = ?self.retry_backoff, "retry_backoff too large, capping");
            self.retry_backoff = MAX_TOKEN_LIFETIME;
        }
        if self.jitter > MAX_JITTER {
            warn!(jitter = ?self.jitter, "jitter too large, capping");
            self.jitter = MAX_JITTER;
        }
        self
    }

    /// Delay from "token issued" to "renew it" for a token of `lifetime`.
    ///
    /// `lifetime − safety_margin`, or half the lifetime when the margin is
    /// as long as the token itself.
    pub fn renewal_delay(&self, lifetime: Duration) -> Duration {
        match lifetime.checked_sub(self.safety_margin) {
            Some(delay) if !delay.is_zero() => delay,
            _ => lifetime / 2,
        }
    }

    /// Token lifetime to plan for after `identity` was issued, never more
    /// than [`MAX_TOKEN_LIFETIME`].
    pub fn lifetime_for(&self, identity: &Identity) -> Duration {
        identity
            .expires_in()
            .filter(|secs| *secs > 0)
            .map_or(self.access_token_lifetime, |secs| {
                Duration::from_secs(secs).min(MAX_TOKEN_LIFETIME)
            })
    }

    /// Full renewal interval for `lifetime`, jitter included.
    fn full_interval(&self, lifetime: Duration) -> Duration {
        let delay = self.renewal_delay(lifetime);
        if self.jitter.is_zero() {
            return delay;
        }
        let max_ms = u64::try_from(self.jitter.as_millis()).unwrap_or(u64::MAX);
        delay.saturating_add(Duration::from_millis(rand::rng().random_range(0..=max_ms)))
    }
}

/// `now + delay`, falling back to `now + MAX_TOKEN_LIFETIME` if the sum
/// does not fit in an `Instant`.
fn deadline_after(delay: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(delay)
        .or_else(|| now.checked_add(MAX_TOKEN_LIFETIME))
        .unwrap_or(now)
}

// ---------------------------------------------------------------------------
// Schedule handle
// ---------------------------------------------------------------------------

/// Owns the one pending renewal timer.
///
/// Dropping the handle cancels the timer, so replacing it is enough to
/// guarantee no stale timer survives a re-arm.
#[derive(Debug)]
pub struct ScheduleHandle {
    task: JoinHandle<()>,
    generation: u64,
}

impl ScheduleHandle {
    /// Which arming this handle belongs to. Increases by one per arm.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether the timer task has stopped.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for ScheduleHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

#[derive(Default)]
struct TimerSlot {
    handle: Option<ScheduleHandle>,
    generation: u64,
    next_fire_at: Option<Instant>,
    lifetime: Option<Duration>,
}

struct TimerShared {
    slot: Mutex<TimerSlot>,
    fired: AtomicU64,
}

impl TimerShared {
    fn lock(&self) -> MutexGuard<'_, TimerSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records the loop's next deadline. Returns `false` if the loop has
    /// been superseded by a newer arming and should exit.
    fn advance(&self, generation: u64, deadline: Instant, lifetime: Option<Duration>) -> bool {
        let mut slot = self.lock();
        if slot.generation != generation || slot.handle.is_none() {
            return false;
        }
        slot.next_fire_at = Some(deadline);
        if lifetime.is_some() {
            slot.lifetime = lifetime;
        }
        true
    }
}

/// Recurring proactive renewal timer.
///
/// One scheduler per pipeline. It holds at most one pending timer at any
/// time: arming again cancels the previous timer first.
///
/// Must be used from within a tokio runtime.
pub struct ProactiveScheduler<E: RequestExecutor> {
    coordinator: RefreshCoordinator<E>,
    config: RenewalConfig,
    shared: Arc<TimerShared>,
}

impl<E: RequestExecutor> ProactiveScheduler<E> {
    pub fn new(coordinator: RefreshCoordinator<E>, config: RenewalConfig) -> Self {
        let config = config.validated();
        debug!(
            lifetime = ?config.access_token_lifetime,
            margin = ?config.safety_margin,
            backoff = ?config.retry_backoff,
            "proactive scheduler created"
        );
        Self {
            coordinator,
            config,
            shared: Arc::new(TimerShared {
                slot: Mutex::new(TimerSlot::default()),
                fired: AtomicU64::new(0),
            }),
        }
    }

    /// Arms the timer for a freshly authenticated session.
    ///
    /// Replaces any pending timer.
    pub fn arm_for(&self, identity: &Identity) {
        let lifetime = self.config.lifetime_for(identity);
        info!(%identity, ?lifetime, "arming proactive renewal");
        self.schedule(lifetime);
    }

    /// Cancels the pending timer. Returns whether one was armed.
    pub fn disarm(&self) -> bool {
        let mut slot = self.shared.lock();
        slot.next_fire_at = None;
        match slot.handle.take() {
            Some(handle) => {
                debug!(generation = handle.generation(), "proactive renewal disarmed");
                true
            }
            None => false,
        }
    }

    /// Restarts a full interval from now, if armed.
    ///
    /// Called after a renewal that happened outside the timer (a reactive
    /// refresh), so the timer doesn't fire shortly after a fresh token was
    /// issued. Returns whether the timer was armed.
    pub fn reset(&self) -> bool {
        let lifetime = {
            let slot = self.shared.lock();
            if slot.handle.is_none() {
                return false;
            }
            slot.lifetime
        };
        self.schedule(lifetime.unwrap_or(self.config.access_token_lifetime));
        true
    }

    pub fn is_armed(&self) -> bool {
        self.shared
            .lock()
            .handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// When the pending timer will fire, if armed.
    pub fn next_fire_at(&self) -> Option<Instant> {
        self.shared.lock().next_fire_at
    }

    /// How many times the timer has fired since creation.
    pub fn fired_count(&self) -> u64 {
        self.shared.fired.load(Ordering::Relaxed)
    }

    pub fn config(&self) -> &RenewalConfig {
        &self.config
    }

    fn schedule(&self, lifetime: Duration) {
        let delay = self.config.full_interval(lifetime);
        let deadline = deadline_after(delay);

        let mut slot = self.shared.lock();
        // Dropping the old handle aborts its task before the new one exists.
        slot.handle = None;
        slot.generation += 1;
        let generation = slot.generation;

        let task = tokio::spawn(renewal_loop(
            self.coordinator.clone(),
            self.config.clone(),
            Arc::clone(&self.shared),
            generation,
            deadline,
        ));
        slot.handle = Some(ScheduleHandle { task, generation });
        slot.next_fire_at = Some(deadline);
        slot.lifetime = Some(lifetime);

        debug!(generation, ?delay, "proactive renewal scheduled");
    }
}

impl<E: RequestExecutor> Drop for ProactiveScheduler<E> {
    fn drop(&mut self) {
        // The loop task holds the shared state; cancel it explicitly so it
        // can't outlive the scheduler.
        self.shared.lock().handle = None;
    }
}

async fn renewal_loop<E: RequestExecutor>(
    coordinator: RefreshCoordinator<E>,
    config: RenewalConfig,
    shared: Arc<TimerShared>,
    generation: u64,
    mut deadline: Instant,
) {
    loop {
        time::sleep_until(deadline).await;
        let fired = shared.fired.fetch_add(1, Ordering::Relaxed) + 1;
        trace!(generation, fired, "proactive renewal firing");

        let (delay, lifetime) = match coordinator.refresh_once().await {
            Ok(RefreshOutcome::Success(identity)) => {
                let lifetime = config.lifetime_for(&identity);
                debug!(%identity, ?lifetime, "proactive renewal succeeded");
                (config.full_interval(lifetime), Some(lifetime))
            }
            Ok(outcome) => {
                warn!(
                    outcome = %outcome.tag(),
                    backoff = ?config.retry_backoff,
                    "proactive renewal did not succeed, retrying after backoff"
                );
                (config.retry_backoff, None)
            }
            Err(err) => {
                warn!(
                    error = %err,
                    backoff = ?config.retry_backoff,
                    "proactive renewal errored, retrying after backoff"
                );
                (config.retry_backoff, None)
            }
        };

        deadline = deadline_after(delay);
        if !shared.advance(generation, deadline, lifetime) {
            trace!(generation, "superseded renewal loop exiting");
            return;
        }
    }
}
