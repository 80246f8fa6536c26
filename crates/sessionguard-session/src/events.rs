//! Session event bus: tells the rest of the application what happened.
//!
//! Two events exist and that's deliberate. The UI layer needs to know
//! when the identity changed (`Renewed`) and when the user is signed out
//! (`LoggedOut`); everything else is internal.
//!
//! Delivery is synchronous and fire-and-forget: `publish` calls every
//! current subscriber, in subscription order, before returning. There is
//! no queue and no replay, so a subscriber added after an event was
//! published never sees it.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use sessionguard_protocol::Identity;
use tokio::sync::mpsc;

/// A session notification.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A refresh succeeded and this is the current identity.
    Renewed(Identity),
    /// The session ended. Redirect to sign-in.
    LoggedOut,
}

type Handler = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: AtomicU64,
    handlers: Mutex<Vec<(u64, Handler)>>,
}

/// Publish/subscribe hub for [`SessionEvent`]s.
///
/// Cloning the bus is cheap and every clone shares the same subscriber
/// list, so the pipeline, the refresh invoker, and the application can each
/// hold their own handle.
///
/// ```rust
/// use std::sync::{Arc, Mutex};
/// use sessionguard_session::{SessionEvent, SessionEventBus};
///
/// let bus = SessionEventBus::new();
/// let seen = Arc::new(Mutex::new(Vec::new()));
///
/// let sink = Arc::clone(&seen);
/// let sub = bus.subscribe(move |event| sink.lock().unwrap().push(event.clone()));
///
/// bus.publish(SessionEvent::LoggedOut);
/// sub.unsubscribe();
/// bus.publish(SessionEvent::LoggedOut);
///
/// assert_eq!(seen.lock().unwrap().len(), 1);
/// ```
#[derive(Clone, Default)]
pub struct SessionEventBus {
    registry: Arc<Registry>,
}

impl SessionEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler. It is called for every event published until
    /// the returned [`Subscription`] is unsubscribed.
    ///
    /// Handlers run on the publisher's task, so they should be quick and
    /// must not block. A handler may unsubscribe itself (or anyone else)
    /// while being called.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        self.handlers().push((id, Arc::new(handler)));
        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Subscribes a channel instead of a closure, for consumers that want
    /// to `await` events. Each event is cloned into the channel.
    pub fn subscribe_channel(&self) -> (Subscription, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = self.subscribe(move |event| {
            // A dropped receiver just means nobody is listening any more.
            let _ = tx.send(event.clone());
        });
        (subscription, rx)
    }

    /// Delivers `event` to every current subscriber.
    pub fn publish(&self, event: SessionEvent) {
        // Snapshot under the lock, call outside it, so handlers can
        // subscribe or unsubscribe without deadlocking.
        let snapshot: Vec<Handler> = self
            .handlers()
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();

        tracing::debug!(?event, subscribers = snapshot.len(), "publishing session event");
        for handler in snapshot {
            handler(&event);
        }
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.handlers().len()
    }

    fn handlers(&self) -> std::sync::MutexGuard<'_, Vec<(u64, Handler)>> {
        self.registry
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for SessionEventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionEventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Handle returned by [`SessionEventBus::subscribe`].
///
/// Dropping it does NOT unsubscribe; call [`unsubscribe`](Self::unsubscribe)
/// explicitly. Long-lived UI subscribers usually keep theirs forever.
#[must_use = "keep the subscription to be able to unsubscribe later"]
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    registry: Weak<Registry>,
}

impl Subscription {
    /// Removes the handler. Safe to call after the bus itself is gone.
    pub fn unsubscribe(self) {
        if let Some(registry) = self.registry.upgrade() {
            registry
                .handlers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|(id, _)| *id != self.id);
        }
    }
}
