//! Scripted in-memory executor for tests.
//!
//! Replies are keyed by `(method, url)`. Each route has a queue of
//! one-shot replies, consumed first, and an optional default reply that
//! is repeated once the queue is empty. Requests to unscripted routes get
//! a plain 404.
//!
//! Latency is simulated with `tokio::time::sleep`, so under
//! `#[tokio::test(start_paused = true)]` every interleaving is
//! deterministic.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use sessionguard_protocol::{Headers, Method, RequestDescriptor, ResponseDescriptor};

use crate::{RequestExecutor, TransportError};

/// One scripted answer.
#[derive(Debug, Clone)]
pub enum MockReply {
    Response(ResponseDescriptor),
    Error(TransportError),
}

impl MockReply {
    /// A bare status with no headers or body.
    pub fn status(status: u16) -> Self {
        Self::Response(ResponseDescriptor::status_only(status))
    }

    /// A JSON body with the given status.
    pub fn json(status: u16, value: serde_json::Value) -> Self {
        let body = value.to_string().into_bytes();
        let headers: Headers = [("content-type", "application/json")].into_iter().collect();
        Self::Response(ResponseDescriptor::new(status, headers, body))
    }

    /// A status with a single header.
    pub fn with_header(status: u16, name: &str, value: &str) -> Self {
        let headers: Headers = [(name, value)].into_iter().collect();
        Self::Response(ResponseDescriptor::new(status, headers, Vec::new()))
    }

    pub fn error(err: TransportError) -> Self {
        Self::Error(err)
    }
}

#[derive(Default)]
struct Route {
    queued: VecDeque<MockReply>,
    default: Option<MockReply>,
}

/// A [`RequestExecutor`] that answers from a script.
#[derive(Default)]
pub struct MockExecutor {
    routes: Mutex<HashMap<(Method, String), Route>>,
    requests: Mutex<Vec<RequestDescriptor>>,
    latency: Mutex<Duration>,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call sleeps for `latency` before answering.
    pub fn with_latency(self, latency: Duration) -> Self {
        *self.latency.lock().unwrap_or_else(PoisonError::into_inner) = latency;
        self
    }

    /// Queues a one-shot reply for a route.
    pub fn push(&self, method: Method, url: &str, reply: MockReply) {
        self.with_route(method, url, |route| route.queued.push_back(reply));
    }

    /// Sets the reply used once a route's queue is empty.
    pub fn set_default(&self, method: Method, url: &str, reply: MockReply) {
        self.with_route(method, url, |route| route.default = Some(reply));
    }

    /// Number of calls made to `url`, any method.
    pub fn calls_to(&self, url: &str) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|req| req.url == url)
            .count()
    }

    /// Every request received so far, in arrival order.
    pub fn requests(&self) -> Vec<RequestDescriptor> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn with_route(&self, method: Method, url: &str, f: impl FnOnce(&mut Route)) {
        let mut routes = self.routes.lock().unwrap_or_else(PoisonError::into_inner);
        f(routes.entry((method, url.to_string())).or_default());
    }

    fn next_reply(&self, request: &RequestDescriptor) -> MockReply {
        let mut routes = self.routes.lock().unwrap_or_else(PoisonError::into_inner);
        routes
            .get_mut(&(request.method, request.url.clone()))
            .and_then(|route| route.queued.pop_front().or_else(|| route.default.clone()))
            .unwrap_or_else(|| MockReply::status(404))
    }
}

impl RequestExecutor for MockExecutor {
    async fn send(
        &self,
        request: &RequestDescriptor,
    ) -> Result<ResponseDescriptor, TransportError> {
        // Record and pick the reply at arrival, so concurrent callers
        // consume queued replies in the order they were issued.
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
        let reply = self.next_reply(request);
        let latency = *self.latency.lock().unwrap_or_else(PoisonError::into_inner);

        tracing::trace!(%request, ?latency, "mock executor answering");
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        match reply {
            MockReply::Response(response) => Ok(response),
            MockReply::Error(err) => Err(err),
        }
    }
}
