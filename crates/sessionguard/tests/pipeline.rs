//! Integration tests for the authenticated pipeline: 401 interception,
//! coordinated refresh, logout, and the proactive timer working together.
//!
//! The backend is a scripted `MockExecutor`; every test runs on a paused
//! tokio clock so latency and timers are deterministic.

use std::sync::Arc;
use std::time::Duration;

use sessionguard::prelude::*;
use sessionguard_transport::{MockExecutor, MockReply};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{Instant, sleep_until};

const BASE: &str = "https://api.test";
const REFRESH: &str = "https://api.test/api/auth/refresh";
const LOGOUT: &str = "https://api.test/api/auth/logout";
const DOCS: &str = "https://api.test/api/documents";

// =========================================================================
// Helpers
// =========================================================================

fn mock() -> Arc<MockExecutor> {
    Arc::new(MockExecutor::new().with_latency(Duration::from_millis(50)))
}

fn pipeline(mock: &Arc<MockExecutor>) -> AuthenticatedPipeline<MockExecutor> {
    AuthenticatedPipeline::builder()
        .config(SessionConfig::with_base_url(BASE))
        .build_shared(Arc::clone(mock))
}

fn identity() -> Identity {
    Identity::from_bytes(br#"{"id":"u-1"}"#).unwrap()
}

fn refresh_ok(mock: &MockExecutor) {
    mock.set_default(Method::Post, REFRESH, MockReply::json(200, serde_json::json!({"id": "u-1"})));
}

fn drain(rx: &mut UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn logged_out_count(events: &[SessionEvent]) -> usize {
    events.iter().filter(|e| matches!(e, SessionEvent::LoggedOut)).count()
}

fn renewed_count(events: &[SessionEvent]) -> usize {
    events.iter().filter(|e| matches!(e, SessionEvent::Renewed(_))).count()
}

// =========================================================================
// Pass-through
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_non_401_responses_pass_through() {
    let mock = mock();
    mock.push(Method::Get, DOCS, MockReply::status(200));
    mock.push(Method::Get, DOCS, MockReply::status(500));
    let p = pipeline(&mock);

    assert_eq!(p.execute(RequestDescriptor::get(DOCS)).await.unwrap().status(), 200);
    assert_eq!(p.execute(RequestDescriptor::get(DOCS)).await.unwrap().status(), 500);
    assert_eq!(mock.calls_to(REFRESH), 0);
}

#[tokio::test(start_paused = true)]
async fn test_skip_auth_401_is_not_intercepted() {
    let mock = mock();
    mock.set_default(Method::Get, DOCS, MockReply::status(401));
    refresh_ok(&mock);
    let p = pipeline(&mock);

    let resp = p.execute(RequestDescriptor::get(DOCS).skip_auth(true)).await.unwrap();

    assert_eq!(resp.status(), 401);
    assert_eq!(mock.calls_to(REFRESH), 0);
}

#[tokio::test(start_paused = true)]
async fn test_retry_disabled_401_is_not_intercepted() {
    let mock = mock();
    mock.set_default(Method::Get, DOCS, MockReply::status(401));
    refresh_ok(&mock);
    let p = pipeline(&mock);

    let resp = p
        .execute(RequestDescriptor::get(DOCS).retry_on_unauthorized(false))
        .await
        .unwrap();

    assert_eq!(resp.status(), 401);
    assert_eq!(mock.calls_to(REFRESH), 0);
    assert_eq!(mock.calls_to(DOCS), 1);
}

#[tokio::test(start_paused = true)]
async fn test_network_error_surfaces_without_refresh() {
    let mock = mock();
    mock.push(Method::Get, DOCS, MockReply::error(TransportError::Connect("refused".into())));
    let p = pipeline(&mock);

    let err = p.execute(RequestDescriptor::get(DOCS)).await.unwrap_err();

    assert!(matches!(err, PipelineError::Network(TransportError::Connect(_))));
    assert_eq!(mock.calls_to(REFRESH), 0);
}

// =========================================================================
// Successful refresh
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_three_concurrent_401s_share_one_refresh() {
    let mock = mock();
    for _ in 0..3 {
        mock.push(Method::Get, DOCS, MockReply::status(401));
    }
    mock.set_default(Method::Get, DOCS, MockReply::status(200));
    refresh_ok(&mock);
    let p = pipeline(&mock);
    let (_sub, mut rx) = p.events().subscribe_channel();

    let (a, b, c) = tokio::join!(
        p.execute(RequestDescriptor::get(DOCS)),
        p.execute(RequestDescriptor::get(DOCS)),
        p.execute(RequestDescriptor::get(DOCS)),
    );

    assert_eq!(a.unwrap().status(), 200);
    assert_eq!(b.unwrap().status(), 200);
    assert_eq!(c.unwrap().status(), 200);
    assert_eq!(mock.calls_to(REFRESH), 1);
    assert_eq!(mock.calls_to(DOCS), 6);

    let events = drain(&mut rx);
    assert_eq!(renewed_count(&events), 1);
    assert_eq!(logged_out_count(&events), 0);
}

#[tokio::test(start_paused = true)]
async fn test_retried_request_is_identical() {
    let mock = mock();
    mock.push(Method::Post, DOCS, MockReply::status(401));
    mock.set_default(Method::Post, DOCS, MockReply::status(201));
    refresh_ok(&mock);
    let p = pipeline(&mock);

    let request = RequestDescriptor::post(DOCS)
        .header("X-Trace", "t-1")
        .json(serde_json::json!({"title": "notes"}));
    let resp = p.execute(request.clone()).await.unwrap();

    assert_eq!(resp.status(), 201);
    let sent: Vec<_> = mock.requests().into_iter().filter(|r| r.url == DOCS).collect();
    assert_eq!(sent, vec![request.clone(), request]);
}

#[tokio::test(start_paused = true)]
async fn test_second_401_after_refresh_is_returned_not_retried() {
    let mock = mock();
    mock.set_default(Method::Get, DOCS, MockReply::status(401));
    refresh_ok(&mock);
    let p = pipeline(&mock);

    let resp = p.execute(RequestDescriptor::get(DOCS)).await.unwrap();

    assert_eq!(resp.status(), 401);
    assert_eq!(mock.calls_to(REFRESH), 1);
    assert_eq!(mock.calls_to(DOCS), 2);
    assert!(!p.is_logged_out());
}

#[tokio::test(start_paused = true)]
async fn test_reactive_success_resets_proactive_timer() {
    let mock = mock();
    mock.push(Method::Get, DOCS, MockReply::status(401));
    mock.set_default(Method::Get, DOCS, MockReply::status(200));
    refresh_ok(&mock);
    let p = pipeline(&mock);
    let start = Instant::now();

    p.establish(&identity());
    sleep_until(start + Duration::from_secs(500)).await;
    p.execute(RequestDescriptor::get(DOCS)).await.unwrap();

    // Refresh finished at +500.1 s (two 50 ms round trips in).
    let next = p.scheduler().next_fire_at().unwrap();
    assert_eq!(next, start + Duration::from_millis(500_100) + Duration::from_secs(600));
}

// =========================================================================
// Rate limited refresh
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_rate_limited_refresh_returns_original_401() {
    let mock = mock();
    mock.set_default(Method::Get, DOCS, MockReply::status(401));
    mock.set_default(Method::Post, REFRESH, MockReply::with_header(429, "Retry-After", "30"));
    let p = pipeline(&mock);
    let (_sub, mut rx) = p.events().subscribe_channel();

    let resp = p.execute(RequestDescriptor::get(DOCS)).await.unwrap();

    assert_eq!(resp.status(), 401);
    assert_eq!(mock.calls_to(DOCS), 1, "no retry without a renewed session");
    assert_eq!(mock.calls_to(LOGOUT), 0);
    assert_eq!(logged_out_count(&drain(&mut rx)), 0);
    assert!(!p.is_logged_out());
}

#[tokio::test(start_paused = true)]
async fn test_rate_limited_proactive_renewal_rearms_within_backoff() {
    let mock = mock();
    mock.set_default(Method::Get, DOCS, MockReply::status(401));
    mock.set_default(Method::Post, REFRESH, MockReply::with_header(429, "Retry-After", "30"));
    let p = pipeline(&mock);
    let start = Instant::now();

    p.establish(&identity());
    p.execute(RequestDescriptor::get(DOCS)).await.unwrap();
    assert!(p.scheduler().is_armed());

    sleep_until(start + Duration::from_secs(601)).await;

    let next = p.scheduler().next_fire_at().unwrap();
    let backoff = Duration::from_secs(120);
    assert!(next <= Instant::now() + backoff);
    assert!(p.scheduler().is_armed());
}

// =========================================================================
// Hard failure
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_failed_refresh_logs_out_once() {
    let mock = mock();
    mock.set_default(Method::Get, DOCS, MockReply::status(401));
    mock.set_default(Method::Post, REFRESH, MockReply::status(401));
    mock.set_default(Method::Post, LOGOUT, MockReply::status(204));
    let p = pipeline(&mock);
    let (_sub, mut rx) = p.events().subscribe_channel();
    p.establish(&identity());

    let err = p.execute(RequestDescriptor::get(DOCS)).await.unwrap_err();

    assert!(err.is_session_expired());
    assert_eq!(logged_out_count(&drain(&mut rx)), 1);
    assert_eq!(mock.calls_to(LOGOUT), 1);
    assert!(!p.scheduler().is_armed());
    assert!(p.is_logged_out());

    let logout = mock.requests().into_iter().find(|r| r.url == LOGOUT).unwrap();
    assert_eq!(logout.method, Method::Post);
    assert!(logout.skip_auth);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_hard_failures_emit_one_logout() {
    let mock = mock();
    mock.set_default(Method::Get, DOCS, MockReply::status(401));
    mock.set_default(Method::Post, REFRESH, MockReply::status(403));
    let p = pipeline(&mock);
    let (_sub, mut rx) = p.events().subscribe_channel();

    let (a, b, c) = tokio::join!(
        p.execute(RequestDescriptor::get(DOCS)),
        p.execute(RequestDescriptor::get(DOCS)),
        p.execute(RequestDescriptor::get(DOCS)),
    );

    for result in [a, b, c] {
        assert!(matches!(result, Err(PipelineError::SessionExpired)));
    }
    assert_eq!(mock.calls_to(REFRESH), 1);
    assert_eq!(mock.calls_to(LOGOUT), 1);
    assert_eq!(logged_out_count(&drain(&mut rx)), 1);
}

#[tokio::test(start_paused = true)]
async fn test_network_error_during_refresh_is_hard_failure() {
    let mock = mock();
    mock.set_default(Method::Get, DOCS, MockReply::status(401));
    mock.set_default(
        Method::Post,
        REFRESH,
        MockReply::error(TransportError::Connect("dns".into())),
    );
    let p = pipeline(&mock);

    let err = p.execute(RequestDescriptor::get(DOCS)).await.unwrap_err();

    assert!(err.is_session_expired());
}

#[tokio::test(start_paused = true)]
async fn test_malformed_refresh_payload_is_an_error_not_a_logout() {
    let mock = mock();
    mock.set_default(Method::Get, DOCS, MockReply::status(401));
    mock.set_default(Method::Post, REFRESH, MockReply::status(200));
    let p = pipeline(&mock);
    let (_sub, mut rx) = p.events().subscribe_channel();

    let err = p.execute(RequestDescriptor::get(DOCS)).await.unwrap_err();

    assert!(matches!(err, PipelineError::Session(SessionError::MalformedIdentity(_))));
    assert!(drain(&mut rx).is_empty());
    assert_eq!(mock.calls_to(LOGOUT), 0);
}

// =========================================================================
// Session lifecycle
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_logout_tolerates_failing_endpoint() {
    let mock = mock();
    mock.set_default(
        Method::Post,
        LOGOUT,
        MockReply::error(TransportError::Timeout),
    );
    let p = pipeline(&mock);
    let (_sub, mut rx) = p.events().subscribe_channel();

    p.logout().await;

    assert_eq!(drain(&mut rx), vec![SessionEvent::LoggedOut]);
}

#[tokio::test(start_paused = true)]
async fn test_logout_is_idempotent_until_next_establish() {
    let mock = mock();
    let p = pipeline(&mock);
    let (_sub, mut rx) = p.events().subscribe_channel();

    p.logout().await;
    p.logout().await;
    assert_eq!(logged_out_count(&drain(&mut rx)), 1);

    p.establish(&identity());
    assert!(!p.is_logged_out());
    p.logout().await;
    assert_eq!(logged_out_count(&drain(&mut rx)), 1);
    assert_eq!(mock.calls_to(LOGOUT), 2);
}

#[tokio::test(start_paused = true)]
async fn test_stale_logout_does_not_publish_after_establish() {
    let mock = Arc::new(MockExecutor::new().with_latency(Duration::from_secs(5)));
    let p = Arc::new(pipeline(&mock));
    let (_sub, mut rx) = p.events().subscribe_channel();
    let start = Instant::now();

    let logout = {
        let p = Arc::clone(&p);
        tokio::spawn(async move { p.logout().await })
    };
    // The logout call is still in flight when the user signs in again.
    sleep_until(start + Duration::from_secs(1)).await;
    p.establish(&identity());
    logout.await.unwrap();

    assert_eq!(mock.calls_to(LOGOUT), 1);
    assert!(!p.is_logged_out());
    assert!(p.scheduler().is_armed());
    assert!(drain(&mut rx).is_empty());
    p.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_resume_success_arms_and_publishes() {
    let mock = mock();
    refresh_ok(&mock);
    let p = pipeline(&mock);
    let (_sub, mut rx) = p.events().subscribe_channel();

    let outcome = p.resume().await.unwrap();

    assert!(outcome.is_success());
    assert!(p.scheduler().is_armed());
    assert_eq!(renewed_count(&drain(&mut rx)), 1);
}

#[tokio::test(start_paused = true)]
async fn test_resume_failure_stays_quiet() {
    let mock = mock();
    mock.set_default(Method::Post, REFRESH, MockReply::status(401));
    let p = pipeline(&mock);
    let (_sub, mut rx) = p.events().subscribe_channel();

    let outcome = p.resume().await.unwrap();

    assert_eq!(outcome, RefreshOutcome::Failure);
    assert!(!p.scheduler().is_armed());
    assert!(drain(&mut rx).is_empty());
    assert_eq!(mock.calls_to(LOGOUT), 0);
}

#[tokio::test(start_paused = true)]
async fn test_resume_with_huge_server_expiry_stays_armed() {
    let mock = mock();
    mock.set_default(
        Method::Post,
        REFRESH,
        MockReply::json(200, serde_json::json!({"id": "u-1", "expires_in": u64::MAX})),
    );
    let p = pipeline(&mock);

    let outcome = p.resume().await.unwrap();

    assert!(outcome.is_success());
    assert!(p.scheduler().is_armed());
    p.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_huge_configured_lifetime_does_not_panic_on_establish() {
    let config = SessionConfig::from_json_str(
        r#"{
            "base_url": "https://api.test",
            "access_token_lifetime_secs": 18446744073709551615,
            "proactive_jitter_secs": 18446744073709551615,
            "proactive_retry_backoff_secs": 18446744073709551615
        }"#,
    )
    .unwrap();
    let mock = mock();
    let p = AuthenticatedPipeline::builder()
        .config(config)
        .build_shared(Arc::clone(&mock));

    p.establish(&identity());

    assert!(p.scheduler().is_armed());
    assert!(p.scheduler().next_fire_at().is_some());
    p.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_disarms_without_events() {
    let mock = mock();
    refresh_ok(&mock);
    let p = pipeline(&mock);
    let (_sub, mut rx) = p.events().subscribe_channel();
    let start = Instant::now();

    p.establish(&identity());
    p.shutdown();
    sleep_until(start + Duration::from_secs(3600)).await;

    assert!(!p.scheduler().is_armed());
    assert_eq!(mock.calls_to(REFRESH), 0);
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_builder_uses_supplied_event_bus() {
    let bus = SessionEventBus::new();
    let (_sub, mut rx) = bus.subscribe_channel();
    let mock = mock();
    refresh_ok(&mock);

    let p = AuthenticatedPipeline::builder()
        .config(SessionConfig::with_base_url(BASE))
        .events(bus)
        .build_shared(Arc::clone(&mock));
    p.resume().await.unwrap();

    assert_eq!(renewed_count(&drain(&mut rx)), 1);
}
