//! Integration tests for the event-driven stop detector.

use std::sync::Arc;
use std::time::Duration;

use inspect_gate::config::StopStrategy;
use inspect_gate::dap::{DebugProtocol, ProtocolEvent};
use inspect_gate::detector::{wait_events, wait_for_stop};
use inspect_gate::models::{Breakpoint, SessionState, StopReason, WaitRequest};
use inspect_gate::AppError;

use super::test_helpers::{frame_at, session_over, wait_until, FakeProtocol};

fn request(target: Option<Breakpoint>, skip_entry: bool) -> WaitRequest {
    WaitRequest {
        target,
        timeout: Duration::from_secs(10),
        poll_interval: Duration::from_secs(1),
        skip_entry,
    }
}

fn stopped(thread_id: Option<i64>, reason: StopReason) -> ProtocolEvent {
    ProtocolEvent::Stopped { thread_id, reason }
}

fn spawn_wait(
    protocol: &Arc<FakeProtocol>,
    request: WaitRequest,
) -> tokio::task::JoinHandle<inspect_gate::Result<inspect_gate::models::StopEvent>> {
    let protocol = Arc::clone(protocol);
    tokio::spawn(async move { wait_events(&*protocol, protocol.subscribe(), &request).await })
}

#[tokio::test]
async fn entry_stop_is_resumed_exactly_once_and_does_not_resolve() {
    let protocol = FakeProtocol::new();
    protocol.set_frame(1, frame_at("/w/a.js", 7));
    let waiter = spawn_wait(&protocol, request(None, true));

    protocol.wait_for_subscriber().await;
    protocol.emit(&stopped(Some(1), StopReason::Entry));
    wait_until(|| protocol.resumes().len() == 1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!waiter.is_finished(), "entry stop must not resolve the wait");

    protocol.emit(&stopped(Some(1), StopReason::Breakpoint));
    let stop = waiter.await.unwrap().unwrap();

    assert_eq!(protocol.resumes(), vec![1]);
    assert_eq!(stop.reason, StopReason::Breakpoint);
    assert_eq!(stop.frame.line, 7);
}

#[tokio::test]
async fn entry_stop_resolves_when_skipping_is_disabled() {
    let protocol = FakeProtocol::new();
    protocol.set_frame(1, frame_at("/w/a.js", 1));
    let waiter = spawn_wait(&protocol, request(None, false));

    protocol.wait_for_subscriber().await;
    protocol.emit(&stopped(Some(1), StopReason::Entry));

    let stop = waiter.await.unwrap().unwrap();
    assert_eq!(stop.reason, StopReason::Entry);
    assert!(protocol.resumes().is_empty());
}

#[tokio::test]
async fn stop_at_other_line_does_not_resolve_targeted_wait() {
    let protocol = FakeProtocol::new();
    protocol.set_frame(1, frame_at("/w/a.js", 10));
    protocol.set_frame(2, frame_at("/w/a.js", 20));
    let target = Breakpoint::new("a.js:20", "/w/a.js", 19, 0);
    let waiter = spawn_wait(&protocol, request(Some(target), true));

    protocol.wait_for_subscriber().await;
    protocol.emit(&stopped(Some(1), StopReason::Breakpoint));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!waiter.is_finished(), "line 10 must not satisfy a line 20 target");

    protocol.emit(&stopped(Some(2), StopReason::Breakpoint));
    let stop = waiter.await.unwrap().unwrap();
    assert_eq!(stop.thread_id, 2);
    assert_eq!(stop.frame.line, 20);
}

#[tokio::test]
async fn missing_thread_id_falls_back_to_first_thread() {
    let protocol = FakeProtocol::new();
    protocol.set_threads(&[3, 4]);
    protocol.set_frame(3, frame_at("/w/a.js", 5));
    let waiter = spawn_wait(&protocol, request(None, true));

    protocol.wait_for_subscriber().await;
    protocol.emit(&stopped(None, StopReason::Pause));

    let stop = waiter.await.unwrap().unwrap();
    assert_eq!(stop.thread_id, 3);
}

#[tokio::test]
async fn stop_without_stack_is_ignored() {
    let protocol = FakeProtocol::new();
    protocol.set_frame(1, frame_at("/w/a.js", 5));
    let waiter = spawn_wait(&protocol, request(None, true));

    protocol.wait_for_subscriber().await;
    protocol.emit(&stopped(Some(9), StopReason::Breakpoint));
    protocol.emit(&stopped(Some(1), StopReason::Breakpoint));

    let stop = waiter.await.unwrap().unwrap();
    assert_eq!(stop.thread_id, 1);
}

#[tokio::test]
async fn subscription_is_released_after_resolution() {
    let protocol = FakeProtocol::new();
    protocol.set_frame(1, frame_at("/w/a.js", 5));
    let waiter = spawn_wait(&protocol, request(None, true));

    protocol.wait_for_subscriber().await;
    protocol.emit(&stopped(Some(1), StopReason::Step));
    waiter.await.unwrap().unwrap();

    assert_eq!(protocol.subscriber_count(), 0);
}

#[tokio::test]
async fn termination_before_stop_is_reported_distinctly() {
    let protocol = FakeProtocol::new();
    let mut session = session_over(&protocol);

    let emitter = {
        let protocol = Arc::clone(&protocol);
        tokio::spawn(async move {
            protocol.wait_for_subscriber().await;
            protocol.emit(&ProtocolEvent::Exited { exit_code: Some(0) });
        })
    };

    let err = wait_for_stop(&mut session, StopStrategy::Event, &request(None, true))
        .await
        .unwrap_err();
    emitter.await.unwrap();

    assert!(matches!(err, AppError::SessionTerminatedEarly(_)), "got {err:?}");
    assert_eq!(session.state, SessionState::Terminated);
}

#[tokio::test]
async fn terminated_event_rejects_the_wait() {
    let protocol = FakeProtocol::new();
    let waiter = spawn_wait(&protocol, request(None, true));

    protocol.wait_for_subscriber().await;
    protocol.emit(&ProtocolEvent::Terminated);

    let err = waiter.await.unwrap().unwrap_err();
    assert!(matches!(err, AppError::SessionTerminatedEarly(_)));
}

#[tokio::test(start_paused = true)]
async fn timeout_tears_down_the_subscription() {
    let protocol = FakeProtocol::new();
    let mut session = session_over(&protocol);
    let wait = WaitRequest {
        timeout: Duration::from_secs(120),
        ..request(None, true)
    };

    let err = wait_for_stop(&mut session, StopStrategy::Event, &wait)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::StopTimeout(_)), "got {err:?}");
    assert_eq!(protocol.subscriber_count(), 0);
    // A late stop reaches nobody.
    protocol.emit(&stopped(Some(1), StopReason::Breakpoint));
    assert_eq!(session.state, SessionState::Attached);
}

#[tokio::test]
async fn events_buffered_before_the_wait_are_handled_in_order() {
    let protocol = FakeProtocol::new();
    protocol.set_frame(1, frame_at("/w/a.js", 7));
    let events = protocol.subscribe();
    protocol.emit(&stopped(Some(1), StopReason::Entry));
    protocol.emit(&stopped(Some(1), StopReason::Breakpoint));

    let stop = wait_events(&*protocol, events, &request(None, true))
        .await
        .unwrap();

    assert_eq!(protocol.resumes(), vec![1]);
    assert_eq!(stop.reason, StopReason::Breakpoint);
    assert_eq!(protocol.subscriber_count(), 0);
}

#[tokio::test]
async fn entry_stop_raised_during_attach_reaches_the_session_wait() {
    let protocol = FakeProtocol::new();
    protocol.set_frame(1, frame_at("/w/a.js", 7));
    let early = protocol.subscribe();
    protocol.emit(&stopped(Some(1), StopReason::Entry));
    let mut session = session_over(&protocol).with_events(early);

    let remote = Arc::clone(&protocol);
    let debuggee = tokio::spawn(async move {
        wait_until(|| remote.resumes().len() == 1).await;
        remote.emit(&stopped(Some(1), StopReason::Breakpoint));
    });

    let summary = wait_for_stop(&mut session, StopStrategy::Event, &request(None, true))
        .await
        .unwrap();
    debuggee.await.unwrap();

    assert_eq!(protocol.resumes(), vec![1]);
    assert_eq!(summary.line, 7);
    assert_eq!(session.state, SessionState::Paused);
    assert!(session.take_events().is_none());
}
