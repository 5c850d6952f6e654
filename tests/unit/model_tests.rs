//! Unit tests for breakpoints, stop rendering, wait criteria and session
//! lifecycle transitions.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use inspect_gate::config::GlobalConfig;
use inspect_gate::dap::{DebugProtocol, EventHub, ProtocolFuture, Subscription, ThreadInfo};
use inspect_gate::models::{
    AttachConfig, Breakpoint, DebugSession, PauseSummary, SessionState, StackFrame, StopEvent,
    StopReason, WaitRequest,
};
use inspect_gate::AppError;

fn frame(path: Option<&str>, line: u32) -> StackFrame {
    StackFrame {
        id: 1,
        name: "adds".into(),
        source_path: path.map(str::to_owned),
        line,
        column: 3,
    }
}

// ── Breakpoint ─────────────────────────────────────────

#[test]
fn location_is_converted_to_zero_based() {
    let bp = Breakpoint::parse_location("/w/tests/sum.test.js:12:5").expect("valid");
    assert_eq!(bp.source, Path::new("/w/tests/sum.test.js"));
    assert_eq!(bp.line, 11);
    assert_eq!(bp.column, 4);
    assert_eq!(bp.id, "/w/tests/sum.test.js:12:5");
}

#[test]
fn column_defaults_to_first() {
    let bp = Breakpoint::parse_location("tests/sum.test.js:3").expect("valid");
    assert_eq!(bp.line, 2);
    assert_eq!(bp.column, 0);
}

#[test]
fn malformed_locations_are_rejected() {
    for raw in ["tests/sum.test.js", "tests/sum.test.js:0", ":4", "a:b:c"] {
        let err = Breakpoint::parse_location(raw).unwrap_err();
        assert!(matches!(err, AppError::Config(_)), "{raw}: {err:?}");
    }
}

#[test]
fn wire_line_is_one_based() {
    let bp = Breakpoint::new("bp", "/w/a.js", 19, 0);
    assert!(bp.matches_wire_location(Path::new("/w/a.js"), 20));
    assert!(!bp.matches_wire_location(Path::new("/w/a.js"), 19));
    assert!(!bp.matches_wire_location(Path::new("/w/b.js"), 20));
    assert!(!bp.matches_wire_location(Path::new("/w/a.js"), 0));
}

// ── Wait request ───────────────────────────────────────

#[test]
fn untargeted_wait_accepts_any_frame() {
    let request = WaitRequest::from_config(&GlobalConfig::default(), None);
    assert!(request.accepts(&frame(None, 1)));
    assert!(request.accepts(&frame(Some("/w/a.js"), 10)));
}

#[test]
fn targeted_wait_requires_file_and_line() {
    let target = Breakpoint::new("bp", "/w/a.js", 19, 0);
    let request = WaitRequest::from_config(&GlobalConfig::default(), Some(target));
    assert!(!request.accepts(&frame(Some("/w/a.js"), 10)));
    assert!(request.accepts(&frame(Some("/w/a.js"), 20)));
    assert!(!request.accepts(&frame(None, 20)));
}

#[test]
fn wait_request_takes_configured_bounds() {
    let mut config = GlobalConfig::default();
    config.timeouts.stop_seconds = 7;
    config.timeouts.poll_interval_ms = 50;
    config.detector.skip_entry = false;
    let request = WaitRequest::from_config(&config, None);
    assert_eq!(request.timeout, Duration::from_secs(7));
    assert_eq!(request.poll_interval, Duration::from_millis(50));
    assert!(!request.skip_entry);
}

// ── Stop rendering ─────────────────────────────────────

#[test]
fn wire_reasons_map_to_variants() {
    assert_eq!(StopReason::from_wire("entry"), StopReason::Entry);
    assert_eq!(StopReason::from_wire("breakpoint"), StopReason::Breakpoint);
    assert_eq!(StopReason::from_wire("function breakpoint"), StopReason::Breakpoint);
    assert_eq!(StopReason::from_wire("step"), StopReason::Step);
    assert_eq!(
        StopReason::from_wire("goto"),
        StopReason::Other("goto".into())
    );
}

#[test]
fn summary_renders_reason_location_and_function() {
    let event = StopEvent {
        thread_id: 1,
        reason: StopReason::Breakpoint,
        frame: frame(Some("tests/sum.test.js"), 12),
    };
    let summary = PauseSummary::from(&event);
    assert_eq!(
        summary.to_string(),
        "Execution paused (reason: breakpoint) at tests/sum.test.js:12:3 in adds"
    );
}

#[test]
fn summary_without_source_uses_placeholder() {
    let event = StopEvent {
        thread_id: 1,
        reason: StopReason::Pause,
        frame: frame(None, 4),
    };
    assert!(PauseSummary::from(&event)
        .to_string()
        .contains("<unknown>:4:3"));
}

// ── Session lifecycle ──────────────────────────────────

struct NullProtocol {
    hub: EventHub,
}

impl DebugProtocol for NullProtocol {
    fn threads(&self) -> ProtocolFuture<'_, Vec<ThreadInfo>> {
        Box::pin(async { Ok(Vec::new()) })
    }

    fn top_frame(&self, _thread_id: i64) -> ProtocolFuture<'_, Option<StackFrame>> {
        Box::pin(async { Ok(None) })
    }

    fn resume(&self, _thread_id: i64) -> ProtocolFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }

    fn subscribe(&self) -> Subscription {
        self.hub.subscribe()
    }

    fn disconnect(&self) -> ProtocolFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }
}

fn session() -> DebugSession {
    let config = AttachConfig {
        port: 9229,
        working_directory: "/w".into(),
        excluded_path_globs: vec!["<node_internals>/**".into()],
    };
    DebugSession::attached(config, Arc::new(NullProtocol { hub: EventHub::new() }))
}

#[test]
fn attached_session_has_unique_id() {
    let a = session();
    let b = session();
    assert_eq!(a.state, SessionState::Attached);
    assert_ne!(a.id, b.id);
}

#[test]
fn lifecycle_transitions_are_validated() {
    let mut s = session();
    assert!(s.transition_to(SessionState::Paused));
    assert!(s.transition_to(SessionState::Attached));
    assert!(s.transition_to(SessionState::Terminated));
    assert!(!s.transition_to(SessionState::Attached));
    assert!(!s.transition_to(SessionState::Paused));
    assert_eq!(s.state, SessionState::Terminated);
}

#[test]
fn attach_arguments_carry_port_cwd_and_skip_files() {
    let s = session();
    let args = s.config.to_attach_arguments("pwa-node");
    assert_eq!(args["type"], "pwa-node");
    assert_eq!(args["request"], "attach");
    assert_eq!(args["port"], 9229);
    assert_eq!(args["cwd"], "/w");
    assert_eq!(args["skipFiles"][0], "<node_internals>/**");
}
