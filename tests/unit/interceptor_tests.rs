//! Unit tests for one-shot pattern interception over accumulated output.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use regex::Regex;

use inspect_gate::process::{InterceptRule, PatternInterceptor};

const READY: &str = "Debugger listening on ws://127.0.0.1:9229/abc\n";

fn counting_rule(pattern: &str) -> (InterceptRule, Arc<AtomicUsize>) {
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&fired);
    let rule = InterceptRule::new(Regex::new(pattern).unwrap(), move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    (rule, fired)
}

#[test]
fn match_straddling_every_chunk_boundary_fires_once() {
    for split in 1..READY.len() {
        let (rule, fired) = counting_rule(r"Debugger listening on ws://\S+");
        let mut interceptor = PatternInterceptor::new(vec![rule]);

        let (a, b) = READY.split_at(split);
        interceptor.observe(a);
        interceptor.observe(b);
        interceptor.observe(READY);

        assert_eq!(fired.load(Ordering::SeqCst), 1, "split at {split}");
    }
}

#[test]
fn byte_by_byte_stream_fires_once() {
    let (rule, fired) = counting_rule(r"listening on ws://[^/]+/abc");
    let mut interceptor = PatternInterceptor::new(vec![rule]);
    let mut total = 0;
    for ch in READY.chars() {
        total += interceptor.observe(&ch.to_string());
    }
    assert_eq!(total, 1);
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[test]
fn output_is_not_consumed() {
    let (rule, _fired) = counting_rule("listening");
    let mut interceptor = PatternInterceptor::new(vec![rule]);
    interceptor.observe("before\n");
    interceptor.observe(READY);
    interceptor.observe("after\n");
    assert_eq!(interceptor.accumulated(), format!("before\n{READY}after\n"));
}

#[tokio::test]
async fn notify_rule_delivers_matched_text() {
    let (rule, rx) = InterceptRule::notify(Regex::new(r"ws://\S+").unwrap());
    let mut interceptor = PatternInterceptor::new(vec![rule]);
    interceptor.observe("Debugger listening on ws://127.0.0.1:9229/");
    interceptor.observe("abc\n");
    // The first match is delivered as soon as it appears, even if it grows later.
    assert_eq!(rx.await.unwrap(), "ws://127.0.0.1:9229/");
}

#[test]
fn independent_rules_fire_independently() {
    let (first, first_fired) = counting_rule("alpha");
    let (second, second_fired) = counting_rule("beta");
    let mut interceptor = PatternInterceptor::new(vec![first, second]);

    assert_eq!(interceptor.observe("alpha\n"), 1);
    assert_eq!(interceptor.observe("beta\n"), 1);
    assert_eq!(interceptor.observe("alpha beta\n"), 0);
    assert_eq!(first_fired.load(Ordering::SeqCst), 1);
    assert_eq!(second_fired.load(Ordering::SeqCst), 1);
}

#[test]
fn has_fired_tracks_state() {
    let (mut rule, _) = counting_rule("x");
    assert!(!rule.has_fired());
    assert!(!rule.test("abc"));
    assert!(rule.test("abcx"));
    assert!(rule.has_fired());
    assert!(!rule.test("xx"));
}
