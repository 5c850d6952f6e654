//! Unit tests for configuration parsing, defaults and validation.

use std::path::PathBuf;
use std::time::Duration;

use inspect_gate::config::{GlobalConfig, StopStrategy};
use inspect_gate::AppError;

#[test]
fn empty_file_yields_defaults() {
    let config = GlobalConfig::from_toml_str("").expect("empty config is valid");
    assert_eq!(config, GlobalConfig::default());
    assert_eq!(config.runtime, "node");
    assert_eq!(config.inspector_port, 9229);
    assert_eq!(config.runner_marker, PathBuf::from("node_modules/jest/bin/jest.js"));
    assert_eq!(config.timeouts.ready(), Duration::from_secs(30));
    assert_eq!(config.timeouts.stop(), Duration::from_secs(300));
    assert_eq!(config.timeouts.poll_interval(), Duration::from_secs(1));
    assert_eq!(config.timeouts.gate(), Duration::from_secs(30));
    assert_eq!(config.detector.strategy, StopStrategy::Event);
    assert!(config.detector.skip_entry);
    assert!(!config.detector.kill_on_stop_timeout);
    assert!(config.skip_files.iter().any(|g| g == "<node_internals>/**"));
    assert!(config.bootstrap_entry.is_none(), "embedded gate script by default");
}

#[test]
fn bootstrap_entry_may_name_a_native_gate() {
    let config = GlobalConfig::from_toml_str(r#"bootstrap_entry = "/opt/gate/inspect-gate-bootstrap""#)
        .expect("entry override is valid");
    assert_eq!(
        config.bootstrap_entry,
        Some(PathBuf::from("/opt/gate/inspect-gate-bootstrap"))
    );

    let err = GlobalConfig::from_toml_str(r#"bootstrap_entry = """#).unwrap_err();
    assert!(matches!(err, AppError::Config(_)), "got {err:?}");
}

#[test]
fn overrides_are_parsed() {
    let config = GlobalConfig::from_toml_str(
        r#"
runtime = "/usr/local/bin/node"
runtime_args = ["--enable-source-maps"]
inspector_port = 9333
runner_marker = "node_modules/jest-runner/bin/run.js"

[timeouts]
ready_seconds = 5
poll_interval_ms = 250

[detector]
strategy = "polling"
skip_entry = false

[adapter]
command = "node"
args = ["/opt/js-debug/dapDebugServer.js"]
"#,
    )
    .expect("valid config");

    assert_eq!(config.runtime_args, ["--enable-source-maps"]);
    assert_eq!(config.inspector_flag(), "--inspect=9333");
    assert_eq!(config.timeouts.ready(), Duration::from_secs(5));
    assert_eq!(config.timeouts.poll_interval(), Duration::from_millis(250));
    assert_eq!(config.detector.strategy, StopStrategy::Polling);
    assert!(!config.detector.skip_entry);
    assert_eq!(config.adapter.command, "node");
    assert_eq!(config.adapter.adapter_id, "pwa-node");
}

#[test]
fn zero_timeout_is_rejected() {
    let err = GlobalConfig::from_toml_str("[timeouts]\nready_seconds = 0\n").unwrap_err();
    assert!(matches!(err, AppError::Config(_)), "got {err:?}");
}

#[test]
fn poll_interval_longer_than_stop_timeout_is_rejected() {
    let err = GlobalConfig::from_toml_str(
        "[timeouts]\nstop_seconds = 1\npoll_interval_ms = 5000\n",
    )
    .unwrap_err();
    assert!(err.to_string().contains("poll_interval_ms"));
}

#[test]
fn invalid_skip_glob_is_rejected() {
    let err = GlobalConfig::from_toml_str("skip_files = [\"**/[broken\"]\n").unwrap_err();
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn empty_runtime_is_rejected() {
    let err = GlobalConfig::from_toml_str("runtime = \"  \"\n").unwrap_err();
    assert!(err.to_string().contains("runtime"));
}

#[test]
fn unknown_strategy_fails_to_parse() {
    let err = GlobalConfig::from_toml_str("[detector]\nstrategy = \"guess\"\n").unwrap_err();
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn load_from_path_reads_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "inspector_port = 9400\n").expect("write config");

    let config = GlobalConfig::load_from_path(&path).expect("load");
    assert_eq!(config.inspector_port, 9400);
}

#[test]
fn load_from_missing_path_is_config_error() {
    let err = GlobalConfig::load_from_path("/definitely/not/here.toml").unwrap_err();
    assert!(matches!(err, AppError::Config(_)));
}
