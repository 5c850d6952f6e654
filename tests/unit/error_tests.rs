//! Unit tests for `AppError` display format and conversions.

use inspect_gate::AppError;

#[test]
fn display_uses_lowercase_kind_prefix() {
    let cases = [
        (AppError::Config("x".into()), "config: x"),
        (AppError::Ipc("x".into()), "ipc: x"),
        (AppError::NotFound("x".into()), "not found: x"),
        (AppError::WorkspaceUnresolved("x".into()), "workspace unresolved: x"),
        (AppError::ReadyTimeout("x".into()), "ready timeout: x"),
        (AppError::AttachFailure("x".into()), "attach failure: x"),
        (AppError::StopTimeout("x".into()), "stop timeout: x"),
        (
            AppError::SessionTerminatedEarly("x".into()),
            "session terminated early: x",
        ),
        (AppError::Spawn("x".into()), "spawn: x"),
    ];
    for (err, expected) in cases {
        assert_eq!(err.to_string(), expected);
    }
}

#[test]
fn stop_timeout_is_distinct_from_early_termination() {
    let timeout = AppError::StopTimeout("no stop".into());
    let ended = AppError::SessionTerminatedEarly("no stop".into());
    assert_ne!(timeout.to_string(), ended.to_string());
}

#[test]
fn message_has_no_trailing_period() {
    let err = AppError::NotFound("runner missing".into());
    assert!(!err.to_string().ends_with('.'));
}

#[test]
fn toml_error_converts_to_config() {
    let err: AppError = toml::from_str::<toml::Table>("= broken")
        .unwrap_err()
        .into();
    assert!(matches!(err, AppError::Config(_)));
    assert!(err.to_string().starts_with("config: invalid config"));
}

#[test]
fn io_error_converts_to_io() {
    let err: AppError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
    assert_eq!(err.to_string(), "io: gone");
}

#[test]
fn implements_std_error() {
    fn assert_error<E: std::error::Error>(_: &E) {}
    assert_error(&AppError::Protocol("bad frame".into()));
}
