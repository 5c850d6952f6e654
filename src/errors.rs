//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// File-system or I/O operation failure.
    Io(String),
    /// Handshake channel failure between orchestrator and bootstrap.
    Ipc(String),
    /// Debug adapter protocol failure (framing, request, response).
    Protocol(String),
    /// Test runner binary absent after the full upward walk.
    NotFound(String),
    /// Target file is not inside any known workspace.
    WorkspaceUnresolved(String),
    /// Inspector never announced readiness within the bound.
    ReadyTimeout(String),
    /// Attach request rejected, failed, or timed out.
    AttachFailure(String),
    /// No qualifying stop observed within the bound.
    StopTimeout(String),
    /// Debuggee exited or the session ended before a qualifying stop.
    SessionTerminatedEarly(String),
    /// Underlying process failed to start.
    Spawn(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
            Self::Ipc(msg) => write!(f, "ipc: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::WorkspaceUnresolved(msg) => write!(f, "workspace unresolved: {msg}"),
            Self::ReadyTimeout(msg) => write!(f, "ready timeout: {msg}"),
            Self::AttachFailure(msg) => write!(f, "attach failure: {msg}"),
            Self::StopTimeout(msg) => write!(f, "stop timeout: {msg}"),
            Self::SessionTerminatedEarly(msg) => write!(f, "session terminated early: {msg}"),
            Self::Spawn(msg) => write!(f, "spawn: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
