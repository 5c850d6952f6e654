//! Debug session model and lifecycle helpers.

use std::fmt::{Debug, Formatter};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::dap::{DebugProtocol, Subscription};

/// Lifecycle state of a debug session.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Attach request in flight.
    Attaching,
    /// Attached and running.
    Attached,
    /// Execution paused at a qualifying stop.
    Paused,
    /// Session ended.
    Terminated,
}

/// Configuration used to attach to an inspector.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct AttachConfig {
    /// Inspector transport port.
    pub port: u16,
    /// Target working directory.
    pub working_directory: PathBuf,
    /// Path globs excluded from stepping.
    pub excluded_path_globs: Vec<String>,
}

impl AttachConfig {
    /// Render the DAP `attach` request arguments.
    #[must_use]
    pub fn to_attach_arguments(&self, adapter_type: &str) -> Value {
        json!({
            "type": adapter_type,
            "request": "attach",
            "name": "inspect-gate",
            "port": self.port,
            "cwd": self.working_directory.to_string_lossy(),
            "skipFiles": self.excluded_path_globs,
        })
    }
}

/// An attached debug session, passed explicitly to every consumer.
pub struct DebugSession {
    /// Unique session identifier.
    pub id: String,
    /// Current lifecycle state.
    pub state: SessionState,
    /// Configuration the session attached with.
    pub config: AttachConfig,
    /// When the attach completed.
    pub attached_at: DateTime<Utc>,
    protocol: Arc<dyn DebugProtocol>,
    events: Option<Subscription>,
}

impl DebugSession {
    /// Wrap an attached protocol handle in a session in the `Attached` state.
    #[must_use]
    pub fn attached(config: AttachConfig, protocol: Arc<dyn DebugProtocol>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            state: SessionState::Attached,
            config,
            attached_at: Utc::now(),
            protocol,
            events: None,
        }
    }

    /// Keep a subscription opened before the attach completed, so events
    /// the debuggee raised during the attach (such as an entry stop) reach
    /// the first stop wait.
    #[must_use]
    pub fn with_events(mut self, events: Subscription) -> Self {
        self.events = Some(events);
        self
    }

    /// Take the subscription handed over by the attacher, if any.
    pub fn take_events(&mut self) -> Option<Subscription> {
        self.events.take()
    }

    /// Protocol handle for this session.
    #[must_use]
    pub fn protocol(&self) -> &Arc<dyn DebugProtocol> {
        &self.protocol
    }

    /// Determine whether a lifecycle transition is permitted.
    #[must_use]
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        matches!(
            (self.state, next),
            (SessionState::Attaching | SessionState::Paused, SessionState::Attached)
                | (SessionState::Attached, SessionState::Paused)
                | (
                    SessionState::Attaching | SessionState::Attached | SessionState::Paused,
                    SessionState::Terminated
                )
        )
    }

    /// Apply a transition if permitted; returns whether it was applied.
    pub fn transition_to(&mut self, next: SessionState) -> bool {
        if self.can_transition_to(next) {
            self.state = next;
            true
        } else {
            false
        }
    }
}

impl Debug for DebugSession {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebugSession")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("config", &self.config)
            .field("attached_at", &self.attached_at)
            .field("buffering_events", &self.events.is_some())
            .finish_non_exhaustive()
    }
}
