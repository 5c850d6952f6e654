//! Stop events and the rendered pause summary.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Why execution stopped, as reported by the `stopped` event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Artificial stop right after attaching to a fresh runtime.
    Entry,
    /// A breakpoint was hit.
    Breakpoint,
    /// A step request completed.
    Step,
    /// Paused by request, or inferred by polling.
    Pause,
    /// An exception was raised.
    Exception,
    /// Any other adapter-specific reason.
    Other(String),
}

impl StopReason {
    /// Map the DAP `reason` string to a variant.
    #[must_use]
    pub fn from_wire(reason: &str) -> Self {
        match reason {
            "entry" => Self::Entry,
            "breakpoint" | "function breakpoint" | "data breakpoint"
            | "instruction breakpoint" => Self::Breakpoint,
            "step" => Self::Step,
            "pause" => Self::Pause,
            "exception" => Self::Exception,
            other => Self::Other(other.to_owned()),
        }
    }
}

impl Display for StopReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Entry => f.write_str("entry"),
            Self::Breakpoint => f.write_str("breakpoint"),
            Self::Step => f.write_str("step"),
            Self::Pause => f.write_str("pause"),
            Self::Exception => f.write_str("exception"),
            Self::Other(reason) => f.write_str(reason),
        }
    }
}

/// Top stack frame as returned by `stackTrace` (1-based line and column).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct StackFrame {
    /// Adapter-assigned frame id.
    pub id: i64,
    /// Function name.
    pub name: String,
    /// Source path, when the frame has one.
    pub source_path: Option<String>,
    /// 1-based line.
    pub line: u32,
    /// 1-based column.
    pub column: u32,
}

/// A qualifying stop observed by the detector. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopEvent {
    /// Thread that stopped.
    pub thread_id: i64,
    /// Reported or inferred reason.
    pub reason: StopReason,
    /// Top frame of the stopped thread.
    pub frame: StackFrame,
}

/// Human-readable rendering of a [`StopEvent`].
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct PauseSummary {
    /// Stop reason.
    pub reason: StopReason,
    /// Source path, or `<unknown>` when the frame has none.
    pub source_path: String,
    /// 1-based line.
    pub line: u32,
    /// 1-based column.
    pub column: u32,
    /// Function name of the top frame.
    pub function_name: String,
}

impl From<&StopEvent> for PauseSummary {
    fn from(event: &StopEvent) -> Self {
        Self {
            reason: event.reason.clone(),
            source_path: event
                .frame
                .source_path
                .clone()
                .unwrap_or_else(|| "<unknown>".to_owned()),
            line: event.frame.line,
            column: event.frame.column,
            function_name: event.frame.name.clone(),
        }
    }
}

impl Display for PauseSummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Execution paused (reason: {}) at {}:{}:{} in {}",
            self.reason, self.source_path, self.line, self.column, self.function_name
        )
    }
}
