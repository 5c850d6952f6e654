//! Per-call stop wait criteria.

use std::path::Path;
use std::time::Duration;

use crate::config::GlobalConfig;
use crate::models::breakpoint::Breakpoint;
use crate::models::stop::StackFrame;

/// Criteria for one stop wait. Created per orchestration call and
/// resolved or rejected exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitRequest {
    /// `None` accepts any real stop.
    pub target: Option<Breakpoint>,
    /// Bound on the whole wait.
    pub timeout: Duration,
    /// Tick interval, polling strategy only.
    pub poll_interval: Duration,
    /// Resume through `entry` stops instead of reporting them.
    pub skip_entry: bool,
}

impl WaitRequest {
    /// Build a request from configured defaults.
    #[must_use]
    pub fn from_config(config: &GlobalConfig, target: Option<Breakpoint>) -> Self {
        Self {
            target,
            timeout: config.timeouts.stop(),
            poll_interval: config.timeouts.poll_interval(),
            skip_entry: config.detector.skip_entry,
        }
    }

    /// Whether a stop with this top frame satisfies the target criteria.
    #[must_use]
    pub fn accepts(&self, frame: &StackFrame) -> bool {
        let Some(target) = &self.target else {
            return true;
        };
        frame
            .source_path
            .as_deref()
            .is_some_and(|path| target.matches_wire_location(Path::new(path), frame.line))
    }
}
