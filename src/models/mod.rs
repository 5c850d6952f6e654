//! Domain models for debug sessions, breakpoints, and stops.

pub mod breakpoint;
pub mod debug_session;
pub mod stop;
pub mod wait;

pub use breakpoint::Breakpoint;
pub use debug_session::{AttachConfig, DebugSession, SessionState};
pub use stop::{PauseSummary, StackFrame, StopEvent, StopReason};
pub use wait::WaitRequest;
