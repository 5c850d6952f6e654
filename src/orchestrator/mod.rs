//! End-to-end orchestration of one debug attempt.
//!
//! Covers runner discovery and the launch → attach → signal → wait flow.

pub mod discovery;
pub mod flow;

pub use discovery::{locate_runner, RunnerLocation};
pub use flow::{DebugRequest, FlowError, FlowPhase, JestDebugFlow, RetainedSession};
