//! Debug Adapter Protocol surface consumed by the stop detector.
//!
//! The engine never talks to an adapter directly; it goes through the
//! [`DebugProtocol`] trait so tests can substitute fakes. The concrete
//! [`client::DapClient`] speaks `Content-Length` framed JSON over an
//! adapter's stdio.
//!
//! Submodules:
//! - `codec`: DAP message framing for [`tokio_util::codec`].
//! - `events`: explicit observer hub for asynchronous protocol events.
//! - `client`: request/response correlation and the adapter process.
//! - `attach`: the attach manager producing a [`DebugSession`](crate::models::DebugSession).

pub mod attach;
pub mod client;
pub mod codec;
pub mod events;

use std::future::Future;
use std::pin::Pin;

use crate::models::{StackFrame, StopReason};
use crate::Result;

pub use events::{EventHub, Subscription};

/// Boxed future returned by [`DebugProtocol`] methods.
pub type ProtocolFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// A thread reported by the `threads` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadInfo {
    /// Adapter-assigned thread id.
    pub id: i64,
    /// Display name.
    pub name: String,
}

/// Asynchronous notifications published by a protocol implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolEvent {
    /// Adapter is ready to accept configuration requests.
    Initialized,
    /// Execution stopped.
    Stopped {
        /// Thread that stopped, when the adapter reports one.
        thread_id: Option<i64>,
        /// Reported reason.
        reason: StopReason,
    },
    /// Execution resumed.
    Continued {
        /// Thread that resumed, when reported.
        thread_id: Option<i64>,
    },
    /// Debuggee process exited.
    Exited {
        /// Exit code reported by the adapter.
        exit_code: Option<i64>,
    },
    /// Debug session ended.
    Terminated,
}

/// Requests and event subscription the stop detector relies on.
pub trait DebugProtocol: Send + Sync {
    /// Enumerate active threads.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Protocol`](crate::AppError::Protocol) on transport
    /// or adapter failure.
    fn threads(&self) -> ProtocolFuture<'_, Vec<ThreadInfo>>;

    /// Fetch the top stack frame of `thread_id`; `None` when the stack is empty.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Protocol`](crate::AppError::Protocol) on transport
    /// or adapter failure, including when the thread is not paused.
    fn top_frame(&self, thread_id: i64) -> ProtocolFuture<'_, Option<StackFrame>>;

    /// Resume `thread_id`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Protocol`](crate::AppError::Protocol) on failure.
    fn resume(&self, thread_id: i64) -> ProtocolFuture<'_, ()>;

    /// Register an observer for asynchronous events. Dropping the returned
    /// handle unregisters it.
    fn subscribe(&self) -> Subscription;

    /// End the session without terminating the debuggee.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Protocol`](crate::AppError::Protocol) on failure.
    fn disconnect(&self) -> ProtocolFuture<'_, ()>;
}
