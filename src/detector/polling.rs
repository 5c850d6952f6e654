//! Polling stop detection.
//!
//! Pause is inferred solely from the presence of a resolvable top stack
//! frame, so the reported reason is always `pause`. This strategy cannot
//! tell a finished debuggee from a running one; only the overall timeout
//! ends an unsuccessful wait.

use tracing::{debug, info, trace};

use crate::dap::DebugProtocol;
use crate::models::{StackFrame, StopEvent, StopReason, WaitRequest};
use crate::{AppError, Result};

/// Result of one polling tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// No thread yet, or no resolvable frame.
    NotPaused,
    /// A thread has a top frame.
    Paused {
        /// Thread the frame belongs to.
        thread_id: i64,
        /// Its top frame.
        frame: StackFrame,
    },
    /// The `threads` request failed.
    TransportError(String),
}

/// Run one tick: enumerate threads, then fetch the first thread's top frame.
pub async fn poll_once(protocol: &dyn DebugProtocol) -> PollOutcome {
    let threads = match protocol.threads().await {
        Ok(threads) => threads,
        Err(err) => return PollOutcome::TransportError(err.to_string()),
    };

    let Some(thread) = threads.first() else {
        return PollOutcome::NotPaused;
    };

    match protocol.top_frame(thread.id).await {
        Ok(Some(frame)) => PollOutcome::Paused {
            thread_id: thread.id,
            frame,
        },
        Ok(None) => PollOutcome::NotPaused,
        // A running thread has no stack to report.
        Err(err) => {
            trace!(thread_id = thread.id, %err, "stack trace unavailable");
            PollOutcome::NotPaused
        }
    }
}

/// Poll every `request.poll_interval`, starting immediately, until a frame
/// accepted by `request` appears.
///
/// # Errors
///
/// Returns `AppError::StopTimeout` when `request.timeout` elapses first.
pub async fn wait_polling(
    protocol: &dyn DebugProtocol,
    request: &WaitRequest,
) -> Result<StopEvent> {
    let mut ticker = tokio::time::interval(request.poll_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let polling = async {
        let mut tick: u64 = 0;
        loop {
            ticker.tick().await;
            tick += 1;

            match poll_once(protocol).await {
                PollOutcome::Paused { thread_id, frame } if request.accepts(&frame) => {
                    info!(tick, thread_id, "paused frame found by polling");
                    return StopEvent {
                        thread_id,
                        reason: StopReason::Pause,
                        frame,
                    };
                }
                PollOutcome::Paused { frame, .. } => {
                    debug!(tick, line = frame.line, path = ?frame.source_path, "paused outside target");
                }
                PollOutcome::NotPaused => trace!(tick, "not paused"),
                PollOutcome::TransportError(err) => {
                    debug!(tick, %err, "transport error while polling, treating as running");
                }
            }
        }
    };

    tokio::time::timeout(request.timeout, polling)
        .await
        .map_err(|_| {
            AppError::StopTimeout(format!(
                "no qualifying stop within {:?} (polling)",
                request.timeout
            ))
        })
}
