//! Event-driven stop detection.

use tracing::{debug, info, warn};

use crate::dap::{DebugProtocol, ProtocolEvent, Subscription};
use crate::models::{StopEvent, StopReason, WaitRequest};
use crate::{AppError, Result};

/// Listen on `events` for a `stopped` event that qualifies for `request`.
///
/// Events already buffered in `events` are handled first, in order. The
/// subscription is dropped before returning, on success and on timeout
/// alike, so no late event reaches an abandoned wait.
///
/// # Errors
///
/// - `AppError::SessionTerminatedEarly` if the session ends first.
/// - `AppError::StopTimeout` if `request.timeout` elapses first.
pub async fn wait_events(
    protocol: &dyn DebugProtocol,
    mut events: Subscription,
    request: &WaitRequest,
) -> Result<StopEvent> {
    let outcome =
        tokio::time::timeout(request.timeout, listen(protocol, &mut events, request)).await;
    drop(events);

    outcome.unwrap_or_else(|_| {
        Err(AppError::StopTimeout(format!(
            "no qualifying stop within {:?}",
            request.timeout
        )))
    })
}

async fn listen(
    protocol: &dyn DebugProtocol,
    subscription: &mut Subscription,
    request: &WaitRequest,
) -> Result<StopEvent> {
    while let Some(event) = subscription.recv().await {
        match event {
            ProtocolEvent::Stopped {
                thread_id,
                reason: StopReason::Entry,
            } if request.skip_entry => {
                let Some(thread_id) = resolve_thread(protocol, thread_id).await else {
                    warn!("entry stop without a resolvable thread");
                    continue;
                };
                info!(thread_id, "skipping entry stop");
                if let Err(err) = protocol.resume(thread_id).await {
                    warn!(thread_id, %err, "failed to resume after entry stop");
                }
            }
            ProtocolEvent::Stopped { thread_id, reason } => {
                let Some(thread_id) = resolve_thread(protocol, thread_id).await else {
                    debug!(%reason, "stop without a resolvable thread, ignoring");
                    continue;
                };
                let frame = match protocol.top_frame(thread_id).await {
                    Ok(Some(frame)) => frame,
                    Ok(None) => {
                        debug!(thread_id, "stop with an empty stack, ignoring");
                        continue;
                    }
                    Err(err) => {
                        debug!(thread_id, %err, "stack trace failed, ignoring stop");
                        continue;
                    }
                };

                if !request.accepts(&frame) {
                    debug!(
                        thread_id,
                        path = ?frame.source_path,
                        line = frame.line,
                        "stop does not match target"
                    );
                    continue;
                }

                info!(thread_id, %reason, line = frame.line, "qualifying stop");
                return Ok(StopEvent {
                    thread_id,
                    reason,
                    frame,
                });
            }
            ProtocolEvent::Exited { exit_code } => {
                return Err(AppError::SessionTerminatedEarly(format!(
                    "debuggee exited (code {exit_code:?}) before a qualifying stop"
                )));
            }
            ProtocolEvent::Terminated => {
                return Err(AppError::SessionTerminatedEarly(
                    "session terminated before a qualifying stop".into(),
                ));
            }
            ProtocolEvent::Initialized | ProtocolEvent::Continued { .. } => {}
        }
    }

    Err(AppError::SessionTerminatedEarly(
        "event stream closed before a qualifying stop".into(),
    ))
}

async fn resolve_thread(protocol: &dyn DebugProtocol, reported: Option<i64>) -> Option<i64> {
    if reported.is_some() {
        return reported;
    }
    match protocol.threads().await {
        Ok(threads) => threads.first().map(|thread| thread.id),
        Err(err) => {
            debug!(%err, "threads request failed");
            None
        }
    }
}
