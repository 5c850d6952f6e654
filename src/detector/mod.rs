//! Stop detection over an attached [`DebugSession`].
//!
//! Two interchangeable strategies share one contract: resolve with a
//! [`PauseSummary`] on the first qualifying stop, or fail with a timeout or
//! termination error. [`wait_for_stop`] takes the session mutably, so two
//! waits can never run against the same session at once.

pub mod events;
pub mod polling;

use std::sync::Arc;

use tracing::{info, info_span, Instrument};

use crate::config::StopStrategy;
use crate::models::{DebugSession, PauseSummary, SessionState, WaitRequest};
use crate::{AppError, Result};

pub use events::wait_events;
pub use polling::{poll_once, wait_polling, PollOutcome};

/// Wait for a qualifying stop using `strategy`.
///
/// The event strategy starts from the subscription the attacher opened, if
/// the session carries one, so stops raised during the attach are seen.
/// On success the session moves to `Paused`; on early termination it moves
/// to `Terminated`. A timeout leaves the state unchanged.
///
/// # Errors
///
/// `AppError::StopTimeout` or `AppError::SessionTerminatedEarly`.
pub async fn wait_for_stop(
    session: &mut DebugSession,
    strategy: StopStrategy,
    request: &WaitRequest,
) -> Result<PauseSummary> {
    let protocol = Arc::clone(session.protocol());
    let span = info_span!("wait_for_stop", session_id = %session.id, ?strategy);

    let early_events = session.take_events();

    let outcome = match strategy {
        StopStrategy::Event => {
            let events = early_events.unwrap_or_else(|| protocol.subscribe());
            wait_events(protocol.as_ref(), events, request)
                .instrument(span)
                .await
        }
        StopStrategy::Polling => {
            drop(early_events);
            wait_polling(protocol.as_ref(), request).instrument(span).await
        }
    };

    match outcome {
        Ok(stop) => {
            session.transition_to(SessionState::Paused);
            let summary = PauseSummary::from(&stop);
            info!(session_id = %session.id, %summary, "execution paused");
            Ok(summary)
        }
        Err(err @ AppError::SessionTerminatedEarly(_)) => {
            session.transition_to(SessionState::Terminated);
            Err(err)
        }
        Err(err) => Err(err),
    }
}
