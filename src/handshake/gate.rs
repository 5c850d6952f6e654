//! Bootstrap side of the handshake: hold the workload until released.

use std::future::Future;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::io::AsyncRead;
use tokio_util::codec::{FramedRead, LinesCodec};
use tracing::{debug, info, warn};

use crate::handshake::HandshakeMessage;
use crate::{AppError, Result};

/// Longest accepted handshake line.
const MAX_LINE_BYTES: usize = 64 * 1024;

/// How a gate run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateExit {
    /// The workload ran and exited with this code.
    Released(i32),
    /// No start signal arrived within the hold timeout.
    TimedOut,
}

impl GateExit {
    /// Process exit code the bootstrap should report.
    #[must_use]
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Released(code) => code,
            Self::TimedOut => 1,
        }
    }
}

/// Holds a workload until exactly one start message is observed.
#[derive(Debug, Clone, Copy)]
pub struct Gate {
    hold: Duration,
}

impl Gate {
    /// Gate that gives up after `hold` without a start message.
    #[must_use]
    pub fn new(hold: Duration) -> Self {
        Self { hold }
    }

    /// Read `channel` until a start message arrives, then run `workload`
    /// once. Start messages arriving while it runs are ignored.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Ipc` if the channel fails or closes before the
    /// start message, or the workload's own error.
    pub async fn run<R, F, Fut>(&self, channel: R, workload: F) -> Result<GateExit>
    where
        R: AsyncRead + Unpin,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<i32>>,
    {
        let mut lines = FramedRead::new(channel, LinesCodec::new_with_max_length(MAX_LINE_BYTES));

        let started = async {
            loop {
                match lines.next().await {
                    Some(Ok(line)) => {
                        if is_start(&line) {
                            return Ok(());
                        }
                    }
                    Some(Err(err)) => {
                        return Err(AppError::Ipc(format!("handshake read failed: {err}")));
                    }
                    None => {
                        return Err(AppError::Ipc(
                            "handshake channel closed before start".into(),
                        ));
                    }
                }
            }
        };

        match tokio::time::timeout(self.hold, started).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => return Err(err),
            Err(_) => {
                warn!(hold = ?self.hold, "no start signal received, giving up");
                return Ok(GateExit::TimedOut);
            }
        }

        info!("start signal received, releasing workload");
        let workload = workload();
        tokio::pin!(workload);

        let mut channel_open = true;
        loop {
            tokio::select! {
                code = &mut workload => return code.map(GateExit::Released),
                next = lines.next(), if channel_open => match next {
                    Some(Ok(line)) if is_start(&line) => {
                        warn!("duplicate start signal ignored");
                    }
                    Some(Ok(_)) => {}
                    Some(Err(_)) | None => channel_open = false,
                },
            }
        }
    }
}

fn is_start(line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return false;
    }
    match serde_json::from_str::<HandshakeMessage>(trimmed) {
        Ok(message) if message.is_start() => true,
        Ok(message) => {
            debug!(command = %message.command, "ignoring unknown handshake command");
            false
        }
        Err(err) => {
            warn!(%err, "ignoring malformed handshake line");
            false
        }
    }
}
