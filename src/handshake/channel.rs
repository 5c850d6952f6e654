//! Local-socket transport for the handshake.
//!
//! Uses a named pipe on Windows and a Unix domain socket in the temp
//! directory elsewhere via the `interprocess` crate. The channel name is a
//! plain filesystem address, so any runtime's socket client can connect to
//! it. The server accepts exactly one connection (the bootstrap's) and
//! writes queued messages to it in order, so a message sent before the
//! bootstrap connects is delivered once it does.

use interprocess::local_socket::{tokio::prelude::*, GenericFilePath, ListenerOptions, ToFsName};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::handshake::HandshakeMessage;
use crate::{AppError, Result};

/// Orchestrator end of the handshake channel.
#[derive(Debug)]
pub struct HandshakeServer {
    name: String,
    outbound: Option<mpsc::UnboundedSender<HandshakeMessage>>,
    released: bool,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl HandshakeServer {
    /// Create a uniquely named listener and start accepting in the
    /// background. Must be called before the child is spawned.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Ipc` if the listener cannot be created.
    pub fn bind() -> Result<Self> {
        let name = channel_address(&format!("inspect-gate-{}", Uuid::new_v4().simple()));

        let listener_name = name
            .clone()
            .to_fs_name::<GenericFilePath>()
            .map_err(|err| AppError::Ipc(format!("invalid channel name '{name}': {err}")))?;

        let listener = ListenerOptions::new()
            .name(listener_name)
            .create_tokio()
            .map_err(|err| AppError::Ipc(format!("failed to create handshake listener: {err}")))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(
            serve(listener, rx, cancel.clone()).instrument(info_span!("handshake", channel = %name)),
        );

        info!(channel = %name, "handshake channel listening");

        Ok(Self {
            name,
            outbound: Some(tx),
            released: false,
            cancel,
            task,
        })
    }

    /// Address the child must connect to.
    #[must_use]
    pub fn channel_name(&self) -> &str {
        &self.name
    }

    /// Whether the start signal has been sent.
    #[must_use]
    pub fn released(&self) -> bool {
        self.released
    }

    /// Send the start signal. A second call sends nothing.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Ipc` if the channel has been closed.
    pub fn send_start(&mut self) -> Result<()> {
        if self.released {
            warn!(channel = %self.name, "start signal already sent, ignoring");
            return Ok(());
        }

        let outbound = self
            .outbound
            .as_ref()
            .ok_or_else(|| AppError::Ipc("handshake channel is closed".into()))?;
        outbound
            .send(HandshakeMessage::start())
            .map_err(|_| AppError::Ipc("handshake channel task has stopped".into()))?;

        self.released = true;
        info!(channel = %self.name, "start signal queued");
        Ok(())
    }

    /// Stop accepting and close the connection once queued messages are
    /// flushed.
    pub fn close(&mut self) {
        self.outbound = None;
        self.cancel.cancel();
    }
}

impl Drop for HandshakeServer {
    fn drop(&mut self) {
        self.close();
        if !self.task.is_finished() {
            debug!(channel = %self.name, "handshake task still flushing on drop");
        }
    }
}

async fn serve(
    listener: LocalSocketListener,
    mut rx: mpsc::UnboundedReceiver<HandshakeMessage>,
    cancel: CancellationToken,
) {
    let stream = tokio::select! {
        () = cancel.cancelled() => {
            debug!("handshake closed before the bootstrap connected");
            return;
        }
        accepted = listener.accept() => match accepted {
            Ok(stream) => stream,
            Err(err) => {
                warn!(%err, "handshake accept failed");
                return;
            }
        },
    };

    info!("bootstrap connected");
    let (_reader, mut writer) = stream.split();

    while let Some(message) = rx.recv().await {
        let mut line = match serde_json::to_string(&message) {
            Ok(line) => line,
            Err(err) => {
                warn!(%err, "failed to encode handshake message");
                continue;
            }
        };
        line.push('\n');

        if let Err(err) = writer.write_all(line.as_bytes()).await {
            warn!(%err, "failed to write handshake message");
            break;
        }
        if let Err(err) = writer.flush().await {
            warn!(%err, "failed to flush handshake message");
            break;
        }
        debug!(command = %message.command, "handshake message delivered");
    }
}

#[cfg(unix)]
fn channel_address(stem: &str) -> String {
    std::env::temp_dir()
        .join(format!("{stem}.sock"))
        .to_string_lossy()
        .into_owned()
}

#[cfg(windows)]
fn channel_address(stem: &str) -> String {
    format!(r"\\.\pipe\{stem}")
}

/// Connect to the channel at `name` from the bootstrap side.
///
/// # Errors
///
/// Returns `AppError::Ipc` if the name is invalid or nothing is listening.
pub async fn connect(name: &str) -> Result<LocalSocketStream> {
    let fs_name = name
        .to_fs_name::<GenericFilePath>()
        .map_err(|err| AppError::Ipc(format!("invalid channel name '{name}': {err}")))?;

    LocalSocketStream::connect(fs_name)
        .await
        .map_err(|err| AppError::Ipc(format!("failed to connect to channel '{name}': {err}")))
}
