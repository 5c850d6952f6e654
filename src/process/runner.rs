//! Process runner.
//!
//! Spawns a child with its own working directory and environment, streams
//! its normalised output to an optional live sink while accumulating it for
//! pattern interception, and guarantees that the whole process tree is
//! killed on cancellation, interrupt, or drop.
//!
//! Intercept rules are handed over before the spawn so no match can slip
//! through between spawn and listener registration.

use std::ffi::OsString;
use std::fmt::{Debug, Formatter};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::process::interceptor::{InterceptRule, PatternInterceptor};
use crate::process::normalize::OutputNormalizer;
use crate::process::tree::{platform_tree_killer, TreeKiller};
use crate::{AppError, Result};

/// Keystroke that terminates the process tree instead of being forwarded.
pub const INTERRUPT_KEY: char = '\u{3}';

const READ_CHUNK_BYTES: usize = 8 * 1024;

/// How long output readers may keep draining after the child exits.
/// Orphaned descendants can hold the pipes open indefinitely.
const READER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// How long [`ManagedProcess::terminate`] waits for finalisation.
const TERMINATE_WAIT: Duration = Duration::from_secs(5);

/// Receiver side of the live output stream.
pub type OutputSink = mpsc::UnboundedSender<String>;

/// Whether the child gets a writable stdin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputPolicy {
    /// Pipe stdin and expose a [`ProcessInput`].
    #[default]
    Forward,
    /// Attach stdin to `/dev/null`.
    Closed,
}

/// What to run and where.
#[derive(Debug, Clone)]
pub struct RunSpec {
    /// Executable.
    pub program: OsString,
    /// Arguments.
    pub args: Vec<OsString>,
    /// Working directory of the child.
    pub working_dir: PathBuf,
    /// Extra environment variables.
    pub env: Vec<(OsString, OsString)>,
    /// Stdin handling.
    pub input: InputPolicy,
}

impl RunSpec {
    /// Start a spec for `program` running in `working_dir`.
    pub fn new(program: impl Into<OsString>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: working_dir.into(),
            env: Vec::new(),
            input: InputPolicy::default(),
        }
    }

    /// Append one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable for the child.
    #[must_use]
    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Choose the stdin policy.
    #[must_use]
    pub fn input(mut self, input: InputPolicy) -> Self {
        self.input = input;
        self
    }
}

/// Final status of a managed process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    /// Exit code; `None` when killed by a signal or unknown.
    pub code: Option<i32>,
    /// `true` only for a normal exit with code 0.
    pub success: bool,
}

impl ProcessExit {
    const UNKNOWN: Self = Self {
        code: None,
        success: false,
    };
}

/// Spawns [`ManagedProcess`]es with a fixed tree-kill backend.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    killer: Arc<dyn TreeKiller>,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessRunner {
    /// Runner using the platform's tree-kill backend.
    #[must_use]
    pub fn new() -> Self {
        Self::with_killer(platform_tree_killer())
    }

    /// Runner using an explicit tree-kill backend.
    #[must_use]
    pub fn with_killer(killer: Arc<dyn TreeKiller>) -> Self {
        Self { killer }
    }

    /// Spawn `spec` with `rules` armed and output mirrored to `sink`.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Spawn` if the OS refuses to start the process or
    /// its pipes cannot be captured.
    pub fn run(
        &self,
        spec: &RunSpec,
        rules: Vec<InterceptRule>,
        sink: Option<OutputSink>,
    ) -> Result<ManagedProcess> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .envs(spec.env.iter().map(|(k, v)| (k, v)))
            .current_dir(&spec.working_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        match spec.input {
            InputPolicy::Forward => cmd.stdin(Stdio::piped()),
            InputPolicy::Closed => cmd.stdin(Stdio::null()),
        };

        // Own process group, so the whole tree can be signalled at once.
        #[cfg(unix)]
        cmd.process_group(0);

        let program = spec.program.to_string_lossy().into_owned();
        let mut child = cmd
            .spawn()
            .map_err(|err| AppError::Spawn(format!("failed to spawn '{program}': {err}")))?;

        let pid = child
            .id()
            .ok_or_else(|| AppError::Spawn(format!("'{program}' exited before reporting a pid")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AppError::Spawn("failed to capture stdout".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| AppError::Spawn("failed to capture stderr".into()))?;

        let cancel = CancellationToken::new();
        let input = child.stdin.take().map(|stdin| ProcessInput {
            stdin: Arc::new(tokio::sync::Mutex::new(stdin)),
            cancel: cancel.clone(),
        });

        let interceptor = Arc::new(Mutex::new(PatternInterceptor::new(rules)));
        let readers = vec![
            tokio::spawn(pump_output(stdout, Arc::clone(&interceptor), sink.clone())),
            tokio::spawn(pump_output(stderr, Arc::clone(&interceptor), sink)),
        ];

        let (exit_tx, exit_rx) = watch::channel(None);
        tokio::spawn(
            monitor_exit(
                child,
                pid,
                Arc::clone(&self.killer),
                cancel.clone(),
                readers,
                exit_tx,
            )
            .instrument(info_span!("managed_process", pid)),
        );

        info!(pid, program, "process spawned");

        Ok(ManagedProcess {
            pid,
            input,
            interceptor,
            exit_rx,
            killer: Arc::clone(&self.killer),
            cancel,
        })
    }
}

/// Write side of a managed process's stdin.
#[derive(Debug, Clone)]
pub struct ProcessInput {
    stdin: Arc<tokio::sync::Mutex<ChildStdin>>,
    cancel: CancellationToken,
}

impl ProcessInput {
    /// Forward `text` to the child. Text containing [`INTERRUPT_KEY`]
    /// terminates the whole process tree instead.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the write fails.
    pub async fn send(&self, text: &str) -> Result<()> {
        if text.contains(INTERRUPT_KEY) {
            info!("interrupt keystroke received, terminating process tree");
            self.cancel.cancel();
            return Ok(());
        }

        let mut stdin = self.stdin.lock().await;
        stdin
            .write_all(text.as_bytes())
            .await
            .map_err(|e| AppError::Io(format!("failed to write to process stdin: {e}")))?;
        stdin
            .flush()
            .await
            .map_err(|e| AppError::Io(format!("failed to flush process stdin: {e}")))
    }
}

/// A spawned process owned by whoever holds this handle.
///
/// Dropping the handle kills the process tree if it is still alive.
pub struct ManagedProcess {
    pid: u32,
    input: Option<ProcessInput>,
    interceptor: Arc<Mutex<PatternInterceptor>>,
    exit_rx: watch::Receiver<Option<ProcessExit>>,
    killer: Arc<dyn TreeKiller>,
    cancel: CancellationToken,
}

impl ManagedProcess {
    /// OS process id (also the process-group id on Unix).
    #[must_use]
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Stdin sink, when spawned with [`InputPolicy::Forward`].
    #[must_use]
    pub fn input(&self) -> Option<&ProcessInput> {
        self.input.as_ref()
    }

    /// Snapshot of all normalised output so far.
    #[must_use]
    pub fn output(&self) -> String {
        self.interceptor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .accumulated()
            .to_owned()
    }

    /// `false` once the exit has been observed and output finalised.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.exit_rx.borrow().is_none()
    }

    /// Exit code, once known.
    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_rx.borrow().and_then(|exit| exit.code)
    }

    /// Token that cancels the process cooperatively (kills the tree).
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for exit and output finalisation.
    pub async fn wait(&self) -> ProcessExit {
        let mut rx = self.exit_rx.clone();
        let exit = match rx.wait_for(Option::is_some).await {
            Ok(exit) => exit.unwrap_or(ProcessExit::UNKNOWN),
            Err(_) => ProcessExit::UNKNOWN,
        };
        exit
    }

    /// Kill the process tree and wait for finalisation. Idempotent.
    ///
    /// The group is signalled even when the leader has already exited, so
    /// descendants it left behind are killed too.
    pub async fn terminate(&self) -> ProcessExit {
        if let Err(err) = self.killer.terminate_tree(self.pid) {
            warn!(pid = self.pid, %err, "failed to kill process tree");
        }
        self.cancel.cancel();
        if let Ok(exit) = tokio::time::timeout(TERMINATE_WAIT, self.wait()).await {
            exit
        } else {
            warn!(pid = self.pid, "process did not finalise after termination");
            ProcessExit::UNKNOWN
        }
    }
}

impl Drop for ManagedProcess {
    fn drop(&mut self) {
        if let Err(err) = self.killer.terminate_tree(self.pid) {
            warn!(pid = self.pid, %err, "failed to kill process tree on drop");
        }
        self.cancel.cancel();
    }
}

impl Debug for ManagedProcess {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedProcess")
            .field("pid", &self.pid)
            .field("alive", &self.is_alive())
            .field("exit", &*self.exit_rx.borrow())
            .finish_non_exhaustive()
    }
}

async fn monitor_exit(
    mut child: Child,
    pid: u32,
    killer: Arc<dyn TreeKiller>,
    cancel: CancellationToken,
    readers: Vec<JoinHandle<()>>,
    exit_tx: watch::Sender<Option<ProcessExit>>,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        () = cancel.cancelled() => {
            debug!(pid, "cancellation received, killing process tree");
            if let Err(err) = killer.terminate_tree(pid) {
                warn!(pid, %err, "process tree kill failed, killing child only");
                child.start_kill().ok();
            }
            child.wait().await
        }
    };

    for mut reader in readers {
        if tokio::time::timeout(READER_DRAIN_TIMEOUT, &mut reader)
            .await
            .is_err()
        {
            debug!(pid, "output reader still open after exit, aborting");
            reader.abort();
        }
    }

    let exit = match status {
        Ok(status) => ProcessExit {
            code: status.code(),
            success: status.success(),
        },
        Err(err) => {
            warn!(pid, %err, "error waiting for child process");
            ProcessExit::UNKNOWN
        }
    };

    info!(pid, code = ?exit.code, success = exit.success, "process exited");
    let _ = exit_tx.send(Some(exit));
}

async fn pump_output<R>(
    mut reader: R,
    interceptor: Arc<Mutex<PatternInterceptor>>,
    sink: Option<OutputSink>,
) where
    R: AsyncRead + Unpin,
{
    let mut normalizer = OutputNormalizer::default();
    let mut pending: Vec<u8> = Vec::new();
    let mut buf = vec![0_u8; READ_CHUNK_BYTES];

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) => {
                warn!(%err, "output read failed");
                break;
            }
        };
        pending.extend_from_slice(&buf[..n]);
        let text = take_utf8(&mut pending);
        if !text.is_empty() {
            emit(&normalizer.push(&text), &interceptor, sink.as_ref());
        }
    }

    let mut tail = normalizer.push(&String::from_utf8_lossy(&pending));
    tail.push_str(&normalizer.finish());
    emit(&tail, &interceptor, sink.as_ref());
}

/// Take the longest decodable prefix of `pending`, keeping an incomplete
/// trailing UTF-8 sequence for the next read.
fn take_utf8(pending: &mut Vec<u8>) -> String {
    match std::str::from_utf8(pending) {
        Ok(text) => {
            let text = text.to_owned();
            pending.clear();
            text
        }
        Err(err) if err.error_len().is_none() => {
            let rest = pending.split_off(err.valid_up_to());
            let text = String::from_utf8_lossy(pending).into_owned();
            *pending = rest;
            text
        }
        Err(_) => {
            let text = String::from_utf8_lossy(pending).into_owned();
            pending.clear();
            text
        }
    }
}

fn emit(chunk: &str, interceptor: &Mutex<PatternInterceptor>, sink: Option<&OutputSink>) {
    if chunk.is_empty() {
        return;
    }
    interceptor
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .observe(chunk);
    if let Some(sink) = sink {
        let _ = sink.send(chunk.to_owned());
    }
}
