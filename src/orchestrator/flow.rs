//! Jest-style runner debug flow.
//!
//! `idle → locating → launching → awaiting_ready → attaching → signaling →
//! awaiting_stop → {paused | failed}`, with an error exit at every step.
//! The start signal is sent strictly after the attach has completed.

use std::ffi::OsString;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use tempfile::NamedTempFile;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::config::{GlobalConfig, StopStrategy};
use crate::dap::attach::Attacher;
use crate::detector::wait_for_stop;
use crate::handshake::{materialize_gate_script, HandshakeServer, CHANNEL_ENV, HOLD_ENV};
use crate::models::{
    AttachConfig, Breakpoint, DebugSession, PauseSummary, SessionState, WaitRequest,
};
use crate::orchestrator::discovery::{locate_runner, RunnerLocation};
use crate::process::{
    InputPolicy, InterceptRule, ManagedProcess, OutputSink, ProcessRunner, RunSpec,
};
use crate::{AppError, Result};

/// Bound on the best-effort disconnect during cleanup.
const DISCONNECT_WAIT: Duration = Duration::from_secs(2);

static READY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Debugger listening on ws://\S+")
        .unwrap_or_else(|_| unreachable!("static pattern"))
});

static ANNOUNCED_PORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"ws://(?:\[[^\]]*\]|[^/:\s]+):(\d+)")
        .unwrap_or_else(|_| unreachable!("static pattern"))
});

/// Orchestration state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowPhase {
    /// Not started.
    Idle,
    /// Resolving workspace root and runner.
    Locating,
    /// Spawning the runner under the bootstrap.
    Launching,
    /// Waiting for the inspector announcement.
    AwaitingReady,
    /// Attaching the debugger.
    Attaching,
    /// Sending the start signal.
    Signaling,
    /// Waiting for a qualifying stop.
    AwaitingStop,
    /// Succeeded.
    Paused,
    /// Failed.
    Failed,
}

impl Display for FlowPhase {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Locating => "locating",
            Self::Launching => "launching",
            Self::AwaitingReady => "awaiting_ready",
            Self::Attaching => "attaching",
            Self::Signaling => "signaling",
            Self::AwaitingStop => "awaiting_stop",
            Self::Paused => "paused",
            Self::Failed => "failed",
        })
    }
}

/// Caller input for one debug attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugRequest {
    /// Absolute path of the test file.
    pub test_file: PathBuf,
    /// Optional test-name filter.
    pub test_name: Option<String>,
    /// Optional breakpoint the stop must match.
    pub breakpoint: Option<Breakpoint>,
    /// Overrides the configured stop strategy.
    pub strategy: Option<StopStrategy>,
}

impl DebugRequest {
    /// Request for `test_file` with no filters.
    #[must_use]
    pub fn new(test_file: impl Into<PathBuf>) -> Self {
        Self {
            test_file: test_file.into(),
            test_name: None,
            breakpoint: None,
            strategy: None,
        }
    }
}

/// Live resources kept after a stop timeout so the caller can inspect
/// the session. Dropping it kills the process tree.
#[derive(Debug)]
pub struct RetainedSession {
    /// The still-running runner.
    pub process: ManagedProcess,
    /// The still-attached session.
    pub session: DebugSession,
    /// Handshake channel, kept open for the bootstrap.
    pub handshake: HandshakeServer,
    gate_script: Option<NamedTempFile>,
}

/// A failed attempt: the phase it failed in plus the cause.
#[derive(Debug)]
pub struct FlowError {
    /// Phase that was active when the failure happened.
    pub phase: FlowPhase,
    /// Underlying failure.
    pub error: AppError,
    /// Present only after a stop timeout when the policy keeps the debuggee.
    pub retained: Option<RetainedSession>,
}

impl Display for FlowError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.phase, self.error)
    }
}

impl std::error::Error for FlowError {}

#[derive(Default)]
struct FlowResources {
    gate_script: Option<NamedTempFile>,
    handshake: Option<HandshakeServer>,
    process: Option<ManagedProcess>,
    session: Option<DebugSession>,
}

impl FlowResources {
    async fn release(&mut self) {
        if let Some(mut session) = self.session.take() {
            let protocol = Arc::clone(session.protocol());
            match tokio::time::timeout(DISCONNECT_WAIT, protocol.disconnect()).await {
                Ok(Ok(())) => debug!(session_id = %session.id, "session disconnected"),
                Ok(Err(err)) => warn!(session_id = %session.id, %err, "disconnect failed"),
                Err(_) => warn!(session_id = %session.id, "disconnect timed out"),
            }
            session.transition_to(SessionState::Terminated);
        }

        if let Some(process) = self.process.take() {
            // Also when the runner already exited: its group may outlive it.
            let exit = process.terminate().await;
            debug!(pid = process.pid(), code = ?exit.code, "runner terminated");
        }

        if let Some(mut handshake) = self.handshake.take() {
            handshake.close();
        }

        self.gate_script = None;
    }

    fn retain(&mut self) -> Option<RetainedSession> {
        match (self.process.take(), self.session.take(), self.handshake.take()) {
            (Some(process), Some(session), Some(handshake)) => Some(RetainedSession {
                process,
                session,
                handshake,
                gate_script: self.gate_script.take(),
            }),
            (process, session, handshake) => {
                self.process = process;
                self.session = session;
                self.handshake = handshake;
                None
            }
        }
    }
}

/// Composes discovery, launch, attach, signaling and stop detection.
pub struct JestDebugFlow<A> {
    config: Arc<GlobalConfig>,
    attacher: A,
    runner: ProcessRunner,
    output: Option<OutputSink>,
    phase: FlowPhase,
}

impl<A: Attacher> JestDebugFlow<A> {
    /// Create a flow using `attacher` for the attach step.
    #[must_use]
    pub fn new(config: Arc<GlobalConfig>, attacher: A) -> Self {
        Self {
            config,
            attacher,
            runner: ProcessRunner::new(),
            output: None,
            phase: FlowPhase::Idle,
        }
    }

    /// Use a specific process runner.
    #[must_use]
    pub fn with_runner(mut self, runner: ProcessRunner) -> Self {
        self.runner = runner;
        self
    }

    /// Mirror the runner's output to `sink`.
    #[must_use]
    pub fn with_output_sink(mut self, sink: OutputSink) -> Self {
        self.output = Some(sink);
        self
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> FlowPhase {
        self.phase
    }

    /// Run one debug attempt end to end.
    ///
    /// Every exit path disconnects the session and kills the process tree,
    /// except a stop timeout when `detector.kill_on_stop_timeout` is off:
    /// then the live resources come back in [`FlowError::retained`].
    ///
    /// # Errors
    ///
    /// Returns a [`FlowError`] naming the failed phase.
    pub async fn run(
        &mut self,
        request: &DebugRequest,
    ) -> std::result::Result<PauseSummary, FlowError> {
        let mut resources = FlowResources::default();
        let outcome = self.drive(request, &mut resources).await;

        match outcome {
            Ok(summary) => {
                self.enter(FlowPhase::Paused);
                resources.release().await;
                Ok(summary)
            }
            Err(error) => {
                let phase = self.phase;
                self.enter(FlowPhase::Failed);
                warn!(%phase, %error, "debug flow failed");

                let keep = matches!(error, AppError::StopTimeout(_))
                    && !self.config.detector.kill_on_stop_timeout;
                let retained = if keep { resources.retain() } else { None };
                if retained.is_some() {
                    info!("stop timed out; leaving the debuggee running");
                } else {
                    resources.release().await;
                }

                Err(FlowError {
                    phase,
                    error,
                    retained,
                })
            }
        }
    }

    async fn drive(
        &mut self,
        request: &DebugRequest,
        resources: &mut FlowResources,
    ) -> Result<PauseSummary> {
        // ── Locate ──────────────────────────────────────
        self.enter(FlowPhase::Locating);
        let location = locate_runner(&request.test_file, &self.config)?;

        // ── Launch ──────────────────────────────────────
        self.enter(FlowPhase::Launching);
        let entry = match &self.config.bootstrap_entry {
            Some(entry) => entry.clone(),
            None => resources
                .gate_script
                .insert(materialize_gate_script()?)
                .path()
                .to_path_buf(),
        };
        let handshake = resources.handshake.insert(HandshakeServer::bind()?);
        let (ready_rule, ready_rx) = InterceptRule::notify(READY_PATTERN.clone());
        let spec = self.launch_spec(request, &location, &entry, handshake.channel_name());
        let process = resources
            .process
            .insert(self.runner.run(&spec, vec![ready_rule], self.output.clone())?);

        // ── Await ready ─────────────────────────────────
        self.enter(FlowPhase::AwaitingReady);
        let announcement = self.await_ready(process, ready_rx).await?;
        let port = announced_port(&announcement).unwrap_or(self.config.inspector_port);
        info!(pid = process.pid(), port, "inspector ready");

        // ── Attach ──────────────────────────────────────
        self.enter(FlowPhase::Attaching);
        let attach_config = AttachConfig {
            port,
            working_directory: location.workspace_root.clone(),
            excluded_path_globs: self.config.skip_files.clone(),
        };
        let bound = self.config.timeouts.attach();
        let session = tokio::time::timeout(bound, self.attacher.attach(attach_config))
            .await
            .map_err(|_| {
                AppError::AttachFailure(format!("attach did not complete within {bound:?}"))
            })??;
        let session = resources.session.insert(session);
        info!(session_id = %session.id, "debugger attached");

        // ── Signal ──────────────────────────────────────
        self.enter(FlowPhase::Signaling);
        handshake.send_start()?;

        // ── Await stop ──────────────────────────────────
        self.enter(FlowPhase::AwaitingStop);
        let wait = WaitRequest::from_config(&self.config, request.breakpoint.clone());
        let strategy = request.strategy.unwrap_or(self.config.detector.strategy);
        wait_for_stop(session, strategy, &wait).await
    }

    fn launch_spec(
        &self,
        request: &DebugRequest,
        location: &RunnerLocation,
        entry: &Path,
        channel: &str,
    ) -> RunSpec {
        RunSpec::new(&self.config.runtime, &location.workspace_root)
            .args(&self.config.runtime_args)
            .arg(self.config.inspector_flag())
            .arg(entry.as_os_str())
            .arg(location.runner_path.as_os_str())
            .args(runner_arguments(&request.test_file, request.test_name.as_deref()))
            .env(CHANNEL_ENV, channel)
            .env(HOLD_ENV, self.config.timeouts.gate_seconds.to_string())
            .input(InputPolicy::Closed)
    }

    async fn await_ready(
        &self,
        process: &ManagedProcess,
        ready: oneshot::Receiver<String>,
    ) -> Result<String> {
        let bound = self.config.timeouts.ready();
        let ready_or_exit = async {
            tokio::select! {
                biased;
                announced = ready => announced
                    .map_err(|_| AppError::Spawn("ready listener was dropped".into())),
                exit = process.wait() => Err(AppError::Spawn(format!(
                    "runner exited (code {:?}) before the inspector was ready",
                    exit.code
                ))),
            }
        };

        tokio::time::timeout(bound, ready_or_exit)
            .await
            .map_err(|_| {
                AppError::ReadyTimeout(format!(
                    "inspector did not announce readiness within {bound:?}"
                ))
            })?
    }

    fn enter(&mut self, phase: FlowPhase) {
        debug!(from = %self.phase, to = %phase, "flow transition");
        self.phase = phase;
    }
}

/// Arguments handed to the runner after its entry point.
#[must_use]
pub fn runner_arguments(test_file: &Path, test_name: Option<&str>) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "--runTestsByPath".into(),
        test_file.as_os_str().to_owned(),
        "--runInBand".into(),
        "--coverage=false".into(),
    ];
    if let Some(name) = test_name {
        args.push("--testNamePattern".into());
        args.push(name.into());
    }
    args
}

/// Port announced in a `Debugger listening on ws://host:port/...` line.
#[must_use]
pub fn announced_port(announcement: &str) -> Option<u16> {
    ANNOUNCED_PORT
        .captures(announcement)
        .and_then(|caps| caps.get(1))
        .and_then(|port| port.as_str().parse().ok())
}
