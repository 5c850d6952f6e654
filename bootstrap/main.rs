#![forbid(unsafe_code)]

//! `inspect-gate-bootstrap`: native counterpart of the Node gate script,
//! for runtimes that `exec` their entry.
//!
//! Usage: `inspect-gate-bootstrap <program> [args...]`. The channel address
//! comes from `INSPECT_GATE_CHANNEL`. Once released, the workload replaces
//! this process on Unix, so it keeps the pid the runtime started with; on
//! other platforms it runs as a child. Exit status is the workload's, `1`
//! when no start signal arrives in time, `2` on any other failure.

use std::ffi::{OsStr, OsString};
use std::process::ExitCode;
use std::time::Duration;

use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use inspect_gate::handshake::{self, Gate, GateExit, CHANNEL_ENV, HOLD_ENV};
use inspect_gate::{AppError, Result};

const DEFAULT_HOLD_SECONDS: u64 = 30;
const FAILURE_EXIT: u8 = 2;

fn main() -> ExitCode {
    init_tracing();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            error!(%err, "failed to build tokio runtime");
            return ExitCode::from(FAILURE_EXIT);
        }
    };

    match runtime.block_on(run()) {
        Ok(exit) => ExitCode::from(u8::try_from(exit.exit_code()).unwrap_or(1)),
        Err(err) => {
            error!(%err, "bootstrap failed");
            ExitCode::from(FAILURE_EXIT)
        }
    }
}

async fn run() -> Result<GateExit> {
    let channel = std::env::var(CHANNEL_ENV)
        .map_err(|_| AppError::Ipc(format!("{CHANNEL_ENV} is not set; refusing to run unguarded")))?;

    let mut argv = std::env::args_os().skip(1);
    let program = argv
        .next()
        .ok_or_else(|| AppError::Config("no workload given".into()))?;
    let args: Vec<_> = argv.collect();

    let stream = handshake::connect(&channel).await?;
    info!(%channel, "connected to handshake channel, holding workload");

    Gate::new(hold_timeout())
        .run(stream, || run_workload(&program, &args))
        .await
}

/// Replace this process with the workload. Returns only on failure.
#[cfg(unix)]
fn run_workload(program: &OsStr, args: &[OsString]) -> std::future::Ready<Result<i32>> {
    use std::os::unix::process::CommandExt;

    // The channel socket is close-on-exec, so the workload does not inherit it.
    let err = std::process::Command::new(program).args(args).exec();
    std::future::ready(Err(AppError::Spawn(format!(
        "failed to exec '{}': {err}",
        program.to_string_lossy()
    ))))
}

#[cfg(not(unix))]
async fn run_workload(program: &OsStr, args: &[OsString]) -> Result<i32> {
    let status = tokio::process::Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .status()
        .await
        .map_err(|err| {
            AppError::Spawn(format!(
                "failed to start '{}': {err}",
                program.to_string_lossy()
            ))
        })?;
    Ok(status.code().unwrap_or(1))
}

fn hold_timeout() -> Duration {
    let seconds = std::env::var(HOLD_ENV)
        .ok()
        .and_then(|raw| raw.parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .unwrap_or(DEFAULT_HOLD_SECONDS);
    Duration::from_secs(seconds)
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    // Stdout belongs to the workload.
    let _ = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init();
}
