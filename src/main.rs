#![forbid(unsafe_code)]

//! `inspect-gate`: run one test file under a debugger and report where it
//! first pauses.
//!
//! The pause summary goes to stdout; logs and errors go to stderr.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use inspect_gate::config::StopStrategy;
use inspect_gate::dap::attach::DapAttacher;
use inspect_gate::models::Breakpoint;
use inspect_gate::orchestrator::{DebugRequest, JestDebugFlow};
use inspect_gate::{AppError, GlobalConfig, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum StrategyArg {
    Event,
    Polling,
}

impl From<StrategyArg> for StopStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Event => Self::Event,
            StrategyArg::Polling => Self::Polling,
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "inspect-gate",
    about = "Attach a debugger to a test run and report the first pause",
    version,
    long_about = None
)]
struct Cli {
    /// Test file to run.
    test_file: PathBuf,

    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Only run tests whose name matches this pattern.
    #[arg(long)]
    test_name: Option<String>,

    /// Only report a stop at this location (1-based).
    #[arg(long, value_name = "PATH:LINE[:COL]")]
    breakpoint: Option<String>,

    /// Stop detection strategy; overrides the configuration file.
    #[arg(long, value_enum)]
    strategy: Option<StrategyArg>,

    /// Echo the runner's output to stderr.
    #[arg(long)]
    show_output: bool,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn main() -> ExitCode {
    let args = Cli::parse();
    if let Err(err) = init_tracing(args.log_format) {
        eprintln!("{err}");
        return ExitCode::FAILURE;
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("failed to build tokio runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(args)) {
        Ok(code) => code,
        Err(err) => {
            error!(%err, "inspect-gate failed");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Cli) -> Result<ExitCode> {
    // ── Load configuration ──────────────────────────────
    let config = match &args.config {
        Some(path) => GlobalConfig::load_from_path(path)?,
        None => GlobalConfig::default(),
    };
    let config = Arc::new(config);
    info!("configuration loaded");

    // ── Build the request ───────────────────────────────
    let test_file = std::path::absolute(&args.test_file)
        .map_err(|err| AppError::Config(format!("invalid test file path: {err}")))?;

    let breakpoint = match args.breakpoint.as_deref() {
        Some(raw) => {
            let mut breakpoint = Breakpoint::parse_location(raw)?;
            breakpoint.source = std::path::absolute(&breakpoint.source)
                .map_err(|err| AppError::Config(format!("invalid breakpoint path: {err}")))?;
            Some(breakpoint)
        }
        None => None,
    };

    let request = DebugRequest {
        test_file,
        test_name: args.test_name,
        breakpoint,
        strategy: args.strategy.map(Into::into),
    };

    // ── Run the flow ────────────────────────────────────
    let attacher = DapAttacher::new(config.adapter.clone(), config.timeouts.attach());
    let mut flow = JestDebugFlow::new(Arc::clone(&config), attacher);

    if args.show_output {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        tokio::spawn(async move {
            while let Some(chunk) = rx.recv().await {
                eprint!("{chunk}");
            }
        });
        flow = flow.with_output_sink(tx);
    }

    tokio::select! {
        outcome = flow.run(&request) => match outcome {
            Ok(summary) => {
                println!("{summary}");
                Ok(ExitCode::SUCCESS)
            }
            Err(failure) => {
                eprintln!("error during {}: {}", failure.phase, failure.error);
                if let Some(retained) = failure.retained {
                    eprintln!(
                        "debuggee (pid {}) left running for inspection; press Ctrl-C to stop it",
                        retained.process.pid()
                    );
                    shutdown_signal().await;
                    drop(retained);
                }
                Ok(ExitCode::FAILURE)
            }
        },
        () = shutdown_signal() => {
            info!("interrupted, tearing down");
            Ok(ExitCode::from(130))
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter).with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
