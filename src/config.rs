//! Global configuration parsing and validation.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::{AppError, Result};

/// Which stop-detection strategy a wait uses.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StopStrategy {
    /// Subscribe to asynchronous `stopped` events.
    #[default]
    Event,
    /// Poll `threads` + `stackTrace` on a fixed interval.
    Polling,
}

/// Configurable timeout values for each bounded wait.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TimeoutConfig {
    /// How long to wait for the inspector's "listening" announcement.
    #[serde(default = "default_ready_seconds")]
    pub ready_seconds: u64,
    /// How long the attach request may take.
    #[serde(default = "default_attach_seconds")]
    pub attach_seconds: u64,
    /// Overall bound on waiting for a qualifying stop.
    #[serde(default = "default_stop_seconds")]
    pub stop_seconds: u64,
    /// Tick interval of the polling strategy.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// How long the bootstrap holds the workload before giving up.
    #[serde(default = "default_gate_seconds")]
    pub gate_seconds: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            ready_seconds: default_ready_seconds(),
            attach_seconds: default_attach_seconds(),
            stop_seconds: default_stop_seconds(),
            poll_interval_ms: default_poll_interval_ms(),
            gate_seconds: default_gate_seconds(),
        }
    }
}

impl TimeoutConfig {
    /// Ready-pattern wait bound.
    #[must_use]
    pub fn ready(&self) -> Duration {
        Duration::from_secs(self.ready_seconds)
    }

    /// Attach wait bound.
    #[must_use]
    pub fn attach(&self) -> Duration {
        Duration::from_secs(self.attach_seconds)
    }

    /// Stop wait bound.
    #[must_use]
    pub fn stop(&self) -> Duration {
        Duration::from_secs(self.stop_seconds)
    }

    /// Polling tick interval.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Bootstrap hold bound.
    #[must_use]
    pub fn gate(&self) -> Duration {
        Duration::from_secs(self.gate_seconds)
    }
}

/// Stop detector behavior.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct DetectorConfig {
    /// Strategy used when the caller does not pick one.
    #[serde(default)]
    pub strategy: StopStrategy,
    /// Resume through the artificial `entry` stop seen right after attach.
    #[serde(default = "default_true")]
    pub skip_entry: bool,
    /// Kill the process tree when the stop wait times out.
    #[serde(default)]
    pub kill_on_stop_timeout: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            strategy: StopStrategy::default(),
            skip_entry: true,
            kill_on_stop_timeout: false,
        }
    }
}

/// Debug adapter process speaking DAP over stdio.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct AdapterConfig {
    /// Adapter executable.
    #[serde(default = "default_adapter_command")]
    pub command: String,
    /// Arguments passed to the adapter.
    #[serde(default)]
    pub args: Vec<String>,
    /// Identifier sent in the `initialize` request.
    #[serde(default = "default_adapter_id")]
    pub adapter_id: String,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            command: default_adapter_command(),
            args: Vec::new(),
            adapter_id: default_adapter_id(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_ready_seconds() -> u64 {
    30
}

fn default_attach_seconds() -> u64 {
    10
}

fn default_stop_seconds() -> u64 {
    300
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_gate_seconds() -> u64 {
    30
}

fn default_runtime() -> String {
    "node".into()
}

fn default_inspector_port() -> u16 {
    9229
}

fn default_runner_marker() -> PathBuf {
    PathBuf::from("node_modules/jest/bin/jest.js")
}

fn default_skip_files() -> Vec<String> {
    vec!["<node_internals>/**".into(), "**/node_modules/**".into()]
}

fn default_adapter_command() -> String {
    "js-debug-adapter".into()
}

fn default_adapter_id() -> String {
    "pwa-node".into()
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Runtime executable that hosts the inspector (e.g. `node`).
    #[serde(default = "default_runtime")]
    pub runtime: String,
    /// Arguments placed before the inspector flag.
    #[serde(default)]
    pub runtime_args: Vec<String>,
    /// Well-known inspector port.
    #[serde(default = "default_inspector_port")]
    pub inspector_port: u16,
    /// Entry script handed to the runtime in place of the runner. Unset
    /// means the embedded Node gate script.
    #[serde(default)]
    pub bootstrap_entry: Option<PathBuf>,
    /// Install path of the runner, relative to a workspace root.
    #[serde(default = "default_runner_marker")]
    pub runner_marker: PathBuf,
    /// Optional allow-list of workspace roots; empty accepts any.
    #[serde(default)]
    pub workspace_roots: Vec<PathBuf>,
    /// Path globs excluded from stepping.
    #[serde(default = "default_skip_files")]
    pub skip_files: Vec<String>,
    /// Timeout configuration for every bounded wait.
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    /// Stop detector behavior.
    #[serde(default)]
    pub detector: DetectorConfig,
    /// Debug adapter launch settings.
    #[serde(default)]
    pub adapter: AdapterConfig,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            runtime: default_runtime(),
            runtime_args: Vec::new(),
            inspector_port: default_inspector_port(),
            bootstrap_entry: None,
            runner_marker: default_runner_marker(),
            workspace_roots: Vec::new(),
            skip_files: default_skip_files(),
            timeouts: TimeoutConfig::default(),
            detector: DetectorConfig::default(),
            adapter: AdapterConfig::default(),
        }
    }
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and validate it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Inspector flag passed to the runtime, e.g. `--inspect=9229`.
    #[must_use]
    pub fn inspector_flag(&self) -> String {
        format!("--inspect={}", self.inspector_port)
    }

    /// Check invariants that serde defaults cannot express.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` describing the first violated rule.
    pub fn validate(&self) -> Result<()> {
        if self.runtime.trim().is_empty() {
            return Err(AppError::Config("runtime must not be empty".into()));
        }

        if self.runner_marker.as_os_str().is_empty() {
            return Err(AppError::Config("runner_marker must not be empty".into()));
        }

        if self
            .bootstrap_entry
            .as_ref()
            .is_some_and(|entry| entry.as_os_str().is_empty())
        {
            return Err(AppError::Config(
                "bootstrap_entry must not be empty when set".into(),
            ));
        }

        let t = &self.timeouts;
        if t.ready_seconds == 0
            || t.attach_seconds == 0
            || t.stop_seconds == 0
            || t.poll_interval_ms == 0
            || t.gate_seconds == 0
        {
            return Err(AppError::Config(
                "timeouts and poll interval must be greater than zero".into(),
            ));
        }

        if t.poll_interval() > t.stop() {
            return Err(AppError::Config(
                "poll_interval_ms must not exceed stop_seconds".into(),
            ));
        }

        for pattern in &self.skip_files {
            glob::Pattern::new(pattern).map_err(|err| {
                AppError::Config(format!("invalid skip_files glob '{pattern}': {err}"))
            })?;
        }

        Ok(())
    }
}
