//! Test-runner discovery.
//!
//! Walks upward from the target file's directory to the filesystem root,
//! probing each directory for the configured runner marker. First match
//! wins; no match is a terminal `NotFound` carrying an install hint.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::GlobalConfig;
use crate::{AppError, Result};

/// Where the runner lives for one target file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerLocation {
    /// Directory containing the runner install; the process's working directory.
    pub workspace_root: PathBuf,
    /// Absolute path of the runner entry point.
    pub runner_path: PathBuf,
}

/// Resolve the workspace root and runner for `test_file`.
///
/// # Errors
///
/// - `AppError::WorkspaceUnresolved` if `test_file` is not an absolute path
///   to an existing file, or lies outside every configured workspace root.
/// - `AppError::NotFound` if no ancestor directory holds the runner marker.
pub fn locate_runner(test_file: &Path, config: &GlobalConfig) -> Result<RunnerLocation> {
    if !test_file.is_absolute() {
        return Err(AppError::WorkspaceUnresolved(format!(
            "test file must be an absolute path: {}",
            test_file.display()
        )));
    }

    if !test_file.is_file() {
        return Err(AppError::WorkspaceUnresolved(format!(
            "test file does not exist: {}",
            test_file.display()
        )));
    }

    if !config.workspace_roots.is_empty()
        && !config
            .workspace_roots
            .iter()
            .any(|root| test_file.starts_with(root))
    {
        return Err(AppError::WorkspaceUnresolved(format!(
            "{} is not inside any configured workspace root",
            test_file.display()
        )));
    }

    let start = test_file.parent().unwrap_or(test_file);
    for dir in start.ancestors() {
        let candidate = dir.join(&config.runner_marker);
        debug!(candidate = %candidate.display(), "probing for runner");
        if candidate.is_file() {
            info!(
                workspace_root = %dir.display(),
                runner = %candidate.display(),
                "runner located"
            );
            return Ok(RunnerLocation {
                workspace_root: dir.to_path_buf(),
                runner_path: candidate,
            });
        }
    }

    Err(AppError::NotFound(format!(
        "no {} found above {}; install the test runner with `npm install --save-dev jest`",
        config.runner_marker.display(),
        start.display()
    )))
}
