//! Runtime-native gate for Node runtimes.
//!
//! The script ships inside the library and is written to a temporary file
//! per launch, so the default configuration needs no install path.

use std::io::Write;

use tempfile::NamedTempFile;
use tracing::debug;

use crate::{AppError, Result};

/// Source of the Node gate entry script.
pub const GATE_SCRIPT: &str = include_str!("../../bootstrap/gate.js");

/// Write [`GATE_SCRIPT`] to a fresh temporary file.
///
/// The file is deleted when the returned handle is dropped, so the handle
/// must outlive the runtime's load of its entry script.
///
/// # Errors
///
/// Returns `AppError::Io` if the file cannot be created or written.
pub fn materialize_gate_script() -> Result<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("inspect-gate-")
        .suffix(".js")
        .tempfile()
        .map_err(|err| AppError::Io(format!("failed to create gate script: {err}")))?;

    file.write_all(GATE_SCRIPT.as_bytes())
        .and_then(|()| file.flush())
        .map_err(|err| AppError::Io(format!("failed to write gate script: {err}")))?;

    debug!(path = %file.path().display(), "gate script written");
    Ok(file)
}
