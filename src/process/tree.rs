//! Process-tree termination.
//!
//! One capability, two backends: signal-based on Unix (the child is spawned
//! as a process-group leader, so signalling the group reaches every
//! descendant) and `taskkill /T` on Windows. The backend is picked once by
//! [`platform_tree_killer`].

use std::fmt::Debug;
use std::sync::Arc;

use tracing::debug;

use crate::{AppError, Result};

/// Terminates a process and everything it transitively spawned.
pub trait TreeKiller: Send + Sync + Debug {
    /// Kill the tree rooted at `pid`. Killing an already-dead tree is `Ok`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` when the platform refuses the request.
    fn terminate_tree(&self, pid: u32) -> Result<()>;
}

/// `SIGKILL` to the process group led by `pid`.
#[cfg(unix)]
#[derive(Debug, Default, Clone, Copy)]
pub struct SignalTreeKiller;

#[cfg(unix)]
impl TreeKiller for SignalTreeKiller {
    fn terminate_tree(&self, pid: u32) -> Result<()> {
        use nix::errno::Errno;
        use nix::sys::signal::{kill, killpg, Signal};
        use nix::unistd::Pid;

        let raw = i32::try_from(pid)
            .map_err(|_| AppError::Io(format!("pid {pid} out of range")))?;
        let pid = Pid::from_raw(raw);

        match killpg(pid, Signal::SIGKILL) {
            Ok(()) => debug!(pid = raw, "process group killed"),
            // Every member is gone. The leader pid may already be reused, so
            // it is not signalled on its own.
            Err(Errno::ESRCH) => debug!(pid = raw, "process group already gone"),
            Err(err) => {
                debug!(pid = raw, %err, "killpg refused, killing process only");
                match kill(pid, Signal::SIGKILL) {
                    Ok(()) | Err(Errno::ESRCH) => {}
                    Err(err) => return Err(AppError::Io(format!("kill {raw} failed: {err}"))),
                }
            }
        }

        Ok(())
    }
}

/// `taskkill /pid <pid> /T /F`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TaskkillTreeKiller;

impl TreeKiller for TaskkillTreeKiller {
    fn terminate_tree(&self, pid: u32) -> Result<()> {
        let status = std::process::Command::new("taskkill")
            .args(["/pid", &pid.to_string(), "/T", "/F"])
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .map_err(|e| AppError::Io(format!("failed to run taskkill: {e}")))?;

        // Exit code 128: process not found, i.e. already gone.
        if status.success() || status.code() == Some(128) {
            debug!(pid, "process tree killed");
            Ok(())
        } else {
            Err(AppError::Io(format!("taskkill for {pid} exited with {status}")))
        }
    }
}

/// Backend for the current platform.
#[must_use]
pub fn platform_tree_killer() -> Arc<dyn TreeKiller> {
    #[cfg(unix)]
    {
        Arc::new(SignalTreeKiller)
    }
    #[cfg(not(unix))]
    {
        Arc::new(TaskkillTreeKiller)
    }
}
