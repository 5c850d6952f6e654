#![forbid(unsafe_code)]

//! Attach a debugger to a freshly spawned test runner before any test code
//! runs, release the runner, and report where execution first pauses.

pub mod config;
pub mod dap;
pub mod detector;
pub mod errors;
pub mod handshake;
pub mod models;
pub mod orchestrator;
pub mod process;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
