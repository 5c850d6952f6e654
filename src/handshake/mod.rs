//! Attach-before-run handshake.
//!
//! The orchestrator owns a [`HandshakeServer`] and passes its channel
//! address to the spawned process through [`CHANNEL_ENV`]. Inside that
//! process the entry script connects to the channel and holds the real
//! workload until a [`START_COMMAND`] message arrives, then runs it in the
//! same process. For Node that entry is the embedded [`GATE_SCRIPT`]; the
//! [`Gate`] type implements the same contract for native entries.
//!
//! Wire format: one JSON object per line.
//!
//! ```json
//! {"command": "runJestTests"}
//! ```

pub mod channel;
pub mod gate;
pub mod script;

use serde::{Deserialize, Serialize};

pub use channel::{connect, HandshakeServer};
pub use gate::{Gate, GateExit};
pub use script::{materialize_gate_script, GATE_SCRIPT};

/// Environment variable carrying the channel address into the child.
pub const CHANNEL_ENV: &str = "INSPECT_GATE_CHANNEL";

/// Environment variable carrying the gate's hold timeout in seconds.
pub const HOLD_ENV: &str = "INSPECT_GATE_HOLD_SECONDS";

/// The one recognised release command.
pub const START_COMMAND: &str = "runJestTests";

/// A single handshake message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeMessage {
    /// Command verb.
    pub command: String,
}

impl HandshakeMessage {
    /// The release message.
    #[must_use]
    pub fn start() -> Self {
        Self {
            command: START_COMMAND.to_owned(),
        }
    }

    /// Whether this message releases the workload.
    #[must_use]
    pub fn is_start(&self) -> bool {
        self.command == START_COMMAND
    }
}
