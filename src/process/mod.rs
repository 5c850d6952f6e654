//! Child-process management: spawning, output capture, interception,
//! and whole-tree termination.

pub mod interceptor;
pub mod normalize;
pub mod runner;
pub mod tree;

pub use interceptor::{InterceptRule, PatternInterceptor};
pub use normalize::{normalize_output, OutputNormalizer};
pub use runner::{
    InputPolicy, ManagedProcess, OutputSink, ProcessExit, ProcessInput, ProcessRunner, RunSpec,
    INTERRUPT_KEY,
};
pub use tree::{platform_tree_killer, TreeKiller};
