//! Sandbox module - Filesystem and process-tree plumbing for one run
//!
//! This module handles:
//! - Per-request workspace creation and cleanup
//! - Process-tree isolation and forced termination
//! - Reading the result channel a script may write
//!
//! The sandbox module does NOT:
//! - Spawn or supervise the interpreter (that's the runner's job)
//! - Assemble responses

pub mod process_tree;
pub mod result_channel;
pub mod workspace;

// Re-exports for convenience
pub use process_tree::{platform_terminator, ProcessTreeTerminator};
pub use result_channel::ResultArtifact;
pub use workspace::ScriptWorkspace;
