//! Runner module - Execution abstraction layer
//!
//! This module provides a unified interface for running one script:
//! - `SupervisedRunner`: spawns the interpreter and enforces the deadline
//!
//! The runner module does NOT:
//! - Create or clean up script files
//! - Read the result channel
//! - Decide what the HTTP response looks like

pub mod supervised;

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::RunError;

/// Command specification for execution
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// Program path or name
    pub program: String,
    /// Arguments to the program
    pub args: Vec<OsString>,
    /// Variables added on top of the inherited environment
    pub env: BTreeMap<String, OsString>,
    /// Working directory
    pub work_dir: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            work_dir: None,
        }
    }

    pub fn with_arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<OsString>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_work_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.work_dir = Some(dir.as_ref().to_path_buf());
        self
    }
}

/// Limits for one run
#[derive(Debug, Clone)]
pub struct RunLimits {
    /// Wall-clock deadline covering exit and pipe draining
    pub timeout: Duration,
}

impl RunLimits {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

/// How the run ended
#[derive(Debug, Clone, PartialEq)]
pub enum RunStatus {
    /// Program exited normally with given exit code
    Exited(i32),
    /// Killed by a signal it did not get from us
    Signaled(i32),
    /// Deadline expired; the process tree was killed
    TimedOut,
}

/// Outcome of running a program
#[derive(Debug)]
pub struct RunOutcome {
    /// Raw stdout bytes (empty after a timeout)
    pub stdout: Vec<u8>,
    /// Raw stderr bytes (empty after a timeout)
    pub stderr: Vec<u8>,
    pub status: RunStatus,
}

impl RunOutcome {
    pub fn timed_out() -> Self {
        Self {
            stdout: Vec::new(),
            stderr: Vec::new(),
            status: RunStatus::TimedOut,
        }
    }

    pub fn is_timed_out(&self) -> bool {
        self.status == RunStatus::TimedOut
    }
}

/// Runner trait for executing programs
#[async_trait]
pub trait Runner: Send + Sync {
    /// Run a command, killing it if it outlives `limits.timeout`
    async fn run(&self, cmd: &CommandSpec, limits: &RunLimits) -> Result<RunOutcome, RunError>;
}

// Re-exports
pub use supervised::SupervisedRunner;
