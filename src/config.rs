//! Runner configuration
//!
//! Loaded once from environment variables at startup. Nothing here is
//! adjustable per request.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Wall-clock limit for a single script run
pub const RUNNER_TIMEOUT: Duration = Duration::from_secs(5);

/// Port used when neither the command line nor `PORT` names one
pub const DEFAULT_PORT: u16 = 8000;

/// Runner configuration
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Interpreter executable invoked with the script path (default: python3)
    pub interpreter: String,
    /// File name of the script inside its per-request directory (default: main.py)
    pub script_file: String,
    /// Parent directory for per-request directories (default: OS temp dir)
    pub work_root: PathBuf,
    /// Environment variable carrying the result-channel path
    pub result_env: String,
    /// Optional cap on concurrently running scripts (default: unbounded)
    pub max_concurrent_runs: Option<usize>,
    /// Deadline for one run
    pub timeout: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            interpreter: "python3".into(),
            script_file: "main.py".into(),
            work_root: std::env::temp_dir(),
            result_env: "RESULT_FILE_PATH".into(),
            max_concurrent_runs: None,
            timeout: RUNNER_TIMEOUT,
        }
    }
}

impl RunnerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let max_concurrent_runs = match std::env::var("RUNNER_MAX_CONCURRENT_RUNS") {
            Ok(raw) => Some(parse_max_concurrent_runs(&raw)?),
            Err(_) => None,
        };

        Ok(Self {
            interpreter: std::env::var("RUNNER_INTERPRETER").unwrap_or(defaults.interpreter),
            script_file: std::env::var("RUNNER_SCRIPT_FILE").unwrap_or(defaults.script_file),
            work_root: match std::env::var("RUNNER_WORK_ROOT") {
                Ok(root) => absolute(PathBuf::from(root))?,
                Err(_) => defaults.work_root,
            },
            result_env: std::env::var("RUNNER_RESULT_ENV").unwrap_or(defaults.result_env),
            max_concurrent_runs,
            timeout: RUNNER_TIMEOUT,
        })
    }
}

fn parse_max_concurrent_runs(raw: &str) -> Result<usize> {
    let limit: usize = raw
        .trim()
        .parse()
        .with_context(|| format!("RUNNER_MAX_CONCURRENT_RUNS must be a number, got {:?}", raw))?;
    if limit == 0 {
        anyhow::bail!("RUNNER_MAX_CONCURRENT_RUNS must be at least 1");
    }
    Ok(limit)
}

/// The child runs inside its workspace, so the script path handed to it
/// must not depend on the service's working directory
fn absolute(path: PathBuf) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path);
    }
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    Ok(cwd.join(path))
}

/// Pick the listening port: first CLI argument, then `PORT`, then 8000.
/// Unparsable values fall through to the next source.
pub fn resolve_port(cli_arg: Option<&str>, env_port: Option<&str>) -> u16 {
    cli_arg
        .and_then(|p| p.trim().parse().ok())
        .or_else(|| env_port.and_then(|p| p.trim().parse().ok()))
        .unwrap_or(DEFAULT_PORT)
}
