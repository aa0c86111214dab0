//! Request pipeline
//!
//! materialize -> execute under deadline -> collect result -> cleanup -> respond

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{debug, info};

use crate::config::RunnerConfig;
use crate::error::RunError;
use crate::runner::{CommandSpec, RunLimits, RunOutcome, Runner, SupervisedRunner};
use crate::sandbox::{result_channel, ResultArtifact, ScriptWorkspace};

/// Returned as `output` in place of captured output when the deadline hits
pub const TIMEOUT_MESSAGE: &str =
    "=== Your script process is killed as it took too long to run. ===";

/// Log correlation id; file names do not depend on it
static RUN_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_run_id() -> u64 {
    RUN_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Response body of `POST /run`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResponse {
    pub output: String,
    /// Always serialized, as `null` when the script left no valid result
    pub result: Option<Value>,
}

/// Runs submitted scripts end to end
pub struct Pipeline {
    config: RunnerConfig,
    runner: Arc<dyn Runner>,
    slots: Option<Semaphore>,
}

impl Pipeline {
    pub fn new(config: RunnerConfig) -> Self {
        Self::with_runner(config, Arc::new(SupervisedRunner::default()))
    }

    pub fn with_runner(config: RunnerConfig, runner: Arc<dyn Runner>) -> Self {
        let slots = config.max_concurrent_runs.map(Semaphore::new);
        Self {
            config,
            runner,
            slots,
        }
    }

    /// Run one script. Only failures of the service itself are errors; the
    /// workspace is removed before returning either way.
    pub async fn run(&self, source: &[u8]) -> Result<RunResponse, RunError> {
        let run_id = next_run_id();
        let started = Instant::now();

        let _permit = match &self.slots {
            Some(slots) => {
                debug!("Run {}: waiting for a free slot", run_id);
                slots.acquire().await.ok()
            }
            None => None,
        };

        let workspace =
            ScriptWorkspace::materialize(&self.config.work_root, &self.config.script_file, source)
                .await?;
        info!(
            "Run {}: received {} bytes, workspace {:?}",
            run_id,
            source.len(),
            workspace.dir()
        );

        let outcome = match self.execute(&workspace).await {
            Ok(outcome) => outcome,
            Err(e) => {
                workspace.cleanup().await;
                return Err(e);
            }
        };

        let artifact = result_channel::collect(workspace.result_path()).await;
        workspace.cleanup().await;

        if let ResultArtifact::Malformed(reason) = &artifact {
            debug!("Run {}: discarding result artifact ({})", run_id, reason);
        }

        info!(
            "Run {}: status={:?}, result={}, elapsed={:?}",
            run_id,
            outcome.status,
            matches!(artifact, ResultArtifact::Value(_)),
            started.elapsed()
        );

        Ok(assemble(outcome, artifact))
    }

    async fn execute(&self, workspace: &ScriptWorkspace) -> Result<RunOutcome, RunError> {
        let cmd = CommandSpec::new(self.config.interpreter.as_str())
            .with_arg(workspace.script_path())
            .with_env(self.config.result_env.as_str(), workspace.result_path())
            .with_work_dir(workspace.dir());
        let limits = RunLimits::new(self.config.timeout);

        self.runner.run(&cmd, &limits).await
    }
}

/// Build the response body from a finished run
pub fn assemble(outcome: RunOutcome, artifact: ResultArtifact) -> RunResponse {
    let output = if outcome.is_timed_out() {
        TIMEOUT_MESSAGE.to_string()
    } else {
        format!(
            "{}\n{}",
            String::from_utf8_lossy(&outcome.stdout),
            String::from_utf8_lossy(&outcome.stderr)
        )
    };

    RunResponse {
        output,
        result: artifact.into_value(),
    }
}
