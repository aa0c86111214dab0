//! Supervised runner implementation
//!
//! Spawns the interpreter in its own process tree and races its exit against
//! a fixed deadline. On expiry the whole tree is killed and whatever output
//! was captured so far is thrown away. On a normal exit the tree is killed
//! too, so background descendants cannot keep the pipes open.

use async_trait::async_trait;
use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{CommandSpec, RunLimits, RunOutcome, RunStatus, Runner};
use crate::error::RunError;
use crate::sandbox::{platform_terminator, ProcessTreeTerminator};

/// Bound on reading the pipes once the process group is gone
const PIPE_DRAIN_GRACE: Duration = Duration::from_secs(1);

/// How the race between the child and the deadline ended
#[derive(Debug)]
enum WaitOutcome {
    Completed(ExitStatus),
    Expired,
}

/// Runner that owns the deadline and the process-tree kill
pub struct SupervisedRunner {
    terminator: Box<dyn ProcessTreeTerminator>,
}

impl SupervisedRunner {
    pub fn new(terminator: Box<dyn ProcessTreeTerminator>) -> Self {
        Self { terminator }
    }

    /// Run a command, capturing stdout/stderr, under `limits.timeout`
    pub async fn execute(
        &self,
        cmd: &CommandSpec,
        limits: &RunLimits,
    ) -> Result<RunOutcome, RunError> {
        debug!(
            "Spawning {} with args: {:?} (timeout {:?})",
            cmd.program, cmd.args, limits.timeout
        );

        let mut command = Command::new(&cmd.program);
        command
            .args(&cmd.args)
            .envs(&cmd.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &cmd.work_dir {
            command.current_dir(dir);
        }
        self.terminator.isolate(&mut command);

        let mut child = command.spawn().map_err(|source| RunError::Spawn {
            program: cmd.program.clone(),
            source,
        })?;
        // Captured now; tokio forgets the pid once the child is reaped
        let pid = child
            .id()
            .ok_or_else(|| RunError::Wait(io::Error::other("child exited before supervision")))?;

        let stdout_task = tokio::spawn(drain(child.stdout.take()));
        let stderr_task = tokio::spawn(drain(child.stderr.take()));

        // The deadline covers the child itself, not its pipes
        let outcome = match tokio::time::timeout(limits.timeout, child.wait()).await {
            Ok(Ok(status)) => WaitOutcome::Completed(status),
            Ok(Err(e)) => {
                stdout_task.abort();
                stderr_task.abort();
                return Err(self.abandon(&mut child, pid, RunError::Wait(e)).await);
            }
            Err(_) => WaitOutcome::Expired,
        };
        debug!("Process {}: {:?}", pid, outcome);

        match outcome {
            WaitOutcome::Completed(status) => {
                // Leftover descendants would hold the pipes open
                if let Err(e) = self.terminator.terminate(&mut child, pid) {
                    warn!("Failed to kill leftovers of process group {}: {}", pid, e);
                }
                let stdout = collect_pipe(stdout_task, pid).await?;
                let stderr = collect_pipe(stderr_task, pid).await?;
                Ok(RunOutcome {
                    stdout,
                    stderr,
                    status: exit_status(status),
                })
            }
            WaitOutcome::Expired => {
                warn!(
                    "Process {} exceeded {:?}, killing its process tree",
                    pid, limits.timeout
                );
                let killed = self.terminator.terminate(&mut child, pid);
                stdout_task.abort();
                stderr_task.abort();
                killed.map_err(RunError::Terminate)?;
                child.wait().await.map_err(RunError::Wait)?;
                debug!("Process {} reaped after kill", pid);
                Ok(RunOutcome::timed_out())
            }
        }
    }

    /// Kill and reap the tree after supervision itself failed, handing back `err`
    async fn abandon(&self, child: &mut Child, pid: u32, err: RunError) -> RunError {
        if let Err(e) = self.terminator.terminate(child, pid) {
            warn!("Failed to kill process group {}: {}", pid, e);
        }
        if let Err(e) = child.wait().await {
            warn!("Failed to reap process {}: {}", pid, e);
        }
        err
    }
}

impl Default for SupervisedRunner {
    fn default() -> Self {
        Self::new(platform_terminator())
    }
}

#[async_trait]
impl Runner for SupervisedRunner {
    async fn run(&self, cmd: &CommandSpec, limits: &RunLimits) -> Result<RunOutcome, RunError> {
        self.execute(cmd, limits).await
    }
}

/// Await a pipe reader, giving up on it after `PIPE_DRAIN_GRACE`
async fn collect_pipe(
    mut task: JoinHandle<io::Result<Vec<u8>>>,
    pid: u32,
) -> Result<Vec<u8>, RunError> {
    match tokio::time::timeout(PIPE_DRAIN_GRACE, &mut task).await {
        Ok(joined) => joined?.map_err(RunError::Wait),
        Err(_) => {
            warn!("Output pipe of process {} still open after exit, dropping it", pid);
            task.abort();
            Ok(Vec::new())
        }
    }
}

async fn drain<R: AsyncRead + Unpin>(pipe: Option<R>) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

fn exit_status(status: ExitStatus) -> RunStatus {
    if let Some(code) = status.code() {
        return RunStatus::Exited(code);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() {
            return RunStatus::Signaled(sig);
        }
    }
    RunStatus::Exited(-1)
}
