//! Process-tree termination
//!
//! A script may fork helpers of its own. Killing only the direct child would
//! leave those running, so the child is launched as the root of a unit that
//! can be killed as a whole. On Unix that unit is a process group.

use std::io;
use tokio::process::{Child, Command};

/// Capability for launching a child as a killable tree and killing that tree
pub trait ProcessTreeTerminator: Send + Sync {
    /// Arrange for the command to start as the root of its own tree
    fn isolate(&self, cmd: &mut Command);

    /// Forcefully kill the tree rooted at `root_pid`.
    ///
    /// A tree that is already gone is not an error.
    fn terminate(&self, child: &mut Child, root_pid: u32) -> io::Result<()>;
}

/// Kills the child's whole process group with SIGKILL
#[cfg(unix)]
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessGroupTerminator;

#[cfg(unix)]
impl ProcessTreeTerminator for ProcessGroupTerminator {
    fn isolate(&self, cmd: &mut Command) {
        // pgid == child pid
        cmd.process_group(0);
    }

    fn terminate(&self, child: &mut Child, root_pid: u32) -> io::Result<()> {
        use nix::errno::Errno;
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        let pgid = i32::try_from(root_pid)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;

        match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(errno) => return Err(io::Error::from(errno)),
        }

        // The group kill already covers the child; this only matters if it
        // somehow left its group.
        let _ = child.start_kill();
        Ok(())
    }
}

/// Fallback for platforms without process groups: kills the direct child only
#[cfg(not(unix))]
#[derive(Debug, Default, Clone, Copy)]
pub struct ChildOnlyTerminator;

#[cfg(not(unix))]
impl ProcessTreeTerminator for ChildOnlyTerminator {
    fn isolate(&self, _cmd: &mut Command) {}

    fn terminate(&self, child: &mut Child, _root_pid: u32) -> io::Result<()> {
        match child.start_kill() {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Terminator appropriate for the current OS
pub fn platform_terminator() -> Box<dyn ProcessTreeTerminator> {
    #[cfg(unix)]
    {
        Box::new(ProcessGroupTerminator)
    }
    #[cfg(not(unix))]
    {
        Box::new(ChildOnlyTerminator)
    }
}
