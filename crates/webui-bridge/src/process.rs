//! Helper subprocess lifecycle.
//!
//! Two anonymous pipes connect host and helper:
//!
//! - pipe A: host writes, helper reads
//! - pipe B: helper writes, host reads
//!
//! The helper receives its two descriptor numbers as decimal arguments. All
//! four ends are created close-on-exec; only the forked helper clears the
//! flag on its own two, so no other child of the host inherits any of them.

use crate::channel::{cloexec_pipe, Channel};
use crate::error::{BridgeError, Result};
use nix::errno::Errno;
use nix::fcntl::{fcntl, FcntlArg, FdFlag};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus};
use std::thread;
use std::time::{Duration, Instant};

const EXIT_POLL: Duration = Duration::from_millis(10);

/// Owned helper process. Killed on drop if still running.
#[derive(Debug)]
pub struct HelperProcess {
    child: Option<Child>,
    path: PathBuf,
}

impl HelperProcess {
    /// Create both pipes, start the helper and return the host channel.
    pub fn spawn(path: &Path) -> Result<(Self, Channel)> {
        let (helper_read, host_write) = cloexec_pipe()?;
        let (host_read, helper_write) = cloexec_pipe()?;
        let inherited = [helper_read.as_raw_fd(), helper_write.as_raw_fd()];

        let mut command = Command::new(path);
        command
            .arg(inherited[0].to_string())
            .arg(inherited[1].to_string());
        // SAFETY: runs in the forked child before exec and only calls fcntl,
        // which is async-signal-safe.
        unsafe {
            command.pre_exec(move || keep_across_exec(&inherited));
        }

        let child = command
            .spawn()
            .map_err(|source| BridgeError::SpawnFailed {
                path: path.to_path_buf(),
                source,
            })?;

        // The helper holds its own copies now.
        drop(helper_read);
        drop(helper_write);

        tracing::info!(pid = child.id(), path = %path.display(), "Spawned web view helper");

        let process = Self {
            child: Some(child),
            path: path.to_path_buf(),
        };
        Ok((process, Channel::open(host_read, host_write)))
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_running(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// SIGTERM, wait up to `timeout`, then SIGKILL.
    pub fn terminate(&mut self, timeout: Duration) -> Result<Option<ExitStatus>> {
        let Some(mut child) = self.child.take() else {
            return Ok(None);
        };

        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }

        let pid = Pid::from_raw(child.id() as i32);
        match kill(pid, Signal::SIGTERM) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(e) => tracing::warn!(%pid, "Failed to send SIGTERM to helper: {}", e),
        }

        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = child.try_wait()? {
                tracing::debug!(%pid, ?status, "Helper exited");
                return Ok(Some(status));
            }
            if Instant::now() >= deadline {
                break;
            }
            thread::sleep(EXIT_POLL);
        }

        tracing::warn!(
            %pid,
            "Helper ignored SIGTERM for {}ms, sending SIGKILL",
            timeout.as_millis()
        );
        match child.kill() {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => {}
            Err(e) => return Err(e.into()),
        }
        Ok(Some(child.wait()?))
    }
}

impl Drop for HelperProcess {
    fn drop(&mut self) {
        if let Some(mut process) = self.child.take() {
            let _ = process.kill();
            let _ = process.wait();
        }
    }
}

fn keep_across_exec(fds: &[RawFd]) -> std::io::Result<()> {
    for &fd in fds {
        fcntl(fd, FcntlArg::F_SETFD(FdFlag::empty()))?;
    }
    Ok(())
}
