//! Pipe transport
//!
//! A [`Channel`] owns one inbound and one outbound descriptor and moves whole
//! [`Packet`]s over them. The read and write halves are locked independently
//! so the reader thread never contends with the control thread.

use crate::error::{BridgeError, Result};
use crate::protocol::{encode_frame, Packet};
use nix::errno::Errno;
#[cfg(not(target_vendor = "apple"))]
use nix::fcntl::OFlag;
#[cfg(target_vendor = "apple")]
use nix::fcntl::{fcntl, FcntlArg, FdFlag};
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use parking_lot::Mutex;
use std::fs::File;
use std::io::Write;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd, RawFd};
use std::time::{Duration, Instant};

pub struct Channel {
    reader: Mutex<Option<File>>,
    writer: Mutex<Option<File>>,
}

impl Channel {
    /// Take ownership of a read descriptor and a write descriptor.
    pub fn open(read_fd: OwnedFd, write_fd: OwnedFd) -> Self {
        Self {
            reader: Mutex::new(Some(File::from(read_fd))),
            writer: Mutex::new(Some(File::from(write_fd))),
        }
    }

    /// Two channels connected back to back over a fresh pair of pipes.
    pub fn pipe() -> Result<(Self, Self)> {
        let (a_read, a_write) = cloexec_pipe()?;
        let (b_read, b_write) = cloexec_pipe()?;
        Ok((Self::open(b_read, a_write), Self::open(a_read, b_write)))
    }

    /// Write one packet. Loops over partial writes; returns the frame size.
    pub fn write(&self, opcode: u16, payload: &[u8]) -> Result<usize> {
        let frame = encode_frame(opcode, payload)?;
        let mut guard = self.writer.lock();
        let file = guard.as_mut().ok_or(BridgeError::ChannelClosed)?;
        file.write_all(&frame)?;
        Ok(frame.len())
    }

    pub fn write_packet(&self, packet: &Packet) -> Result<usize> {
        self.write(packet.opcode, &packet.payload)
    }

    /// Read one packet.
    ///
    /// With `timeout == None` this blocks until a whole packet has arrived.
    /// With a timeout it first waits for the descriptor to become readable and
    /// returns [`BridgeError::Timeout`] if it does not; once data is present
    /// the full packet is read blocking, so a partial packet is never dropped.
    ///
    /// `Ok(None)` means the peer closed its end at a packet boundary.
    pub fn read(&self, timeout: Option<Duration>) -> Result<Option<Packet>> {
        let mut guard = self.reader.lock();
        let file = guard.as_mut().ok_or(BridgeError::ChannelClosed)?;
        if let Some(timeout) = timeout {
            if !poll_readable(file.as_fd(), timeout)? {
                return Err(BridgeError::Timeout {
                    operation: "read packet".to_string(),
                    duration_ms: timeout.as_millis() as u64,
                });
            }
        }
        Packet::decode(file)
    }

    /// Wait up to `timeout` for inbound data or hang-up.
    pub fn wait_readable(&self, timeout: Duration) -> Result<bool> {
        let guard = self.reader.lock();
        let file = guard.as_ref().ok_or(BridgeError::ChannelClosed)?;
        poll_readable(file.as_fd(), timeout)
    }

    /// Release both descriptors. Safe to call more than once.
    pub fn close(&self) {
        let reader = self.reader.lock().take();
        let writer = self.writer.lock().take();
        if reader.is_some() || writer.is_some() {
            tracing::debug!("Channel closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.reader.lock().is_none() && self.writer.lock().is_none()
    }

    pub fn read_fd(&self) -> Option<RawFd> {
        self.reader.lock().as_ref().map(|f| f.as_raw_fd())
    }

    pub fn write_fd(&self) -> Option<RawFd> {
        self.writer.lock().as_ref().map(|f| f.as_raw_fd())
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("read_fd", &self.read_fd())
            .field("write_fd", &self.write_fd())
            .finish()
    }
}

/// Pipe whose ends are never inherited by a child process.
#[cfg(not(target_vendor = "apple"))]
pub(crate) fn cloexec_pipe() -> Result<(OwnedFd, OwnedFd)> {
    Ok(nix::unistd::pipe2(OFlag::O_CLOEXEC)?)
}

/// No `pipe2` here, so a fork on another thread can still slip in before
/// the flag is set.
#[cfg(target_vendor = "apple")]
pub(crate) fn cloexec_pipe() -> Result<(OwnedFd, OwnedFd)> {
    let (read, write) = nix::unistd::pipe()?;
    for fd in [&read, &write] {
        fcntl(fd.as_raw_fd(), FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC))?;
    }
    Ok((read, write))
}

/// Hang-up and error count as readable: the following read reports them.
/// An interrupted wait resumes with the time left.
fn poll_readable(fd: BorrowedFd<'_>, timeout: Duration) -> Result<bool> {
    let start = Instant::now();
    loop {
        let remaining = timeout.saturating_sub(start.elapsed());
        let ms = PollTimeout::try_from(poll_millis(remaining)).unwrap_or(PollTimeout::MAX);
        let mut fds = [PollFd::new(fd, PollFlags::POLLIN)];
        match poll(&mut fds, ms) {
            Ok(0) => return Ok(false),
            Ok(_) => {
                let revents = fds[0].revents().unwrap_or(PollFlags::empty());
                if revents.contains(PollFlags::POLLNVAL) {
                    return Err(BridgeError::ChannelClosed);
                }
                return Ok(revents
                    .intersects(PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR));
            }
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

/// Single waits are capped at `i32::MAX` ms, about 24 days.
fn poll_millis(timeout: Duration) -> i32 {
    i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX)
}
