//! Helper process configuration, parsed from the command line.

use crate::error::{HelperError, Result};
use std::os::fd::RawFd;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelperConfig {
    /// Inherited descriptor carrying host -> helper packets.
    pub read_fd: RawFd,
    /// Inherited descriptor carrying helper -> host packets.
    pub write_fd: RawFd,
    pub poll_interval: Duration,
    /// Control loop wake-up when neither side has traffic.
    pub pump_interval: Duration,
}

impl HelperConfig {
    pub fn new(read_fd: RawFd, write_fd: RawFd) -> Self {
        Self {
            read_fd,
            write_fd,
            poll_interval: Duration::from_millis(100),
            pump_interval: Duration::from_millis(16),
        }
    }

    /// `<read_fd> <write_fd>`, program name already stripped.
    pub fn from_args<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut args = args.into_iter();
        let read_fd = parse_fd(args.next(), "read_fd")?;
        let write_fd = parse_fd(args.next(), "write_fd")?;
        if read_fd == write_fd {
            return Err(HelperError::InvalidArguments(format!(
                "read_fd and write_fd are both {read_fd}"
            )));
        }
        Ok(Self::new(read_fd, write_fd))
    }
}

fn parse_fd<S: AsRef<str>>(arg: Option<S>, name: &str) -> Result<RawFd> {
    let arg = arg.ok_or_else(|| HelperError::InvalidArguments(format!("missing {name}")))?;
    let fd: RawFd = arg.as_ref().trim().parse().map_err(|_| {
        HelperError::InvalidArguments(format!("{name} is not a number: {:?}", arg.as_ref()))
    })?;
    // 0-2 are stdio.
    if fd < 3 {
        return Err(HelperError::InvalidArguments(format!(
            "{name} {fd} is a standard stream"
        )));
    }
    Ok(fd)
}
