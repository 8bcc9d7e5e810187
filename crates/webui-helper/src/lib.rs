//! Web view helper process
//!
//! Spawned by `webui-bridge` with two inherited pipe descriptors. Owns the
//! platform web view, applies host packets to it and reports page loads and
//! script messages back.
//!
//! This crate backs the `webui-helper` binary. Hosts talk to it through
//! `webui_bridge::HostBridge`.

pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod platform;

pub use config::HelperConfig;
pub use dispatcher::Dispatcher;
pub use engine::{EngineEvent, EventSender, WebViewEngine};
pub use error::{HelperError, Result};
pub use platform::{EngineCall, HeadlessEngine, PlatformEngine};

use nix::fcntl::{fcntl, FcntlArg, FdFlag};
use std::os::fd::{FromRawFd, OwnedFd, RawFd};
use std::sync::Arc;
use tracing::info;
use webui_bridge::{BridgeError, Channel, ReaderTask};

/// Serve the host over the descriptors named in `config` with the engine
/// compiled for this platform.
pub fn run(config: HelperConfig) -> Result<()> {
    let read_fd = adopt_fd(config.read_fd, "read_fd")?;
    let write_fd = adopt_fd(config.write_fd, "write_fd")?;
    let channel = Arc::new(Channel::open(read_fd, write_fd));
    serve(channel, &config, PlatformEngine::new)
}

/// Serve the host over an open channel until it hangs up or the engine's
/// window goes away. The channel is closed on return.
pub fn serve<E, F>(channel: Arc<Channel>, config: &HelperConfig, make_engine: F) -> Result<()>
where
    E: WebViewEngine,
    F: FnOnce(EventSender) -> Result<E>,
{
    let (packet_tx, packet_rx) = crossbeam_channel::unbounded();
    let mut reader = ReaderTask::spawn(
        "webui-helper-reader",
        Arc::clone(&channel),
        packet_tx,
        config.poll_interval,
    )?;

    let (event_tx, event_rx) = crossbeam_channel::unbounded();
    let result = make_engine(event_tx).and_then(|engine| {
        let mut dispatcher = Dispatcher::new(engine, Arc::clone(&channel));
        dispatcher.install_defaults()?;
        info!("Helper ready");
        dispatcher.run(&packet_rx, &event_rx, config.pump_interval)
    });

    reader.stop(Some(config.poll_interval * 5));
    channel.close();
    result
}

fn adopt_fd(fd: RawFd, what: &str) -> Result<OwnedFd> {
    if fcntl(fd, FcntlArg::F_GETFD).is_err() {
        return Err(HelperError::InvalidArguments(format!(
            "{what} {fd} is not an open descriptor"
        )));
    }
    // Web engine subprocesses must not hold the host's pipes open.
    fcntl(fd, FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC)).map_err(BridgeError::from)?;
    // SAFETY: the descriptor is open and was handed to this process for its
    // exclusive use; nothing else in the helper refers to it.
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}
