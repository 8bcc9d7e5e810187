//! Background packet reader.
//!
//! Channel read side → reader thread → [`PacketHandler`].
//!
//! The thread waits on the inbound descriptor for at most one poll interval
//! at a time and checks the stop flag between waits, so [`ReaderTask::stop`]
//! returns within one interval when the channel is idle. The handler runs on
//! the reader thread; [`ReaderEvent`] senders forward packets to whichever
//! thread owns the UI.

use crate::channel::Channel;
use crate::error::{BridgeError, Result};
use crate::protocol::Packet;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Receives packets on the reader thread.
pub trait PacketHandler: Send + 'static {
    fn on_packet(&mut self, packet: Packet);

    /// Called exactly once, after the last packet.
    fn on_closed(&mut self, exit: ReaderExit) {
        let _ = exit;
    }
}

/// Why the reader thread exited.
#[derive(Debug)]
pub enum ReaderExit {
    /// `stop()` was requested.
    Stopped,
    /// The peer closed its end.
    EndOfStream,
    Failed(BridgeError),
}

/// Queue item for control-thread delivery.
#[derive(Debug)]
pub enum ReaderEvent {
    Packet(Packet),
    Closed(ReaderExit),
}

impl PacketHandler for Sender<ReaderEvent> {
    fn on_packet(&mut self, packet: Packet) {
        // Receiver gone means the owner is tearing down.
        let _ = self.send(ReaderEvent::Packet(packet));
    }

    fn on_closed(&mut self, exit: ReaderExit) {
        let _ = self.send(ReaderEvent::Closed(exit));
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    Created = 0,
    Running = 1,
    StopRequested = 2,
    Stopped = 3,
}

impl ReaderState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ReaderState::Created,
            1 => ReaderState::Running,
            2 => ReaderState::StopRequested,
            _ => ReaderState::Stopped,
        }
    }
}

/// Reader thread handle. Stops the thread when dropped.
pub struct ReaderTask {
    name: String,
    channel: Arc<Channel>,
    poll_interval: Duration,
    state: Arc<AtomicU8>,
    handler: Option<Box<dyn PacketHandler>>,
    thread_handle: Option<thread::JoinHandle<()>>,
    done: Option<Receiver<()>>,
}

impl ReaderTask {
    pub fn new(
        name: impl Into<String>,
        channel: Arc<Channel>,
        handler: impl PacketHandler,
        poll_interval: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            channel,
            poll_interval,
            state: Arc::new(AtomicU8::new(ReaderState::Created as u8)),
            handler: Some(Box::new(handler)),
            thread_handle: None,
            done: None,
        }
    }

    /// Create and start in one step.
    pub fn spawn(
        name: impl Into<String>,
        channel: Arc<Channel>,
        handler: impl PacketHandler,
        poll_interval: Duration,
    ) -> Result<Self> {
        let mut task = Self::new(name, channel, handler, poll_interval);
        task.start()?;
        Ok(task)
    }

    pub fn state(&self) -> ReaderState {
        ReaderState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_running(&self) -> bool {
        self.state() == ReaderState::Running
    }

    /// Start the thread. A task runs at most once.
    pub fn start(&mut self) -> Result<()> {
        if self
            .state
            .compare_exchange(
                ReaderState::Created as u8,
                ReaderState::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return Err(BridgeError::InvalidState(format!(
                "reader task '{}' cannot start from {:?}",
                self.name,
                self.state()
            )));
        }

        let handler = self.handler.take().ok_or_else(|| {
            BridgeError::InvalidState(format!("reader task '{}' has no handler", self.name))
        })?;
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        let channel = Arc::clone(&self.channel);
        let state = Arc::clone(&self.state);
        let interval = self.poll_interval;

        let spawned = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || {
                Self::reader_thread_main(channel, state, handler, interval);
                let _ = done_tx.send(());
            });

        match spawned {
            Ok(handle) => {
                self.thread_handle = Some(handle);
                self.done = Some(done_rx);
                tracing::debug!(name = %self.name, "Reader task started");
                Ok(())
            }
            Err(e) => {
                self.state
                    .store(ReaderState::Stopped as u8, Ordering::Release);
                Err(BridgeError::Io(e))
            }
        }
    }

    fn reader_thread_main(
        channel: Arc<Channel>,
        state: Arc<AtomicU8>,
        mut handler: Box<dyn PacketHandler>,
        interval: Duration,
    ) {
        let stop_requested =
            || state.load(Ordering::Acquire) == ReaderState::StopRequested as u8;

        let exit = loop {
            if stop_requested() {
                break ReaderExit::Stopped;
            }

            match channel.wait_readable(interval) {
                Ok(false) => continue,
                Ok(true) => {}
                Err(_) if stop_requested() => break ReaderExit::Stopped,
                Err(e) => break ReaderExit::Failed(e),
            }

            match channel.read(None) {
                Ok(Some(packet)) => handler.on_packet(packet),
                Ok(None) => break ReaderExit::EndOfStream,
                Err(_) if stop_requested() => break ReaderExit::Stopped,
                Err(e) => break ReaderExit::Failed(e),
            }
        };

        match &exit {
            ReaderExit::Failed(e) => tracing::warn!("Reader task failed: {}", e),
            other => tracing::debug!("Reader task exiting: {:?}", other),
        }

        state.store(ReaderState::Stopped as u8, Ordering::Release);
        handler.on_closed(exit);
    }

    /// Signal the thread to stop and wait for it.
    ///
    /// With `Some(timeout)` the wait gives up after `timeout` and the thread is
    /// detached; returns `false` in that case.
    pub fn stop(&mut self, join_timeout: Option<Duration>) -> bool {
        let _ = self.state.compare_exchange(
            ReaderState::Running as u8,
            ReaderState::StopRequested as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        let _ = self.state.compare_exchange(
            ReaderState::Created as u8,
            ReaderState::Stopped as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );

        let Some(handle) = self.thread_handle.take() else {
            return true;
        };

        if let (Some(timeout), Some(done)) = (join_timeout, self.done.as_ref()) {
            if let Err(RecvTimeoutError::Timeout) = done.recv_timeout(timeout) {
                tracing::warn!(
                    name = %self.name,
                    "Reader task did not stop within {}ms, detaching",
                    timeout.as_millis()
                );
                self.done = None;
                return false;
            }
        }

        self.done = None;
        if handle.join().is_err() {
            tracing::error!(name = %self.name, "Reader task panicked");
        }
        true
    }
}

impl Drop for ReaderTask {
    fn drop(&mut self) {
        self.stop(Some(self.poll_interval * 5));
    }
}
