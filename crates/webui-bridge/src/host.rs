//! Host-side web view bridge.
//!
//! Runs in the plugin process. Owns the helper process and the host end of
//! the channel, turns UI operations into packets and turns inbound packets
//! into [`BridgeHandler`] callbacks.
//!
//! Operations are fire-and-forget: failures are logged and never reach the
//! caller, so a broken helper leaves the UI blank without disturbing the
//! audio side. Inbound traffic is queued by the reader thread and delivered
//! from [`HostBridge::idle`], which the plugin calls from its UI timer.

use crate::args::{to_json_array, Argument, ArgumentList};
use crate::channel::Channel;
use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::handler::{BridgeHandler, ConsoleLevel};
use crate::process::HelperProcess;
use crate::protocol::{
    HelperMessage, HostMessage, KeyEvent, Packet, ScriptMessage, CONSOLE_CHANNEL,
};
use crate::reader::{ReaderEvent, ReaderExit, ReaderTask};
use crate::scripts;
use crossbeam_channel::Receiver;
use std::sync::Arc;
use std::time::Duration;

const READER_THREAD_NAME: &str = "webui-host-reader";

/// Cap on queued scripts and key events, and on `post_message` calls held
/// back until the document is ready.
pub const QUEUE_LIMIT: usize = 256;

/// Helper connection, present between realize and teardown.
struct Connection {
    process: Option<HelperProcess>,
    channel: Arc<Channel>,
    reader: ReaderTask,
    events: Receiver<ReaderEvent>,
}

/// Host end of the web view bridge.
///
/// The helper is started lazily by the first [`reparent`](Self::reparent)
/// (or an explicit [`realize`](Self::realize)). Messages issued before that
/// are kept and delivered in order once the helper is up.
pub struct HostBridge {
    config: BridgeConfig,
    handler: Arc<dyn BridgeHandler>,
    connection: Option<Connection>,
    backlog: Vec<HostMessage>,
    init_queue: Vec<ArgumentList>,
    document_ready: bool,
    helper_lost: bool,
    size: (u32, u32),
    parent: Option<u64>,
    // Replayed into the next helper after a loss.
    handlers: Vec<String>,
    injected: Vec<String>,
    background: Option<u32>,
    position: Option<(i32, i32)>,
    url: Option<String>,
}

// =============================================================================
// Lifecycle
// =============================================================================

impl HostBridge {
    pub fn new(config: BridgeConfig, handler: impl BridgeHandler + 'static) -> Self {
        let size = config.initial_size;
        Self {
            config,
            handler: Arc::new(handler),
            connection: None,
            backlog: Vec::new(),
            init_queue: Vec::new(),
            document_ready: false,
            helper_lost: false,
            size,
            parent: None,
            handlers: Vec::new(),
            injected: Vec::new(),
            background: None,
            position: None,
            url: None,
        }
    }

    /// Bridge over an already connected channel, without a helper process.
    pub fn from_channel(
        config: BridgeConfig,
        handler: impl BridgeHandler + 'static,
        channel: Channel,
    ) -> Result<Self> {
        let mut bridge = Self::new(config, handler);
        bridge.attach(channel, None)?;
        Ok(bridge)
    }

    /// Spawn the helper if it is not running yet.
    pub fn realize(&mut self) -> Result<()> {
        if self.connection.is_some() {
            return Ok(());
        }
        let path = self.config.resolve_helper_path()?;
        let (process, channel) = HelperProcess::spawn(&path)?;
        self.attach(channel, Some(process))
    }

    fn attach(&mut self, channel: Channel, process: Option<HelperProcess>) -> Result<()> {
        let channel = Arc::new(channel);
        let (tx, events) = crossbeam_channel::unbounded();
        let reader = ReaderTask::spawn(
            READER_THREAD_NAME,
            Arc::clone(&channel),
            tx,
            self.config.poll_interval(),
        )?;

        self.connection = Some(Connection {
            process,
            channel,
            reader,
            events,
        });
        self.helper_lost = false;

        let backlog = std::mem::take(&mut self.backlog);
        tracing::debug!(queued = backlog.len(), "Helper connected, flushing backlog");
        for msg in backlog {
            self.send(msg);
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.connection.is_some()
    }

    pub fn is_document_ready(&self) -> bool {
        self.document_ready
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    pub fn parent(&self) -> Option<u64> {
        self.parent
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Messages waiting for the helper to connect.
    pub fn pending(&self) -> usize {
        self.backlog.len()
    }

    /// `post_message` calls waiting for the document.
    pub fn pending_posts(&self) -> usize {
        self.init_queue.len()
    }

    pub fn helper_pid(&self) -> Option<u32> {
        self.connection
            .as_ref()
            .and_then(|c| c.process.as_ref())
            .and_then(HelperProcess::pid)
    }

    /// Stop the helper and release the channel.
    ///
    /// Order: terminate the helper, stop the reader, close the channel. The
    /// reader then sees end of stream instead of a descriptor closed under it.
    pub fn terminate(&mut self) {
        let Some(mut connection) = self.connection.take() else {
            return;
        };

        if let Some(mut process) = connection.process.take() {
            match process.terminate(self.config.terminate_timeout()) {
                Ok(status) => tracing::debug!(?status, "Helper terminated"),
                Err(e) => tracing::error!("Failed to terminate helper: {}", e),
            }
        }

        if !connection
            .reader
            .stop(Some(self.config.reader_join_timeout()))
        {
            tracing::warn!("Host reader did not stop in time");
        }
        connection.channel.close();
        self.document_ready = false;
    }
}

impl Drop for HostBridge {
    fn drop(&mut self) {
        self.terminate();
    }
}

// =============================================================================
// Operations
// =============================================================================

impl HostBridge {
    pub fn navigate(&mut self, url: &str) {
        self.document_ready = false;
        self.url = Some(url.to_string());
        self.send(HostMessage::Navigate {
            url: url.to_string(),
        });
    }

    /// Embed into `window`. Starts the helper on first use.
    pub fn reparent(&mut self, window: u64) {
        self.parent = Some(window);
        if let Err(e) = self.realize() {
            tracing::error!("Web view helper unavailable: {}", e);
            return;
        }
        self.send(HostMessage::Reparent { window });
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.size = (width, height);
        self.send(HostMessage::Resize { width, height });
    }

    pub fn run_script(&mut self, source: &str) {
        self.send(HostMessage::RunScript {
            source: source.to_string(),
        });
    }

    /// Run `source` at document start on every subsequent navigation.
    pub fn inject_script(&mut self, source: &str) {
        if !self.injected.iter().any(|s| s == source) {
            self.injected.push(source.to_string());
        }
        self.send(HostMessage::InjectScript {
            source: source.to_string(),
        });
    }

    pub fn add_script_message_handler(&mut self, name: &str) {
        if !self.handlers.iter().any(|n| n == name) {
            self.handlers.push(name.to_string());
        }
        self.send(HostMessage::AddScriptMessageHandler {
            name: name.to_string(),
        });
    }

    /// `rgba` is 0xRRGGBBAA.
    pub fn set_background_color(&mut self, rgba: u32) {
        self.config.background_color = rgba;
        self.background = Some(rgba);
        self.send(HostMessage::SetBackgroundColor { rgba });
    }

    pub fn set_position(&mut self, x: i32, y: i32) {
        self.position = Some((x, y));
        self.send(HostMessage::SetPosition { x, y });
    }

    pub fn send_key_event(&mut self, pressed: bool, code: u32, hw_code: u32, modifiers: u32) {
        self.send(HostMessage::KeyEvent(KeyEvent {
            pressed,
            code,
            hw_code,
            modifiers,
        }));
    }

    /// Deliver `args` to page listeners of `window.webviewHost`.
    ///
    /// Held back until the document is ready, up to [`QUEUE_LIMIT`] calls.
    pub fn post_message(&mut self, args: &[Argument]) {
        if !self.document_ready {
            if self.init_queue.len() >= QUEUE_LIMIT {
                tracing::debug!("Init queue full, dropping post_message");
                return;
            }
            self.init_queue.push(args.iter().cloned().collect());
            return;
        }
        if self.config.print_traffic {
            tracing::info!("host -> web : {}", to_json_array(args));
        }
        self.run_script(&scripts::post_message_script(args));
    }

    pub fn add_stylesheet(&mut self, css: &str) {
        self.run_script(&scripts::add_stylesheet_script(css));
    }

    fn send(&mut self, msg: HostMessage) {
        let Some(connection) = self.connection.as_ref() else {
            self.queue(msg);
            return;
        };

        if self.config.print_traffic {
            tracing::info!("host -> helper : {:?}", msg);
        }

        let result = msg
            .to_packet()
            .and_then(|packet| connection.channel.write_packet(&packet));

        match result {
            Ok(_) => {}
            Err(e) if e.is_fatal() => {
                tracing::error!(opcode = ?msg.opcode(), "Helper channel failed: {}", e);
                self.lose_helper();
            }
            Err(e) => tracing::warn!(opcode = ?msg.opcode(), "Dropped message: {}", e),
        }
    }

    /// Backlog keeps only the latest of each setting. Handlers and injected
    /// scripts are kept once each; scripts and key events up to [`QUEUE_LIMIT`].
    fn queue(&mut self, msg: HostMessage) {
        match &msg {
            HostMessage::AddScriptMessageHandler { .. } | HostMessage::InjectScript { .. } => {
                if self.backlog.contains(&msg) {
                    return;
                }
            }
            HostMessage::RunScript { .. } | HostMessage::KeyEvent(_) => {
                let transient = self.backlog.iter().filter(|m| is_transient(m)).count();
                if transient >= QUEUE_LIMIT {
                    tracing::debug!(opcode = ?msg.opcode(), "Backlog full, dropping message");
                    return;
                }
            }
            _ => {
                let opcode = msg.opcode();
                self.backlog.retain(|m| m.opcode() != opcode);
            }
        }
        self.backlog.push(msg);
    }

    /// Tear down and rebuild the backlog from the page state, so the next
    /// helper shows the same page. Pending posts targeted the lost document.
    fn lose_helper(&mut self) {
        self.terminate();
        self.helper_lost = true;
        self.init_queue.clear();
        self.backlog = self.replay_state();
    }

    fn replay_state(&self) -> Vec<HostMessage> {
        let mut messages: Vec<HostMessage> = self
            .handlers
            .iter()
            .map(|name| HostMessage::AddScriptMessageHandler { name: name.clone() })
            .collect();
        messages.extend(
            self.injected
                .iter()
                .map(|source| HostMessage::InjectScript {
                    source: source.clone(),
                }),
        );
        if let Some(rgba) = self.background {
            messages.push(HostMessage::SetBackgroundColor { rgba });
        }
        let (width, height) = self.size;
        messages.push(HostMessage::Resize { width, height });
        if let Some((x, y)) = self.position {
            messages.push(HostMessage::SetPosition { x, y });
        }
        if let Some(url) = &self.url {
            messages.push(HostMessage::Navigate { url: url.clone() });
        }
        messages
    }
}

fn is_transient(msg: &HostMessage) -> bool {
    matches!(msg, HostMessage::RunScript { .. } | HostMessage::KeyEvent(_))
}

// =============================================================================
// Inbound dispatch
// =============================================================================

impl HostBridge {
    /// Deliver everything the helper sent since the last call.
    ///
    /// Call periodically from the UI thread. Returns the number of events
    /// processed.
    pub fn idle(&mut self) -> usize {
        let pending: Vec<ReaderEvent> = match self.connection.as_ref() {
            Some(connection) => connection.events.try_iter().collect(),
            None => Vec::new(),
        };
        let count = pending.len();
        for event in pending {
            self.dispatch(event);
        }
        self.report_helper_lost();
        count
    }

    /// Wait up to `timeout` for the first event, then behave like [`idle`](Self::idle).
    pub fn idle_timeout(&mut self, timeout: Duration) -> usize {
        let first = self
            .connection
            .as_ref()
            .and_then(|c| c.events.recv_timeout(timeout).ok());
        match first {
            Some(event) => {
                self.dispatch(event);
                1 + self.idle()
            }
            None => self.idle(),
        }
    }

    fn dispatch(&mut self, event: ReaderEvent) {
        match event {
            ReaderEvent::Packet(packet) => {
                if self.connection.is_some() {
                    self.handle_packet(packet);
                }
            }
            ReaderEvent::Closed(ReaderExit::Stopped) => {}
            ReaderEvent::Closed(exit) => {
                match exit {
                    ReaderExit::Failed(e) => tracing::error!("Lost web view helper: {}", e),
                    _ => tracing::warn!("Web view helper closed the channel"),
                }
                self.lose_helper();
            }
        }
    }

    fn handle_packet(&mut self, packet: Packet) {
        let msg = match HelperMessage::from_packet(&packet) {
            Ok(msg) => msg,
            Err(BridgeError::UnknownOpcode(opcode)) => {
                tracing::debug!(opcode, "Ignoring unknown opcode");
                return;
            }
            Err(e) => {
                tracing::warn!(opcode = packet.opcode, "Dropped malformed packet: {}", e);
                return;
            }
        };

        match msg {
            HelperMessage::LoadFinished => self.handle_load_finished(),
            HelperMessage::ScriptMessageReceived(msg) => self.handle_script_message(msg),
        }
    }

    fn handle_load_finished(&mut self) {
        tracing::debug!("Document ready");
        // Some hosts and engines lose the size set before the page loaded.
        let (width, height) = self.size;
        self.send(HostMessage::Resize { width, height });
        if !self.is_running() {
            return;
        }

        self.document_ready = true;
        for args in std::mem::take(&mut self.init_queue) {
            self.post_message(&args);
            if !self.is_running() {
                return;
            }
        }

        let handler = Arc::clone(&self.handler);
        handler.on_document_ready(self);
    }

    fn handle_script_message(&mut self, msg: ScriptMessage) {
        if msg.name == CONSOLE_CHANNEL {
            self.handle_console(&msg.args);
            return;
        }

        if self.config.print_traffic {
            tracing::info!("web -> host : {} {}", msg.name, to_json_array(&msg.args));
        }
        let handler = Arc::clone(&self.handler);
        handler.on_script_message(self, &msg.name, &msg.args);
    }

    fn handle_console(&mut self, args: &[Argument]) {
        let text = match args.first() {
            Some(Argument::String(s)) => s.clone(),
            Some(other) => other.to_json().to_string(),
            None => String::new(),
        };
        let level = args
            .get(1)
            .and_then(Argument::as_str)
            .map(ConsoleLevel::from_name)
            .unwrap_or(ConsoleLevel::Log);

        match level {
            ConsoleLevel::Log | ConsoleLevel::Info => tracing::info!(target: "webui::console", "{}", text),
            ConsoleLevel::Warn => tracing::warn!(target: "webui::console", "{}", text),
            ConsoleLevel::Error => tracing::error!(target: "webui::console", "{}", text),
        }

        let handler = Arc::clone(&self.handler);
        handler.on_console(self, level, &text);
    }

    fn report_helper_lost(&mut self) {
        if std::mem::take(&mut self.helper_lost) {
            let handler = Arc::clone(&self.handler);
            handler.on_helper_lost(self);
        }
    }
}
