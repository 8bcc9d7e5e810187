//! Helper-side dispatcher - runs in the helper process
//!
//! Applies host packets to the web view engine and reports engine events
//! back to the host. Everything here runs on the helper's control thread;
//! the reader thread only queues packets.

use crate::engine::{EngineEvent, WebViewEngine};
use crate::error::{HelperError, Result};
use crossbeam_channel::{select, Receiver};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use webui_bridge::{
    scripts, BridgeError, Channel, HelperMessage, HostMessage, Packet, ReaderEvent, ReaderExit,
};

pub struct Dispatcher<E: WebViewEngine> {
    engine: E,
    channel: Arc<Channel>,
}

impl<E: WebViewEngine> Dispatcher<E> {
    pub fn new(engine: E, channel: Arc<Channel>) -> Self {
        Self { engine, channel }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    /// Console shim, context menu and host object at document start, plus
    /// the console and host message handlers.
    pub fn install_defaults(&mut self) -> Result<()> {
        self.engine
            .inject_script(&scripts::document_start_script())?;
        for name in scripts::DEFAULT_MESSAGE_HANDLERS {
            self.engine.add_script_message_handler(name)?;
        }
        Ok(())
    }

    // =========================================================================
    // Host -> engine
    // =========================================================================

    /// Decode and apply one packet. Bad packets are logged and dropped.
    pub fn handle_packet(&mut self, packet: &Packet) {
        let msg = match HostMessage::from_packet(packet) {
            Ok(msg) => msg,
            Err(BridgeError::UnknownOpcode(opcode)) => {
                debug!(opcode, "Ignoring unknown opcode");
                return;
            }
            Err(e) => {
                warn!(opcode = packet.opcode, "Dropped malformed packet: {}", e);
                return;
            }
        };

        let opcode = msg.opcode();
        if let Err(e) = self.apply(msg) {
            warn!(?opcode, "Engine call failed: {}", e);
        }
    }

    pub fn apply(&mut self, msg: HostMessage) -> Result<()> {
        match msg {
            HostMessage::Navigate { url } => {
                debug!(url = %url, "Navigate");
                self.engine.load_url(&url)
            }

            HostMessage::Reparent { window } => match self.engine.reparent(window) {
                Err(e) if e.is_unsupported() => {
                    warn!("{}; keeping a top-level window", e);
                    self.engine.show_toplevel()
                }
                other => other,
            },

            HostMessage::Resize { width, height } => self.engine.set_size(width, height),

            HostMessage::RunScript { source } => self.engine.run_script(&source),

            HostMessage::InjectScript { source } => self.engine.inject_script(&source),

            HostMessage::AddScriptMessageHandler { name } => {
                self.engine.add_script_message_handler(&name)
            }

            HostMessage::SetBackgroundColor { rgba } => self.engine.set_background_color(rgba),

            HostMessage::SetPosition { x, y } => self.engine.set_position(x, y),

            HostMessage::KeyEvent(key) => self.engine.key_event(&key),
        }
    }

    // =========================================================================
    // Engine -> host
    // =========================================================================

    pub fn handle_event(&mut self, event: EngineEvent) -> Result<()> {
        match event {
            EngineEvent::LoadFinished => {
                // Stylesheets do not survive navigation.
                if let Err(e) = self.engine.run_script(&scripts::load_finished_script()) {
                    warn!("Failed to apply default stylesheet: {}", e);
                }
                self.send(HelperMessage::LoadFinished)
            }
            EngineEvent::ScriptMessage(msg) => {
                self.send(HelperMessage::ScriptMessageReceived(msg))
            }
        }
    }

    fn send(&self, msg: HelperMessage) -> Result<()> {
        let packet = msg.to_packet()?;
        self.channel.write_packet(&packet)?;
        Ok(())
    }

    // =========================================================================
    // Control loop
    // =========================================================================

    /// Serve until the host closes the channel or the engine window is gone.
    pub fn run(
        &mut self,
        packets: &Receiver<ReaderEvent>,
        events: &Receiver<EngineEvent>,
        pump_interval: Duration,
    ) -> Result<()> {
        loop {
            select! {
                recv(packets) -> msg => match msg {
                    Ok(ReaderEvent::Packet(packet)) => self.handle_packet(&packet),
                    Ok(ReaderEvent::Closed(ReaderExit::Failed(e))) => return Err(e.into()),
                    Ok(ReaderEvent::Closed(_)) | Err(_) => {
                        info!("Host closed the channel");
                        return Ok(());
                    }
                },
                recv(events) -> event => match event {
                    Ok(event) => {
                        match self.handle_event(event) {
                            Ok(()) => {}
                            Err(HelperError::Bridge(e)) if e.is_fatal() => {
                                info!("Host hung up: {}", e);
                                return Ok(());
                            }
                            Err(e) => warn!("Failed to report engine event: {}", e),
                        }
                    }
                    Err(_) => {
                        info!("Engine event source gone");
                        return Ok(());
                    }
                },
                default(pump_interval) => {}
            }

            if !self.engine.pump() {
                info!("Web view window destroyed");
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{EngineCall, HeadlessEngine};
    use webui_bridge::{Argument, KeyEvent, Opcode, CONSOLE_CHANNEL};

    fn setup() -> (
        Dispatcher<HeadlessEngine>,
        Receiver<EngineEvent>,
        Channel,
    ) {
        let (host, helper) = Channel::pipe().unwrap();
        let (tx, rx) = crossbeam_channel::unbounded();
        let engine = HeadlessEngine::new(tx).unwrap();
        (Dispatcher::new(engine, Arc::new(helper)), rx, host)
    }

    fn packet(msg: HostMessage) -> Packet {
        msg.to_packet().unwrap()
    }

    #[test]
    fn test_install_defaults() {
        let (mut dispatcher, _rx, _host) = setup();
        dispatcher.install_defaults().unwrap();
        let calls = dispatcher.engine().calls();
        assert!(matches!(&calls[0], EngineCall::InjectScript(js) if js.contains("window.console")));
        assert_eq!(
            calls[1],
            EngineCall::AddScriptMessageHandler(CONSOLE_CHANNEL.to_string())
        );
        assert_eq!(calls[2], EngineCall::AddScriptMessageHandler("host".to_string()));
    }

    #[test]
    fn test_dispatch_table() {
        let (mut dispatcher, _rx, _host) = setup();
        let key = KeyEvent {
            pressed: false,
            code: 13,
            hw_code: 36,
            modifiers: 0,
        };
        for msg in [
            HostMessage::Navigate {
                url: "file:///ui/index.html".into(),
            },
            HostMessage::Resize {
                width: 300,
                height: 200,
            },
            HostMessage::RunScript {
                source: "go()".into(),
            },
            HostMessage::InjectScript {
                source: "early()".into(),
            },
            HostMessage::AddScriptMessageHandler {
                name: "meter".into(),
            },
            HostMessage::SetBackgroundColor { rgba: 0x2020_20ff },
            HostMessage::SetPosition { x: 3, y: 4 },
            HostMessage::KeyEvent(key),
        ] {
            dispatcher.handle_packet(&packet(msg));
        }

        assert_eq!(
            dispatcher.engine_mut().take_calls(),
            vec![
                EngineCall::LoadUrl("file:///ui/index.html".into()),
                EngineCall::SetSize(300, 200),
                EngineCall::RunScript("go()".into()),
                EngineCall::InjectScript("early()".into()),
                EngineCall::AddScriptMessageHandler("meter".into()),
                EngineCall::SetBackgroundColor(0x2020_20ff),
                EngineCall::SetPosition(3, 4),
                EngineCall::Key(key),
            ]
        );
    }

    #[test]
    fn test_reparent_falls_back_to_toplevel() {
        let (mut dispatcher, _rx, _host) = setup();
        dispatcher.handle_packet(&packet(HostMessage::Reparent { window: 0x3a00007 }));
        assert_eq!(
            dispatcher.engine().calls(),
            &[EngineCall::Reparent(0x3a00007), EngineCall::ShowToplevel]
        );
    }

    #[test]
    fn test_bad_packets_ignored() {
        let (mut dispatcher, _rx, _host) = setup();
        dispatcher.handle_packet(&Packet {
            opcode: 0x1234,
            payload: vec![1, 2],
        });
        dispatcher.handle_packet(&Packet::empty(Opcode::LoadFinished));
        dispatcher.handle_packet(&Packet::new(Opcode::Resize, vec![0; 3]));
        assert!(dispatcher.engine().calls().is_empty());
    }

    #[test]
    fn test_load_finished_reported_with_stylesheet() {
        let (mut dispatcher, rx, host) = setup();
        dispatcher.handle_packet(&packet(HostMessage::Navigate {
            url: "about:blank".into(),
        }));
        let event = rx.try_recv().unwrap();
        dispatcher.handle_event(event).unwrap();

        assert!(dispatcher
            .engine()
            .calls()
            .iter()
            .any(|c| matches!(c, EngineCall::RunScript(js) if js.contains("touchstart"))));

        let reply = host.read(Some(Duration::from_secs(1))).unwrap().unwrap();
        assert_eq!(reply.opcode(), Some(Opcode::LoadFinished));
        assert!(reply.is_empty());
    }

    #[test]
    fn test_script_message_forwarded() {
        let (mut dispatcher, rx, host) = setup();
        dispatcher.install_defaults().unwrap();
        dispatcher
            .engine_mut()
            .post_from_page("host", vec![Argument::from("param"), Argument::Number(7.0)])
            .unwrap();
        dispatcher.handle_event(rx.try_recv().unwrap()).unwrap();

        let reply = host.read(Some(Duration::from_secs(1))).unwrap().unwrap();
        match HelperMessage::from_packet(&reply).unwrap() {
            HelperMessage::ScriptMessageReceived(msg) => {
                assert_eq!(msg.name, "host");
                assert_eq!(msg.args.as_slice(), &[Argument::from("param"), Argument::Number(7.0)]);
            }
            other => panic!("Expected ScriptMessageReceived, got {:?}", other),
        }
    }

    #[test]
    fn test_run_exits_when_host_closes() {
        let (mut dispatcher, events, host) = setup();
        let (packet_tx, packet_rx) = crossbeam_channel::unbounded();
        packet_tx
            .send(ReaderEvent::Packet(packet(HostMessage::Resize {
                width: 10,
                height: 10,
            })))
            .unwrap();
        packet_tx
            .send(ReaderEvent::Closed(ReaderExit::EndOfStream))
            .unwrap();

        dispatcher
            .run(&packet_rx, &events, Duration::from_millis(5))
            .unwrap();
        assert_eq!(dispatcher.engine().size(), (10, 10));
        drop(host);
    }

    #[test]
    fn test_run_exits_when_host_hangs_up_mid_event() {
        let (mut dispatcher, events, host) = setup();
        let (_packet_tx, packet_rx) = crossbeam_channel::unbounded();
        drop(host);
        dispatcher.engine_mut().load_url("about:blank").unwrap();
        dispatcher
            .run(&packet_rx, &events, Duration::from_millis(5))
            .unwrap();
    }

    #[test]
    fn test_run_exits_when_window_destroyed() {
        let (mut dispatcher, events, _host) = setup();
        let (_packet_tx, packet_rx) = crossbeam_channel::unbounded();
        dispatcher.engine_mut().close();
        dispatcher
            .run(&packet_rx, &events, Duration::from_millis(5))
            .unwrap();
    }
}
