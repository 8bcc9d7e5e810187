//! Teardown, helper loss and malformed traffic.

use crate::helpers::*;
use std::time::Duration;
use webui::{
    Argument, BridgeConfig, Channel, HostBridge, HostMessage, Opcode, Packet, WebUiBuilder,
    HOST_CHANNEL,
};

/// Dropping the bridge closes the channel and the helper loop exits cleanly.
#[test]
fn test_drop_bridge_stops_helper() {
    let InProcess {
        bridge,
        recorder,
        server,
    } = in_process(WebUiBuilder::new());

    drop(bridge);
    server.join().unwrap().unwrap();
    assert!(recorder.events().is_empty());
}

/// The page's window going away is reported as helper loss, once.
#[test]
fn test_window_destroyed_reports_lost() {
    let InProcess {
        mut bridge,
        recorder,
        server,
    } = in_process(WebUiBuilder::new().url("file:///ui/index.html"));
    pump_until(&mut bridge, &recorder, has(Event::Ready));

    bridge.navigate(CLOSE_URL);
    pump_until(&mut bridge, &recorder, has(Event::Lost));
    server.join().unwrap().unwrap();

    assert!(!bridge.is_running());
    assert!(!bridge.is_document_ready());

    // Operations after loss are kept for the next helper, not reported again.
    bridge.run_script("noop()");
    bridge.idle();
    assert_eq!(recorder.count(&Event::Lost), 1);
}

/// Unknown and malformed packets from the helper are dropped; later ones still arrive.
#[test]
fn test_bad_helper_traffic_ignored() {
    let (host_end, helper_end) = Channel::pipe().unwrap();
    let recorder = std::sync::Arc::new(Recorder::default());
    let mut bridge = HostBridge::from_channel(
        BridgeConfig {
            poll_interval_ms: 10,
            ..Default::default()
        },
        std::sync::Arc::clone(&recorder),
        host_end,
    )
    .unwrap();

    helper_end.write(0x7fff, b"future opcode").unwrap();
    helper_end
        .write_packet(&Packet::new(Opcode::ScriptMessageReceived, b"no terminator".to_vec()))
        .unwrap();
    helper_end
        .write_packet(&Packet::new(Opcode::Navigate, b"wrong way\0".to_vec()))
        .unwrap();
    helper_end
        .write_packet(&webui::HelperMessage::ScriptMessageReceived(
            webui::ScriptMessage::new(HOST_CHANNEL, [Argument::from("still here")]),
        )
        .to_packet()
        .unwrap())
        .unwrap();

    pump_until(
        &mut bridge,
        &recorder,
        has(Event::Message(
            HOST_CHANNEL.to_string(),
            vec![Argument::from("still here")],
        )),
    );
    assert_eq!(recorder.events().len(), 1);
    assert!(bridge.is_running());
}

/// Messages issued before the helper connects reach it in order.
#[test]
fn test_host_messages_in_order() {
    let (host_end, helper_end) = Channel::pipe().unwrap();
    let mut bridge = WebUiBuilder::new()
        .size(100, 50)
        .connect(webui::NoopHandler, host_end)
        .unwrap();
    bridge.set_position(-3, 7);
    bridge.send_key_event(true, 'a' as u32, 38, 0);
    bridge.add_stylesheet("p { margin: 0; }");

    let mut opcodes = Vec::new();
    while let Ok(Some(packet)) = helper_end.read(Some(Duration::from_millis(200))) {
        opcodes.push(HostMessage::from_packet(&packet).unwrap().opcode());
    }
    assert_eq!(
        opcodes,
        vec![
            Opcode::Resize,
            Opcode::SetPosition,
            Opcode::KeyEvent,
            Opcode::RunScript
        ]
    );
}
