//! Host operations reaching the page and page messages reaching the host.

use crate::helpers::*;
use webui::{Argument, ConsoleLevel, WebUiBuilder, HOST_CHANNEL};

/// Navigation ends in a document-ready callback.
#[test]
fn test_document_ready_after_navigate() {
    let InProcess {
        mut bridge,
        recorder,
        server,
    } = in_process(WebUiBuilder::new().url("file:///ui/index.html"));

    assert!(!bridge.is_document_ready());
    pump_until(&mut bridge, &recorder, has(Event::Ready));
    assert!(bridge.is_document_ready());

    drop(bridge);
    server.join().unwrap().unwrap();
}

/// Page console output arrives with its level.
#[test]
fn test_console_forwarded() {
    let InProcess {
        mut bridge,
        recorder,
        server,
    } = in_process(WebUiBuilder::new().url("file:///ui/index.html"));

    pump_until(
        &mut bridge,
        &recorder,
        has(Event::Console(
            ConsoleLevel::Info,
            "loaded file:///ui/index.html".into(),
        )),
    );

    drop(bridge);
    server.join().unwrap().unwrap();
}

/// Messages posted before the page loads are delivered once it is ready, in order.
#[test]
fn test_post_message_queued_until_ready() {
    let InProcess {
        mut bridge,
        recorder,
        server,
    } = in_process(WebUiBuilder::new());

    let first = vec![
        Argument::from("hello"),
        Argument::Number(1.5),
        Argument::Boolean(true),
        Argument::Null,
    ];
    let second = vec![Argument::from("again")];
    bridge.post_message(&first);
    bridge.post_message(&second);
    bridge.navigate("file:///ui/index.html");

    let echoed = |events: &[Event]| {
        events
            .iter()
            .filter(|e| matches!(e, Event::Message(..)))
            .count()
            >= 2
    };
    pump_until(&mut bridge, &recorder, echoed);

    let events = recorder.events();
    let ready_at = events.iter().position(|e| *e == Event::Ready).unwrap();
    let messages: Vec<(usize, &Event)> = events
        .iter()
        .enumerate()
        .filter(|(_, e)| matches!(e, Event::Message(..)))
        .collect();

    assert_eq!(
        messages[0].1,
        &Event::Message(HOST_CHANNEL.to_string(), first)
    );
    assert_eq!(
        messages[1].1,
        &Event::Message(HOST_CHANNEL.to_string(), second)
    );
    assert!(messages.iter().all(|(i, _)| *i > ready_at));

    drop(bridge);
    server.join().unwrap().unwrap();
}

/// After the document is ready, messages go straight to the page.
#[test]
fn test_post_message_after_ready() {
    let InProcess {
        mut bridge,
        recorder,
        server,
    } = in_process(WebUiBuilder::new().url("file:///ui/index.html"));
    pump_until(&mut bridge, &recorder, has(Event::Ready));

    bridge.post_message(&[Argument::from("param"), Argument::Number(0.25)]);
    pump_until(
        &mut bridge,
        &recorder,
        has(Event::Message(
            HOST_CHANNEL.to_string(),
            vec![Argument::from("param"), Argument::Number(0.25)],
        )),
    );

    drop(bridge);
    server.join().unwrap().unwrap();
}

/// Every navigation produces its own ready callback.
#[test]
fn test_each_navigation_reports_ready() {
    let InProcess {
        mut bridge,
        recorder,
        server,
    } = in_process(WebUiBuilder::new().url("file:///ui/a.html"));
    pump_until(&mut bridge, &recorder, has(Event::Ready));

    bridge.navigate("file:///ui/b.html");
    assert!(!bridge.is_document_ready());
    pump_until(&mut bridge, &recorder, |_| recorder.count(&Event::Ready) == 2);
    assert!(bridge.is_document_ready());

    drop(bridge);
    server.join().unwrap().unwrap();
}
