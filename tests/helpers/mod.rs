//! Test helpers and fixtures for webui integration tests
//!
//! - [`EchoPage`]: engine standing in for a page that answers every
//!   `webviewHost` message by posting the same arguments back, and logs each
//!   navigation to the console
//! - [`Recorder`]: `BridgeHandler` collecting every callback
//! - [`in_process`]: host bridge connected to a helper dispatcher on a thread

use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use webui_helper::{serve, EngineEvent, EventSender, HeadlessEngine, HelperConfig, WebViewEngine};
use webui::{
    Argument, BridgeHandler, Channel, ConsoleLevel, HostBridge, KeyEvent, ScriptMessage,
    WebUiBuilder, CONSOLE_CHANNEL, HOST_CHANNEL,
};

/// Navigating here destroys the page's window.
pub const CLOSE_URL: &str = "about:close";

/// Poll interval for both sides; keeps teardown fast.
pub const TEST_POLL_INTERVAL: Duration = Duration::from_millis(10);

pub struct EchoPage {
    inner: HeadlessEngine,
    events: EventSender,
    closed: bool,
}

impl EchoPage {
    pub fn new(events: EventSender) -> webui_helper::Result<Self> {
        Ok(Self {
            inner: HeadlessEngine::new(events.clone())?,
            events,
            closed: false,
        })
    }

    fn post(&self, name: &str, args: Vec<Argument>) {
        let _ = self
            .events
            .send(EngineEvent::ScriptMessage(ScriptMessage::new(name, args)));
    }
}

/// Arguments of a script produced by `HostBridge::post_message`.
fn posted_args(source: &str) -> Option<Vec<Argument>> {
    let start = source.find("{detail:")? + "{detail:".len();
    let end = source.rfind("}));")?;
    let values: Vec<serde_json::Value> = serde_json::from_str(source.get(start..end)?).ok()?;
    Some(values.into_iter().map(Argument::from).collect())
}

impl WebViewEngine for EchoPage {
    fn load_url(&mut self, url: &str) -> webui_helper::Result<()> {
        if url == CLOSE_URL {
            self.closed = true;
            return Ok(());
        }
        self.inner.load_url(url)?;
        self.post(
            CONSOLE_CHANNEL,
            vec![Argument::from(format!("loaded {url}")), Argument::from("info")],
        );
        Ok(())
    }

    fn run_script(&mut self, source: &str) -> webui_helper::Result<()> {
        self.inner.run_script(source)?;
        if let Some(args) = posted_args(source) {
            self.post(HOST_CHANNEL, args);
        }
        Ok(())
    }

    fn inject_script(&mut self, source: &str) -> webui_helper::Result<()> {
        self.inner.inject_script(source)
    }

    fn add_script_message_handler(&mut self, name: &str) -> webui_helper::Result<()> {
        self.inner.add_script_message_handler(name)
    }

    fn reparent(&mut self, window: u64) -> webui_helper::Result<()> {
        self.inner.reparent(window)
    }

    fn show_toplevel(&mut self) -> webui_helper::Result<()> {
        self.inner.show_toplevel()
    }

    fn set_size(&mut self, width: u32, height: u32) -> webui_helper::Result<()> {
        self.inner.set_size(width, height)
    }

    fn set_position(&mut self, x: i32, y: i32) -> webui_helper::Result<()> {
        self.inner.set_position(x, y)
    }

    fn set_background_color(&mut self, rgba: u32) -> webui_helper::Result<()> {
        self.inner.set_background_color(rgba)
    }

    fn key_event(&mut self, event: &KeyEvent) -> webui_helper::Result<()> {
        self.inner.key_event(event)
    }

    fn pump(&mut self) -> bool {
        !self.closed && self.inner.pump()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Ready,
    Message(String, Vec<Argument>),
    Console(ConsoleLevel, String),
    Lost,
}

#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<Event>>,
}

impl Recorder {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn count(&self, event: &Event) -> usize {
        self.events.lock().iter().filter(|e| *e == event).count()
    }

    fn push(&self, event: Event) {
        self.events.lock().push(event);
    }
}

impl BridgeHandler for Recorder {
    fn on_document_ready(&self, _bridge: &mut HostBridge) {
        self.push(Event::Ready);
    }

    fn on_script_message(&self, _bridge: &mut HostBridge, name: &str, args: &[Argument]) {
        self.push(Event::Message(name.to_string(), args.to_vec()));
    }

    fn on_console(&self, _bridge: &mut HostBridge, level: ConsoleLevel, text: &str) {
        self.push(Event::Console(level, text.to_string()));
    }

    fn on_helper_lost(&self, _bridge: &mut HostBridge) {
        self.push(Event::Lost);
    }
}

/// In-process helper serving an [`EchoPage`] on its own thread.
pub struct InProcess {
    pub bridge: HostBridge,
    pub recorder: Arc<Recorder>,
    pub server: JoinHandle<webui_helper::Result<()>>,
}

pub fn in_process(builder: WebUiBuilder) -> InProcess {
    let (host_end, helper_end) = Channel::pipe().expect("Failed to create pipe pair");

    let mut config = HelperConfig::new(3, 4);
    config.poll_interval = TEST_POLL_INTERVAL;
    config.pump_interval = Duration::from_millis(5);
    let server = std::thread::Builder::new()
        .name("webui-test-helper".into())
        .spawn(move || serve(Arc::new(helper_end), &config, EchoPage::new))
        .expect("Failed to start helper thread");

    let recorder = Arc::new(Recorder::default());
    let bridge = builder
        .poll_interval(TEST_POLL_INTERVAL)
        .connect(Arc::clone(&recorder), host_end)
        .expect("Failed to connect bridge");

    InProcess {
        bridge,
        recorder,
        server,
    }
}

/// Drive `idle` until `done` holds or two seconds pass.
pub fn pump_until(
    bridge: &mut HostBridge,
    recorder: &Recorder,
    done: impl Fn(&[Event]) -> bool,
) {
    for _ in 0..200 {
        if done(&recorder.events()) {
            return;
        }
        bridge.idle_timeout(TEST_POLL_INTERVAL);
    }
    panic!("Timed out, events so far: {:?}", recorder.events());
}

pub fn has(event: Event) -> impl Fn(&[Event]) -> bool {
    move |events| events.contains(&event)
}
