//! Engine without a display.
//!
//! Keeps the state a real engine would hold, reports every navigation as
//! finished immediately and records each call. Used where no browser engine
//! is compiled in, and by tests.

use crate::engine::{EngineEvent, EventSender, WebViewEngine};
use crate::error::{HelperError, Result};
use webui_bridge::{Argument, KeyEvent, ScriptMessage};

/// One engine operation, as recorded by [`HeadlessEngine`].
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    LoadUrl(String),
    RunScript(String),
    InjectScript(String),
    AddScriptMessageHandler(String),
    Reparent(u64),
    ShowToplevel,
    SetSize(u32, u32),
    SetPosition(i32, i32),
    SetBackgroundColor(u32),
    Key(KeyEvent),
}

pub struct HeadlessEngine {
    events: EventSender,
    calls: Vec<EngineCall>,
    url: Option<String>,
    document_start_scripts: Vec<String>,
    handlers: Vec<String>,
    size: (u32, u32),
    closed: bool,
}

impl HeadlessEngine {
    pub fn new(events: EventSender) -> Result<Self> {
        Ok(Self {
            events,
            calls: Vec::new(),
            url: None,
            document_start_scripts: Vec::new(),
            handlers: Vec::new(),
            size: (0, 0),
            closed: false,
        })
    }

    pub fn calls(&self) -> &[EngineCall] {
        &self.calls
    }

    pub fn take_calls(&mut self) -> Vec<EngineCall> {
        std::mem::take(&mut self.calls)
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    pub fn handlers(&self) -> &[String] {
        &self.handlers
    }

    /// Act as page script calling
    /// `window.webkit.messageHandlers[name].postMessage(args)`.
    pub fn post_from_page(&mut self, name: &str, args: Vec<Argument>) -> Result<()> {
        if !self.handlers.iter().any(|h| h == name) {
            return Err(HelperError::Engine(format!(
                "no message handler registered for '{name}'"
            )));
        }
        self.emit(EngineEvent::ScriptMessage(ScriptMessage::new(name, args)));
        Ok(())
    }

    /// Destroy the (virtual) window; the next `pump` reports it.
    pub fn close(&mut self) {
        self.closed = true;
    }

    fn emit(&self, event: EngineEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!("Engine event dropped, control loop gone");
        }
    }
}

impl WebViewEngine for HeadlessEngine {
    fn load_url(&mut self, url: &str) -> Result<()> {
        tracing::debug!(
            url,
            scripts = self.document_start_scripts.len(),
            "Headless navigation"
        );
        self.calls.push(EngineCall::LoadUrl(url.to_string()));
        self.url = Some(url.to_string());
        self.emit(EngineEvent::LoadFinished);
        Ok(())
    }

    fn run_script(&mut self, source: &str) -> Result<()> {
        self.calls.push(EngineCall::RunScript(source.to_string()));
        Ok(())
    }

    fn inject_script(&mut self, source: &str) -> Result<()> {
        self.calls.push(EngineCall::InjectScript(source.to_string()));
        self.document_start_scripts.push(source.to_string());
        Ok(())
    }

    fn add_script_message_handler(&mut self, name: &str) -> Result<()> {
        self.calls
            .push(EngineCall::AddScriptMessageHandler(name.to_string()));
        if !self.handlers.iter().any(|h| h == name) {
            self.handlers.push(name.to_string());
        }
        Ok(())
    }

    fn reparent(&mut self, window: u64) -> Result<()> {
        self.calls.push(EngineCall::Reparent(window));
        Err(HelperError::unsupported(format!(
            "headless engine cannot embed into window {window:#x}"
        )))
    }

    fn show_toplevel(&mut self) -> Result<()> {
        self.calls.push(EngineCall::ShowToplevel);
        Ok(())
    }

    fn set_size(&mut self, width: u32, height: u32) -> Result<()> {
        self.calls.push(EngineCall::SetSize(width, height));
        self.size = (width, height);
        Ok(())
    }

    fn set_position(&mut self, x: i32, y: i32) -> Result<()> {
        self.calls.push(EngineCall::SetPosition(x, y));
        Ok(())
    }

    fn set_background_color(&mut self, rgba: u32) -> Result<()> {
        self.calls.push(EngineCall::SetBackgroundColor(rgba));
        Ok(())
    }

    fn key_event(&mut self, event: &KeyEvent) -> Result<()> {
        self.calls.push(EngineCall::Key(*event));
        Ok(())
    }

    fn pump(&mut self) -> bool {
        !self.closed
    }
}
