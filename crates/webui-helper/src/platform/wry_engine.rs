//! WebKitGTK engine through wry.
//!
//! The web view is created lazily: embedded into the host's X11 window on
//! `reparent`, or inside a top-level GTK window when embedding fails (for
//! example under Wayland). wry fixes document-start scripts and handlers at
//! build time, so registering new ones marks the web view for rebuild on the
//! next navigation.
//!
//! Page scripts post through `window.webkit.messageHandlers[name]`; where
//! wry's IPC channel is the only way out, a shim turns those calls into
//! `window.ipc.postMessage(JSON.stringify([name, args]))`.

use crate::engine::{rgba_components, EngineEvent, EventSender, WebViewEngine};
use crate::error::{HelperError, Result};
use gtk::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use webui_bridge::{Argument, ArgumentList, KeyEvent, ScriptMessage};
use wry::dpi::{LogicalPosition, LogicalSize};
use wry::raw_window_handle::{
    HandleError, HasWindowHandle, RawWindowHandle, WindowHandle, XlibWindowHandle,
};
use wry::{PageLoadEvent, Rect, WebView, WebViewBuilder, WebViewBuilderExtUnix};

/// Routes `window.webkit.messageHandlers[name].postMessage` to wry's IPC.
///
/// Handlers are added next to whatever the engine already defines there;
/// wry's own `window.ipc` depends on the existing entries.
fn message_handler_shim(names: &[String]) -> String {
    let names = serde_json::Value::Array(
        names
            .iter()
            .cloned()
            .map(serde_json::Value::String)
            .collect(),
    );
    format!(
        "(() => {{ window.webkit = window.webkit || {{}}; \
         window.webkit.messageHandlers = window.webkit.messageHandlers || {{}}; \
         const handlers = window.webkit.messageHandlers; \
         for (const name of {names}) {{ if (name in handlers) continue; \
         Object.defineProperty(handlers, name, {{ configurable: true, value: {{ \
         postMessage: (args) => window.ipc.postMessage(JSON.stringify([name, args])) }} }}); }} }})();"
    )
}

/// Foreign X11 window given to us by the host.
struct ForeignWindow(u64);

impl HasWindowHandle for ForeignWindow {
    fn window_handle(&self) -> std::result::Result<WindowHandle<'_>, HandleError> {
        let raw = RawWindowHandle::Xlib(XlibWindowHandle::new(self.0 as std::os::raw::c_ulong));
        // SAFETY: the host keeps its window alive while the helper runs; the
        // handle is only borrowed for the duration of `build_as_child`.
        Ok(unsafe { WindowHandle::borrow_raw(raw) })
    }
}

enum Host {
    Unset,
    Embedded(u64),
    Toplevel(gtk::Window),
}

pub struct WryEngine {
    events: EventSender,
    webview: Option<WebView>,
    host: Host,
    url: Option<String>,
    scripts: Vec<String>,
    handlers: Vec<String>,
    position: (i32, i32),
    size: (u32, u32),
    background: u32,
    rebuild: bool,
    destroyed: Arc<AtomicBool>,
}

impl WryEngine {
    pub fn new(events: EventSender) -> Result<Self> {
        gtk::init().map_err(|e| HelperError::Engine(format!("GTK init failed: {e}")))?;
        Ok(Self {
            events,
            webview: None,
            host: Host::Unset,
            url: None,
            scripts: Vec::new(),
            handlers: Vec::new(),
            position: (0, 0),
            size: (800, 600),
            background: 0x0000_00ff,
            rebuild: false,
            destroyed: Arc::new(AtomicBool::new(false)),
        })
    }

    fn bounds(&self) -> Rect {
        Rect {
            position: LogicalPosition::new(self.position.0, self.position.1).into(),
            size: LogicalSize::new(self.size.0, self.size.1).into(),
        }
    }

    fn builder(&self) -> WebViewBuilder<'static> {
        let mut builder = WebViewBuilder::new()
            .with_bounds(self.bounds())
            .with_background_color(rgba_components(self.background))
            .with_initialization_script(&message_handler_shim(&self.handlers));
        for script in &self.scripts {
            builder = builder.with_initialization_script(script);
        }
        if let Some(url) = &self.url {
            builder = builder.with_url(url);
        }

        let events = self.events.clone();
        builder = builder.with_ipc_handler(move |request| {
            match parse_ipc_message(request.body()) {
                Some(msg) => {
                    let _ = events.send(EngineEvent::ScriptMessage(msg));
                }
                None => warn!(body_len = request.body().len(), "Rejected IPC message"),
            }
        });

        let events = self.events.clone();
        builder.with_on_page_load_handler(move |event, url| {
            if let PageLoadEvent::Finished = event {
                debug!(url = %url, "Page load finished");
                let _ = events.send(EngineEvent::LoadFinished);
            }
        })
    }

    fn build(&mut self) -> Result<()> {
        self.webview = None;
        let built = match &self.host {
            Host::Unset => return Ok(()),
            Host::Embedded(window) => self.builder().build_as_child(&ForeignWindow(*window)),
            Host::Toplevel(window) => self.builder().build_gtk(window),
        };
        let webview = built.map_err(|e| HelperError::Engine(e.to_string()))?;
        self.webview = Some(webview);
        self.rebuild = false;
        Ok(())
    }

    fn webview(&self) -> Option<&WebView> {
        self.webview.as_ref()
    }

    fn evaluate(&self, source: &str) -> Result<()> {
        match self.webview() {
            Some(webview) => webview
                .evaluate_script(source)
                .map_err(|e| HelperError::Engine(e.to_string())),
            None => {
                debug!("Script dropped, no web view yet");
                Ok(())
            }
        }
    }
}

impl WebViewEngine for WryEngine {
    fn load_url(&mut self, url: &str) -> Result<()> {
        self.url = Some(url.to_string());
        if self.rebuild || self.webview.is_none() {
            return self.build();
        }
        match self.webview() {
            Some(webview) => webview
                .load_url(url)
                .map_err(|e| HelperError::Engine(e.to_string())),
            None => Ok(()),
        }
    }

    fn run_script(&mut self, source: &str) -> Result<()> {
        self.evaluate(source)
    }

    fn inject_script(&mut self, source: &str) -> Result<()> {
        self.scripts.push(source.to_string());
        self.rebuild = self.webview.is_some();
        Ok(())
    }

    fn add_script_message_handler(&mut self, name: &str) -> Result<()> {
        if !self.handlers.iter().any(|h| h == name) {
            self.handlers.push(name.to_string());
            self.rebuild = self.webview.is_some();
        }
        Ok(())
    }

    fn reparent(&mut self, window: u64) -> Result<()> {
        if std::env::var_os("WAYLAND_DISPLAY").is_some() && std::env::var_os("DISPLAY").is_none()
        {
            return Err(HelperError::unsupported(
                "reparenting into a foreign window on Wayland",
            ));
        }
        self.host = Host::Embedded(window);
        self.build().map_err(|e| {
            warn!(window, "Embedding failed: {}", e);
            HelperError::unsupported(format!("embedding into window {window:#x}"))
        })
    }

    fn show_toplevel(&mut self) -> Result<()> {
        let window = gtk::Window::new(gtk::WindowType::Toplevel);
        window.set_default_size(self.size.0 as i32, self.size.1 as i32);
        let destroyed = Arc::clone(&self.destroyed);
        window.connect_destroy(move |_| destroyed.store(true, Ordering::Release));
        window.show_all();
        info!("Showing web view in a top-level window");

        self.host = Host::Toplevel(window);
        self.build()
    }

    fn set_size(&mut self, width: u32, height: u32) -> Result<()> {
        self.size = (width, height);
        if let Host::Toplevel(window) = &self.host {
            window.resize(width as i32, height as i32);
        }
        match self.webview() {
            Some(webview) => webview
                .set_bounds(self.bounds())
                .map_err(|e| HelperError::Engine(e.to_string())),
            None => Ok(()),
        }
    }

    fn set_position(&mut self, x: i32, y: i32) -> Result<()> {
        self.position = (x, y);
        match self.webview() {
            Some(webview) => webview
                .set_bounds(self.bounds())
                .map_err(|e| HelperError::Engine(e.to_string())),
            None => Ok(()),
        }
    }

    fn set_background_color(&mut self, rgba: u32) -> Result<()> {
        self.background = rgba;
        match self.webview() {
            Some(webview) => webview
                .set_background_color(rgba_components(rgba))
                .map_err(|e| HelperError::Engine(e.to_string())),
            None => Ok(()),
        }
    }

    fn key_event(&mut self, event: &KeyEvent) -> Result<()> {
        self.evaluate(&key_event_script(event))
    }

    fn pump(&mut self) -> bool {
        while gtk::events_pending() {
            gtk::main_iteration_do(false);
        }
        !self.destroyed.load(Ordering::Acquire)
    }
}

/// `[name, args]` as posted by [`message_handler_shim`].
fn parse_ipc_message(body: &str) -> Option<ScriptMessage> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let mut parts = match value {
        serde_json::Value::Array(parts) if parts.len() == 2 => parts.into_iter(),
        _ => return None,
    };
    let name = match parts.next()? {
        serde_json::Value::String(name) => name,
        _ => return None,
    };
    let args: ArgumentList = match parts.next()? {
        serde_json::Value::Array(values) => values.into_iter().map(Argument::from).collect(),
        single => std::iter::once(Argument::from(single)).collect(),
    };
    Some(ScriptMessage { name, args })
}

/// Synthetic DOM keyboard event for the focused element.
fn key_event_script(event: &KeyEvent) -> String {
    let kind = if event.pressed { "keydown" } else { "keyup" };
    let key = char::from_u32(event.code)
        .filter(|c| !c.is_control())
        .map(String::from)
        .unwrap_or_default();
    let key = serde_json::Value::String(key).to_string();
    format!(
        "(document.activeElement || document.body).dispatchEvent(new KeyboardEvent('{kind}', \
         {{ key: {key}, keyCode: {code}, shiftKey: {shift}, ctrlKey: {ctrl}, altKey: {alt}, \
         bubbles: true }}));",
        code = event.code,
        shift = event.modifiers & 0x1 != 0,
        ctrl = event.modifiers & 0x4 != 0,
        alt = event.modifiers & 0x8 != 0,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ipc_message() {
        let msg = parse_ipc_message(r#"["host", ["gain", 0.5, true, null, {"a": 1}]]"#).unwrap();
        assert_eq!(msg.name, "host");
        assert_eq!(msg.args.len(), 5);
        assert_eq!(msg.args[1], Argument::Number(0.5));
        assert_eq!(msg.args[4].as_str(), Some(r#"{"a":1}"#));
    }

    #[test]
    fn test_parse_ipc_rejects_other_shapes() {
        assert!(parse_ipc_message("not json").is_none());
        assert!(parse_ipc_message(r#"{"name": "host"}"#).is_none());
        assert!(parse_ipc_message(r#"[1, []]"#).is_none());
    }

    #[test]
    fn test_shim_lists_handlers() {
        let js = message_handler_shim(&["console_log".to_string(), "host".to_string()]);
        assert!(js.contains(r#"for (const name of ["console_log","host"])"#));
        assert!(js.contains("window.ipc.postMessage(JSON.stringify([name, args]))"));
    }

    #[test]
    fn test_key_event_script() {
        let js = key_event_script(&KeyEvent {
            pressed: true,
            code: 'a' as u32,
            hw_code: 38,
            modifiers: 0x4,
        });
        assert!(js.contains("'keydown'"));
        assert!(js.contains(r#"key: "a""#));
        assert!(js.contains("ctrlKey: true"));
    }
}
