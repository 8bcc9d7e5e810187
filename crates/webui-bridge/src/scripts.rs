//! JavaScript and CSS sources injected into every page.
//!
//! Page scripts talk to native code through
//! `window.webkit.messageHandlers[<name>].postMessage(args)`, where `args` is
//! an array of flat values. Engines without that object install an
//! equivalent shim before these scripts run.

use crate::args::{to_json_array, Argument};
use crate::protocol::{CONSOLE_CHANNEL, HOST_CHANNEL};

pub const DISABLE_CONTEXT_MENU: &str = "window.oncontextmenu = (e) => e.preventDefault();";

pub const DISABLE_PRINT: &str = "window.addEventListener('keydown', (e) => { \
     if ((e.key == 'p') && (e.ctrlKey || e.metaKey)) e.preventDefault(); });";

/// `window.webviewHost`: an EventTarget receiving native messages, with
/// `postMessage` sending to native code.
pub const CREATE_HOST_OBJECT: &str = "window.webviewHost = new EventTarget;\
     window.webviewHost.addMessageListener = (lr) => {\
     window.webviewHost.addEventListener('message', (ev) => lr(ev.detail)) };\
     window.webviewHost.postMessage = (args) => \
     window.webkit.messageHandlers.host.postMessage(args);";

/// WebKitGTK ignores `touch-action` for pinch zoom.
pub const DISABLE_PINCH_ZOOM_WORKAROUND: &str = "if (document.body.children.length > 0) \
     document.body.children[0].addEventListener('touchstart', (ev) => { ev.preventDefault(); });";

pub const DEFAULT_STYLESHEET: &str = "img { user-drag: none; -webkit-user-drag: none; }\
     body { user-select: none; -webkit-user-select: none; }\
     body { touch-action: pan-x pan-y; }\
     body { overflow: hidden; }";

/// Message handlers registered before the first navigation.
pub const DEFAULT_MESSAGE_HANDLERS: [&str; 2] = [CONSOLE_CHANNEL, HOST_CHANNEL];

/// `console.*` replacement forwarding `[text, level]` to the console channel.
pub fn console_shim() -> String {
    let levels = ["log", "info", "warn", "error"]
        .iter()
        .map(|level| {
            format!(
                "{level}: (...a) => window.webkit.messageHandlers.{CONSOLE_CHANNEL}\
                 .postMessage([a.map(String).join(' '), '{level}'])"
            )
        })
        .collect::<Vec<_>>()
        .join(",");
    format!("window.console = {{{levels}}};")
}

/// Everything that must run before page scripts on every navigation.
pub fn document_start_script() -> String {
    let mut js = String::new();
    js.push_str(DISABLE_CONTEXT_MENU);
    js.push_str(DISABLE_PRINT);
    js.push_str(CREATE_HOST_OBJECT);
    js.push_str(&console_shim());
    js
}

/// Everything that runs after each load finishes.
pub fn load_finished_script() -> String {
    let mut js = add_stylesheet_script(DEFAULT_STYLESHEET);
    js.push_str(DISABLE_PINCH_ZOOM_WORKAROUND);
    js
}

/// Append a `<style>` element holding `css`.
pub fn add_stylesheet_script(css: &str) -> String {
    let literal = serde_json::Value::String(css.to_string()).to_string();
    format!(
        "(() => {{ const s = document.createElement('style'); s.textContent = {literal}; \
         document.head.appendChild(s); }})();"
    )
}

/// Deliver `args` to listeners registered with `webviewHost.addMessageListener`.
pub fn post_message_script(args: &[Argument]) -> String {
    format!(
        "window.webviewHost.dispatchEvent(new CustomEvent('message',{{detail:{}}}));",
        to_json_array(args)
    )
}
