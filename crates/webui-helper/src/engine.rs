//! Web view engine trait.
//!
//! One implementation per platform, selected at build time through
//! [`crate::platform::PlatformEngine`]. Engines are driven from the helper's
//! control thread only and report page events through an [`EventSender`].

use crate::error::Result;
use webui_bridge::{KeyEvent, ScriptMessage};

/// Something the page did that the host needs to hear about.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// A navigation finished loading.
    LoadFinished,
    /// Page script posted to a registered message handler.
    ScriptMessage(ScriptMessage),
}

pub type EventSender = crossbeam_channel::Sender<EngineEvent>;

pub trait WebViewEngine {
    fn load_url(&mut self, url: &str) -> Result<()>;

    /// Run now, in the current document.
    fn run_script(&mut self, source: &str) -> Result<()>;

    /// Run at document start, before page scripts, on every later navigation.
    fn inject_script(&mut self, source: &str) -> Result<()>;

    /// Expose `window.webkit.messageHandlers[name]` to page scripts.
    fn add_script_message_handler(&mut self, name: &str) -> Result<()>;

    /// Embed into a foreign native window.
    ///
    /// Returns `UnsupportedPlatformOperation` where the windowing system has
    /// no such primitive; the caller then uses [`show_toplevel`](Self::show_toplevel).
    fn reparent(&mut self, window: u64) -> Result<()>;

    /// Fallback when reparenting is unavailable.
    fn show_toplevel(&mut self) -> Result<()>;

    fn set_size(&mut self, width: u32, height: u32) -> Result<()>;

    fn set_position(&mut self, x: i32, y: i32) -> Result<()>;

    /// `rgba` is 0xRRGGBBAA.
    fn set_background_color(&mut self, rgba: u32) -> Result<()>;

    fn key_event(&mut self, event: &KeyEvent) -> Result<()>;

    /// Process pending native events. Returns `false` once the engine's
    /// window has been destroyed and the helper should exit.
    fn pump(&mut self) -> bool;
}

/// Split 0xRRGGBBAA into components.
pub fn rgba_components(rgba: u32) -> (u8, u8, u8, u8) {
    let [r, g, b, a] = rgba.to_be_bytes();
    (r, g, b, a)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgba_components() {
        assert_eq!(rgba_components(0x1020_30ff), (0x10, 0x20, 0x30, 0xff));
        assert_eq!(rgba_components(0), (0, 0, 0, 0));
    }
}
