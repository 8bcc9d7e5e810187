//! Builder for configuring and constructing a `HostBridge`.

use crate::{BridgeConfig, BridgeHandler, Channel, HostBridge, Result};
use std::path::PathBuf;
use std::time::Duration;
use webui_bridge::scripts;

/// Everything set here is queued on the bridge at build time and reaches the
/// helper, in order, once it is started by the first `reparent`.
///
/// # Example
///
/// ```ignore
/// use webui::prelude::*;
///
/// let mut bridge = WebUiBuilder::new()
///     .size(640, 480)
///     .message_handler("meters")
///     .stylesheet("body { background: #202020; }")
///     .url("file:///opt/myplugin/ui/index.html")
///     .build(MyHandler);
///
/// bridge.reparent(parent_window_id);
/// ```
#[derive(Debug, Clone, Default)]
pub struct WebUiBuilder {
    config: BridgeConfig,
    background_color: Option<u32>,
    handlers: Vec<String>,
    scripts: Vec<String>,
    url: Option<String>,
}

impl WebUiBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration, e.g. one loaded from disk.
    pub fn config(mut self, config: BridgeConfig) -> Self {
        self.config = config;
        self
    }

    /// Default: `webui-helper` next to the current executable
    pub fn helper_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.helper_path = Some(path.into());
        self
    }

    /// Default: 100ms
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Default: 2s
    pub fn terminate_timeout(mut self, timeout: Duration) -> Self {
        self.config.terminate_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Default: 800x600
    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.config.initial_size = (width, height);
        self
    }

    /// `rgba` is 0xRRGGBBAA.
    pub fn background_color(mut self, rgba: u32) -> Self {
        self.config.background_color = rgba;
        self.background_color = Some(rgba);
        self
    }

    pub fn print_traffic(mut self, enabled: bool) -> Self {
        self.config.print_traffic = enabled;
        self
    }

    /// Extra `window.webkit.messageHandlers` channel besides the defaults.
    pub fn message_handler(mut self, name: &str) -> Self {
        self.handlers.push(name.to_string());
        self
    }

    /// Document-start script for every navigation.
    pub fn inject_script(mut self, source: &str) -> Self {
        self.scripts.push(source.to_string());
        self
    }

    /// Stylesheet applied to every document once its DOM exists.
    pub fn stylesheet(mut self, css: &str) -> Self {
        self.scripts.push(format!(
            "document.addEventListener('DOMContentLoaded', () => {{ {} }});",
            scripts::add_stylesheet_script(css)
        ));
        self
    }

    pub fn url(mut self, url: &str) -> Self {
        self.url = Some(url.to_string());
        self
    }

    /// Bridge with a lazily started helper.
    pub fn build(self, handler: impl BridgeHandler + 'static) -> HostBridge {
        let (config, setup) = self.split();
        let mut bridge = HostBridge::new(config, handler);
        setup.apply(&mut bridge);
        bridge
    }

    /// Bridge over an already connected channel, e.g. an in-process helper.
    pub fn connect(
        self,
        handler: impl BridgeHandler + 'static,
        channel: Channel,
    ) -> Result<HostBridge> {
        let (config, setup) = self.split();
        let mut bridge = HostBridge::from_channel(config, handler, channel)?;
        setup.apply(&mut bridge);
        Ok(bridge)
    }

    fn split(self) -> (BridgeConfig, Setup) {
        let setup = Setup {
            size: self.config.initial_size,
            background_color: self.background_color,
            handlers: self.handlers,
            scripts: self.scripts,
            url: self.url,
        };
        (self.config, setup)
    }
}

/// Messages queued on a fresh bridge. Handlers and scripts must precede the
/// first navigation to take effect on it.
struct Setup {
    size: (u32, u32),
    background_color: Option<u32>,
    handlers: Vec<String>,
    scripts: Vec<String>,
    url: Option<String>,
}

impl Setup {
    fn apply(self, bridge: &mut HostBridge) {
        for name in &self.handlers {
            bridge.add_script_message_handler(name);
        }
        for source in &self.scripts {
            bridge.inject_script(source);
        }
        if let Some(rgba) = self.background_color {
            bridge.set_background_color(rgba);
        }
        bridge.resize(self.size.0, self.size.1);
        if let Some(url) = &self.url {
            bridge.navigate(url);
        }
    }
}
