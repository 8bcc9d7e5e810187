//! Application callbacks for the host bridge.
//!
//! Implement [`BridgeHandler`] to receive page events. Every method runs on
//! the thread calling [`HostBridge::idle`] and receives the bridge itself, so
//! a handler can answer with `post_message` or `run_script` directly.

use crate::args::Argument;
use crate::host::HostBridge;
use std::sync::Arc;

/// Level of a forwarded `console.*` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleLevel {
    Log,
    Info,
    Warn,
    Error,
}

impl ConsoleLevel {
    /// Unrecognized names fall back to `Log`.
    pub fn from_name(name: &str) -> Self {
        match name {
            "info" => ConsoleLevel::Info,
            "warn" => ConsoleLevel::Warn,
            "error" => ConsoleLevel::Error,
            _ => ConsoleLevel::Log,
        }
    }
}

impl std::fmt::Display for ConsoleLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConsoleLevel::Log => write!(f, "log"),
            ConsoleLevel::Info => write!(f, "info"),
            ConsoleLevel::Warn => write!(f, "warn"),
            ConsoleLevel::Error => write!(f, "error"),
        }
    }
}

/// Handler for web view events.
pub trait BridgeHandler: Send + Sync {
    /// The page finished loading and queued messages were delivered.
    fn on_document_ready(&self, _bridge: &mut HostBridge) {}

    /// A page script posted to a named message channel.
    fn on_script_message(&self, _bridge: &mut HostBridge, _name: &str, _args: &[Argument]) {}

    /// Page console output. Already logged through `tracing`.
    fn on_console(&self, _bridge: &mut HostBridge, _level: ConsoleLevel, _text: &str) {}

    /// The helper exited or its channel failed. The bridge is torn down
    /// before this is called; the next `reparent` starts a new helper.
    fn on_helper_lost(&self, _bridge: &mut HostBridge) {}
}

/// Handler that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHandler;

impl BridgeHandler for NoopHandler {}

/// Lets the application keep a handle on its handler.
impl<T: BridgeHandler + ?Sized> BridgeHandler for Arc<T> {
    fn on_document_ready(&self, bridge: &mut HostBridge) {
        (**self).on_document_ready(bridge)
    }

    fn on_script_message(&self, bridge: &mut HostBridge, name: &str, args: &[Argument]) {
        (**self).on_script_message(bridge, name, args)
    }

    fn on_console(&self, bridge: &mut HostBridge, level: ConsoleLevel, text: &str) {
        (**self).on_console(bridge, level, text)
    }

    fn on_helper_lost(&self, bridge: &mut HostBridge) {
        (**self).on_helper_lost(bridge)
    }
}
