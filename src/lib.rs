//! # webui - Out-of-process web view for plugin UIs
//!
//! Web-based plugin editors without linking a browser engine into the host.
//!
//! ## Architecture
//!
//! webui is an umbrella crate over:
//! - **webui-bridge** - Wire protocol, pipe channel, reader thread, helper
//!   lifecycle and the host-side [`HostBridge`]
//! - **webui-helper** - The helper process: engine trait, dispatcher, headless
//!   and WebKitGTK engines (feature `helper`)
//!
//! ## Quick Start
//!
//! ```ignore
//! use webui::prelude::*;
//!
//! struct Editor;
//!
//! impl BridgeHandler for Editor {
//!     fn on_script_message(&self, bridge: &mut HostBridge, name: &str, args: &[Argument]) {
//!         if name == HOST_CHANNEL {
//!             bridge.post_message(&[Argument::from("ack")]);
//!         }
//!     }
//! }
//!
//! let mut bridge = WebUiBuilder::new()
//!     .url("file:///opt/myplugin/ui/index.html")
//!     .build(Editor);
//!
//! // When the host hands over its editor window
//! bridge.reparent(parent_window_id);
//!
//! // From the editor's idle timer
//! bridge.idle();
//! ```
//!
//! ## Feature Flags
//!
//! - `default` - Host side only
//! - `helper` - Helper library for in-process use and tests
//! - `wry` - WebKitGTK engine in the helper (Linux)

/// Re-export of webui-bridge for direct access
pub use webui_bridge as bridge;

// Wire protocol
pub use webui_bridge::{
    Argument, ArgumentList, BridgeError, DecodeStage, Direction, HelperMessage, HostMessage,
    KeyEvent, Opcode, Packet, ScriptMessage, CONSOLE_CHANNEL, HEADER_SIZE, HOST_CHANNEL,
};

// Configuration
pub use webui_bridge::{BridgeConfig, DEFAULT_HELPER_NAME};

// Host side
pub use webui_bridge::{
    BridgeHandler, Channel, ConsoleLevel, HelperProcess, HostBridge, NoopHandler,
    PacketHandler, ReaderEvent, ReaderExit, ReaderState, ReaderTask,
};

// Helper side
#[cfg(feature = "helper")]
pub use webui_helper as helper;

#[cfg(feature = "helper")]
pub use webui_helper::{Dispatcher, HeadlessEngine, HelperConfig, HelperError, WebViewEngine};

mod builder;
mod error;

pub use builder::WebUiBuilder;
pub use error::{Error, Result};

/// Convenience prelude for common imports
pub mod prelude {
    pub use crate::WebUiBuilder;

    pub use crate::{Argument, BridgeConfig, BridgeHandler, ConsoleLevel, HostBridge};

    pub use crate::{CONSOLE_CHANNEL, HOST_CHANNEL};
}
