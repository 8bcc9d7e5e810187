//! Out-of-process web view bridge for plugin UIs
//!
//! A plugin process cannot always link a browser engine directly (GTK and
//! WebKit clash with host toolkits on Linux), so the engine lives in a helper
//! process and this crate carries UI commands and script messages across a
//! pair of anonymous pipes. The helper side is in `webui-helper`.
//!
//! ## Layers
//!
//! - [`args`]: flat codec for JavaScript call arguments
//! - [`protocol`]: TLV packet framing and typed messages
//! - [`Channel`]: pipe pair carrying packets
//! - [`ReaderTask`]: background thread feeding a packet handler
//! - [`HostBridge`]: helper lifecycle and application callbacks
//!
//! ## Usage
//!
//! ```ignore
//! use webui_bridge::{BridgeConfig, BridgeHandler, HostBridge};
//!
//! let mut bridge = HostBridge::new(BridgeConfig::default(), MyHandler);
//! bridge.navigate("file:///path/to/ui/index.html");
//! bridge.reparent(parent_window_id); // spawns the helper
//!
//! // From the UI timer:
//! bridge.idle();
//! ```

pub mod args;
pub use args::{Argument, ArgumentList};

pub mod error;
pub use error::{BridgeError, DecodeStage, Result};

pub mod protocol;
pub use protocol::{
    Direction, HelperMessage, HostMessage, KeyEvent, Opcode, Packet, ScriptMessage,
    CONSOLE_CHANNEL, HEADER_SIZE, HOST_CHANNEL,
};

mod config;
pub use config::{BridgeConfig, DEFAULT_HELPER_NAME};

pub mod scripts;

#[cfg(unix)]
mod handler;
#[cfg(unix)]
pub use handler::{BridgeHandler, ConsoleLevel, NoopHandler};

#[cfg(unix)]
mod channel;
#[cfg(unix)]
pub use channel::Channel;

#[cfg(unix)]
mod reader;
#[cfg(unix)]
pub use reader::{PacketHandler, ReaderEvent, ReaderExit, ReaderState, ReaderTask};

#[cfg(unix)]
mod process;
#[cfg(unix)]
pub use process::HelperProcess;

#[cfg(unix)]
mod host;
#[cfg(unix)]
pub use host::HostBridge;
