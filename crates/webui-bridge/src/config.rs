//! Bridge configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default helper executable name, looked up next to the host binary.
pub const DEFAULT_HELPER_NAME: &str = "webui-helper";

/// Configuration for the host side of the bridge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Explicit helper executable. When unset the helper is resolved as
    /// `<dir of current executable>/<helper_name>`.
    #[serde(default)]
    pub helper_path: Option<PathBuf>,
    pub helper_name: String,
    /// Reader wake-up interval; bounds how long a stop request waits.
    pub poll_interval_ms: u64,
    /// Grace period between SIGTERM and SIGKILL.
    pub terminate_timeout_ms: u64,
    pub reader_join_timeout_ms: u64,
    /// Log every packet in both directions.
    #[serde(default)]
    pub print_traffic: bool,
    /// 0xRRGGBBAA
    pub background_color: u32,
    pub initial_size: (u32, u32),
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            helper_path: None,
            helper_name: DEFAULT_HELPER_NAME.to_string(),
            poll_interval_ms: 100,
            terminate_timeout_ms: 2000,
            reader_join_timeout_ms: 500,
            print_traffic: false,
            background_color: 0x0000_00ff,
            initial_size: (800, 600),
        }
    }
}

impl BridgeConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn terminate_timeout(&self) -> Duration {
        Duration::from_millis(self.terminate_timeout_ms)
    }

    pub fn reader_join_timeout(&self) -> Duration {
        Duration::from_millis(self.reader_join_timeout_ms)
    }

    /// Helper executable path.
    pub fn resolve_helper_path(&self) -> std::io::Result<PathBuf> {
        if let Some(path) = &self.helper_path {
            return Ok(path.clone());
        }
        std::env::current_exe().map(|mut p| {
            p.pop();
            p.push(&self.helper_name);
            p
        })
    }
}
