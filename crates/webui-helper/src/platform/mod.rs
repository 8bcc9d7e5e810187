//! Platform-specific engine implementations.

pub mod headless;
pub use headless::{EngineCall, HeadlessEngine};

#[cfg(all(feature = "wry", target_os = "linux"))]
pub mod wry_engine;

#[cfg(all(feature = "wry", target_os = "linux"))]
pub use wry_engine::WryEngine as PlatformEngine;

#[cfg(not(all(feature = "wry", target_os = "linux")))]
pub use headless::HeadlessEngine as PlatformEngine;
