//! Centralized error type for the webui umbrella crate.
//!
//! Wraps the bridge and helper errors so `?` propagates across crate boundaries.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Bridge(#[from] webui_bridge::BridgeError),

    #[cfg(feature = "helper")]
    #[error("Helper: {0}")]
    Helper(#[from] webui_helper::HelperError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
