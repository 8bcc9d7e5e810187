//! Error types for the helper process

use thiserror::Error;
use webui_bridge::BridgeError;

#[derive(Error, Debug)]
pub enum HelperError {
    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Web view engine error: {0}")]
    Engine(String),

    #[error("Invalid arguments: {0}\n  Usage: webui-helper <read_fd> <write_fd>")]
    InvalidArguments(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HelperError {
    pub fn unsupported(operation: impl Into<String>) -> Self {
        HelperError::Bridge(BridgeError::UnsupportedPlatformOperation(operation.into()))
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(
            self,
            HelperError::Bridge(BridgeError::UnsupportedPlatformOperation(_))
        )
    }
}

pub type Result<T> = std::result::Result<T, HelperError>;
