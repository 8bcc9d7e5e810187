//! Error types for the web view bridge

use std::path::PathBuf;
use thiserror::Error;

/// Which decoder rejected a byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStage {
    Header,
    Payload,
}

impl std::fmt::Display for DecodeStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeStage::Header => write!(f, "packet header"),
            DecodeStage::Payload => write!(f, "packet payload"),
        }
    }
}

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Failed to spawn helper process: {path}\n  Reason: {source}")]
    SpawnFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Stream truncated in {stage}: expected {expected} bytes, got {got}")]
    TruncatedStream {
        stage: DecodeStage,
        expected: usize,
        got: usize,
    },

    #[error("Malformed argument stream at offset {offset}: {reason}")]
    MalformedArgumentStream { offset: usize, reason: String },

    #[error("Unknown opcode: {0}")]
    UnknownOpcode(u16),

    #[error("Unsupported platform operation: {0}")]
    UnsupportedPlatformOperation(String),

    #[error("Timeout after {duration_ms}ms: {operation}")]
    Timeout { operation: String, duration_ms: u64 },

    #[error("Helper process lost")]
    HelperLost,

    #[error("Channel closed")]
    ChannelClosed,

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(unix)]
    #[error("System error: {0}")]
    Sys(#[from] nix::errno::Errno),
}

impl BridgeError {
    pub(crate) fn malformed(offset: usize, reason: impl Into<String>) -> Self {
        Self::MalformedArgumentStream {
            offset,
            reason: reason.into(),
        }
    }

    /// Errors after which the channel can no longer be used.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BridgeError::Io(_)
                | BridgeError::SpawnFailed { .. }
                | BridgeError::TruncatedStream { .. }
                | BridgeError::HelperLost
                | BridgeError::ChannelClosed
        ) || self.is_sys()
    }

    #[cfg(unix)]
    fn is_sys(&self) -> bool {
        matches!(self, BridgeError::Sys(_))
    }

    #[cfg(not(unix))]
    fn is_sys(&self) -> bool {
        false
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
