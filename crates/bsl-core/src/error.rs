//! Error types shared by the exchange, bootstrap and transfer layers.

use std::path::PathBuf;

use thiserror::Error;

use crate::protocol::{Command, FrameError, HeaderError, Reply};
use crate::transport::TransportError;

/// The device answered, but not the way the current phase requires.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("{command}: expected {expected}, device answered {actual}")]
    UnexpectedResponse {
        command: Command,
        expected: Reply,
        actual: Reply,
    },

    #[error("Partition '{partition}' is smaller than the {size}-byte image")]
    SizeMismatch { partition: String, size: u64 },

    #[error("Device returned {actual} bytes for a {expected}-byte window")]
    ShortData { expected: usize, actual: usize },

    #[error("Operation not supported: {0}")]
    Unsupported(&'static str),

    #[error("Partition '{0}' is not open")]
    NotOpen(String),
}

/// Caller-supplied arguments that cannot be used.
#[derive(Error, Debug)]
pub enum ParamError {
    #[error("Unknown partition '{0}'")]
    UnknownPartition(String),

    #[error("Invalid size '{0}' (expected <n>, <n>k or <n>m)")]
    InvalidSize(String),

    #[error("Invalid window size {0} (must be 1..=65535)")]
    InvalidWindow(u32),

    #[error("'{}' is not a readable regular file", .0.display())]
    NotAFile(PathBuf),

    #[error("Image '{}' is larger than 4 GiB", .0.display())]
    ImageTooLarge(PathBuf),

    #[error("Blocks {start}+{count} are outside the device")]
    BlockRange { start: u64, count: u32 },

    #[error("Invalid request: {0}")]
    Header(#[from] HeaderError),
}

/// Top-level error for every session operation.
#[derive(Error, Debug)]
pub enum BslError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Parameter error: {0}")]
    Param(#[from] ParamError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<HeaderError> for BslError {
    fn from(e: HeaderError) -> Self {
        BslError::Param(ParamError::Header(e))
    }
}

impl BslError {
    /// Transport and frame failures are worth another receive attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BslError::Transport(_) | BslError::Frame(_))
    }
}

pub type BslResult<T> = Result<T, BslError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        let timeout = BslError::from(TransportError::Timeout { timeout_ms: 200 });
        assert!(timeout.is_retryable());
        assert!(BslError::from(FrameError::BadDelimiter).is_retryable());

        let unexpected = BslError::from(ProtocolError::UnexpectedResponse {
            command: Command::Connect,
            expected: Reply::Ack,
            actual: Reply::InvalidCommand,
        });
        assert!(!unexpected.is_retryable());
    }

    #[test]
    fn test_messages() {
        let err = ProtocolError::UnexpectedResponse {
            command: Command::ExecData,
            expected: Reply::Ack,
            actual: Reply::DownDestError,
        };
        assert_eq!(
            err.to_string(),
            "EXEC_DATA (0x04): expected Ack (0x80), device answered DownDestError (0x89)"
        );
    }
}
