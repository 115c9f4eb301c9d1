//! Windowed partition transfers.
//!
//! Both directions run `Start -> Transferring -> End -> Done`; any failed
//! step leaves the transfer in `Failed` and the device mid-protocol.

pub mod download;
pub mod upload;
pub mod window;

use std::fmt;

use crate::error::{BslResult, ParamError};
use crate::protocol::constants::MAX_PAYLOAD_LEN;

pub use download::{DownloadTarget, PartitionDownload, download, download_file, image_size};
pub use upload::{PartitionUpload, upload};
pub use window::TransferWindow;

/// Phase of a single upload or download.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TransferPhase {
    #[default]
    Start,
    Transferring,
    End,
    Done,
    Failed(String),
}

impl fmt::Display for TransferPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferPhase::Start => write!(f, "START"),
            TransferPhase::Transferring => write!(f, "TRANSFERRING"),
            TransferPhase::End => write!(f, "END"),
            TransferPhase::Done => write!(f, "DONE"),
            TransferPhase::Failed(reason) => write!(f, "FAILED ({reason})"),
        }
    }
}

impl TransferPhase {
    pub(crate) fn goto(&mut self, next: TransferPhase) {
        tracing::debug!(from = %self, to = %next, "Transfer phase");
        *self = next;
    }

    /// Record `result`'s error, if any, as the failure reason.
    pub(crate) fn track<R>(&mut self, result: BslResult<R>) -> BslResult<R> {
        if let Err(e) = &result {
            self.goto(TransferPhase::Failed(e.to_string()));
        }
        result
    }
}

/// Summary of a finished transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferSummary {
    pub bytes: u64,
    pub chunks: u32,
}

/// Windows must fit the 16-bit frame length field.
pub fn validate_window(window_size: u32) -> BslResult<u32> {
    if window_size == 0 || window_size as usize > MAX_PAYLOAD_LEN {
        return Err(ParamError::InvalidWindow(window_size).into());
    }
    Ok(window_size)
}
