//! Window accounting for chunked partition transfers.

use super::validate_window;
use crate::error::BslResult;

/// Offset/remaining bookkeeping for one transfer.
///
/// `offset` only grows and `remaining` only shrinks; the window is finished
/// when `remaining` reaches zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferWindow {
    /// Device offset of the next chunk.
    pub offset: u32,
    /// Bytes still to transfer.
    pub remaining: u32,
    window_size: u32,
    total: u32,
    last_percent: u64,
}

impl TransferWindow {
    /// Fails with `InvalidWindow` unless `window_size` fits one frame.
    pub fn new(total: u32, window_size: u32) -> BslResult<Self> {
        Self::at_offset(0, total, window_size)
    }

    /// Window starting at a device offset other than zero.
    pub fn at_offset(offset: u32, total: u32, window_size: u32) -> BslResult<Self> {
        Ok(Self {
            offset,
            remaining: total,
            window_size: validate_window(window_size)?,
            total,
            last_percent: 0,
        })
    }

    /// Largest chunk per request.
    pub fn window_size(&self) -> u32 {
        self.window_size
    }

    /// Size of the next chunk, `None` once everything is transferred.
    pub fn next_chunk(&self) -> Option<u32> {
        (self.remaining > 0).then(|| self.remaining.min(self.window_size))
    }

    /// Account for a completed chunk.
    ///
    /// Returns the new integer percentage when it changed.
    pub fn advance(&mut self, chunk: u32) -> Option<u64> {
        let chunk = chunk.min(self.remaining);
        self.offset = self.offset.wrapping_add(chunk);
        self.remaining -= chunk;

        let percent = self.percent();
        if percent != self.last_percent {
            self.last_percent = percent;
            Some(percent)
        } else {
            None
        }
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn transferred(&self) -> u32 {
        self.total - self.remaining
    }

    pub fn percent(&self) -> u64 {
        if self.total == 0 {
            return 100;
        }
        u64::from(self.transferred()) * 100 / u64::from(self.total)
    }

    pub fn is_done(&self) -> bool {
        self.remaining == 0
    }

    /// Number of requests needed for the whole window.
    pub fn chunk_count(&self) -> u32 {
        self.total.div_ceil(self.window_size)
    }
}
