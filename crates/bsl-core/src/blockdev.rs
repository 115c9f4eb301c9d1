//! Block-device view of a partition for filesystem drivers.
//!
//! Reads go through the upload engine: the partition is opened once with
//! `READ_FLASH_START`, every block read is a run of `READ_FLASH_MIDST`
//! windows at `start * 512`, and `READ_FLASH_END` closes it.

use tracing::{debug, info};

use crate::error::{BslResult, ParamError, ProtocolError};
use crate::events::NullObserver;
use crate::exchange::FrameExchange;
use crate::protocol::constants::{BLOCK_COUNT, BLOCK_SIZE, UPLOAD_WINDOW};
use crate::transfer::{PartitionUpload, TransferPhase, TransferWindow, validate_window};
use crate::transport::UsbTransport;

/// Fixed-geometry block device.
pub trait BlockDevice {
    fn block_size(&self) -> u32;

    fn block_count(&self) -> u64;

    fn open(&mut self) -> BslResult<()>;

    /// Read `count` blocks starting at block `start`.
    fn read_blocks(&mut self, start: u64, count: u32) -> BslResult<Vec<u8>>;

    fn write_blocks(&mut self, start: u64, data: &[u8]) -> BslResult<()>;

    fn close(&mut self) -> BslResult<()>;
}

/// Read-only block device over one FDL2 partition.
pub struct PartitionBlockDevice<'l, 'a, T: UsbTransport> {
    upload: PartitionUpload<'l, 'a, T>,
    window: u32,
    open: bool,
}

impl<'l, 'a, T: UsbTransport> PartitionBlockDevice<'l, 'a, T> {
    pub fn new(link: &'l FrameExchange<'a, T>, partition: impl Into<String>) -> Self {
        Self {
            upload: PartitionUpload::new(link, partition),
            window: UPLOAD_WINDOW,
            open: false,
        }
    }

    pub fn with_window(mut self, window: u32) -> BslResult<Self> {
        self.window = validate_window(window)?;
        Ok(self)
    }

    pub fn partition(&self) -> &str {
        self.upload.partition()
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Device byte range of `count` blocks at `start`.
    fn byte_range(start: u64, count: u32) -> Result<(u32, u32), ParamError> {
        let out_of_range = || ParamError::BlockRange { start, count };
        let end = start.checked_add(u64::from(count)).ok_or_else(out_of_range)?;
        if end > BLOCK_COUNT {
            return Err(out_of_range());
        }
        let offset = start
            .checked_mul(u64::from(BLOCK_SIZE))
            .and_then(|o| u32::try_from(o).ok())
            .ok_or_else(out_of_range)?;
        let len = count.checked_mul(BLOCK_SIZE).ok_or_else(out_of_range)?;
        Ok((offset, len))
    }
}

impl<T: UsbTransport> BlockDevice for PartitionBlockDevice<'_, '_, T> {
    fn block_size(&self) -> u32 {
        BLOCK_SIZE
    }

    fn block_count(&self) -> u64 {
        BLOCK_COUNT
    }

    fn open(&mut self) -> BslResult<()> {
        if self.open {
            return Ok(());
        }
        self.upload.start()?;
        self.open = true;
        info!(partition = self.partition(), "Block device open");
        Ok(())
    }

    fn read_blocks(&mut self, start: u64, count: u32) -> BslResult<Vec<u8>> {
        if !self.open {
            return Err(ProtocolError::NotOpen(self.partition().to_string()).into());
        }
        let (offset, len) = Self::byte_range(start, count)?;
        debug!(start, count, offset = %format!("0x{offset:X}"), "Block read");

        let mut window = TransferWindow::at_offset(offset, len, self.window)?;
        let mut data = Vec::with_capacity(len as usize);
        self.upload.read_range(&mut window, &mut data, &NullObserver)?;
        Ok(data)
    }

    fn write_blocks(&mut self, _start: u64, _data: &[u8]) -> BslResult<()> {
        Err(ProtocolError::Unsupported("block writes").into())
    }

    fn close(&mut self) -> BslResult<()> {
        if !self.open {
            return Ok(());
        }
        self.upload.finish()?;
        self.open = false;
        info!(partition = self.partition(), "Block device closed");
        Ok(())
    }
}

impl<T: UsbTransport> PartitionBlockDevice<'_, '_, T> {
    /// Phase of the underlying upload.
    pub fn phase(&self) -> &TransferPhase {
        self.upload.phase()
    }
}
