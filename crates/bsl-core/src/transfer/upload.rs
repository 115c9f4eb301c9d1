//! Partition upload (device -> host).
//!
//! `READ_FLASH_START` names the partition, each `READ_FLASH_MIDST` asks for
//! `{size, offset}` and is answered with a `READ_FLASH_DATA` frame, and
//! `READ_FLASH_END` closes the partition.

use std::io::Write;

use tracing::{debug, info, instrument, warn};

use super::{TransferPhase, TransferSummary, TransferWindow};
use crate::error::{BslResult, ProtocolError};
use crate::events::{BslEvent, BslObserver, BslPhase};
use crate::exchange::{ExchangePolicy, FrameExchange};
use crate::protocol::constants::{READ_ALL, START_ATTEMPTS};
use crate::protocol::{Command, PartitionRequest, ReadWindow, Reply};
use crate::transport::UsbTransport;

/// `DOWN_SIZE_ERROR` only means the size hint exceeds the partition.
const START_POLICY: ExchangePolicy = ExchangePolicy::expect(Reply::Ack)
    .with_attempts(START_ATTEMPTS)
    .tolerating(&[Reply::DownSizeError]);

const MIDST_POLICY: ExchangePolicy = ExchangePolicy::expect(Reply::ReadFlashData);

const END_POLICY: ExchangePolicy = ExchangePolicy::expect(Reply::Ack);

/// One open partition being read.
pub struct PartitionUpload<'l, 'a, T: UsbTransport> {
    link: &'l FrameExchange<'a, T>,
    partition: String,
    phase: TransferPhase,
}

impl<'l, 'a, T: UsbTransport> PartitionUpload<'l, 'a, T> {
    pub fn new(link: &'l FrameExchange<'a, T>, partition: impl Into<String>) -> Self {
        Self {
            link,
            partition: partition.into(),
            phase: TransferPhase::Start,
        }
    }

    pub fn phase(&self) -> &TransferPhase {
        &self.phase
    }

    pub fn partition(&self) -> &str {
        &self.partition
    }

    /// Open the partition for reading.
    pub fn start(&mut self) -> BslResult<Reply> {
        let result = self.send_start();
        let reply = self.phase.track(result)?;
        self.phase.goto(TransferPhase::Transferring);
        Ok(reply)
    }

    fn send_start(&self) -> BslResult<Reply> {
        let request = PartitionRequest::new(self.partition.as_str(), READ_ALL)?;
        let reply = self
            .link
            .exchange(Command::ReadFlashStart, request.to_bytes(), &START_POLICY)?
            .reply();
        if reply == Reply::DownSizeError {
            warn!(partition = %self.partition, "Partition size hint rejected, continuing");
        }
        Ok(reply)
    }

    /// Read every chunk of `window` into `sink`, in order.
    pub fn read_range<W: Write, O: BslObserver + ?Sized>(
        &mut self,
        window: &mut TransferWindow,
        sink: &mut W,
        observer: &O,
    ) -> BslResult<TransferSummary> {
        let result = self.read_chunks(window, sink, observer);
        self.phase.track(result)
    }

    fn read_chunks<W: Write, O: BslObserver + ?Sized>(
        &self,
        window: &mut TransferWindow,
        sink: &mut W,
        observer: &O,
    ) -> BslResult<TransferSummary> {
        let mut summary = TransferSummary {
            bytes: 0,
            chunks: 0,
        };

        while let Some(chunk) = window.next_chunk() {
            let request = ReadWindow::new(chunk, window.offset);
            let data = self
                .link
                .exchange(Command::ReadFlashMidst, request.to_bytes(), &MIDST_POLICY)?
                .into_payload();
            if data.len() != chunk as usize {
                return Err(ProtocolError::ShortData {
                    expected: chunk as usize,
                    actual: data.len(),
                }
                .into());
            }
            sink.write_all(&data)?;

            summary.bytes += u64::from(chunk);
            summary.chunks += 1;
            if let Some(percent) = window.advance(chunk) {
                debug!(partition = %self.partition, percent, "Upload progress");
                observer.on_event(&BslEvent::Progress {
                    phase: BslPhase::Upload,
                    operation: self.partition.clone(),
                    current: u64::from(window.transferred()),
                    total: u64::from(window.total()),
                });
            }
        }

        sink.flush()?;
        Ok(summary)
    }

    /// Close the partition.
    pub fn finish(&mut self) -> BslResult<()> {
        self.phase.goto(TransferPhase::End);
        let result = self
            .link
            .exchange(Command::ReadFlashEnd, Vec::new(), &END_POLICY)
            .map(|_| ());
        self.phase.track(result)?;
        self.phase.goto(TransferPhase::Done);
        Ok(())
    }
}

/// Read `size` bytes of `partition` into `sink`.
#[instrument(skip(link, sink, observer), fields(mode = %link.mode()))]
pub fn upload<T: UsbTransport, W: Write, O: BslObserver + ?Sized>(
    link: &FrameExchange<'_, T>,
    partition: &str,
    size: u32,
    window_size: u32,
    sink: &mut W,
    observer: &O,
) -> BslResult<TransferSummary> {
    let mut window = TransferWindow::new(size, window_size)?;
    info!(
        partition,
        size = %format!("0x{size:X}"),
        window = %format!("0x{window_size:X}"),
        "Reading partition"
    );

    let mut upload = PartitionUpload::new(link, partition);
    upload.start()?;
    let summary = upload.read_range(&mut window, sink, observer)?;
    upload.finish()?;

    info!(partition, bytes = summary.bytes, chunks = summary.chunks, "Partition read");
    Ok(summary)
}
