//! Host -> device downloads: loader images and partition images.

use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use tracing::{debug, info, instrument};

use super::{TransferPhase, TransferSummary, TransferWindow, validate_window};
use crate::error::{BslError, BslResult, ParamError, ProtocolError};
use crate::events::{BslEvent, BslObserver, BslPhase};
use crate::exchange::{ExchangePolicy, FrameExchange};
use crate::protocol::constants::START_ATTEMPTS;
use crate::protocol::{Command, LoadRequest, PartitionRequest, Reply};
use crate::transport::UsbTransport;

const ACK: ExchangePolicy = ExchangePolicy::expect(Reply::Ack);

/// Where a download lands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadTarget {
    /// Loader image placed at a RAM address.
    Address(u32),
    /// Named flash partition.
    Partition(String),
}

impl DownloadTarget {
    /// `START_DATA` payload announcing `size` bytes.
    fn start_payload(&self, size: u32) -> BslResult<Vec<u8>> {
        match self {
            DownloadTarget::Address(address) => Ok(LoadRequest::new(*address, size).to_bytes()),
            DownloadTarget::Partition(name) => {
                Ok(PartitionRequest::new(name.as_str(), size)?.to_bytes())
            }
        }
    }

    fn start_policy(&self) -> ExchangePolicy {
        match self {
            DownloadTarget::Address(_) => ACK,
            DownloadTarget::Partition(_) => ACK.with_attempts(START_ATTEMPTS),
        }
    }
}

impl fmt::Display for DownloadTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownloadTarget::Address(address) => write!(f, "0x{address:08X}"),
            DownloadTarget::Partition(name) => write!(f, "{name}"),
        }
    }
}

/// One download in progress.
pub struct PartitionDownload<'l, 'a, T: UsbTransport> {
    link: &'l FrameExchange<'a, T>,
    target: DownloadTarget,
    phase: TransferPhase,
}

impl<'l, 'a, T: UsbTransport> PartitionDownload<'l, 'a, T> {
    pub fn new(link: &'l FrameExchange<'a, T>, target: DownloadTarget) -> Self {
        Self {
            link,
            target,
            phase: TransferPhase::Start,
        }
    }

    pub fn phase(&self) -> &TransferPhase {
        &self.phase
    }

    pub fn target(&self) -> &DownloadTarget {
        &self.target
    }

    /// Announce `size` bytes. `DOWN_SIZE_ERROR` means the image does not fit.
    pub fn start(&mut self, size: u32) -> BslResult<()> {
        let result = self.send_start(size);
        self.phase.track(result)?;
        self.phase.goto(TransferPhase::Transferring);
        Ok(())
    }

    fn send_start(&self, size: u32) -> BslResult<()> {
        let payload = self.target.start_payload(size)?;
        match self
            .link
            .exchange(Command::StartData, payload, &self.target.start_policy())
        {
            Ok(_) => Ok(()),
            Err(BslError::Protocol(ProtocolError::UnexpectedResponse {
                actual: Reply::DownSizeError,
                ..
            })) => Err(ProtocolError::SizeMismatch {
                partition: self.target.to_string(),
                size: u64::from(size),
            }
            .into()),
            Err(e) => Err(e),
        }
    }

    /// Send `source` chunk by chunk; every chunk must be acknowledged before
    /// the next one goes out.
    pub fn write_all<R: Read, O: BslObserver + ?Sized>(
        &mut self,
        window: &mut TransferWindow,
        source: &mut R,
        observer: &O,
    ) -> BslResult<TransferSummary> {
        let result = self.write_chunks(window, source, observer);
        self.phase.track(result)
    }

    fn write_chunks<R: Read, O: BslObserver + ?Sized>(
        &self,
        window: &mut TransferWindow,
        source: &mut R,
        observer: &O,
    ) -> BslResult<TransferSummary> {
        let mut summary = TransferSummary {
            bytes: 0,
            chunks: 0,
        };
        let mut buffer = vec![0u8; window.window_size() as usize];

        while let Some(chunk) = window.next_chunk() {
            let data = &mut buffer[..chunk as usize];
            source.read_exact(data)?;
            self.link
                .exchange(Command::MidstData, data.to_vec(), &ACK)?;

            summary.bytes += u64::from(chunk);
            summary.chunks += 1;
            if let Some(percent) = window.advance(chunk) {
                debug!(dest = %self.target, percent, "Download progress");
                observer.on_event(&BslEvent::Progress {
                    phase: BslPhase::Download,
                    operation: self.target.to_string(),
                    current: u64::from(window.transferred()),
                    total: u64::from(window.total()),
                });
            }
        }
        Ok(summary)
    }

    pub fn finish(&mut self) -> BslResult<()> {
        self.phase.goto(TransferPhase::End);
        let result = self
            .link
            .exchange(Command::EndData, Vec::new(), &ACK)
            .map(|_| ());
        self.phase.track(result)?;
        self.phase.goto(TransferPhase::Done);
        Ok(())
    }
}

/// Size of `path` if it is a regular file the 32-bit size fields can carry.
pub fn image_size(path: &Path) -> BslResult<u32> {
    let metadata =
        std::fs::metadata(path).map_err(|_| ParamError::NotAFile(path.to_path_buf()))?;
    if !metadata.is_file() {
        return Err(ParamError::NotAFile(path.to_path_buf()).into());
    }
    u32::try_from(metadata.len()).map_err(|_| ParamError::ImageTooLarge(path.to_path_buf()).into())
}

/// Download the file at `path` to `target`.
#[instrument(skip_all, fields(path = %path.display(), dest = %target, window = window_size))]
pub fn download_file<T: UsbTransport, O: BslObserver + ?Sized>(
    link: &FrameExchange<'_, T>,
    observer: &O,
    target: DownloadTarget,
    path: &Path,
    window_size: u32,
) -> BslResult<TransferSummary> {
    validate_window(window_size)?;
    let size = image_size(path)?;
    let file = File::open(path).map_err(|_| ParamError::NotAFile(path.to_path_buf()))?;
    let mut source = BufReader::new(file);

    info!(
        dest = %target,
        size = %format!("0x{size:X}"),
        window = window_size,
        "Downloading image"
    );
    download(link, observer, target, size, window_size, &mut source)
}

/// Download `size` bytes read from `source` to `target`.
pub fn download<T: UsbTransport, R: Read, O: BslObserver + ?Sized>(
    link: &FrameExchange<'_, T>,
    observer: &O,
    target: DownloadTarget,
    size: u32,
    window_size: u32,
    source: &mut R,
) -> BslResult<TransferSummary> {
    let mut window = TransferWindow::new(size, window_size)?;
    let mut download = PartitionDownload::new(link, target);
    download.start(size)?;
    let summary = download.write_all(&mut window, source, observer)?;
    download.finish()?;

    info!(dest = %download.target(), bytes = summary.bytes, "Download complete");
    Ok(summary)
}
