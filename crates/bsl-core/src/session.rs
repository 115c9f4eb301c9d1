//! BSL session: one opened device plus the configuration every command uses.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::blockdev::{BlockDevice, PartitionBlockDevice};
use crate::error::BslResult;
use crate::events::{BslEvent, BslObserver, BslPhase, PacketDirection, TracingObserver};
use crate::exchange::{ExchangePolicy, FrameExchange};
use crate::partition;
use crate::protocol::constants::{
    DOWNLOAD_WINDOW, FDL1_LOAD_ADDRESS, FDL1_WINDOW, FDL2_LOAD_ADDRESS, FDL2_WINDOW,
    TRANSFER_TIMEOUT, UPLOAD_WINDOW,
};
use crate::protocol::{ChecksumMode, Command, Reply};
use crate::state::{BootReport, Bootstrap, LoaderImage};
use crate::transfer::{self, DownloadTarget, TransferSummary};
use crate::transport::{NusbTransport, TransportError, UsbTransport};

/// Blocks per `READ_FLASH_MIDST` batch when dumping through the block device.
const DUMP_BATCH_BLOCKS: u32 = 2048;

/// Configuration for a BSL session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Stage-1 loader image.
    pub fdl1_path: PathBuf,
    pub fdl1_address: u32,
    pub fdl1_window: u32,
    /// Stage-2 loader image.
    pub fdl2_path: PathBuf,
    pub fdl2_address: u32,
    pub fdl2_window: u32,
    /// Chunk size for partition reads.
    pub upload_window: u32,
    /// Chunk size for partition writes.
    pub download_window: u32,
    /// Per-call USB timeout in milliseconds.
    pub timeout_ms: u64,
    /// How long to wait for the device to enumerate, in seconds.
    pub device_wait_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            fdl1_path: PathBuf::from("fdl1.bin"),
            fdl1_address: FDL1_LOAD_ADDRESS,
            fdl1_window: FDL1_WINDOW,
            fdl2_path: PathBuf::from("fdl2.bin"),
            fdl2_address: FDL2_LOAD_ADDRESS,
            fdl2_window: FDL2_WINDOW,
            upload_window: UPLOAD_WINDOW,
            download_window: DOWNLOAD_WINDOW,
            timeout_ms: TRANSFER_TIMEOUT.as_millis() as u64,
            device_wait_secs: 0,
        }
    }
}

impl SessionConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SessionConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// BSL session over one transport.
pub struct BslSession<T: UsbTransport, O: BslObserver> {
    transport: T,
    config: SessionConfig,
    observer: Arc<O>,
}

impl BslSession<NusbTransport, TracingObserver> {
    /// Open the first Spreadtrum device with the default tracing observer.
    pub fn open(config: SessionConfig) -> Result<Self> {
        Self::open_with_observer(config, Arc::new(TracingObserver))
    }
}

impl<O: BslObserver> BslSession<NusbTransport, O> {
    /// Open the first Spreadtrum device, polling until `device_wait_secs`.
    pub fn open_with_observer(config: SessionConfig, observer: Arc<O>) -> Result<Self> {
        observer.on_event(&BslEvent::PhaseChanged {
            from: BslPhase::WaitingForDevice,
            to: BslPhase::WaitingForDevice,
        });
        let transport = wait_for_device(&config)?;
        Ok(Self::with_transport(transport, config, observer))
    }
}

fn wait_for_device(config: &SessionConfig) -> Result<NusbTransport> {
    info!("Waiting for device...");
    let deadline = Duration::from_secs(config.device_wait_secs);
    let start = Instant::now();
    let mut poll_count = 0u64;

    loop {
        poll_count += 1;
        match NusbTransport::open_with_timeout(config.timeout()) {
            Ok(t) => {
                info!(
                    vid = format!("{:04X}", t.vendor_id()),
                    pid = format!("{:04X}", t.product_id()),
                    "Device found after {} polls",
                    poll_count
                );
                return Ok(t);
            }
            Err(TransportError::DeviceNotFound { .. }) if start.elapsed() < deadline => {
                thread::sleep(Duration::from_millis(100));
            }
            Err(TransportError::DeviceNotFound { .. }) => {
                return Err(anyhow!(
                    "No Spreadtrum device found after {}s",
                    deadline.as_secs()
                ));
            }
            Err(e) => return Err(e.into()),
        }
    }
}

impl<T: UsbTransport, O: BslObserver> BslSession<T, O> {
    pub fn with_transport(transport: T, config: SessionConfig, observer: Arc<O>) -> Self {
        observer.on_event(&BslEvent::DeviceConnected {
            vid: transport.vendor_id(),
            pid: transport.product_id(),
        });
        Self {
            transport,
            config,
            observer,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn observed(&self) -> ObservableTransport<'_, T, O> {
        ObservableTransport {
            inner: &self.transport,
            observer: &self.observer,
        }
    }

    fn finish<R>(&self, result: BslResult<R>) -> BslResult<R> {
        match &result {
            Ok(_) => self.observer.on_event(&BslEvent::Complete),
            Err(e) => self.observer.on_event(&BslEvent::Error {
                message: e.to_string(),
            }),
        }
        result
    }

    /// Bring the device from boot ROM to FDL2.
    #[instrument(skip(self))]
    pub fn ready(&self) -> BslResult<BootReport> {
        let result = self.ready_inner();
        self.finish(result)
    }

    fn ready_inner(&self) -> BslResult<BootReport> {
        let fdl1 = LoaderImage::from_file(
            &self.config.fdl1_path,
            self.config.fdl1_address,
            self.config.fdl1_window,
        )?;
        let fdl2 = LoaderImage::from_file(
            &self.config.fdl2_path,
            self.config.fdl2_address,
            self.config.fdl2_window,
        )?;

        let transport = self.observed();
        let mut link = FrameExchange::new(&transport, ChecksumMode::Crc);
        Bootstrap::new(&mut link, self.observer.as_ref()).run(&fdl1, &fdl2)
    }

    /// Reboot the device into its normal firmware.
    #[instrument(skip(self))]
    pub fn reset(&self) -> BslResult<()> {
        let result = self.device_command(Command::NormalReset);
        self.finish(result)
    }

    /// Power the device off.
    #[instrument(skip(self))]
    pub fn shutdown(&self) -> BslResult<()> {
        let result = self.device_command(Command::PowerDown);
        self.finish(result)
    }

    fn device_command(&self, command: Command) -> BslResult<()> {
        self.observer.on_event(&BslEvent::PhaseChanged {
            from: BslPhase::Ready,
            to: BslPhase::DeviceReset,
        });
        let transport = self.observed();
        let link = FrameExchange::new(&transport, ChecksumMode::InternetSum);
        link.exchange(command, Vec::new(), &ExchangePolicy::expect(Reply::Ack))?;
        info!(command = %command, "Device acknowledged");
        Ok(())
    }

    /// Read `size` bytes of `partition` into a new file at `path`.
    #[instrument(skip(self, path), fields(path = %path.display()))]
    pub fn read_partition(
        &self,
        partition: &str,
        size: u32,
        path: &Path,
    ) -> BslResult<TransferSummary> {
        let result = self.read_partition_inner(partition, size, path);
        self.finish(result)
    }

    fn read_partition_inner(
        &self,
        partition: &str,
        size: u32,
        path: &Path,
    ) -> BslResult<TransferSummary> {
        let partition = partition::lookup(partition)?;
        self.upload_phase();

        let mut sink = BufWriter::new(File::create(path)?);
        let transport = self.observed();
        let link = FrameExchange::new(&transport, ChecksumMode::InternetSum);
        let summary = transfer::upload(
            &link,
            partition,
            size,
            self.config.upload_window,
            &mut sink,
            self.observer.as_ref(),
        )?;
        sink.flush()?;
        Ok(summary)
    }

    /// Write the file at `path` into `partition`.
    #[instrument(skip(self, path), fields(path = %path.display()))]
    pub fn write_partition(&self, partition: &str, path: &Path) -> BslResult<TransferSummary> {
        let result = self.write_partition_inner(partition, path);
        self.finish(result)
    }

    fn write_partition_inner(&self, partition: &str, path: &Path) -> BslResult<TransferSummary> {
        let partition = partition::lookup(partition)?;
        self.observer.on_event(&BslEvent::PhaseChanged {
            from: BslPhase::Ready,
            to: BslPhase::Download,
        });

        let transport = self.observed();
        let link = FrameExchange::new(&transport, ChecksumMode::InternetSum);
        transfer::download_file(
            &link,
            self.observer.as_ref(),
            DownloadTarget::Partition(partition.to_string()),
            path,
            self.config.download_window,
        )
    }

    /// Copy `count` 512-byte blocks starting at `start` into a file, reading
    /// through the block-device interface.
    #[instrument(skip(self, path), fields(path = %path.display()))]
    pub fn dump_blocks(
        &self,
        partition: &str,
        start: u64,
        count: u32,
        path: &Path,
    ) -> BslResult<u64> {
        let result = self.dump_blocks_inner(partition, start, count, path);
        self.finish(result)
    }

    fn dump_blocks_inner(
        &self,
        partition: &str,
        start: u64,
        count: u32,
        path: &Path,
    ) -> BslResult<u64> {
        let partition = partition::lookup(partition)?;
        self.upload_phase();

        let mut sink = BufWriter::new(File::create(path)?);
        let transport = self.observed();
        let link = FrameExchange::new(&transport, ChecksumMode::InternetSum);
        let mut device =
            PartitionBlockDevice::new(&link, partition).with_window(self.config.upload_window)?;

        device.open()?;
        let mut done = 0u32;
        while done < count {
            let batch = (count - done).min(DUMP_BATCH_BLOCKS);
            let data = device.read_blocks(start + u64::from(done), batch)?;
            sink.write_all(&data)?;
            done += batch;
            self.observer.on_event(&BslEvent::Progress {
                phase: BslPhase::Upload,
                operation: partition.to_string(),
                current: u64::from(done),
                total: u64::from(count),
            });
        }
        device.close()?;
        sink.flush()?;

        let bytes = u64::from(count) * u64::from(device.block_size());
        info!(partition, start, count, bytes, "Blocks dumped");
        Ok(bytes)
    }

    fn upload_phase(&self) {
        self.observer.on_event(&BslEvent::PhaseChanged {
            from: BslPhase::Ready,
            to: BslPhase::Upload,
        });
    }
}

/// Transport wrapper that emits packet events.
struct ObservableTransport<'a, T: UsbTransport, O: BslObserver> {
    inner: &'a T,
    observer: &'a Arc<O>,
}

impl<'a, T: UsbTransport, O: BslObserver> UsbTransport for ObservableTransport<'a, T, O> {
    fn write(&self, data: &[u8]) -> Result<usize, TransportError> {
        let res = self.inner.write(data);
        if res.is_ok() {
            self.observer.on_event(&BslEvent::Packet {
                direction: PacketDirection::Tx,
                length: data.len(),
                data: Some(data.iter().take(32).cloned().collect()),
            });
        }
        res
    }

    fn read(&self, max_len: usize) -> Result<Vec<u8>, TransportError> {
        let res = self.inner.read(max_len);
        if let Ok(data) = &res
            && !data.is_empty()
        {
            self.observer.on_event(&BslEvent::Packet {
                direction: PacketDirection::Rx,
                length: data.len(),
                data: Some(data.iter().take(32).cloned().collect()),
            });
        }
        res
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    fn vendor_id(&self) -> u16 {
        self.inner.vendor_id()
    }

    fn product_id(&self) -> u16 {
        self.inner.product_id()
    }
}
