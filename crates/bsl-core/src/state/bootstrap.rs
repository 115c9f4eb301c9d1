//! Two-stage bring-up: boot ROM -> FDL1 -> FDL2.

use std::path::Path;

use tracing::{info, instrument, warn};

use super::machine::{BootMachine, BootState};
use crate::error::{BslResult, ParamError};
use crate::events::{BslEvent, BslObserver, BslPhase};
use crate::exchange::{ExchangePolicy, FrameExchange};
use crate::protocol::constants::{FDL2_EXEC_ATTEMPTS, LOADER_PROBE_ATTEMPTS};
use crate::protocol::{Command, Reply};
use crate::transfer::{DownloadTarget, download, image_size, validate_window};
use crate::transport::UsbTransport;

const ACK: ExchangePolicy = ExchangePolicy::expect(Reply::Ack);

/// FDL2 may report that its partition layout differs from the flash.
const FDL2_EXEC_POLICY: ExchangePolicy = ExchangePolicy::expect(Reply::Ack)
    .with_attempts(FDL2_EXEC_ATTEMPTS)
    .tolerating(&[Reply::IncompatiblePartition]);

/// A loader image and where it runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderImage {
    pub address: u32,
    pub window: u32,
    pub data: Vec<u8>,
}

impl LoaderImage {
    pub fn new(address: u32, window: u32, data: Vec<u8>) -> BslResult<Self> {
        validate_window(window)?;
        if u32::try_from(data.len()).is_err() {
            return Err(ParamError::InvalidSize(format!("{} bytes", data.len())).into());
        }
        Ok(Self {
            address,
            window,
            data,
        })
    }

    pub fn from_file(path: &Path, address: u32, window: u32) -> BslResult<Self> {
        image_size(path)?;
        let data = std::fs::read(path)?;
        Self::new(address, window, data)
    }

    fn size(&self) -> u32 {
        // Bounded by `new`.
        self.data.len() as u32
    }
}

/// What the device reported during bring-up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootReport {
    pub rom_version: Option<String>,
    pub loader_version: Option<String>,
    /// FDL2 answered `EXEC_DATA` with `INCOMPATIBLE_PARTITION`.
    pub incompatible_partition: bool,
}

/// Drives one device from power-on to a running FDL2.
pub struct Bootstrap<'l, 'a, T: UsbTransport, O: BslObserver + ?Sized> {
    link: &'l mut FrameExchange<'a, T>,
    observer: &'l O,
    machine: BootMachine,
}

impl<'l, 'a, T: UsbTransport, O: BslObserver + ?Sized> Bootstrap<'l, 'a, T, O> {
    pub fn new(link: &'l mut FrameExchange<'a, T>, observer: &'l O) -> Self {
        Self {
            link,
            observer,
            machine: BootMachine::new(),
        }
    }

    pub fn state(&self) -> &BootState {
        self.machine.state()
    }

    pub fn machine(&self) -> &BootMachine {
        &self.machine
    }

    /// Run every stage. On failure the machine is left `Aborted`.
    #[instrument(skip_all)]
    pub fn run(&mut self, fdl1: &LoaderImage, fdl2: &LoaderImage) -> BslResult<BootReport> {
        match self.run_stages(fdl1, fdl2) {
            Ok(report) => Ok(report),
            Err(e) => {
                self.machine.abort(e.to_string());
                self.observer.on_event(&BslEvent::Error {
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    fn run_stages(&mut self, fdl1: &LoaderImage, fdl2: &LoaderImage) -> BslResult<BootReport> {
        let mut report = BootReport::default();

        self.link.set_mode(self.machine.state().checksum_mode());
        self.phase(BslPhase::WaitingForDevice, BslPhase::BootRom);
        report.rom_version = self.probe(BslPhase::BootRom, 1);
        self.connect()?;
        self.machine.goto_state(BootState::Connected);

        self.load(fdl1, "FDL1")?;
        self.machine.goto_state(BootState::Stage1Loaded);
        self.link.exchange(Command::ExecData, Vec::new(), &ACK)?;
        self.machine.goto_state(BootState::Stage1Exec);

        self.machine.goto_state(BootState::Stage2Probing);
        self.link.set_mode(self.machine.state().checksum_mode());
        self.phase(BslPhase::BootRom, BslPhase::Loader);
        report.loader_version = self.probe(BslPhase::Loader, LOADER_PROBE_ATTEMPTS);
        self.connect()?;
        self.machine.goto_state(BootState::Stage2Connected);

        self.load(fdl2, "FDL2")?;
        self.machine.goto_state(BootState::Stage2Loaded);
        let reply = self
            .link
            .exchange(Command::ExecData, Vec::new(), &FDL2_EXEC_POLICY)?
            .reply();
        report.incompatible_partition = reply == Reply::IncompatiblePartition;
        if report.incompatible_partition {
            warn!("FDL2 running with incompatible partition table");
        }
        self.machine.goto_state(BootState::Stage2Exec);

        self.machine.goto_state(BootState::Ready);
        self.phase(BslPhase::Loader, BslPhase::Ready);
        info!(
            rom = report.rom_version.as_deref().unwrap_or("-"),
            loader = report.loader_version.as_deref().unwrap_or("-"),
            "Device ready"
        );
        Ok(report)
    }

    /// A failed probe is not fatal; `CONNECT` decides.
    fn probe(&self, phase: BslPhase, attempts: u32) -> Option<String> {
        match self.link.probe(attempts) {
            Ok(version) => {
                info!(phase = %phase, version = %version, "Version");
                self.observer.on_event(&BslEvent::VersionReported {
                    phase,
                    version: version.clone(),
                });
                Some(version)
            }
            Err(e) => {
                warn!(phase = %phase, error = %e, "Version probe failed, connecting anyway");
                None
            }
        }
    }

    fn connect(&self) -> BslResult<()> {
        self.link.exchange(Command::Connect, Vec::new(), &ACK)?;
        info!(mode = %self.link.mode(), "Connected");
        Ok(())
    }

    fn load(&self, image: &LoaderImage, name: &str) -> BslResult<()> {
        info!(
            loader = name,
            address = %format!("0x{:08X}", image.address),
            size = image.size(),
            window = image.window,
            "Sending loader"
        );
        download(
            &*self.link,
            self.observer,
            DownloadTarget::Address(image.address),
            image.size(),
            image.window,
            &mut image.data.as_slice(),
        )?;
        Ok(())
    }

    fn phase(&self, from: BslPhase, to: BslPhase) {
        self.observer.on_event(&BslEvent::PhaseChanged { from, to });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{BslError, ProtocolError};
    use crate::events::testing::RecordingObserver;
    use crate::protocol::ChecksumMode;
    use crate::protocol::constants::{
        FDL1_LOAD_ADDRESS, FDL1_WINDOW, FDL2_LOAD_ADDRESS, FDL2_WINDOW,
    };
    use crate::testing::{FakeDevice, Stage};
    use crate::transport::MockTransport;

    fn loaders() -> (LoaderImage, LoaderImage) {
        let fdl1 = (0..1500u32).map(|i| (i % 256) as u8).collect();
        let fdl2 = (0..5000u32).map(|i| (i % 253) as u8).collect();
        (
            LoaderImage::new(FDL1_LOAD_ADDRESS, FDL1_WINDOW, fdl1).unwrap(),
            LoaderImage::new(FDL2_LOAD_ADDRESS, FDL2_WINDOW, fdl2).unwrap(),
        )
    }

    #[test]
    fn test_full_bring_up() {
        let device = FakeDevice::rom();
        let mock = device.transport();
        let mut link = FrameExchange::new(&mock, ChecksumMode::Crc);
        let observer = RecordingObserver::default();
        let (fdl1, fdl2) = loaders();

        let mut boot = Bootstrap::new(&mut link, &observer);
        let report = boot.run(&fdl1, &fdl2).unwrap();

        assert_eq!(boot.state(), &BootState::Ready);
        assert_eq!(
            boot.machine().history(),
            &[
                BootState::Probing,
                BootState::Connected,
                BootState::Stage1Loaded,
                BootState::Stage1Exec,
                BootState::Stage2Probing,
                BootState::Stage2Connected,
                BootState::Stage2Loaded,
                BootState::Stage2Exec,
            ]
        );
        assert_eq!(report.rom_version.as_deref(), Some("SPRD3"));
        assert_eq!(
            report.loader_version.as_deref(),
            Some("Spreadtrum Boot Block version 1.1")
        );
        assert!(!report.incompatible_partition);
        assert_eq!(observer.versions().len(), 2);

        assert_eq!(device.stage(), Stage::Fdl2);
        assert_eq!(device.loaded(FDL1_LOAD_ADDRESS), Some(fdl1.data));
        assert_eq!(device.loaded(FDL2_LOAD_ADDRESS), Some(fdl2.data));
        assert_eq!(link.mode(), ChecksumMode::InternetSum);
    }

    #[test]
    fn test_command_sequence() {
        let device = FakeDevice::rom();
        let mock = device.transport();
        let mut link = FrameExchange::new(&mock, ChecksumMode::Crc);
        let (fdl1, fdl2) = loaders();

        Bootstrap::new(&mut link, &crate::events::NullObserver)
            .run(&fdl1, &fdl2)
            .unwrap();

        // 1500 / 528 -> 3 chunks, 5000 / 2112 -> 3 chunks.
        assert_eq!(
            device.commands(),
            [0x00, 0x01, 0x02, 0x02, 0x02, 0x03, 0x04, 0x00, 0x01, 0x02, 0x02, 0x02, 0x03, 0x04]
        );
        // First write is the bare probe, the CONNECT that follows is CRC-framed.
        let writes = mock.get_writes();
        assert_eq!(writes[0], [0x7E]);
        assert_eq!(writes[1], [0x7E, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x7E]);
    }

    #[test]
    fn test_incompatible_partition_is_not_fatal() {
        let device = FakeDevice::rom()
            .fdl2_exec_reply(Reply::IncompatiblePartition)
            .stall_fdl2_exec(10);
        let mock = device.transport();
        let mut link = FrameExchange::new(&mock, ChecksumMode::Crc);
        let (fdl1, fdl2) = loaders();

        let mut boot = Bootstrap::new(&mut link, &crate::events::NullObserver);
        let report = boot.run(&fdl1, &fdl2).unwrap();

        assert!(report.incompatible_partition);
        assert_eq!(boot.state(), &BootState::Ready);
    }

    #[test]
    fn test_fdl2_exec_gives_up_after_fifteen_reads() {
        let device = FakeDevice::rom().stall_fdl2_exec(15);
        let mock = device.transport();
        let mut link = FrameExchange::new(&mock, ChecksumMode::Crc);
        let (fdl1, fdl2) = loaders();

        let mut boot = Bootstrap::new(&mut link, &crate::events::NullObserver);
        assert!(boot.run(&fdl1, &fdl2).is_err());
        assert!(boot.machine().is_aborted());
    }

    #[test]
    fn test_silent_probe_still_connects() {
        let device = FakeDevice::rom().silent_probe();
        let mock = device.transport();
        let mut link = FrameExchange::new(&mock, ChecksumMode::Crc);
        let (fdl1, fdl2) = loaders();

        let report = Bootstrap::new(&mut link, &crate::events::NullObserver)
            .run(&fdl1, &fdl2)
            .unwrap();
        assert_eq!(report.rom_version, None);
        assert_eq!(report.loader_version, None);
        // One ROM probe, two FDL1 probes.
        let probes = mock.get_writes().iter().filter(|w| w[..] == [0x7E]).count();
        assert_eq!(probes, 3);
    }

    #[test]
    fn test_connect_rejected_aborts() {
        let mock = MockTransport::new();
        mock.queue_reply(Reply::Version, b"SPRD3\0", ChecksumMode::Crc);
        mock.queue_reply(Reply::InvalidCommand, &[], ChecksumMode::Crc);
        let mut link = FrameExchange::new(&mock, ChecksumMode::Crc);
        let (fdl1, fdl2) = loaders();

        let mut boot = Bootstrap::new(&mut link, &crate::events::NullObserver);
        let err = boot.run(&fdl1, &fdl2).unwrap_err();

        assert!(matches!(
            err,
            BslError::Protocol(ProtocolError::UnexpectedResponse {
                command: Command::Connect,
                ..
            })
        ));
        assert!(boot.machine().is_aborted());
        assert_eq!(boot.machine().history(), &[BootState::Probing]);
    }

    #[test]
    fn test_fdl1_exec_rejected_aborts() {
        let device = FakeDevice::rom().rom_exec_reply(Reply::DownDestError);
        let mock = device.transport();
        let mut link = FrameExchange::new(&mock, ChecksumMode::Crc);
        let (fdl1, fdl2) = loaders();

        let mut boot = Bootstrap::new(&mut link, &crate::events::NullObserver);
        let err = boot.run(&fdl1, &fdl2).unwrap_err();

        assert!(matches!(
            err,
            BslError::Protocol(ProtocolError::UnexpectedResponse {
                command: Command::ExecData,
                actual: Reply::DownDestError,
                ..
            })
        ));
        assert!(boot.machine().is_aborted());
        assert_eq!(
            boot.machine().history(),
            &[
                BootState::Probing,
                BootState::Connected,
                BootState::Stage1Loaded
            ]
        );
        assert_eq!(device.stage(), Stage::Rom);
        assert_eq!(link.mode(), ChecksumMode::Crc);
    }

    #[test]
    fn test_fdl1_download_failure_aborts() {
        let device = FakeDevice::rom().fail_midst_at(1);
        let mock = device.transport();
        let mut link = FrameExchange::new(&mock, ChecksumMode::Crc);
        let (fdl1, fdl2) = loaders();

        let mut boot = Bootstrap::new(&mut link, &crate::events::NullObserver);
        let err = boot.run(&fdl1, &fdl2).unwrap_err();

        assert!(matches!(
            err,
            BslError::Protocol(ProtocolError::UnexpectedResponse {
                command: Command::MidstData,
                actual: Reply::OperationFailed,
                ..
            })
        ));
        assert!(boot.machine().is_aborted());
        assert_eq!(
            boot.machine().history(),
            &[BootState::Probing, BootState::Connected]
        );
        // No third chunk, no END_DATA, no EXEC_DATA.
        assert_eq!(device.commands(), [0x00, 0x01, 0x02, 0x02]);
    }

    #[test]
    fn test_loader_from_file() {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0xAA; 700]).unwrap();

        let image = LoaderImage::from_file(file.path(), FDL1_LOAD_ADDRESS, FDL1_WINDOW).unwrap();
        assert_eq!(image.size(), 700);
        assert!(LoaderImage::new(FDL1_LOAD_ADDRESS, 0, vec![]).is_err());
    }
}
