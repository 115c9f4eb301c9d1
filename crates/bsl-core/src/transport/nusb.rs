//! nusb-based USB transport implementation.

use nusb::io::{EndpointRead, EndpointWrite};
use nusb::transfer::{Bulk, In, Out};
use nusb::{MaybeFuture, list_devices};
use std::io::{ErrorKind, Read, Write};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, instrument};

use super::traits::{TransportError, UsbTransport};
use crate::protocol::constants::{
    MAX_READ_SIZE, SPRD_ENDPOINT_IN, SPRD_ENDPOINT_OUT, SPRD_INTERFACE, SPRD_VENDOR_ID,
    SUPPORTED_PIDS, TRANSFER_TIMEOUT,
};

/// nusb-based USB transport.
pub struct NusbTransport {
    reader: Mutex<EndpointRead<Bulk>>,
    writer: Mutex<EndpointWrite<Bulk>>,
    timeout: Duration,
    vid: u16,
    pid: u16,
}

impl NusbTransport {
    /// Open the first Spreadtrum device in download mode.
    #[instrument(level = "info")]
    pub fn open() -> Result<Self, TransportError> {
        Self::open_with_timeout(TRANSFER_TIMEOUT)
    }

    /// Open with a custom per-call timeout.
    pub fn open_with_timeout(timeout: Duration) -> Result<Self, TransportError> {
        let devices = list_devices()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?;

        for device_info in devices {
            if device_info.vendor_id() == SPRD_VENDOR_ID
                && SUPPORTED_PIDS.contains(&device_info.product_id())
            {
                return Self::open_device_info(device_info, timeout);
            }
        }

        Err(TransportError::DeviceNotFound {
            vid: SPRD_VENDOR_ID,
            pid: 0,
        })
    }

    /// Open a device with specific VID/PID.
    #[instrument(
        level = "info",
        fields(vid = format!("{:04X}", vid), pid = format!("{:04X}", pid))
    )]
    pub fn open_with_ids(vid: u16, pid: u16, timeout: Duration) -> Result<Self, TransportError> {
        let device_info = list_devices()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?
            .find(|d| d.vendor_id() == vid && d.product_id() == pid)
            .ok_or(TransportError::DeviceNotFound { vid, pid })?;

        Self::open_device_info(device_info, timeout)
    }

    fn open_device_info(
        device_info: nusb::DeviceInfo,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let vid = device_info.vendor_id();
        let pid = device_info.product_id();

        info!(
            vendor_id = %format!("{:04X}", vid),
            product_id = %format!("{:04X}", pid),
            "Found device"
        );

        let device = device_info
            .open()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?;

        let interface = device.claim_interface(SPRD_INTERFACE).wait().map_err(|e| {
            TransportError::ClaimInterfaceFailed {
                interface: SPRD_INTERFACE,
                message: e.to_string(),
            }
        })?;

        // Prefer the advertised bulk pair, fall back to the known addresses.
        let mut in_endpoint: u8 = 0;
        let mut out_endpoint: u8 = 0;

        for config in device.configurations() {
            for iface in config.interfaces() {
                if iface.interface_number() == SPRD_INTERFACE {
                    for alt in iface.alt_settings() {
                        for ep in alt.endpoints() {
                            if ep.transfer_type() == nusb::descriptors::TransferType::Bulk {
                                if ep.direction() == nusb::transfer::Direction::In {
                                    in_endpoint = ep.address();
                                } else {
                                    out_endpoint = ep.address();
                                }
                            }
                        }
                    }
                }
            }
        }

        if in_endpoint == 0 {
            in_endpoint = SPRD_ENDPOINT_IN;
        }
        if out_endpoint == 0 {
            out_endpoint = SPRD_ENDPOINT_OUT;
        }

        let reader = interface
            .endpoint::<Bulk, In>(in_endpoint)
            .map_err(|_| TransportError::EndpointNotFound {
                ep_type: "Bulk".into(),
                direction: "In".into(),
            })?
            .reader(MAX_READ_SIZE)
            .with_read_timeout(timeout);
        let writer = interface
            .endpoint::<Bulk, Out>(out_endpoint)
            .map_err(|_| TransportError::EndpointNotFound {
                ep_type: "Bulk".into(),
                direction: "Out".into(),
            })?
            .writer(MAX_READ_SIZE)
            .with_write_timeout(timeout);

        info!(
            in_ep = %format!("0x{:02X}", in_endpoint),
            out_ep = %format!("0x{:02X}", out_endpoint),
            timeout_ms = timeout.as_millis() as u64,
            "Device opened successfully"
        );

        Ok(Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            timeout,
            vid,
            pid,
        })
    }

    fn map_io(&self, e: std::io::Error, read: bool) -> TransportError {
        match e.kind() {
            ErrorKind::TimedOut => TransportError::Timeout {
                timeout_ms: self.timeout.as_millis() as u64,
            },
            ErrorKind::BrokenPipe | ErrorKind::NotConnected => TransportError::Disconnected,
            _ if read => TransportError::ReadFailed(e.to_string()),
            _ => TransportError::WriteFailed(e.to_string()),
        }
    }
}

impl UsbTransport for NusbTransport {
    #[instrument(skip(self, data), fields(len = data.len()))]
    fn write(&self, data: &[u8]) -> Result<usize, TransportError> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| TransportError::WriteFailed("writer lock poisoned".into()))?;

        writer.write_all(data).map_err(|e| self.map_io(e, false))?;
        writer.flush().map_err(|e| self.map_io(e, false))?;

        debug!(bytes_written = data.len(), "Write complete");
        Ok(data.len())
    }

    #[instrument(skip(self), fields(max_len))]
    fn read(&self, max_len: usize) -> Result<Vec<u8>, TransportError> {
        let mut reader = self
            .reader
            .lock()
            .map_err(|_| TransportError::ReadFailed("reader lock poisoned".into()))?;

        let mut buf = vec![0u8; max_len];
        let n = reader.read(&mut buf).map_err(|e| self.map_io(e, true))?;

        buf.truncate(n);
        debug!(bytes_read = n, "Read complete");
        Ok(buf)
    }

    fn is_connected(&self) -> bool {
        // nusb doesn't provide a direct "is connected" check.
        true
    }

    fn vendor_id(&self) -> u16 {
        self.vid
    }

    fn product_id(&self) -> u16 {
        self.pid
    }
}
