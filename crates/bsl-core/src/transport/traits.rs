//! Transport seam between the frame exchange and the USB stack.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("No download-mode device: VID={vid:04X} PID={pid:04X}")]
    DeviceNotFound { vid: u16, pid: u16 },

    #[error("Failed to open device: {0}")]
    OpenFailed(String),

    #[error("Failed to claim interface {interface}: {message}")]
    ClaimInterfaceFailed { interface: u8, message: String },

    #[error("Endpoint not found: type={ep_type}, direction={direction}")]
    EndpointNotFound { ep_type: String, direction: String },

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Device disconnected")]
    Disconnected,

    #[error("No data within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

/// Bulk IN/OUT byte pipe to one device.
///
/// Every call blocks for at most the transport's per-call timeout. The
/// protocol engine borrows a transport and never owns it.
pub trait UsbTransport: Send + Sync {
    /// Write raw bytes to the OUT endpoint.
    fn write(&self, data: &[u8]) -> Result<usize, TransportError>;

    /// Read whatever arrives on the IN endpoint within the timeout,
    /// at most `max_len` bytes.
    fn read(&self, max_len: usize) -> Result<Vec<u8>, TransportError>;

    /// Check if device is still connected.
    fn is_connected(&self) -> bool;

    /// Get the current VID.
    fn vendor_id(&self) -> u16;

    /// Get the current PID.
    fn product_id(&self) -> u16;
}
