//! Protocol constants for the Spreadtrum BSL download protocol.
//!
//! Values match what the boot ROM and the FDL loaders answer on the wire.

use std::time::Duration;

// ============================================================================
// Device Identification
// ============================================================================

/// Spreadtrum Communications Vendor ID
pub const SPRD_VENDOR_ID: u16 = 0x1782;

/// Download-mode Product ID (boot ROM, FDL1 and FDL2 all enumerate with it)
pub const SPRD_DOWNLOAD_PID: u16 = 0x4D00;

/// Alternative PID seen on some boards
pub const SPRD_ALT_PID: u16 = 0x4002;

/// All supported PIDs for device discovery
pub const SUPPORTED_PIDS: &[u16] = &[SPRD_DOWNLOAD_PID, SPRD_ALT_PID];

/// Interface carrying the bulk pipes
pub const SPRD_INTERFACE: u8 = 0x00;

/// Bulk IN endpoint
pub const SPRD_ENDPOINT_IN: u8 = 0x85;

/// Bulk OUT endpoint
pub const SPRD_ENDPOINT_OUT: u8 = 0x06;

/// Per-call bulk transfer timeout.
pub const TRANSFER_TIMEOUT: Duration = Duration::from_millis(200);

/// Upper bound for a single bulk read.
pub const MAX_READ_SIZE: usize = 0x10000;

// ============================================================================
// Framing
// ============================================================================

/// Start-of-frame delimiter.
pub const FRAME_START: u8 = 0x7E;

/// End-of-frame delimiter.
pub const FRAME_END: u8 = 0x7E;

/// Escape byte inside the stuffed region.
pub const ESCAPE: u8 = 0x7D;

/// Second byte of an escaped `0x7E`.
pub const ESCAPED_DELIMITER: u8 = 0x5E;

/// Second byte of an escaped `0x7D`.
pub const ESCAPED_ESCAPE: u8 = 0x5D;

/// Offset of the frame type (command/reply) byte.
pub const FRAME_TYPE_OFFSET: usize = 2;

/// Offset of the big-endian payload length.
pub const FRAME_LENGTH_OFFSET: usize = 3;

/// Offset of the first payload byte.
pub const FRAME_DATA_OFFSET: usize = 5;

/// Delimiters, reserved byte, type, length and checksum.
pub const FRAME_OVERHEAD: usize = 8;

/// Largest payload the 16-bit length field can describe.
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize;

// ============================================================================
// Loader images
// ============================================================================

/// Stage-1 loader (FDL1) load address in internal RAM.
pub const FDL1_LOAD_ADDRESS: u32 = 0x5000_0000;

/// Stage-1 download window.
pub const FDL1_WINDOW: u32 = 528;

/// Stage-2 loader (FDL2) load address in DRAM.
pub const FDL2_LOAD_ADDRESS: u32 = 0x9F00_0000;

/// Stage-2 download window.
pub const FDL2_WINDOW: u32 = 2112;

// ============================================================================
// Partition transfers
// ============================================================================

/// Default window for `READ_FLASH_MIDST` (12 KiB).
pub const UPLOAD_WINDOW: u32 = 0x3000;

/// Default window for partition `MIDST_DATA`.
pub const DOWNLOAD_WINDOW: u32 = 0x1000;

/// Longest partition name, in UTF-16 code units.
pub const PARTITION_NAME_UNITS: usize = 36;

/// Byte length of the UTF-16LE partition name field.
pub const PARTITION_NAME_FIELD: usize = PARTITION_NAME_UNITS * 2;

/// Payload length of a partition start request (name + size).
pub const PARTITION_REQUEST_LEN: usize = PARTITION_NAME_FIELD + 4;

/// "Read everything available" size hint.
pub const READ_ALL: u32 = 0xFFFF_FFFF;

// ============================================================================
// Retry policy
// ============================================================================

/// Receive attempts for a partition start/open acknowledgement.
pub const START_ATTEMPTS: u32 = 5;

/// Receive attempts while FDL2 boots after `EXEC_DATA`.
pub const FDL2_EXEC_ATTEMPTS: u32 = 15;

/// Version probe attempts once FDL1 is running.
pub const LOADER_PROBE_ATTEMPTS: u32 = 2;

// ============================================================================
// Block device
// ============================================================================

/// Physical block size exposed to filesystem drivers.
pub const BLOCK_SIZE: u32 = 512;

/// Block count (4 GiB at 512-byte blocks).
pub const BLOCK_COUNT: u64 = 8 * 1024 * 1024;
