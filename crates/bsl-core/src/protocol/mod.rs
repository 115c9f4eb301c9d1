//! Protocol module - BSL wire format definitions.

pub mod checksum;
pub mod codec;
pub mod command;
pub mod constants;
pub mod frame;
pub mod header;

pub use checksum::{ChecksumMode, checksum, crc16, internet_checksum};
pub use command::{Command, Reply};
pub use constants::*;
pub use frame::{Frame, FrameError};
pub use header::{HeaderError, LoadRequest, PartitionRequest, ReadWindow};
