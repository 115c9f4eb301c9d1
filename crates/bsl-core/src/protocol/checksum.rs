//! Frame checksums.
//!
//! The boot ROM and FDL1 check frames with CRC-16 (poly 0x1021, MSB first).
//! FDL2 switches to an IP-style one's-complement sum over big-endian words.

use std::fmt;

use crc::{CRC_16_XMODEM, Crc};
use serde::{Deserialize, Serialize};

/// Which checksum the peer currently expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChecksumMode {
    /// Boot ROM / FDL1.
    #[default]
    Crc,
    /// FDL2 and partition transfers.
    InternetSum,
}

impl fmt::Display for ChecksumMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChecksumMode::Crc => write!(f, "CRC16"),
            ChecksumMode::InternetSum => write!(f, "IPSUM"),
        }
    }
}

/// CRC-16/XMODEM: polynomial 0x1021, MSB first, no final XOR.
pub const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

/// CRC-16 starting from `seed`.
pub fn crc16(seed: u16, buffer: &[u8]) -> u16 {
    let mut digest = CRC16.digest_with_initial(seed);
    digest.update(buffer);
    digest.finalize()
}

/// One's-complement checksum over big-endian 16-bit words.
///
/// A trailing odd byte is the high half of a zero-padded word.
pub fn internet_checksum(buffer: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut words = buffer.chunks_exact(2);
    for word in &mut words {
        sum += u32::from(u16::from_be_bytes([word[0], word[1]]));
    }
    if let [last] = words.remainder() {
        sum += u32::from(*last) << 8;
    }
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    !(sum as u16)
}

/// Checksum `buffer` with the algorithm selected by `mode`.
pub fn checksum(mode: ChecksumMode, buffer: &[u8]) -> u16 {
    match mode {
        ChecksumMode::Crc => crc16(0, buffer),
        ChecksumMode::InternetSum => internet_checksum(buffer),
    }
}
