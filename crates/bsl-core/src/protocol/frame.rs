//! Logical BSL frames.
//!
//! ```text
//! +------+------+------+---------+-----------+----------+------+
//! | 0x7E | 0x00 | type | len BE  |  payload  | csum BE  | 0x7E |
//! +------+------+------+---------+-----------+----------+------+
//! |  1   |  1   |  1   |    2    |    len    |    2     |  1   |
//! +------+------+------+---------+-----------+----------+------+
//! ```
//!
//! The checksum covers reserved byte, type, length and payload.

use thiserror::Error;

use super::checksum::{ChecksumMode, checksum};
use super::codec;
use super::command::{Command, Reply};
use super::constants::*;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Frame too short: {len} bytes")]
    Truncated { len: usize },

    #[error("Missing frame delimiter")]
    BadDelimiter,

    #[error("Checksum mismatch: frame carries 0x{received:04X}, computed 0x{computed:04X}")]
    ChecksumMismatch { received: u16, computed: u16 },

    #[error("Length field says {declared} payload bytes, frame holds {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("Payload of {len} bytes exceeds the 16-bit length field")]
    PayloadTooLarge { len: usize },
}

/// One protocol message, delimiters and escaping stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    kind: u8,
    payload: Vec<u8>,
    checksum: u16,
}

impl Frame {
    /// Build a host command frame, checksummed with `mode`.
    pub fn command(
        command: Command,
        payload: Vec<u8>,
        mode: ChecksumMode,
    ) -> Result<Self, FrameError> {
        Self::build(command.code(), payload, mode)
    }

    /// Build a frame with an arbitrary type byte.
    pub fn build(kind: u8, payload: Vec<u8>, mode: ChecksumMode) -> Result<Self, FrameError> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(FrameError::PayloadTooLarge { len: payload.len() });
        }
        let mut frame = Self {
            kind,
            payload,
            checksum: 0,
        };
        let raw = frame.raw_without_checksum();
        frame.checksum = checksum(mode, &raw[1..]);
        Ok(frame)
    }

    pub fn kind(&self) -> u8 {
        self.kind
    }

    pub fn reply(&self) -> Reply {
        Reply::from_code(self.kind)
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    pub fn checksum(&self) -> u16 {
        self.checksum
    }

    fn raw_without_checksum(&self) -> Vec<u8> {
        let mut raw = Vec::with_capacity(self.payload.len() + FRAME_OVERHEAD);
        raw.push(FRAME_START);
        raw.push(0x00);
        raw.push(self.kind);
        raw.extend_from_slice(&(self.payload.len() as u16).to_be_bytes());
        raw.extend_from_slice(&self.payload);
        raw
    }

    /// Unstuffed frame bytes including both delimiters.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut raw = self.raw_without_checksum();
        raw.extend_from_slice(&self.checksum.to_be_bytes());
        raw.push(FRAME_END);
        raw
    }

    /// Stuffed bytes ready for the transport.
    pub fn encode(&self) -> Vec<u8> {
        codec::stuff(&self.to_bytes())
    }

    /// Parse and validate an unstuffed frame.
    pub fn parse(raw: &[u8], mode: ChecksumMode) -> Result<Self, FrameError> {
        let received = verify(raw, mode)?;
        let declared =
            u16::from_be_bytes([raw[FRAME_LENGTH_OFFSET], raw[FRAME_LENGTH_OFFSET + 1]]) as usize;
        let actual = raw.len() - FRAME_OVERHEAD;
        if declared != actual {
            return Err(FrameError::LengthMismatch { declared, actual });
        }
        Ok(Self {
            kind: raw[FRAME_TYPE_OFFSET],
            payload: raw[FRAME_DATA_OFFSET..FRAME_DATA_OFFSET + actual].to_vec(),
            checksum: received,
        })
    }
}

/// Check delimiters and checksum of an unstuffed frame.
///
/// Returns the checksum the frame carries.
pub fn verify(raw: &[u8], mode: ChecksumMode) -> Result<u16, FrameError> {
    let len = raw.len();
    if len < FRAME_OVERHEAD {
        return Err(FrameError::Truncated { len });
    }
    if raw[0] != FRAME_START || raw[len - 1] != FRAME_END {
        return Err(FrameError::BadDelimiter);
    }
    let received = u16::from_be_bytes([raw[len - 3], raw[len - 2]]);
    let computed = checksum(mode, &raw[1..len - 3]);
    if received != computed {
        return Err(FrameError::ChecksumMismatch { received, computed });
    }
    Ok(received)
}

/// Total unstuffed length announced by a frame prefix, once the length field
/// has arrived.
pub fn expected_len(prefix: &[u8]) -> Option<usize> {
    if prefix.len() < FRAME_DATA_OFFSET {
        return None;
    }
    let declared =
        u16::from_be_bytes([prefix[FRAME_LENGTH_OFFSET], prefix[FRAME_LENGTH_OFFSET + 1]]);
    Some(declared as usize + FRAME_OVERHEAD)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_frame_layout() {
        let frame = Frame::command(Command::Connect, Vec::new(), ChecksumMode::Crc).unwrap();
        let wire = frame.encode();
        assert_eq!(wire.len(), 8);
        assert_eq!(wire, [0x7E, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x7E]);
    }

    #[test]
    fn test_ack_frame_matches_capture() {
        let frame = Frame::build(Reply::Ack.code(), Vec::new(), ChecksumMode::InternetSum).unwrap();
        assert_eq!(frame.to_bytes(), [0x7E, 0x00, 0x80, 0x00, 0x00, 0xFF, 0x7F, 0x7E]);
    }

    #[test]
    fn test_encode_unstuff_parse_roundtrip() {
        let payload: Vec<u8> = [0x7E, 0x7D, 0x00, 0xFF].repeat(300);
        for mode in [ChecksumMode::Crc, ChecksumMode::InternetSum] {
            let frame = Frame::command(Command::MidstData, payload.clone(), mode).unwrap();
            let raw = codec::unstuff(&frame.encode());
            let parsed = Frame::parse(&raw, mode).unwrap();
            assert_eq!(parsed, frame);
        }
    }

    #[test]
    fn test_payload_mutation_breaks_checksum() {
        let frame =
            Frame::command(Command::StartData, vec![1, 2, 3, 4], ChecksumMode::Crc).unwrap();
        let mut raw = frame.to_bytes();
        raw[FRAME_DATA_OFFSET + 2] ^= 0x01;
        assert!(matches!(
            verify(&raw, ChecksumMode::Crc),
            Err(FrameError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_wrong_mode_fails_verification() {
        let frame = Frame::command(Command::Connect, vec![9], ChecksumMode::Crc).unwrap();
        assert!(verify(&frame.to_bytes(), ChecksumMode::InternetSum).is_err());
    }

    #[test]
    fn test_bad_delimiter() {
        let frame = Frame::command(Command::Connect, Vec::new(), ChecksumMode::Crc).unwrap();
        let mut raw = frame.to_bytes();
        raw[0] = 0x00;
        assert_eq!(verify(&raw, ChecksumMode::Crc), Err(FrameError::BadDelimiter));
        assert_eq!(
            verify(&raw[..4], ChecksumMode::Crc),
            Err(FrameError::Truncated { len: 4 })
        );
    }

    #[test]
    fn test_payload_too_large() {
        let err = Frame::command(
            Command::MidstData,
            vec![0; MAX_PAYLOAD_LEN + 1],
            ChecksumMode::Crc,
        )
        .unwrap_err();
        assert_eq!(err, FrameError::PayloadTooLarge { len: 65536 });
        let largest = vec![0; MAX_PAYLOAD_LEN];
        assert!(Frame::command(Command::MidstData, largest, ChecksumMode::Crc).is_ok());
    }

    #[test]
    fn test_expected_len() {
        assert_eq!(expected_len(&[0x7E, 0x00, 0x93]), None);
        assert_eq!(expected_len(&[0x7E, 0x00, 0x93, 0x30, 0x00]), Some(0x3008));
    }
}
