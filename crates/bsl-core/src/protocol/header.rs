//! Payload layouts for transfer requests.

use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;
use thiserror::Error;

use super::constants::{PARTITION_NAME_FIELD, PARTITION_NAME_UNITS, PARTITION_REQUEST_LEN};

#[derive(Error, Debug)]
pub enum HeaderError {
    #[error("Buffer too small: expected {expected}, got {actual}")]
    BufferTooSmall { expected: usize, actual: usize },
    #[error("Partition name '{name}' is longer than {max} UTF-16 units")]
    NameTooLong { name: String, max: usize },
    #[error("Partition name is empty")]
    EmptyName,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Partition start request (76 bytes).
///
/// Sent with `READ_FLASH_START` and, for named partitions, `START_DATA`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionRequest {
    pub name: String,
    pub size: u32,
}

impl PartitionRequest {
    pub const SIZE: usize = PARTITION_REQUEST_LEN;

    pub fn new(name: impl Into<String>, size: u32) -> Result<Self, HeaderError> {
        let name = name.into();
        if name.is_empty() {
            return Err(HeaderError::EmptyName);
        }
        if name.encode_utf16().count() > PARTITION_NAME_UNITS {
            return Err(HeaderError::NameTooLong {
                name,
                max: PARTITION_NAME_UNITS,
            });
        }
        Ok(Self { name, size })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        for unit in self.name.encode_utf16() {
            buf.write_u16::<LittleEndian>(unit).unwrap();
        }
        buf.resize(PARTITION_NAME_FIELD, 0);
        buf.write_u32::<LittleEndian>(self.size).unwrap();
        buf
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, HeaderError> {
        if data.len() < Self::SIZE {
            return Err(HeaderError::BufferTooSmall {
                expected: Self::SIZE,
                actual: data.len(),
            });
        }
        let mut cursor = Cursor::new(data);
        let mut units = Vec::with_capacity(PARTITION_NAME_UNITS);
        for _ in 0..PARTITION_NAME_UNITS {
            units.push(cursor.read_u16::<LittleEndian>()?);
        }
        let end = units.iter().position(|&u| u == 0).unwrap_or(units.len());
        Ok(Self {
            name: String::from_utf16_lossy(&units[..end]),
            size: cursor.read_u32::<LittleEndian>()?,
        })
    }
}

/// `READ_FLASH_MIDST` window request (8 bytes, little-endian).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadWindow {
    pub size: u32,
    pub offset: u32,
}

impl ReadWindow {
    pub const SIZE: usize = 8;

    pub fn new(size: u32, offset: u32) -> Self {
        Self { size, offset }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        buf.write_u32::<LittleEndian>(self.size).unwrap();
        buf.write_u32::<LittleEndian>(self.offset).unwrap();
        buf
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, HeaderError> {
        if data.len() < Self::SIZE {
            return Err(HeaderError::BufferTooSmall {
                expected: Self::SIZE,
                actual: data.len(),
            });
        }
        let mut cursor = Cursor::new(data);
        Ok(Self {
            size: cursor.read_u32::<LittleEndian>()?,
            offset: cursor.read_u32::<LittleEndian>()?,
        })
    }
}

/// `START_DATA` request for a RAM load address (8 bytes, big-endian).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadRequest {
    pub address: u32,
    pub size: u32,
}

impl LoadRequest {
    pub const SIZE: usize = 8;

    pub fn new(address: u32, size: u32) -> Self {
        Self { address, size }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        buf.write_u32::<BigEndian>(self.address).unwrap();
        buf.write_u32::<BigEndian>(self.size).unwrap();
        buf
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, HeaderError> {
        if data.len() < Self::SIZE {
            return Err(HeaderError::BufferTooSmall {
                expected: Self::SIZE,
                actual: data.len(),
            });
        }
        let mut cursor = Cursor::new(data);
        Ok(Self {
            address: cursor.read_u32::<BigEndian>()?,
            size: cursor.read_u32::<BigEndian>()?,
        })
    }
}

/// Version string from a probe reply, up to the first NUL.
pub fn version_string(payload: &[u8]) -> String {
    let end = payload.iter().position(|&b| b == 0).unwrap_or(payload.len());
    String::from_utf8_lossy(&payload[..end]).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::constants::READ_ALL;

    #[test]
    fn test_partition_request_layout() {
        let req = PartitionRequest::new("data", READ_ALL).unwrap();
        let bytes = req.to_bytes();
        assert_eq!(bytes.len(), 76);
        assert_eq!(&bytes[..8], b"d\0a\0t\0a\0");
        assert!(bytes[8..72].iter().all(|&b| b == 0));
        assert_eq!(&bytes[72..], &[0xFF; 4]);

        let parsed = PartitionRequest::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, req);
    }

    #[test]
    fn test_partition_request_name_limits() {
        assert!(PartitionRequest::new("x".repeat(36), 0).is_ok());
        assert!(matches!(
            PartitionRequest::new("x".repeat(37), 0),
            Err(HeaderError::NameTooLong { .. })
        ));
        assert!(matches!(
            PartitionRequest::new("", 0),
            Err(HeaderError::EmptyName)
        ));
    }

    #[test]
    fn test_read_window_is_little_endian() {
        let bytes = ReadWindow::new(0x3000, 0x0001_2000).to_bytes();
        assert_eq!(bytes, [0x00, 0x30, 0x00, 0x00, 0x00, 0x20, 0x01, 0x00]);
    }

    #[test]
    fn test_load_request_is_big_endian() {
        let bytes = LoadRequest::new(0x5000_0000, 0x1234).to_bytes();
        assert_eq!(bytes, [0x50, 0x00, 0x00, 0x00, 0x00, 0x00, 0x12, 0x34]);
        assert_eq!(
            LoadRequest::from_bytes(&bytes).unwrap(),
            LoadRequest::new(0x5000_0000, 0x1234)
        );
    }

    #[test]
    fn test_version_string() {
        assert_eq!(version_string(b"SPRD3\0\0\0"), "SPRD3");
        assert_eq!(
            version_string(b"Spreadtrum Boot Block version 1.1"),
            "Spreadtrum Boot Block version 1.1"
        );
    }
}
