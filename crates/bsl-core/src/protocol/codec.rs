//! Byte stuffing between logical frames and their wire form.
//!
//! Inside a frame `0x7E` becomes `0x7D 0x5E` and `0x7D` becomes `0x7D 0x5D`.
//! The delimiters at both ends of the buffer are structural and pass through.

use super::constants::{ESCAPE, ESCAPED_DELIMITER, ESCAPED_ESCAPE, FRAME_START};

/// Escape a delimited logical frame for the wire.
///
/// `raw` must already carry its own start and end delimiters.
pub fn stuff(raw: &[u8]) -> Vec<u8> {
    let last = raw.len().saturating_sub(1);
    let mut wire = Vec::with_capacity(raw.len() + raw.len() / 8 + 2);

    for (i, &byte) in raw.iter().enumerate() {
        match byte {
            FRAME_START if i != 0 && i != last => {
                wire.push(ESCAPE);
                wire.push(ESCAPED_DELIMITER);
            }
            ESCAPE => {
                wire.push(ESCAPE);
                wire.push(ESCAPED_ESCAPE);
            }
            _ => wire.push(byte),
        }
    }

    wire
}

/// Undo [`stuff`].
///
/// An escape followed by an unknown byte is dropped together with that byte.
/// A lone trailing escape is dropped; callers must not unstuff a buffer that
/// ends inside an escape pair.
pub fn unstuff(wire: &[u8]) -> Vec<u8> {
    let mut raw = Vec::with_capacity(wire.len());
    let mut bytes = wire.iter();

    while let Some(&byte) = bytes.next() {
        if byte != ESCAPE {
            raw.push(byte);
            continue;
        }
        match bytes.next() {
            Some(&ESCAPED_DELIMITER) => raw.push(FRAME_START),
            Some(&ESCAPED_ESCAPE) => raw.push(ESCAPE),
            Some(other) => {
                tracing::trace!(byte = %format!("0x{other:02X}"), "Dropping invalid escape pair");
            }
            None => {
                tracing::trace!("Dropping trailing escape byte");
            }
        }
    }

    raw
}

/// Whether a wire buffer ends on the first half of an escape pair.
pub fn ends_mid_escape(wire: &[u8]) -> bool {
    wire.last() == Some(&ESCAPE)
}
