//! BER-TLV encapsulation in the `53` data object used by ISO 18013-5 NFC data transfer.

use crate::bytes::{ByteCursor, ByteWriter};
use crate::error::ErrorKind;

pub const TAG_DO53: u8 = 0x53;

/// Largest value a length of up to four bytes can express.
pub const MAX_DO53_LENGTH: usize = 0xFF_FFFF;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TlvError {
    #[error("expected tag 0x53, found 0x{0:02x}")]
    UnexpectedTag(u8),
    #[error("unsupported length form 0x{0:02x}")]
    UnsupportedLengthForm(u8),
    #[error("input ends before the TLV header is complete")]
    Truncated,
    #[error("declared length {declared} does not match the {actual} bytes of value present")]
    LengthMismatch { declared: usize, actual: usize },
    #[error("value of {0} bytes is too long to encapsulate")]
    ValueTooLong(usize),
}

impl TlvError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TlvError::ValueTooLong(_) => ErrorKind::UnsupportedFeature,
            _ => ErrorKind::MalformedEncoding,
        }
    }
}

/// Wraps `data` in a `53` data object.
pub fn encapsulate(data: &[u8]) -> Result<Vec<u8>, TlvError> {
    let len = data.len();
    let mut writer = ByteWriter::with_capacity(len + 5);
    writer.write_u8(TAG_DO53);
    if len < 0x80 {
        writer.write_u8(len as u8);
    } else if len < 0x100 {
        writer.write_u8(0x81).write_u8(len as u8);
    } else if len < 0x1_0000 {
        writer.write_u8(0x82).write_u16_be(len as u16);
    } else if len <= MAX_DO53_LENGTH {
        writer.write_u8(0x83).write_u24_be(len as u32);
    } else {
        return Err(TlvError::ValueTooLong(len));
    }
    writer.write_slice(data);
    Ok(writer.into_bytes())
}

/// Returns the value of a `53` data object that spans all of `bytes`.
pub fn extract(bytes: &[u8]) -> Result<&[u8], TlvError> {
    let mut cursor = ByteCursor::new(bytes);
    let tag = cursor.read_u8().map_err(|_| TlvError::Truncated)?;
    if tag != TAG_DO53 {
        return Err(TlvError::UnexpectedTag(tag));
    }
    let first = cursor.read_u8().map_err(|_| TlvError::Truncated)?;
    let declared = match first {
        0x00..=0x7F => Ok(first as usize),
        0x81 => cursor.read_u8().map(usize::from),
        0x82 => cursor.read_u16_be().map(usize::from),
        0x83 => cursor.read_u24_be().map(|len| len as usize),
        _ => return Err(TlvError::UnsupportedLengthForm(first)),
    }
    .map_err(|_| TlvError::Truncated)?;

    let value = cursor.rest();
    if value.len() != declared {
        return Err(TlvError::LengthMismatch {
            declared,
            actual: value.len(),
        });
    }
    Ok(value)
}
