use crate::bytes::{ByteCursor, BytesError};

use super::{CborError, CborMap, DataItem, MalformedReason};

/// Containers nested deeper than this are rejected.
pub const MAX_NESTING_DEPTH: usize = 256;

const BREAK: u8 = 0xff;

type Result<T, E = CborError> = std::result::Result<T, E>;

/// Decodes exactly one data item spanning the whole buffer.
pub fn decode(bytes: &[u8]) -> Result<DataItem> {
    decode_nested(bytes, 0)
}

/// [decode] for CBOR found inside another item at `depth`, so that nesting across embedded
/// layers counts against [MAX_NESTING_DEPTH].
pub(crate) fn decode_nested(bytes: &[u8], depth: usize) -> Result<DataItem> {
    let mut decoder = Decoder {
        cursor: ByteCursor::new(bytes),
    };
    let item = decoder.item(depth)?;
    let end = decoder.cursor.position();
    if end != bytes.len() {
        return Err(CborError::malformed(
            end,
            MalformedReason::TrailingBytes(bytes.len() - end),
        ));
    }
    Ok(item)
}

/// Decodes one data item starting at `offset`, returning the offset just past it.
pub fn decode_at(bytes: &[u8], offset: usize) -> Result<(usize, DataItem)> {
    let mut decoder = Decoder {
        cursor: ByteCursor::at(bytes, offset),
    };
    let item = decoder.item(0)?;
    Ok((decoder.cursor.position(), item))
}

impl From<BytesError> for CborError {
    fn from(e: BytesError) -> Self {
        CborError::malformed(e.position, MalformedReason::Truncated)
    }
}

struct Decoder<'a> {
    cursor: ByteCursor<'a>,
}

impl<'a> Decoder<'a> {
    fn item(&mut self, depth: usize) -> Result<DataItem> {
        let start = self.cursor.position();
        match self.next(depth)? {
            Some(item) => Ok(item),
            None => Err(CborError::malformed(start, MalformedReason::UnexpectedBreak)),
        }
    }

    /// The next item, or `None` if a BREAK was consumed.
    fn next(&mut self, depth: usize) -> Result<Option<DataItem>> {
        let start = self.cursor.position();
        let initial = self.cursor.read_u8()?;
        if initial == BREAK {
            return Ok(None);
        }
        if depth > MAX_NESTING_DEPTH {
            return Err(CborError::malformed(
                start,
                MalformedReason::NestingTooDeep(MAX_NESTING_DEPTH),
            ));
        }
        let major = initial >> 5;
        let ai = initial & 0x1f;
        if major == 7 {
            return self.simple_or_float(start, ai).map(Some);
        }

        let argument = self.argument(start, major, ai)?;
        let item = match major {
            0 => DataItem::UnsignedInt(definite(start, major, argument)?),
            1 => DataItem::NegativeInt(definite(start, major, argument)?),
            2 => match argument {
                Some(len) => DataItem::ByteString(self.slice(start, len)?.to_vec()),
                None => DataItem::IndefiniteByteString(self.chunks(2, |bytes, _| {
                    Ok(bytes.to_vec())
                })?),
            },
            3 => match argument {
                Some(len) => {
                    let bytes = self.slice(start, len)?;
                    DataItem::TextString(utf8(start, bytes)?)
                }
                None => DataItem::IndefiniteTextString(self.chunks(3, utf8_chunk)?),
            },
            4 => {
                let mut items = Vec::new();
                match argument {
                    Some(count) => {
                        self.check_count(start, count, 1)?;
                        items.reserve(count as usize);
                        for _ in 0..count {
                            items.push(self.item(depth + 1)?);
                        }
                    }
                    None => {
                        while let Some(item) = self.next(depth + 1)? {
                            items.push(item);
                        }
                    }
                }
                DataItem::Array {
                    items,
                    indefinite: argument.is_none(),
                }
            }
            5 => {
                let mut entries = CborMap::new();
                match argument {
                    Some(count) => {
                        self.check_count(start, count, 2)?;
                        for _ in 0..count {
                            let key_start = self.cursor.position();
                            let key = self.item(depth + 1)?;
                            let value = self.item(depth + 1)?;
                            insert_entry(&mut entries, key_start, key, value)?;
                        }
                    }
                    None => {
                        let mut key_start = self.cursor.position();
                        while let Some(key) = self.next(depth + 1)? {
                            let value = self.item(depth + 1)?;
                            insert_entry(&mut entries, key_start, key, value)?;
                            key_start = self.cursor.position();
                        }
                    }
                }
                DataItem::Map {
                    entries,
                    indefinite: argument.is_none(),
                }
            }
            _ => {
                let tag = definite(start, major, argument)?;
                DataItem::Tagged(tag, Box::new(self.item(depth + 1)?))
            }
        };
        Ok(Some(item))
    }

    /// The header argument, `None` for an indefinite length.
    fn argument(&mut self, start: usize, major: u8, ai: u8) -> Result<Option<u64>> {
        let value = match ai {
            0..=23 => ai as u64,
            24 => self.cursor.read_u8()? as u64,
            25 => self.cursor.read_u16_be()? as u64,
            26 => self.cursor.read_u32_be()? as u64,
            27 => self.cursor.read_u64_be()?,
            31 => {
                if !(2..=5).contains(&major) {
                    return Err(CborError::malformed(
                        start,
                        MalformedReason::IndefiniteNotAllowed(major),
                    ));
                }
                return Ok(None);
            }
            _ => {
                return Err(CborError::malformed(
                    start,
                    MalformedReason::InvalidAdditionalInfo(ai),
                ))
            }
        };
        Ok(Some(value))
    }

    fn simple_or_float(&mut self, start: usize, ai: u8) -> Result<DataItem> {
        Ok(match ai {
            0..=23 => DataItem::Simple(ai),
            24 => {
                let value = self.cursor.read_u8()?;
                if value < 32 {
                    return Err(CborError::malformed(
                        start,
                        MalformedReason::InvalidSimpleValue(value),
                    ));
                }
                DataItem::Simple(value)
            }
            25 => DataItem::Float32(half_to_f32(self.cursor.read_u16_be()?)),
            26 => DataItem::Float32(f32::from_bits(self.cursor.read_u32_be()?)),
            27 => DataItem::Float64(f64::from_bits(self.cursor.read_u64_be()?)),
            _ => {
                return Err(CborError::malformed(
                    start,
                    MalformedReason::InvalidAdditionalInfo(ai),
                ))
            }
        })
    }

    fn slice(&mut self, start: usize, len: u64) -> Result<&'a [u8]> {
        if len > self.cursor.remaining() as u64 {
            return Err(CborError::malformed(
                start,
                MalformedReason::LengthOutOfRange(len),
            ));
        }
        Ok(self.cursor.read_slice(len as usize)?)
    }

    /// Rejects counts that cannot fit in the rest of the input before allocating for them.
    fn check_count(&self, start: usize, count: u64, min_item_size: u64) -> Result<()> {
        if count.saturating_mul(min_item_size) > self.cursor.remaining() as u64 {
            return Err(CborError::malformed(
                start,
                MalformedReason::LengthOutOfRange(count),
            ));
        }
        Ok(())
    }

    /// Reads the definite-length chunks of an indefinite string up to BREAK.
    fn chunks<T>(
        &mut self,
        major: u8,
        convert: impl Fn(&'a [u8], usize) -> Result<T>,
    ) -> Result<Vec<T>> {
        let mut chunks = Vec::new();
        loop {
            let start = self.cursor.position();
            let initial = self.cursor.read_u8()?;
            if initial == BREAK {
                return Ok(chunks);
            }
            if initial >> 5 != major || initial & 0x1f == 31 {
                return Err(CborError::malformed(start, MalformedReason::InvalidChunk));
            }
            let len = definite(start, major, self.argument(start, major, initial & 0x1f)?)?;
            let bytes = self.slice(start, len)?;
            chunks.push(convert(bytes, start)?);
        }
    }
}

fn definite(start: usize, major: u8, argument: Option<u64>) -> Result<u64> {
    argument.ok_or_else(|| CborError::malformed(start, MalformedReason::IndefiniteNotAllowed(major)))
}

fn utf8(start: usize, bytes: &[u8]) -> Result<String> {
    String::from_utf8(bytes.to_vec())
        .map_err(|_| CborError::malformed(start, MalformedReason::InvalidUtf8))
}

fn utf8_chunk(bytes: &[u8], start: usize) -> Result<String> {
    utf8(start, bytes)
}

fn insert_entry(
    entries: &mut CborMap,
    key_start: usize,
    key: DataItem,
    value: DataItem,
) -> Result<()> {
    entries
        .insert_unique(key, value)
        .map_err(|_| CborError::malformed(key_start, MalformedReason::DuplicateMapKey))
}

/// Widens an IEEE 754 half-precision value (RFC 8949 Appendix D).
fn half_to_f32(half: u16) -> f32 {
    let sign = ((half & 0x8000) as u32) << 16;
    let exponent = (half >> 10) & 0x1f;
    let mantissa = (half & 0x3ff) as u32;
    match exponent {
        // Subnormal halves are normal f32 values, so go through arithmetic.
        0 => {
            let magnitude = mantissa as f32 * 2f32.powi(-24);
            if sign != 0 {
                -magnitude
            } else {
                magnitude
            }
        }
        31 => f32::from_bits(sign | 0x7f80_0000 | (mantissa << 13)),
        _ => f32::from_bits(sign | ((exponent as u32 + 112) << 23) | (mantissa << 13)),
    }
}
